//! Transaction management tools.
//!
//! A connection holds at most one transaction. `begin_transaction` pins it, every
//! `execute_query` on the same connection runs inside it, and `commit_transaction` or
//! `rollback_transaction` releases it.

use crate::db::{ConnectionRegistry, SafeExecution, TransactionSupport};
use crate::error::DbResult;
use crate::tools::schema::ConnectionInput;
use schemars::JsonSchema;
use serde::Serialize;
use tracing::{info, warn};

/// Output shared by the three transaction tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TransactionOutput {
    pub connection: String,
    /// Whether a transaction is open after the call
    pub in_transaction: bool,
    /// "native" or "emulated". Emulated transactions cannot undo writes.
    pub support: TransactionSupport,
    /// Human-readable status message
    pub message: String,
}

/// Handler for transaction tools.
pub struct TransactionToolHandler {
    registry: ConnectionRegistry,
}

impl TransactionToolHandler {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub async fn begin_transaction(&self, input: ConnectionInput) -> DbResult<TransactionOutput> {
        let (connection, adapter) = self.registry.resolve_named(input.connection.as_deref()).await?;
        adapter.ensure_connection().await?;
        adapter.begin_transaction().await?;

        let support = adapter.transaction_support();
        info!(connection = %connection, support = ?support, "Transaction started");
        let message = match support {
            TransactionSupport::Native => "Transaction started".to_string(),
            TransactionSupport::Emulated => format!(
                "Transaction started; {} does not support rollback, writes apply immediately",
                adapter.kind().display_name()
            ),
        };
        Ok(TransactionOutput {
            connection,
            in_transaction: adapter.is_in_transaction(),
            support,
            message,
        })
    }

    pub async fn commit_transaction(&self, input: ConnectionInput) -> DbResult<TransactionOutput> {
        let (connection, adapter) = self.registry.resolve_named(input.connection.as_deref()).await?;
        adapter.commit_transaction().await?;

        info!(connection = %connection, "Transaction committed");
        Ok(TransactionOutput {
            connection,
            in_transaction: adapter.is_in_transaction(),
            support: adapter.transaction_support(),
            message: "Transaction committed".to_string(),
        })
    }

    pub async fn rollback_transaction(&self, input: ConnectionInput) -> DbResult<TransactionOutput> {
        let (connection, adapter) = self.registry.resolve_named(input.connection.as_deref()).await?;
        adapter.rollback_transaction().await?;

        let support = adapter.transaction_support();
        let message = if support.is_atomic() {
            "Transaction rolled back".to_string()
        } else {
            warn!(connection = %connection, "Rollback requested on emulated transaction");
            "Transaction closed; writes made inside it were not undone".to_string()
        };
        info!(connection = %connection, "Transaction rolled back");
        Ok(TransactionOutput {
            connection,
            in_transaction: adapter.is_in_transaction(),
            support,
            message,
        })
    }
}

//! Schema introspection tools.
//!
//! - `get_tables`: list tables (collections, key prefixes) on a connection
//! - `get_table_info`: columns, indexes and constraints for one table
//! - `get_database_stats`: aggregate counts and size
//! - `validate_connection`: liveness probe

use crate::db::{ConnectionRegistry, SafeExecution};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseKind, DatabaseStats, TableInfo};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Input for tools that only need a connection.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ConnectionInput {
    /// Connection name from list_connections. Omit to use the current connection.
    #[serde(default)]
    pub connection: Option<String>,
}

/// Output from the get_tables tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GetTablesOutput {
    pub connection: String,
    pub backend: DatabaseKind,
    /// Tables, collections or key-prefix groups with their columns
    pub tables: Vec<TableInfo>,
    pub count: usize,
}

/// Input for the get_table_info tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetTableInfoInput {
    /// Connection name from list_connections. Omit to use the current connection.
    #[serde(default)]
    pub connection: Option<String>,
    /// Table, collection or key-prefix name
    pub table: String,
    /// Schema or keyspace. Defaults to the connection's own.
    #[serde(default)]
    pub schema: Option<String>,
}

/// Output from the get_table_info tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GetTableInfoOutput {
    pub connection: String,
    /// False when no such table exists
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<TableInfo>,
}

/// Output from the get_database_stats tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DatabaseStatsOutput {
    pub connection: String,
    pub backend: DatabaseKind,
    #[serde(flatten)]
    pub stats: DatabaseStats,
}

/// Output from the validate_connection tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ValidateConnectionOutput {
    pub connection: String,
    pub valid: bool,
}

/// Handler for schema tools.
pub struct SchemaToolHandler {
    registry: ConnectionRegistry,
}

impl SchemaToolHandler {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub async fn get_tables(&self, input: ConnectionInput) -> DbResult<GetTablesOutput> {
        let (connection, adapter) = self.registry.resolve_named(input.connection.as_deref()).await?;
        adapter.ensure_connection().await?;

        let tables = adapter.get_tables().await?;
        debug!(connection = %connection, count = tables.len(), "Listed tables");
        Ok(GetTablesOutput {
            connection,
            backend: adapter.kind(),
            count: tables.len(),
            tables,
        })
    }

    pub async fn get_table_info(&self, input: GetTableInfoInput) -> DbResult<GetTableInfoOutput> {
        let table_name = input.table.trim();
        if table_name.is_empty() {
            return Err(DbError::invalid_input("table must not be empty"));
        }
        let (connection, adapter) = self.registry.resolve_named(input.connection.as_deref()).await?;
        adapter.ensure_connection().await?;

        let table = adapter
            .get_table_info(table_name, input.schema.as_deref())
            .await?;
        Ok(GetTableInfoOutput {
            connection,
            found: table.is_some(),
            table,
        })
    }

    pub async fn get_database_stats(&self, input: ConnectionInput) -> DbResult<DatabaseStatsOutput> {
        let (connection, adapter) = self.registry.resolve_named(input.connection.as_deref()).await?;
        adapter.ensure_connection().await?;

        let stats = adapter.get_database_stats().await?;
        Ok(DatabaseStatsOutput {
            connection,
            backend: adapter.kind(),
            stats,
        })
    }

    /// Probe the connection. A failed probe is reported as `valid: false`, not an error.
    pub async fn validate_connection(
        &self,
        input: ConnectionInput,
    ) -> DbResult<ValidateConnectionOutput> {
        let (connection, adapter) = self.registry.resolve_named(input.connection.as_deref()).await?;
        let valid = adapter.validate_connection().await;
        Ok(ValidateConnectionOutput { connection, valid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseAdapterFactory;

    async fn registry_with_sqlite() -> ConnectionRegistry {
        let registry = ConnectionRegistry::new();
        registry
            .add_connection(
                "mem",
                DatabaseAdapterFactory::default_config(DatabaseKind::Sqlite),
            )
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_get_tables_on_empty_database() {
        let registry = registry_with_sqlite().await;
        let handler = SchemaToolHandler::new(registry.clone());
        let output = handler.get_tables(ConnectionInput::default()).await.unwrap();
        assert_eq!(output.connection, "mem");
        assert_eq!(output.count, 0);
        registry.disconnect_all().await;
    }

    #[tokio::test]
    async fn test_missing_table_is_not_found() {
        let registry = registry_with_sqlite().await;
        let handler = SchemaToolHandler::new(registry.clone());
        let output = handler
            .get_table_info(GetTableInfoInput {
                connection: None,
                table: "nope".to_string(),
                schema: None,
            })
            .await
            .unwrap();
        assert!(!output.found);
        assert!(output.table.is_none());
        registry.disconnect_all().await;
    }

    #[tokio::test]
    async fn test_blank_table_name_rejected() {
        let handler = SchemaToolHandler::new(ConnectionRegistry::new());
        let err = handler
            .get_table_info(GetTableInfoInput {
                connection: None,
                table: "  ".to_string(),
                schema: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_unknown_connection() {
        let handler = SchemaToolHandler::new(ConnectionRegistry::new());
        let err = handler
            .validate_connection(ConnectionInput {
                connection: Some("ghost".to_string()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ConnectionNotFound { .. }));
    }
}

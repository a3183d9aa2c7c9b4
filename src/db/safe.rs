//! Safe execution: validate, ensure the connection is live, then run.
//!
//! Implemented once for every [`DatabaseAdapter`], so backends never reimplement the
//! orchestration.

use crate::db::adapter::{DatabaseAdapter, validate_input};
use crate::error::DbResult;
use crate::models::{BatchOutcome, QueryInput, QueryResult};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info, warn};

#[async_trait]
pub trait SafeExecution {
    /// Connect if not connected. Exactly one attempt is made.
    async fn ensure_connection(&self) -> DbResult<()>;

    /// Validate the input, ensure the connection, then execute.
    async fn safe_execute_query(&self, input: &QueryInput) -> DbResult<QueryResult>;

    /// Run every operation inside one transaction, rolling back on the first failure.
    ///
    /// The original failure is returned unchanged. On backends with emulated transactions
    /// the operations that already ran stay applied and the outcome is marked non-atomic.
    async fn execute_batch(&self, operations: &[QueryInput]) -> DbResult<BatchOutcome>;
}

#[async_trait]
impl<A> SafeExecution for A
where
    A: DatabaseAdapter + ?Sized,
{
    async fn ensure_connection(&self) -> DbResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        info!(backend = %self.kind(), "Connection not live, reconnecting");
        self.connect().await
    }

    async fn safe_execute_query(&self, input: &QueryInput) -> DbResult<QueryResult> {
        validate_input(input)?;
        self.ensure_connection().await?;

        let start = Instant::now();
        let result = self.execute_query(input).await?;
        debug!(
            backend = %self.kind(),
            row_count = result.row_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(result)
    }

    async fn execute_batch(&self, operations: &[QueryInput]) -> DbResult<BatchOutcome> {
        for op in operations {
            validate_input(op)?;
        }
        self.ensure_connection().await?;

        let atomic = self.transaction_support().is_atomic();
        if !atomic {
            warn!(
                backend = %self.kind(),
                operations = operations.len(),
                "Backend has no native transactions; batch runs without rollback"
            );
        }

        self.begin_transaction().await?;

        let mut results = Vec::with_capacity(operations.len());
        for (idx, op) in operations.iter().enumerate() {
            match self.execute_query(op).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    if let Err(rollback_err) = self.rollback_transaction().await {
                        warn!(
                            backend = %self.kind(),
                            error = %rollback_err,
                            "Rollback after batch failure failed"
                        );
                    }
                    if !atomic && idx > 0 {
                        warn!(
                            backend = %self.kind(),
                            applied = idx,
                            "Batch failed; earlier operations were not undone"
                        );
                    }
                    return Err(err);
                }
            }
        }

        self.commit_transaction().await?;
        Ok(BatchOutcome { results, atomic })
    }
}

//! Query execution tools.
//!
//! - `execute_query`: run one native query or structured command
//! - `execute_batch`: run several inside one transaction
//!
//! Both go through [`SafeExecution`], so input is validated and the connection is
//! re-established before anything reaches the backend.

use crate::db::{ConnectionRegistry, SafeExecution};
use crate::error::{DbError, DbResult};
use crate::models::{Command, DatabaseKind, FieldInfo, QueryInput, QueryResult, params_from_json};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Instant;
use tracing::info;

/// One query or command as it arrives from a tool call.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct Operation {
    /// Native query text (SQL, CQL, or a Redis command line). Mutually exclusive with `command`.
    #[serde(default)]
    pub query: Option<String>,
    /// Positional parameters. Must be a JSON array.
    #[serde(default)]
    pub params: Option<JsonValue>,
    /// Structured command for MongoDB and DynamoDB, e.g.
    /// {"collection": "users", "operation": "find", "filter": {"age": 30}}
    #[serde(default)]
    pub command: Option<Command>,
}

impl Operation {
    /// Convert into a [`QueryInput`], requiring exactly one of `query` or `command`.
    pub fn into_input(self) -> DbResult<QueryInput> {
        match (self.query, self.command) {
            (Some(query), None) => Ok(QueryInput::with_params(query, params_from_json(self.params)?)),
            (None, Some(command)) => {
                if self.params.as_ref().is_some_and(|p| !p.is_null()) {
                    return Err(DbError::invalid_input(
                        "params are not accepted with a structured command",
                    ));
                }
                Ok(QueryInput::command(command))
            }
            (Some(_), Some(_)) => Err(DbError::invalid_input(
                "Provide either query or command, not both",
            )),
            (None, None) => Err(DbError::invalid_input("Either query or command is required")),
        }
    }
}

/// Input for the execute_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteQueryInput {
    /// Connection name from list_connections. Omit to use the current connection.
    #[serde(default)]
    pub connection: Option<String>,
    #[serde(flatten)]
    pub operation: Operation,
}

/// Output from the execute_query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExecuteQueryOutput {
    /// Connection the query ran on
    pub connection: String,
    pub backend: DatabaseKind,
    /// Result rows as key-value maps. Empty for writes.
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// Rows returned, or rows affected for writes
    pub row_count: u64,
    /// Field descriptors, declared or inferred
    pub fields: Vec<FieldInfo>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

/// Input for the execute_batch tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteBatchInput {
    /// Connection name from list_connections. Omit to use the current connection.
    #[serde(default)]
    pub connection: Option<String>,
    /// Operations to run in order inside one transaction
    pub operations: Vec<Operation>,
}

/// Output from the execute_batch tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExecuteBatchOutput {
    pub connection: String,
    pub backend: DatabaseKind,
    /// One result per operation, in order
    pub results: Vec<QueryResult>,
    /// False when the backend only emulates transactions
    pub atomic: bool,
    pub execution_time_ms: u64,
}

/// Handler for the query tools.
pub struct QueryToolHandler {
    registry: ConnectionRegistry,
}

impl QueryToolHandler {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub async fn execute_query(&self, input: ExecuteQueryInput) -> DbResult<ExecuteQueryOutput> {
        let query = input.operation.into_input()?;
        let (connection, adapter) = self.registry.resolve_named(input.connection.as_deref()).await?;

        let start = Instant::now();
        let result = adapter.safe_execute_query(&query).await?;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        info!(
            connection = %connection,
            backend = %adapter.kind(),
            row_count = result.row_count,
            elapsed_ms = execution_time_ms,
            "execute_query completed"
        );

        Ok(ExecuteQueryOutput {
            connection,
            backend: adapter.kind(),
            rows: result.rows,
            row_count: result.row_count,
            fields: result.fields,
            execution_time_ms,
        })
    }

    pub async fn execute_batch(&self, input: ExecuteBatchInput) -> DbResult<ExecuteBatchOutput> {
        if input.operations.is_empty() {
            return Err(DbError::invalid_input("operations must not be empty"));
        }
        let operations = input
            .operations
            .into_iter()
            .map(Operation::into_input)
            .collect::<DbResult<Vec<_>>>()?;
        let (connection, adapter) = self.registry.resolve_named(input.connection.as_deref()).await?;

        let start = Instant::now();
        let outcome = adapter.execute_batch(&operations).await?;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        info!(
            connection = %connection,
            operations = operations.len(),
            atomic = outcome.atomic,
            elapsed_ms = execution_time_ms,
            "execute_batch completed"
        );

        Ok(ExecuteBatchOutput {
            connection,
            backend: adapter.kind(),
            results: outcome.results,
            atomic: outcome.atomic,
            execution_time_ms,
        })
    }
}

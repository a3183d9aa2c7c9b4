//! MCP tool implementations.
//!
//! Each handler resolves its connection through the shared
//! [`ConnectionRegistry`](crate::db::ConnectionRegistry) and returns a serializable output struct:
//! - `query`: execute_query, execute_batch
//! - `schema`: get_tables, get_table_info, get_database_stats, validate_connection
//! - `transaction`: begin/commit/rollback_transaction
//! - `connection`: registry management and discovery helpers

pub mod connection;
pub mod query;
pub mod schema;
pub mod transaction;

pub use connection::{
    AddConnectionInput, AddConnectionOutput, ConnectionNameInput, ConnectionToolHandler,
    CurrentConnectionOutput, DefaultConfigInput, DefaultConfigOutput, ListConnectionsOutput,
    RemoveConnectionOutput, SupportedTypesOutput, ValidateAllOutput,
};
pub use query::{
    ExecuteBatchInput, ExecuteBatchOutput, ExecuteQueryInput, ExecuteQueryOutput, Operation,
    QueryToolHandler,
};
pub use schema::{
    ConnectionInput, DatabaseStatsOutput, GetTableInfoInput, GetTableInfoOutput, GetTablesOutput,
    SchemaToolHandler, ValidateConnectionOutput,
};
pub use transaction::{TransactionOutput, TransactionToolHandler};

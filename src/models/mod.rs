//! Data models for the database gateway.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;

pub use connection::{
    BackendOptions, CassandraOptions, ConnectionConfig, ConnectionConfigError, ConnectionSummary,
    DatabaseKind, DynamoDbOptions, MongoOptions, MsSqlOptions, MySqlOptions, PostgresOptions,
    RedisOptions, SqliteOptions, validate_connection_name,
};
pub use query::{
    BatchOutcome, Command, CommandAction, FieldInfo, QueryInput, QueryParam, QueryResult,
    infer_fields, params_from_json,
};
pub use schema::{
    ColumnInfo, ConstraintInfo, ConstraintKind, DatabaseStats, IndexInfo, TableInfo, TableType,
    format_size, group_constraints,
};

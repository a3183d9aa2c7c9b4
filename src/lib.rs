//! db-gateway library.
//!
//! One MCP tool surface over relational, key-value, document, wide-column and managed
//! NoSQL databases. Every backend implements [`db::DatabaseAdapter`]; the
//! [`db::ConnectionRegistry`] holds them by name and [`mcp::GatewayService`] exposes them.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use db::{ConnectionRegistry, DatabaseAdapter, DatabaseAdapterFactory, SafeExecution};
pub use error::{DbError, DbResult};
pub use mcp::GatewayService;

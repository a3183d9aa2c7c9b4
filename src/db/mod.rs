//! Database abstraction layer.
//!
//! - [`adapter`]: the contract every backend implements, plus shared helpers
//! - [`safe`]: validate-connect-execute orchestration and batches
//! - [`adapters`]: one implementation per backend
//! - [`factory`]: config validation and adapter construction
//! - [`registry`]: named connections and the current pointer

pub mod adapter;
pub mod adapters;
pub mod factory;
pub mod registry;
pub mod safe;
pub mod sql;
pub mod types;

pub use adapter::{DatabaseAdapter, TransactionSupport, validate_input, validate_query};
pub use factory::{ConfigValidation, DatabaseAdapterFactory};
pub use registry::{ConnectionRegistry, TeardownFailure};
pub use safe::SafeExecution;

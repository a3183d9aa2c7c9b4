//! Error types for the database gateway.
//!
//! Every failure surfaced by an adapter, the registry or the safe-execution layer is a
//! [`DbError`]. Backend failures carry the backend's display name as a prefix so the
//! dispatch layer can render one error shape regardless of which driver failed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid configuration: {}", errors.join("; "))]
    Configuration { errors: Vec<String> },

    #[error("{backend} error: {message}")]
    Connection {
        backend: String,
        message: String,
        suggestion: String,
    },

    #[error("{backend} error: not connected")]
    NotConnected { backend: String },

    #[error("{backend} error: {message}")]
    Backend {
        backend: String,
        message: String,
        /// Native error code when the driver reports one (e.g. SQLSTATE "42P01")
        code: Option<String>,
        suggestion: String,
    },

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout { operation: String, elapsed_secs: u64 },

    #[error("Connection not found: {name}")]
    ConnectionNotFound { name: String },

    #[error("No current connection")]
    NoCurrentConnection,

    #[error("Connection '{name}' already exists")]
    DuplicateConnection { name: String },

    #[error("Failed to add connection '{name}': {source}")]
    Registration {
        name: String,
        #[source]
        source: Box<DbError>,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error from collected validation messages.
    pub fn configuration(errors: Vec<String>) -> Self {
        Self::Configuration { errors }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(
        backend: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Connection {
            backend: backend.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn not_connected(backend: impl Into<String>) -> Self {
        Self::NotConnected {
            backend: backend.into(),
        }
    }

    /// Create a backend execution error.
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
            code: None,
            suggestion: "Check the query syntax and referenced objects".to_string(),
        }
    }

    /// Create a backend execution error carrying a native error code.
    pub fn backend_with_code(
        backend: impl Into<String>,
        message: impl Into<String>,
        code: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
            code,
            suggestion: suggestion.into(),
        }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn connection_not_found(name: impl Into<String>) -> Self {
        Self::ConnectionNotFound { name: name.into() }
    }

    pub fn duplicate_connection(name: impl Into<String>) -> Self {
        Self::DuplicateConnection { name: name.into() }
    }

    /// Wrap a connect failure with the name it was being registered under.
    pub fn registration(name: impl Into<String>, source: DbError) -> Self {
        Self::Registration {
            name: name.into(),
            source: Box::new(source),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify a sqlx error raised by the named backend.
    pub fn from_sqlx(backend: &str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                backend,
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::backend_with_code(
                    backend,
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::backend_with_code(
                backend,
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout(format!("{backend} pool acquire"), 30),
            sqlx::Error::PoolClosed => DbError::connection(
                backend,
                "Connection pool is closed",
                "Reconnect to the database",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                backend,
                format!("I/O error: {io_err}"),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                backend,
                format!("TLS error: {tls_err}"),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                backend,
                format!("Protocol error: {msg}"),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::backend(backend, format!("Column not found: {col}"))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::backend(backend, format!("Failed to decode column {index}: {source}"))
            }
            sqlx::Error::Decode(source) => {
                DbError::backend(backend, format!("Decode error: {source}"))
            }
            other => DbError::backend(backend, other.to_string()),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Backend { suggestion, .. } => Some(suggestion),
            Self::NotConnected { .. } => Some("Connect the adapter before issuing operations"),
            Self::NoCurrentConnection => {
                Some("Add a connection or pass an explicit connection name")
            }
            Self::Registration { source, .. } => source.suggestion(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } | Self::NotConnected { .. } => true,
            Self::Registration { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
/// Includes the suggestion field in the `data` object when available.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = suggestion_data(err.suggestion());
        match &err {
            DbError::Configuration { .. }
            | DbError::InvalidInput { .. }
            | DbError::NotConnected { .. }
            | DbError::Transaction { .. }
            | DbError::DuplicateConnection { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), data)
            }

            DbError::ConnectionNotFound { .. } | DbError::NoCurrentConnection => {
                rmcp::ErrorData::resource_not_found(err.to_string(), data)
            }

            DbError::Backend { code, .. } => {
                let msg = match code {
                    Some(code) => format!("{err} (code: {code})"),
                    None => err.to_string(),
                };
                rmcp::ErrorData::invalid_params(msg, data)
            }

            DbError::Connection { .. }
            | DbError::Registration { .. }
            | DbError::Timeout { .. }
            | DbError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_is_prefixed() {
        let err = DbError::backend("Postgres", "relation \"missing\" does not exist");
        assert_eq!(
            err.to_string(),
            "Postgres error: relation \"missing\" does not exist"
        );
    }

    #[test]
    fn test_not_connected_display() {
        let err = DbError::not_connected("Redis");
        assert_eq!(err.to_string(), "Redis error: not connected");
    }

    #[test]
    fn test_registration_keeps_source_message() {
        let err = DbError::registration(
            "primary",
            DbError::connection("MySQL", "connection refused", "check host"),
        );
        let msg = err.to_string();
        assert!(msg.contains("primary"));
        assert!(msg.contains("MySQL error: connection refused"));
        assert_eq!(err.suggestion(), Some("check host"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_configuration_joins_messages() {
        let err = DbError::configuration(vec!["host is required".into(), "db".into()]);
        assert_eq!(err.to_string(), "Invalid configuration: host is required; db");
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("query", 30).is_retryable());
        assert!(DbError::connection("SQLite", "err", "sugg").is_retryable());
        assert!(!DbError::transaction("No transaction in progress").is_retryable());
    }

    #[test]
    fn test_invalid_input_maps_to_invalid_params() {
        let mcp_err: rmcp::ErrorData = DbError::invalid_input("bad input").into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_transaction_maps_to_invalid_params() {
        let mcp_err: rmcp::ErrorData =
            DbError::transaction("Transaction already in progress").into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_connection_not_found_maps_to_resource_not_found() {
        let mcp_err: rmcp::ErrorData = DbError::connection_not_found("conn1").into();
        assert_eq!(mcp_err.code.0, -32002);
        let mcp_err: rmcp::ErrorData = DbError::NoCurrentConnection.into();
        assert_eq!(mcp_err.code.0, -32002);
    }

    #[test]
    fn test_connection_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData = DbError::connection("Redis", "failed", "try again").into();
        assert_eq!(mcp_err.code.0, -32603);
        let data = mcp_err.data.expect("suggestion data");
        assert_eq!(data["suggestion"], "try again");
    }

    #[test]
    fn test_backend_error_includes_code() {
        let err = DbError::backend_with_code(
            "Postgres",
            "syntax error",
            Some("42601".to_string()),
            "check syntax",
        );
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.code.0, -32602);
        assert!(mcp_err.message.contains("42601"));
        assert!(mcp_err.message.starts_with("Postgres error:"));
    }
}

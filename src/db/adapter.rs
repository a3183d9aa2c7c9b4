//! The adapter contract and the helpers every backend shares.
//!
//! Each backend implements [`DatabaseAdapter`] over its own native client. Adapters are
//! shared as `Arc<dyn DatabaseAdapter>`, so every method takes `&self` and state lives
//! behind interior mutability: the native handle in a [`NativeHandle`], the transaction
//! flag in a [`TxState`].

use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DatabaseKind, DatabaseStats, QueryInput, QueryResult, TableInfo};
use async_trait::async_trait;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Whether an adapter's transactions are backed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSupport {
    /// BEGIN/COMMIT/ROLLBACK (or a session transaction) on the server.
    Native,
    /// Only the begin/commit ordering is enforced; nothing is undone on rollback.
    Emulated,
}

impl TransactionSupport {
    pub fn is_atomic(&self) -> bool {
        matches!(self, Self::Native)
    }
}

/// Uniform contract over one backend connection.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    fn kind(&self) -> DatabaseKind;

    fn config(&self) -> &ConnectionConfig;

    fn transaction_support(&self) -> TransactionSupport;

    /// Establish the native handle. Callers check [`is_connected`](Self::is_connected) first.
    async fn connect(&self) -> DbResult<()>;

    /// Release the native handle and clear connected state.
    async fn disconnect(&self) -> DbResult<()>;

    /// True iff the connected flag is set and the native handle is present.
    fn is_connected(&self) -> bool;

    async fn execute_query(&self, input: &QueryInput) -> DbResult<QueryResult>;

    /// Descriptors for every visible table or collection.
    async fn get_tables(&self) -> DbResult<Vec<TableInfo>>;

    /// Descriptor for one table; `None` if it does not exist.
    async fn get_table_info(&self, name: &str, schema: Option<&str>) -> DbResult<Option<TableInfo>>;

    async fn get_database_stats(&self) -> DbResult<DatabaseStats>;

    /// Lightweight liveness probe; errors are reported as `false`.
    async fn validate_connection(&self) -> bool;

    async fn begin_transaction(&self) -> DbResult<()>;

    async fn commit_transaction(&self) -> DbResult<()>;

    async fn rollback_transaction(&self) -> DbResult<()>;

    fn is_in_transaction(&self) -> bool;
}

/// Exclusive holder of an adapter's native client plus its connected flag.
pub struct NativeHandle<T> {
    backend: DatabaseKind,
    inner: RwLock<Option<T>>,
    connected: AtomicBool,
}

impl<T: Clone> NativeHandle<T> {
    pub fn new(backend: DatabaseKind) -> Self {
        Self {
            backend,
            inner: RwLock::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Install a freshly connected handle.
    pub fn set(&self, handle: T) {
        match self.inner.write() {
            Ok(mut guard) => *guard = Some(handle),
            Err(poisoned) => *poisoned.into_inner() = Some(handle),
        }
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Remove the handle, leaving the adapter disconnected.
    pub fn take(&self) -> Option<T> {
        self.connected.store(false, Ordering::SeqCst);
        match self.inner.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Clone the handle, or fail with a not-connected error before any native call.
    pub fn get(&self) -> DbResult<T> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(DbError::not_connected(self.backend.display_name()));
        }
        let handle = match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        handle.ok_or_else(|| DbError::not_connected(self.backend.display_name()))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
            && match self.inner.read() {
                Ok(guard) => guard.is_some(),
                Err(poisoned) => poisoned.into_inner().is_some(),
            }
    }
}

/// Idle / in-transaction state machine shared by every adapter.
#[derive(Debug, Default)]
pub struct TxState {
    active: AtomicBool,
}

pub const TX_ALREADY_ACTIVE: &str = "Transaction already in progress";
pub const TX_NOT_ACTIVE: &str = "No transaction in progress";

impl TxState {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Fail unless idle.
    pub fn ensure_idle(&self) -> DbResult<()> {
        if self.is_active() {
            return Err(DbError::transaction(TX_ALREADY_ACTIVE));
        }
        Ok(())
    }

    /// Fail unless in a transaction.
    pub fn ensure_active(&self) -> DbResult<()> {
        if !self.is_active() {
            return Err(DbError::transaction(TX_NOT_ACTIVE));
        }
        Ok(())
    }

    /// idle -> in-transaction.
    pub fn begin(&self) -> DbResult<()> {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| DbError::transaction(TX_ALREADY_ACTIVE))
    }

    /// in-transaction -> idle.
    pub fn end(&self) -> DbResult<()> {
        self.active
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| DbError::transaction(TX_NOT_ACTIVE))
    }

    /// Force idle, e.g. when the connection is torn down mid-transaction.
    pub fn reset(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Run a backend call under the connection's request timeout.
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DbError::timeout(operation, limit.as_secs())),
    }
}

/// Destructive statements rejected when stacked after a `;`.
const STACKED_DENY_LIST: &[(&str, &str)] = &[
    ("DROP", "TABLE"),
    ("DELETE", "FROM"),
    ("TRUNCATE", "TABLE"),
    ("ALTER", "TABLE"),
    ("DROP", "DATABASE"),
];

/// Reject empty queries and statement-stacked destructive patterns.
///
/// This is a guard against naive `; DROP TABLE` injection, not a SQL parser: only the
/// first two words after each `;` are inspected, case-insensitively.
pub fn validate_query(query: &str) -> DbResult<()> {
    if query.trim().is_empty() {
        return Err(DbError::invalid_input("Query must be a non-empty string"));
    }

    for segment in query.split(';').skip(1) {
        let mut words = segment.split_whitespace();
        let (Some(first), Some(second)) = (words.next(), words.next()) else {
            continue;
        };
        let first = first.to_ascii_uppercase();
        let second = second.to_ascii_uppercase();
        if let Some((verb, object)) = STACKED_DENY_LIST
            .iter()
            .find(|(verb, object)| first == *verb && second.starts_with(object))
        {
            return Err(DbError::invalid_input(format!(
                "Query contains a potentially dangerous stacked statement: {verb} {object}"
            )));
        }
    }
    Ok(())
}

/// Validate a query input before it reaches an adapter.
pub fn validate_input(input: &QueryInput) -> DbResult<()> {
    match input {
        QueryInput::Native { query, .. } => validate_query(query),
        QueryInput::Command(cmd) => {
            if cmd.collection.trim().is_empty() {
                return Err(DbError::invalid_input(format!(
                    "Command '{}' requires a target collection",
                    cmd.action.name()
                )));
            }
            Ok(())
        }
    }
}

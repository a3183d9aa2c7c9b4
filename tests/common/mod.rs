//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use db_gateway::db::adapter::TxState;
use db_gateway::db::{DatabaseAdapter, TransactionSupport};
use db_gateway::error::{DbError, DbResult};
use db_gateway::models::{
    BackendOptions, ConnectionConfig, DatabaseKind, DatabaseStats, QueryInput, QueryResult,
    TableInfo,
};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-process adapter with scripted failures, for exercising registry and batch logic
/// without a server.
pub struct ScriptedAdapter {
    config: ConnectionConfig,
    support: TransactionSupport,
    connected: AtomicBool,
    tx: TxState,
    /// Query text that fails with a backend error
    failing_query: Option<String>,
    fail_connect: bool,
    fail_disconnect: bool,
    healthy: bool,
    pub connect_calls: AtomicUsize,
    pub executed: Mutex<Vec<String>>,
    pub rollbacks: AtomicUsize,
    pub commits: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            config: ConnectionConfig::new(name, BackendOptions::empty(DatabaseKind::Postgres)),
            support: TransactionSupport::Native,
            connected: AtomicBool::new(false),
            tx: TxState::default(),
            failing_query: None,
            fail_connect: false,
            fail_disconnect: false,
            healthy: true,
            connect_calls: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
            rollbacks: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
        }
    }

    pub fn emulated(mut self) -> Self {
        self.support = TransactionSupport::Emulated;
        self
    }

    pub fn failing_on(mut self, query: &str) -> Self {
        self.failing_query = Some(query.to_string());
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_disconnect(mut self) -> Self {
        self.fail_disconnect = true;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatabaseAdapter for ScriptedAdapter {
    fn kind(&self) -> DatabaseKind {
        self.config.kind()
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn transaction_support(&self) -> TransactionSupport {
        self.support
    }

    async fn connect(&self) -> DbResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(DbError::connection("Scripted", "refused", "start the server"));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> DbResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.tx.reset();
        if self.fail_disconnect {
            return Err(DbError::backend("Scripted", "socket already closed"));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn execute_query(&self, input: &QueryInput) -> DbResult<QueryResult> {
        if !self.is_connected() {
            return Err(DbError::not_connected("Scripted"));
        }
        let (query, _) = input.as_native("Scripted")?;
        if self.failing_query.as_deref() == Some(query) {
            return Err(DbError::backend_with_code(
                "Scripted",
                format!("cannot run {query}"),
                Some("42000".to_string()),
                "check the statement",
            ));
        }
        self.executed.lock().unwrap().push(query.to_string());
        Ok(QueryResult::affected(1))
    }

    async fn get_tables(&self) -> DbResult<Vec<TableInfo>> {
        Ok(Vec::new())
    }

    async fn get_table_info(&self, _name: &str, _schema: Option<&str>) -> DbResult<Option<TableInfo>> {
        Ok(None)
    }

    async fn get_database_stats(&self) -> DbResult<DatabaseStats> {
        Ok(DatabaseStats::new(0, 0, 0, "0 B"))
    }

    async fn validate_connection(&self) -> bool {
        self.is_connected() && self.healthy
    }

    async fn begin_transaction(&self) -> DbResult<()> {
        self.tx.begin()
    }

    async fn commit_transaction(&self) -> DbResult<()> {
        self.tx.end()?;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback_transaction(&self) -> DbResult<()> {
        self.tx.end()?;
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_in_transaction(&self) -> bool {
        self.tx.is_active()
    }
}

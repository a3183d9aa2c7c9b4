//! Helpers shared by the sqlx-backed adapters (Postgres, MySQL, SQLite).
//!
//! Each of those adapters owns a pool plus a [`SqlTransaction`] slot. While a transaction
//! is open every statement runs on its dedicated connection; otherwise a connection is
//! checked out of the pool per call. [`with_sql_connection!`] encodes that choice once.

use crate::db::adapter::{TX_NOT_ACTIVE, TxState};
use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{Database, MySql, Pool, Postgres, Sqlite, Transaction};
use tokio::sync::{Mutex, MutexGuard};

/// Quote an identifier for interpolation into statements that cannot take bind parameters.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        // No native JSON type, store as text
        QueryParam::Json(v) => query.bind(v.to_string()),
    }
}

/// A held server-side transaction plus the adapter's transaction state.
///
/// The transaction owns a dedicated pool connection until commit or rollback.
pub struct SqlTransaction<DB: Database> {
    backend: &'static str,
    slot: Mutex<Option<Transaction<'static, DB>>>,
    state: TxState,
}

impl<DB: Database> SqlTransaction<DB> {
    pub fn new(backend: &'static str) -> Self {
        Self {
            backend,
            slot: Mutex::new(None),
            state: TxState::default(),
        }
    }

    /// Lock the slot; `Some` while a transaction is open.
    pub async fn lock(&self) -> MutexGuard<'_, Option<Transaction<'static, DB>>> {
        self.slot.lock().await
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub async fn begin(&self, pool: &Pool<DB>) -> DbResult<()> {
        let mut slot = self.slot.lock().await;
        self.state.ensure_idle()?;
        let tx = pool
            .begin()
            .await
            .map_err(|e| DbError::from_sqlx(self.backend, e))?;
        *slot = Some(tx);
        self.state.begin()
    }

    pub async fn commit(&self) -> DbResult<()> {
        let tx = self.finish().await?;
        tx.commit()
            .await
            .map_err(|e| DbError::from_sqlx(self.backend, e))
    }

    pub async fn rollback(&self) -> DbResult<()> {
        let tx = self.finish().await?;
        tx.rollback()
            .await
            .map_err(|e| DbError::from_sqlx(self.backend, e))
    }

    /// Drop any open transaction; the driver rolls it back when the connection is returned.
    pub async fn discard(&self) {
        let mut slot = self.slot.lock().await;
        if slot.take().is_some() {
            tracing::warn!(backend = self.backend, "Discarding open transaction on disconnect");
        }
        self.state.reset();
    }

    /// Take the open transaction and return to idle, whatever the outcome of the
    /// commit or rollback that follows.
    async fn finish(&self) -> DbResult<Transaction<'static, DB>> {
        let mut slot = self.slot.lock().await;
        self.state.ensure_active()?;
        let tx = slot
            .take()
            .ok_or_else(|| DbError::transaction(TX_NOT_ACTIVE))?;
        self.state.end()?;
        Ok(tx)
    }
}

/// Run `$body` with `$conn` bound to the connection statements should use: the open
/// transaction's connection, or one checked out of the pool.
///
/// Expects `$adapter` to have `pool: NativeHandle<Pool<_>>` and `tx: SqlTransaction<_>`
/// fields, and expands inside an async fn returning `DbResult`.
macro_rules! with_sql_connection {
    ($adapter:expr, $backend:expr, |$conn:ident| $body:expr) => {{
        let pool = $adapter.pool.get()?;
        let mut slot = $adapter.tx.lock().await;
        match slot.as_mut() {
            Some(tx) => {
                let $conn = &mut **tx;
                $body
            }
            None => {
                // Pooled statements must not serialize on the slot
                drop(slot);
                let mut pooled = pool
                    .acquire()
                    .await
                    .map_err(|e| $crate::error::DbError::from_sqlx($backend, e))?;
                let $conn = &mut *pooled;
                $body
            }
        }
    }};
}

pub(crate) use with_sql_connection;

/// Run a bound query to completion on `$conn`, keeping every row it yields and summing the
/// affected counts of every result it reports.
///
/// A statement that yields no rows is described afterwards: one with result columns is an
/// empty query, anything else reports its affected count.
macro_rules! collect_statement {
    ($conn:expr, $query:expr, $sql:expr, $backend:expr) => {{
        use futures_util::TryStreamExt as _;
        use sqlx::Executor as _;

        let mut rows = Vec::new();
        let mut rows_affected: u64 = 0;
        {
            let mut stream = (&mut *$conn).fetch_many($query);
            while let Some(item) = stream
                .try_next()
                .await
                .map_err(|e| $crate::error::DbError::from_sqlx($backend, e))?
            {
                match item {
                    sqlx::Either::Left(done) => rows_affected += done.rows_affected(),
                    sqlx::Either::Right(row) => rows.push(row),
                }
            }
        }

        if rows.is_empty() {
            let fields = match (&mut *$conn).describe($sql).await {
                Ok(described) => $crate::db::types::column_fields(described.columns()),
                Err(_) => Vec::new(),
            };
            if fields.is_empty() {
                Ok($crate::models::QueryResult::affected(rows_affected))
            } else {
                Ok($crate::models::QueryResult::from_rows(Vec::new(), fields))
            }
        } else {
            Ok($crate::db::types::rows_to_result(&rows))
        }
    }};
}

pub(crate) use collect_statement;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}

//! SQLite adapter over a single-connection sqlx pool.
//!
//! In-memory databases live exactly as long as their one connection, so the pool keeps it
//! open indefinitely instead of recycling idle connections.

use super::connection_failed;
use crate::db::adapter::{DatabaseAdapter, NativeHandle, TransactionSupport, with_timeout};
use crate::db::sql::{
    SqlTransaction, bind_sqlite_param, collect_statement, quote_identifier, with_sql_connection,
};
use crate::error::{DbError, DbResult};
use crate::models::{
    BackendOptions, ColumnInfo, ConnectionConfig, ConstraintInfo, ConstraintKind, DatabaseKind,
    DatabaseStats, IndexInfo, QueryInput, QueryParam, QueryResult, TableInfo, TableType,
    format_size,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};

const BACKEND: &str = "SQLite";
const MEMORY: &str = ":memory:";

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT name FROM sqlite_master
        WHERE type IN ('table', 'view')
        AND name NOT LIKE 'sqlite_%'
        ORDER BY name
        "#;

    pub const TABLE_TYPE: &str = r#"
        SELECT type FROM sqlite_master
        WHERE name = ? AND type IN ('table', 'view')
        "#;

    pub const STATS: &str = r#"
        SELECT
            (SELECT COUNT(*) FROM sqlite_master
                WHERE type = 'table' AND name NOT LIKE 'sqlite_%') AS table_count,
            (SELECT COUNT(*) FROM sqlite_master WHERE type = 'view') AS view_count,
            (SELECT COUNT(*) FROM sqlite_master
                WHERE type = 'index' AND name NOT LIKE 'sqlite_%') AS index_count,
            (SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()) AS size_bytes
        "#;
}

pub struct SqliteAdapter {
    config: ConnectionConfig,
    pool: NativeHandle<SqlitePool>,
    tx: SqlTransaction<Sqlite>,
}

impl SqliteAdapter {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            pool: NativeHandle::new(DatabaseKind::Sqlite),
            tx: SqlTransaction::new(BACKEND),
        }
    }

    fn read_only(&self) -> bool {
        matches!(&self.config.options, BackendOptions::Sqlite(opts) if opts.read_only)
    }

    /// The database file: the `filename` option, else `database`, else the URL.
    fn filename(&self) -> Option<&str> {
        match &self.config.options {
            BackendOptions::Sqlite(opts) if opts.filename.is_some() => opts.filename.as_deref(),
            _ if self.config.url.is_none() => self.config.database.as_deref(),
            _ => None,
        }
    }

    fn is_in_memory(&self) -> bool {
        match (self.filename(), &self.config.url) {
            (Some(filename), _) => filename == MEMORY,
            (None, Some(url)) => url.contains(MEMORY) || url.contains("mode=memory"),
            (None, None) => true,
        }
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let invalid = |e: sqlx::Error| {
            DbError::connection(
                BACKEND,
                format!("Invalid SQLite target: {e}"),
                "Use a file path, ':memory:' or a URL like sqlite:path/to/db.sqlite",
            )
        };
        let read_only = self.read_only();

        let options = match (self.filename(), &self.config.url) {
            (Some(MEMORY), _) | (None, None) => {
                SqliteConnectOptions::from_str("sqlite::memory:").map_err(invalid)?
            }
            (Some(filename), _) => SqliteConnectOptions::new()
                .filename(filename)
                .create_if_missing(!read_only),
            (None, Some(url)) => SqliteConnectOptions::from_str(url)
                .map_err(invalid)?
                .create_if_missing(!read_only),
        };
        Ok(options.read_only(read_only))
    }

    async fn probe(&self) -> DbResult<()> {
        with_sql_connection!(self, BACKEND, |conn| {
            sqlx::query("SELECT 1")
                .execute(&mut *conn)
                .await
                .map_err(|e| DbError::from_sqlx(BACKEND, e))?;
            Ok(())
        })
    }
}

async fn run_statement(conn: &mut SqliteConnection, sql: &str, params: &[QueryParam]) -> DbResult<QueryResult> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = bind_sqlite_param(query, param);
    }
    collect_statement!(conn, query, sql, BACKEND)
}

async fn describe_table(conn: &mut SqliteConnection, name: &str) -> DbResult<Option<TableInfo>> {
    let Some(type_row) = sqlx::query(queries::TABLE_TYPE)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| DbError::from_sqlx(BACKEND, e))?
    else {
        return Ok(None);
    };
    let table_type = TableType::parse(&type_row.get::<String, _>("type"));
    let quoted = quote_identifier(name);

    let column_rows = sqlx::query(&format!("PRAGMA table_info({quoted})"))
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| DbError::from_sqlx(BACKEND, e))?;

    let mut primary_key: Vec<(i64, String)> = Vec::new();
    let columns = column_rows
        .iter()
        .map(|row| {
            let name: String = row.get("name");
            let data_type: String = row.try_get("type").unwrap_or_default();
            let not_null: i64 = row.try_get("notnull").unwrap_or(0);
            let pk: i64 = row.try_get("pk").unwrap_or(0);
            if pk > 0 {
                primary_key.push((pk, name.clone()));
            }
            let mut column = ColumnInfo::new(name, data_type, not_null == 0 && pk == 0);
            if let Ok(Some(default)) = row.try_get::<Option<String>, _>("dflt_value") {
                column = column.with_default_str(&default);
            }
            column
        })
        .collect();

    let mut constraints = Vec::new();
    if !primary_key.is_empty() {
        primary_key.sort();
        constraints.push(ConstraintInfo::new(
            "PRIMARY",
            ConstraintKind::PrimaryKey,
            primary_key.into_iter().map(|(_, col)| col).collect(),
        ));
    }
    constraints.extend(fetch_foreign_keys(conn, name, &quoted).await);

    let mut indexes = Vec::new();
    let index_rows = sqlx::query(&format!("PRAGMA index_list({quoted})"))
        .fetch_all(&mut *conn)
        .await
        .unwrap_or_default();
    for row in &index_rows {
        let index_name: String = row.get("name");
        let is_unique = row.try_get::<i64, _>("unique").unwrap_or(0) != 0;
        let origin: String = row.try_get("origin").unwrap_or_default();

        let columns: Vec<String> = sqlx::query(&format!(
            "PRAGMA index_info({})",
            quote_identifier(&index_name)
        ))
        .fetch_all(&mut *conn)
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|r| r.try_get::<Option<String>, _>("name").ok().flatten())
        .collect();
        if columns.is_empty() {
            continue;
        }
        if origin == "u" {
            constraints.push(ConstraintInfo::new(&index_name, ConstraintKind::Unique, columns.clone()));
        }
        indexes.push(IndexInfo::new(index_name, columns).with_unique(is_unique));
    }

    let mut table = TableInfo::new(name, table_type)
        .with_columns(columns)
        .with_indexes(indexes)
        .with_constraints(constraints)
        .apply_key_flags();

    if table_type == TableType::Table {
        let count = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {quoted}"))
            .fetch_one(&mut *conn)
            .await
            .ok()
            .and_then(|row| row.try_get::<i64, _>("n").ok());
        if let Some(count) = count {
            table = table.with_row_count(count.max(0) as u64);
        }
    }
    Ok(Some(table))
}

async fn fetch_foreign_keys(conn: &mut SqliteConnection, table: &str, quoted: &str) -> Vec<ConstraintInfo> {
    let rows = match sqlx::query(&format!("PRAGMA foreign_key_list({quoted})"))
        .fetch_all(&mut *conn)
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            warn!(table, error = %e, "Failed to read SQLite foreign keys");
            return Vec::new();
        }
    };

    let mut constraints: Vec<(i64, ConstraintInfo)> = Vec::new();
    for row in &rows {
        let id: i64 = row.try_get("id").unwrap_or(0);
        let from: String = row.try_get("from").unwrap_or_default();
        let ref_table: String = row.try_get("table").unwrap_or_default();
        let to: Option<String> = row.try_get("to").ok().flatten();

        match constraints.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, fk)) => {
                fk.columns.push(from);
                fk.referenced_columns.extend(to);
            }
            None => {
                let fk = ConstraintInfo::new(format!("fk_{table}_{id}"), ConstraintKind::ForeignKey, vec![from])
                    .with_reference(ref_table, to.into_iter().collect());
                constraints.push((id, fk));
            }
        }
    }
    constraints.into_iter().map(|(_, fk)| fk).collect()
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Sqlite
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn transaction_support(&self) -> TransactionSupport {
        TransactionSupport::Native
    }

    async fn connect(&self) -> DbResult<()> {
        let options = self.connect_options()?;
        let pool_opts = &self.config.pool;

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(pool_opts.max_connections_or_default(true))
            .acquire_timeout(pool_opts.acquire_timeout_or_default())
            .test_before_acquire(pool_opts.test_before_acquire_or_default());
        pool_options = if self.is_in_memory() {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options
                .min_connections(pool_opts.min_connections_or_default())
                .idle_timeout(Some(pool_opts.idle_timeout_or_default()))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| connection_failed(DatabaseKind::Sqlite, e))?;

        self.pool.set(pool);
        info!(connection = %self.config.name, endpoint = %self.config.endpoint(), "Opened SQLite database");
        Ok(())
    }

    async fn disconnect(&self) -> DbResult<()> {
        self.tx.discard().await;
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!(connection = %self.config.name, "Closed SQLite database");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool.is_connected()
    }

    async fn execute_query(&self, input: &QueryInput) -> DbResult<QueryResult> {
        self.pool.get()?;
        let (sql, params) = input.as_native(BACKEND)?;
        let limit = self.config.pool.request_timeout_or_default();
        with_timeout("SQLite query", limit, async {
            with_sql_connection!(self, BACKEND, |conn| run_statement(conn, sql, params).await)
        })
        .await
    }

    async fn get_tables(&self) -> DbResult<Vec<TableInfo>> {
        with_sql_connection!(self, BACKEND, |conn| {
            let names: Vec<String> = sqlx::query(queries::LIST_TABLES)
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| DbError::from_sqlx(BACKEND, e))?
                .iter()
                .map(|row| row.get("name"))
                .collect();

            let mut tables = Vec::with_capacity(names.len());
            for name in names {
                match describe_table(conn, &name).await {
                    Ok(Some(table)) => tables.push(table),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(table = %name, error = %e, "Failed to describe table");
                        tables.push(TableInfo::new(name, TableType::Table));
                    }
                }
            }
            debug!(count = tables.len(), "Listed SQLite tables");
            Ok(tables)
        })
    }

    /// SQLite has no schemas; `schema` is ignored.
    async fn get_table_info(&self, name: &str, _schema: Option<&str>) -> DbResult<Option<TableInfo>> {
        with_sql_connection!(self, BACKEND, |conn| describe_table(conn, name).await)
    }

    async fn get_database_stats(&self) -> DbResult<DatabaseStats> {
        with_sql_connection!(self, BACKEND, |conn| {
            let row = sqlx::query(queries::STATS)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| DbError::from_sqlx(BACKEND, e))?;
            let count = |col: &str| row.try_get::<i64, _>(col).unwrap_or_default().max(0) as u64;
            Ok(DatabaseStats::new(
                count("table_count"),
                count("view_count"),
                count("index_count"),
                format_size(count("size_bytes")),
            )
            .with_connections(1))
        })
    }

    async fn validate_connection(&self) -> bool {
        let limit = self.config.pool.acquire_timeout_or_default();
        with_timeout("SQLite probe", limit, self.probe()).await.is_ok()
    }

    async fn begin_transaction(&self) -> DbResult<()> {
        let pool = self.pool.get()?;
        self.tx.begin(&pool).await
    }

    async fn commit_transaction(&self) -> DbResult<()> {
        self.tx.commit().await
    }

    async fn rollback_transaction(&self) -> DbResult<()> {
        self.tx.rollback().await
    }

    fn is_in_transaction(&self) -> bool {
        self.tx.is_active()
    }
}

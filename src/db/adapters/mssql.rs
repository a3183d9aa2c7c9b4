//! SQL Server adapter over tiberius.
//!
//! A single TDS client is held behind a mutex. Transactions are emulated: statements
//! apply immediately and rollback only resets state.

use super::connection_failed;
use crate::db::adapter::{DatabaseAdapter, NativeHandle, TransactionSupport, TxState, with_timeout};
use crate::db::types::{encode_binary, float_value};
use crate::error::{DbError, DbResult};
use crate::models::{
    BackendOptions, ColumnInfo, ConnectionConfig, ConstraintKind, DatabaseKind, DatabaseStats,
    FieldInfo, IndexInfo, QueryInput, QueryParam, QueryResult, TableInfo, TableType, format_size,
    group_constraints,
};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use serde_json::{Map, Value as JsonValue, json};
use std::borrow::Cow;
use std::sync::Arc;
use tiberius::{AuthMethod, Client, Column, ColumnData, EncryptionLevel, FromSql, QueryItem, Row, ToSql};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

const BACKEND: &str = "MSSQL";

/// Column of the trailing result set that carries the statement's affected count.
const ROW_COUNT_COLUMN: &str = "gateway_row_count";

type TdsClient = Client<Compat<TcpStream>>;

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT TABLE_SCHEMA, TABLE_NAME
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA NOT IN ('sys', 'INFORMATION_SCHEMA')
        ORDER BY TABLE_SCHEMA, TABLE_NAME
        "#;

    pub const TABLE_TYPE: &str = r#"
        SELECT TABLE_TYPE
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
        "#;

    pub const COLUMNS: &str = r#"
        SELECT
            COLUMN_NAME,
            DATA_TYPE,
            IS_NULLABLE,
            COLUMN_DEFAULT,
            CAST(CHARACTER_MAXIMUM_LENGTH AS BIGINT),
            CAST(NUMERIC_PRECISION AS BIGINT),
            CAST(NUMERIC_SCALE AS BIGINT)
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
        ORDER BY ORDINAL_POSITION
        "#;

    pub const CONSTRAINTS: &str = r#"
        SELECT tc.CONSTRAINT_NAME, tc.CONSTRAINT_TYPE, kcu.COLUMN_NAME, rk.TABLE_NAME, rk.COLUMN_NAME
        FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
        JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
            ON kcu.CONSTRAINT_NAME = tc.CONSTRAINT_NAME AND kcu.TABLE_SCHEMA = tc.TABLE_SCHEMA
        LEFT JOIN INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc
            ON rc.CONSTRAINT_NAME = tc.CONSTRAINT_NAME AND rc.CONSTRAINT_SCHEMA = tc.TABLE_SCHEMA
        LEFT JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE rk
            ON rk.CONSTRAINT_NAME = rc.UNIQUE_CONSTRAINT_NAME
            AND rk.CONSTRAINT_SCHEMA = rc.UNIQUE_CONSTRAINT_SCHEMA
            AND rk.ORDINAL_POSITION = kcu.ORDINAL_POSITION
        WHERE tc.TABLE_SCHEMA = @P1 AND tc.TABLE_NAME = @P2
        ORDER BY tc.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
        "#;

    pub const INDEXES: &str = r#"
        SELECT i.name, c.name, i.is_unique, i.type_desc
        FROM sys.indexes i
        JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
        JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
        WHERE i.object_id = OBJECT_ID(QUOTENAME(@P1) + '.' + QUOTENAME(@P2)) AND i.name IS NOT NULL
        ORDER BY i.name, ic.key_ordinal
        "#;

    pub const ROW_COUNT: &str = r#"
        SELECT CAST(SUM(p.rows) AS BIGINT)
        FROM sys.partitions p
        WHERE p.object_id = OBJECT_ID(QUOTENAME(@P1) + '.' + QUOTENAME(@P2)) AND p.index_id IN (0, 1)
        "#;

    pub const STATS: &str = r#"
        SELECT
            CAST((SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'BASE TABLE') AS BIGINT),
            CAST((SELECT COUNT(*) FROM INFORMATION_SCHEMA.VIEWS) AS BIGINT),
            CAST((SELECT COUNT(*) FROM sys.indexes i JOIN sys.tables t ON t.object_id = i.object_id
                WHERE i.name IS NOT NULL) AS BIGINT),
            CAST((SELECT SUM(CAST(size AS BIGINT)) * 8192 FROM sys.database_files) AS BIGINT)
        "#;

    pub const SESSIONS: &str =
        "SELECT CAST(COUNT(*) AS BIGINT) FROM sys.dm_exec_sessions WHERE is_user_process = 1";
}

impl ToSql for QueryParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            QueryParam::Null => ColumnData::String(None),
            QueryParam::Bool(b) => ColumnData::Bit(Some(*b)),
            QueryParam::Int(i) => ColumnData::I64(Some(*i)),
            QueryParam::Float(f) => ColumnData::F64(Some(*f)),
            QueryParam::String(s) => ColumnData::String(Some(Cow::Borrowed(s.as_str()))),
            QueryParam::Json(v) => ColumnData::String(Some(Cow::Owned(v.to_string()))),
        }
    }
}

pub(crate) fn tiberius_error(err: tiberius::error::Error) -> DbError {
    use tiberius::error::Error;
    match err {
        Error::Server(token) => DbError::backend_with_code(
            BACKEND,
            token.message().to_string(),
            Some(token.code().to_string()),
            "Check the T-SQL syntax and referenced objects",
        ),
        err @ (Error::Io { .. } | Error::Tls(_) | Error::Routing { .. }) => {
            connection_failed(DatabaseKind::MsSql, err)
        }
        other => DbError::backend(BACKEND, other.to_string()),
    }
}

fn cell_to_json(data: &ColumnData<'static>) -> JsonValue {
    let temporal = |value: Result<Option<String>, tiberius::error::Error>| match value {
        Ok(Some(s)) => JsonValue::String(s),
        Ok(None) => JsonValue::Null,
        Err(e) => JsonValue::String(format!("<{e}>")),
    };
    match data {
        ColumnData::U8(v) => v.map_or(JsonValue::Null, |v| json!(v)),
        ColumnData::I16(v) => v.map_or(JsonValue::Null, |v| json!(v)),
        ColumnData::I32(v) => v.map_or(JsonValue::Null, |v| json!(v)),
        ColumnData::I64(v) => v.map_or(JsonValue::Null, |v| json!(v)),
        ColumnData::F32(v) => v.map_or(JsonValue::Null, |v| float_value(v as f64)),
        ColumnData::F64(v) => v.map_or(JsonValue::Null, float_value),
        ColumnData::Bit(v) => v.map_or(JsonValue::Null, JsonValue::Bool),
        ColumnData::String(v) => v.as_ref().map_or(JsonValue::Null, |s| JsonValue::String(s.to_string())),
        ColumnData::Guid(v) => v.as_ref().map_or(JsonValue::Null, |g| JsonValue::String(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map_or(JsonValue::Null, |b| encode_binary(b)),
        ColumnData::Numeric(v) => v.as_ref().map_or(JsonValue::Null, |n| JsonValue::String(n.to_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => temporal(
            chrono::NaiveDateTime::from_sql(data).map(|v| v.map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        ),
        ColumnData::Date(_) => temporal(chrono::NaiveDate::from_sql(data).map(|v| v.map(|d| d.to_string()))),
        ColumnData::Time(_) => temporal(chrono::NaiveTime::from_sql(data).map(|v| v.map(|t| t.to_string()))),
        ColumnData::DateTimeOffset(_) => temporal(
            chrono::DateTime::<chrono::FixedOffset>::from_sql(data).map(|v| v.map(|dt| dt.to_rfc3339())),
        ),
        other => JsonValue::String(format!("{other:?}")),
    }
}

/// One result set read off a TDS response.
#[derive(Debug, Default)]
struct ResultSet {
    fields: Vec<FieldInfo>,
    rows: Vec<Map<String, JsonValue>>,
}

impl ResultSet {
    fn new(columns: &[Column]) -> Self {
        let fields = columns
            .iter()
            .map(|c| FieldInfo::new(c.name(), format!("{:?}", c.column_type()).to_lowercase()))
            .collect();
        Self { fields, rows: Vec::new() }
    }

    fn push(&mut self, row: &Row) {
        self.rows.push(
            row.cells()
                .map(|(column, data)| (column.name().to_string(), cell_to_json(data)))
                .collect(),
        );
    }

    fn is_row_count(&self) -> bool {
        matches!(self.fields.as_slice(), [field] if field.name == ROW_COUNT_COLUMN)
    }
}

/// Append a trailing `SELECT @@ROWCOUNT` so writes report their count through the same
/// stream that carries any result sets.
fn with_row_count(sql: &str) -> String {
    format!("{sql}\n;SELECT CAST(@@ROWCOUNT AS BIGINT) AS {ROW_COUNT_COLUMN}")
}

/// Fold the result sets of one batch: the first set the statement produced wins, whether or
/// not it has rows. Without one, the trailing count is the affected row count.
fn fold_result_sets(mut sets: Vec<ResultSet>) -> QueryResult {
    let mut rows_affected = 0;
    if sets.last().is_some_and(ResultSet::is_row_count) {
        rows_affected = sets
            .pop()
            .and_then(|trailer| trailer.rows.first()?.get(ROW_COUNT_COLUMN)?.as_u64())
            .unwrap_or(0);
    }
    match sets.into_iter().next() {
        Some(set) => QueryResult::from_rows(set.rows, set.fields),
        None => QueryResult::affected(rows_affected),
    }
}

fn text(row: &Row, idx: usize) -> Option<String> {
    row.try_get::<&str, _>(idx).ok().flatten().map(String::from)
}

fn int(row: &Row, idx: usize) -> Option<i64> {
    row.try_get::<i64, _>(idx).ok().flatten()
}

pub struct MsSqlAdapter {
    config: ConnectionConfig,
    client: NativeHandle<Arc<Mutex<TdsClient>>>,
    tx: TxState,
}

impl MsSqlAdapter {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            client: NativeHandle::new(DatabaseKind::MsSql),
            tx: TxState::default(),
        }
    }

    fn tds_config(&self) -> tiberius::Config {
        let mut config = tiberius::Config::new();
        config.host(self.config.host_or_default());
        config.port(self.config.port_or_default());
        if let Some(database) = &self.config.database {
            config.database(database);
        }
        if let Some(username) = &self.config.username {
            config.authentication(AuthMethod::sql_server(
                username,
                self.config.password.as_deref().unwrap_or_default(),
            ));
        }
        let options = match &self.config.options {
            BackendOptions::MsSql(opts) => opts.clone(),
            _ => Default::default(),
        };
        if options.trust_server_certificate {
            config.trust_cert();
        }
        config.application_name(options.application_name.as_deref().unwrap_or("db-gateway"));
        config.encryption(if self.config.ssl {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::Off
        });
        config
    }

    fn default_schema(&self) -> &'static str {
        "dbo"
    }

    async fn fetch(client: &mut TdsClient, sql: &str, params: &[&dyn ToSql]) -> DbResult<Vec<Row>> {
        client
            .query(sql, params)
            .await
            .map_err(tiberius_error)?
            .into_first_result()
            .await
            .map_err(tiberius_error)
    }

    async fn run(&self, sql: &str, params: &[QueryParam]) -> DbResult<QueryResult> {
        let handle = self.client.get()?;
        let mut client = handle.lock().await;
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();

        let mut stream = client
            .query(with_row_count(sql), &refs)
            .await
            .map_err(tiberius_error)?;
        let mut sets: Vec<ResultSet> = Vec::new();
        while let Some(item) = stream.try_next().await.map_err(tiberius_error)? {
            match item {
                QueryItem::Metadata(meta) => sets.push(ResultSet::new(meta.columns())),
                QueryItem::Row(row) => {
                    if sets.is_empty() {
                        sets.push(ResultSet::new(row.columns()));
                    }
                    if let Some(set) = sets.last_mut() {
                        set.push(&row);
                    }
                }
            }
        }
        Ok(fold_result_sets(sets))
    }

    async fn describe_table(&self, client: &mut TdsClient, schema: &str, name: &str) -> DbResult<Option<TableInfo>> {
        let schema_arg = schema.to_string();
        let name_arg = name.to_string();
        let args: [&dyn ToSql; 2] = [&schema_arg, &name_arg];

        let Some(table_type) = Self::fetch(client, queries::TABLE_TYPE, &args)
            .await?
            .first()
            .and_then(|row| text(row, 0))
        else {
            return Ok(None);
        };

        let columns = Self::fetch(client, queries::COLUMNS, &args)
            .await?
            .iter()
            .filter_map(|row| {
                let nullable = text(row, 2).is_some_and(|v| v == "YES");
                let mut column = ColumnInfo::new(text(row, 0)?, text(row, 1).unwrap_or_default(), nullable)
                    .with_length(int(row, 4))
                    .with_precision(int(row, 5), int(row, 6));
                if let Some(default) = text(row, 3) {
                    column = column.with_default_str(&default);
                }
                Some(column)
            })
            .collect();

        let constraints = group_constraints(
            Self::fetch(client, queries::CONSTRAINTS, &args)
                .await?
                .iter()
                .filter_map(|row| {
                    let kind = ConstraintKind::parse(&text(row, 1)?)?;
                    Some((text(row, 0)?, kind, text(row, 2)?, text(row, 3), text(row, 4)))
                }),
        );

        let mut indexes: Vec<IndexInfo> = Vec::new();
        for row in Self::fetch(client, queries::INDEXES, &args).await? {
            let (Some(index), Some(column)) = (text(&row, 0), text(&row, 1)) else {
                continue;
            };
            match indexes.iter_mut().find(|i| i.name == index) {
                Some(existing) => existing.columns.push(column),
                None => {
                    let unique = row.try_get::<bool, _>(2).ok().flatten().unwrap_or(false);
                    let mut info = IndexInfo::new(index, vec![column]).with_unique(unique);
                    if let Some(kind) = text(&row, 3) {
                        info = info.with_type(kind.to_lowercase());
                    }
                    indexes.push(info);
                }
            }
        }

        let mut table = TableInfo::new(name, TableType::parse(&table_type))
            .with_schema(schema)
            .with_columns(columns)
            .with_indexes(indexes)
            .with_constraints(constraints)
            .apply_key_flags();

        if let Ok(rows) = Self::fetch(client, queries::ROW_COUNT, &args).await {
            if let Some(count) = rows.first().and_then(|row| int(row, 0)) {
                table = table.with_row_count(count.max(0) as u64);
            }
        }
        Ok(Some(table))
    }

    async fn probe(&self) -> DbResult<()> {
        let handle = self.client.get()?;
        let mut client = handle.lock().await;
        Self::fetch(&mut client, "SELECT 1", &[]).await.map(|_| ())
    }
}

#[async_trait]
impl DatabaseAdapter for MsSqlAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MsSql
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn transaction_support(&self) -> TransactionSupport {
        TransactionSupport::Emulated
    }

    async fn connect(&self) -> DbResult<()> {
        let config = self.tds_config();
        let limit = self.config.pool.acquire_timeout_or_default();
        let client = with_timeout("MSSQL connect", limit, async {
            let tcp = TcpStream::connect(config.get_addr())
                .await
                .map_err(|e| connection_failed(DatabaseKind::MsSql, e))?;
            tcp.set_nodelay(true)
                .map_err(|e| connection_failed(DatabaseKind::MsSql, e))?;
            Client::connect(config, tcp.compat_write())
                .await
                .map_err(|e| connection_failed(DatabaseKind::MsSql, e))
        })
        .await?;

        self.client.set(Arc::new(Mutex::new(client)));
        info!(connection = %self.config.name, endpoint = %self.config.endpoint(), "Connected to SQL Server");
        Ok(())
    }

    async fn disconnect(&self) -> DbResult<()> {
        self.tx.reset();
        let Some(handle) = self.client.take() else {
            return Ok(());
        };
        match Arc::try_unwrap(handle) {
            Ok(client) => client.into_inner().close().await.map_err(tiberius_error)?,
            Err(_) => debug!(connection = %self.config.name, "Client still in use; dropping shared handle"),
        }
        debug!(connection = %self.config.name, "Closed SQL Server client");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    async fn execute_query(&self, input: &QueryInput) -> DbResult<QueryResult> {
        self.client.get()?;
        let (sql, params) = input.as_native(BACKEND)?;
        let limit = self.config.pool.request_timeout_or_default();
        with_timeout("MSSQL query", limit, self.run(sql, params)).await
    }

    async fn get_tables(&self) -> DbResult<Vec<TableInfo>> {
        let handle = self.client.get()?;
        let mut client = handle.lock().await;
        let names: Vec<(String, String)> = Self::fetch(&mut client, queries::LIST_TABLES, &[])
            .await?
            .iter()
            .filter_map(|row| Some((text(row, 0)?, text(row, 1)?)))
            .collect();

        let mut tables = Vec::with_capacity(names.len());
        for (schema, name) in names {
            match self.describe_table(&mut client, &schema, &name).await {
                Ok(Some(table)) => tables.push(table),
                Ok(None) => {}
                Err(e) => {
                    warn!(table = %name, error = %e, "Failed to describe table");
                    tables.push(TableInfo::new(name, TableType::Table).with_schema(schema));
                }
            }
        }
        Ok(tables)
    }

    async fn get_table_info(&self, name: &str, schema: Option<&str>) -> DbResult<Option<TableInfo>> {
        let handle = self.client.get()?;
        let mut client = handle.lock().await;
        let schema = schema.unwrap_or(self.default_schema());
        self.describe_table(&mut client, schema, name).await
    }

    async fn get_database_stats(&self) -> DbResult<DatabaseStats> {
        let handle = self.client.get()?;
        let mut client = handle.lock().await;
        let rows = Self::fetch(&mut client, queries::STATS, &[]).await?;
        let Some(row) = rows.first() else {
            return Err(DbError::backend(BACKEND, "Statistics query returned no rows"));
        };
        let count = |idx| int(row, idx).unwrap_or(0).max(0) as u64;
        let mut stats = DatabaseStats::new(count(0), count(1), count(2), format_size(count(3)));

        // dm_exec_sessions needs VIEW SERVER STATE
        match Self::fetch(&mut client, queries::SESSIONS, &[]).await {
            Ok(rows) => {
                if let Some(sessions) = rows.first().and_then(|row| int(row, 0)) {
                    stats = stats.with_connections(sessions.max(0) as u64);
                }
            }
            Err(e) => debug!(error = %e, "Session count unavailable"),
        }
        Ok(stats)
    }

    async fn validate_connection(&self) -> bool {
        let limit = self.config.pool.acquire_timeout_or_default();
        with_timeout("MSSQL probe", limit, self.probe()).await.is_ok()
    }

    async fn begin_transaction(&self) -> DbResult<()> {
        self.client.get()?;
        self.tx.begin()
    }

    async fn commit_transaction(&self) -> DbResult<()> {
        self.tx.end()
    }

    async fn rollback_transaction(&self) -> DbResult<()> {
        self.tx.end()?;
        warn!(connection = %self.config.name, "MSSQL rollback is a no-op; earlier statements remain applied");
        Ok(())
    }

    fn is_in_transaction(&self) -> bool {
        self.tx.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_count_set(count: u64) -> ResultSet {
        ResultSet {
            fields: vec![FieldInfo::new(ROW_COUNT_COLUMN, "i64")],
            rows: vec![Map::from_iter([(ROW_COUNT_COLUMN.to_string(), json!(count))])],
        }
    }

    fn named_set(names: &[&str], rows: Vec<JsonValue>) -> ResultSet {
        ResultSet {
            fields: names.iter().map(|n| FieldInfo::new(*n, "nvarchar")).collect(),
            rows: rows
                .into_iter()
                .filter_map(|row| row.as_object().cloned())
                .collect(),
        }
    }

    #[test]
    fn test_write_reports_trailing_count() {
        // UPDATE jobs SET note = 'no output yet' produces no result set of its own
        let result = fold_result_sets(vec![row_count_set(3)]);
        assert_eq!(result.row_count, 3);
        assert!(result.rows.is_empty());
    }

    #[test]
    fn test_procedure_rows_are_kept() {
        // EXEC sp_tables: the procedure's set comes first, the trailer last
        let procedure = named_set(
            &["TABLE_NAME"],
            vec![json!({ "TABLE_NAME": "jobs" }), json!({ "TABLE_NAME": "users" })],
        );
        let result = fold_result_sets(vec![procedure, row_count_set(2)]);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.rows[1]["TABLE_NAME"], json!("users"));
        assert_eq!(result.fields[0].name, "TABLE_NAME");
    }

    #[test]
    fn test_empty_select_keeps_fields() {
        let result = fold_result_sets(vec![named_set(&["id"], Vec::new()), row_count_set(0)]);
        assert_eq!(result.row_count, 0);
        assert_eq!(result.fields.len(), 1);
    }

    #[test]
    fn test_output_clause_rows_win_over_count() {
        let inserted = named_set(&["id"], vec![json!({ "id": 7 })]);
        let result = fold_result_sets(vec![inserted, row_count_set(1)]);
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0]["id"], json!(7));
    }

    #[test]
    fn test_row_count_trailer_survives_line_comment() {
        let batch = with_row_count("UPDATE t SET a = 1 -- bump");
        assert!(batch.starts_with("UPDATE t SET a = 1 -- bump\n;SELECT"));
        assert!(batch.ends_with(ROW_COUNT_COLUMN));
    }

    #[test]
    fn test_param_to_sql() {
        assert!(matches!(QueryParam::Int(5).to_sql(), ColumnData::I64(Some(5))));
        assert!(matches!(QueryParam::Bool(true).to_sql(), ColumnData::Bit(Some(true))));
        assert!(matches!(QueryParam::Null.to_sql(), ColumnData::String(None)));
        match QueryParam::Json(json!({ "a": 1 })).to_sql() {
            ColumnData::String(Some(s)) => assert_eq!(s, r#"{"a":1}"#),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cell_to_json() {
        assert_eq!(cell_to_json(&ColumnData::I32(Some(3))), json!(3));
        assert_eq!(cell_to_json(&ColumnData::I32(None)), JsonValue::Null);
        assert_eq!(
            cell_to_json(&ColumnData::String(Some(Cow::Owned("x".into())))),
            json!("x")
        );
        assert_eq!(cell_to_json(&ColumnData::Bit(Some(false))), json!(false));
    }

    #[tokio::test]
    async fn test_not_connected_before_connect() {
        let adapter = MsSqlAdapter::new(ConnectionConfig::empty(DatabaseKind::MsSql));
        let err = adapter.execute_query(&QueryInput::native("SELECT 1")).await.unwrap_err();
        assert!(matches!(err, DbError::NotConnected { .. }));
        assert!(!adapter.validate_connection().await);
    }
}

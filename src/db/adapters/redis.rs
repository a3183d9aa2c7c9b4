//! Redis adapter.
//!
//! Queries are raw command lines (`SET user:1 "Ada Lovelace"`), with `?` tokens replaced by
//! positional parameters. Key prefixes before the first `:` stand in for tables.

use super::connection_failed;
use crate::db::adapter::{DatabaseAdapter, NativeHandle, TransactionSupport, TxState, with_timeout};
use crate::error::{DbError, DbResult};
use crate::models::{
    BackendOptions, ColumnInfo, ConnectionConfig, DatabaseKind, DatabaseStats, FieldInfo,
    QueryInput, QueryParam, QueryResult, TableInfo, TableType,
};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisError, Value};
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use url::Url;

const BACKEND: &str = "Redis";

/// Upper bound on keys visited when grouping keys into prefixes.
const MAX_SCANNED_KEYS: usize = 10_000;
const SCAN_BATCH: usize = 500;

pub(crate) fn redis_error(err: RedisError) -> DbError {
    if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        return connection_failed(DatabaseKind::Redis, err);
    }
    if err.is_timeout() {
        return DbError::timeout("Redis command", 0);
    }
    let message = match err.detail() {
        Some(detail) => detail.to_string(),
        None => err.to_string(),
    };
    DbError::backend_with_code(
        BACKEND,
        message,
        err.code().map(String::from),
        "Check the command name and its arguments",
    )
}

/// Split a command line into arguments, honoring single and double quotes.
pub fn tokenize(command: &str) -> DbResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some('"') if c == '\\' => match chars.next() {
                Some('n') => current.push('\n'),
                Some('t') => current.push('\t'),
                Some(escaped) => current.push(escaped),
                None => current.push('\\'),
            },
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if quote.is_some() {
        return Err(DbError::invalid_input("Unterminated quote in Redis command"));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Replace bare `?` arguments with positional parameters.
pub fn substitute_params(tokens: Vec<String>, params: &[QueryParam]) -> DbResult<Vec<String>> {
    let placeholders = tokens.iter().filter(|t| t.as_str() == "?").count();
    if placeholders != params.len() {
        return Err(DbError::invalid_input(format!(
            "Command has {placeholders} placeholder(s) but {} parameter(s) were given",
            params.len()
        )));
    }
    let mut params = params.iter();
    Ok(tokens
        .into_iter()
        .map(|token| {
            if token == "?" {
                params.next().map(QueryParam::to_plain_string).unwrap_or(token)
            } else {
                token
            }
        })
        .collect())
}

fn value_to_json(value: Value) -> JsonValue {
    match value {
        Value::Nil => JsonValue::Null,
        Value::Int(i) => json!(i),
        Value::Double(f) => crate::db::types::float_value(f),
        Value::Boolean(b) => JsonValue::Bool(b),
        Value::Okay => JsonValue::String("OK".to_string()),
        Value::SimpleString(s) => JsonValue::String(s),
        Value::BulkString(bytes) => match String::from_utf8(bytes) {
            Ok(s) => JsonValue::String(s),
            Err(e) => crate::db::types::encode_binary(e.as_bytes()),
        },
        Value::VerbatimString { text, .. } => JsonValue::String(text),
        Value::Array(items) | Value::Set(items) => {
            JsonValue::Array(items.into_iter().map(value_to_json).collect())
        }
        Value::Map(pairs) => {
            let mut map = Map::new();
            for (k, v) in pairs {
                let key = match value_to_json(k) {
                    JsonValue::String(s) => s,
                    other => other.to_string(),
                };
                map.insert(key, value_to_json(v));
            }
            JsonValue::Object(map)
        }
        Value::Attribute { data, .. } => value_to_json(*data),
        other => JsonValue::String(format!("{other:?}")),
    }
}

/// Shape a reply as rows: arrays become `{index, value}`, maps `{key, value}`, scalars `{result}`.
pub(crate) fn reply_to_result(value: Value) -> QueryResult {
    let row = |pairs: [(&str, JsonValue); 2]| -> Map<String, JsonValue> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    };
    let (rows, fields) = match value_to_json(value) {
        JsonValue::Array(items) => (
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| row([("index", json!(i)), ("value", v)]))
                .collect(),
            vec![FieldInfo::new("index", "integer"), FieldInfo::new("value", "string")],
        ),
        JsonValue::Object(map) => (
            map.into_iter()
                .map(|(k, v)| row([("key", JsonValue::String(k)), ("value", v)]))
                .collect(),
            vec![FieldInfo::new("key", "string"), FieldInfo::new("value", "string")],
        ),
        scalar => {
            let data_type = crate::models::query::json_type_name(&scalar);
            let mut map = Map::new();
            map.insert("result".to_string(), scalar);
            (vec![map], vec![FieldInfo::new("result", data_type)])
        }
    };
    QueryResult::from_rows(rows, fields)
}

/// Prefix before the first `:`, or the whole key.
fn key_prefix(key: &str) -> &str {
    key.split_once(':').map(|(prefix, _)| prefix).unwrap_or(key)
}

fn escape_glob(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Read one `field:value` line from an INFO section.
fn info_field<'a>(info: &'a str, field: &str) -> Option<&'a str> {
    info.lines().find_map(|line| {
        line.trim()
            .strip_prefix(field)
            .and_then(|rest| rest.strip_prefix(':'))
    })
}

pub struct RedisAdapter {
    config: ConnectionConfig,
    conn: NativeHandle<ConnectionManager>,
    tx: TxState,
}

impl RedisAdapter {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            conn: NativeHandle::new(DatabaseKind::Redis),
            tx: TxState::default(),
        }
    }

    fn connection_url(&self) -> DbResult<String> {
        if let Some(url) = &self.config.url {
            return Ok(url.clone());
        }
        let scheme = if self.config.ssl { "rediss" } else { "redis" };
        let db = match &self.config.options {
            BackendOptions::Redis(opts) => opts.db.unwrap_or(0),
            _ => 0,
        };
        let raw = format!(
            "{scheme}://{}:{}/{db}",
            self.config.host_or_default(),
            self.config.port_or_default()
        );
        let mut url = Url::parse(&raw).map_err(|e| DbError::invalid_input(format!("Invalid Redis address: {e}")))?;
        if let Some(username) = &self.config.username {
            let _ = url.set_username(username);
        }
        if let Some(password) = &self.config.password {
            let _ = url.set_password(Some(password));
        }
        Ok(url.to_string())
    }

    async fn command(&self, args: &[String]) -> DbResult<Value> {
        let Some((name, rest)) = args.split_first() else {
            return Err(DbError::invalid_input("Redis command is empty"));
        };
        let mut conn = self.conn.get()?;
        let mut cmd = redis::cmd(name);
        for arg in rest {
            cmd.arg(arg);
        }
        let limit = self.config.pool.request_timeout_or_default();
        with_timeout("Redis command", limit, async {
            cmd.query_async::<Value>(&mut conn).await.map_err(redis_error)
        })
        .await
    }

    /// Keys matching `pattern`, bounded by [`MAX_SCANNED_KEYS`].
    async fn scan_keys(&self, pattern: &str) -> DbResult<Vec<String>> {
        let mut conn = self.conn.get()?;
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(redis_error)?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 || keys.len() >= MAX_SCANNED_KEYS {
                break;
            }
        }
        if keys.len() >= MAX_SCANNED_KEYS {
            warn!(connection = %self.config.name, "Key scan truncated at {MAX_SCANNED_KEYS} keys");
        }
        Ok(keys)
    }

    async fn key_type(&self, key: &str) -> DbResult<String> {
        let mut conn = self.conn.get()?;
        redis::cmd("TYPE")
            .arg(key)
            .query_async::<String>(&mut conn)
            .await
            .map_err(redis_error)
    }

    async fn describe_prefix(&self, prefix: &str, keys: &[String]) -> TableInfo {
        let value_type = match keys.first() {
            Some(sample) => self.key_type(sample).await.unwrap_or_else(|e| {
                warn!(key = %sample, error = %e, "Failed to read key type");
                "unknown".to_string()
            }),
            None => "unknown".to_string(),
        };
        TableInfo::new(prefix, TableType::Table)
            .with_columns(vec![
                ColumnInfo::new("key", "string", false).with_primary_key(true),
                ColumnInfo::new("value", value_type, true),
            ])
            .with_row_count(keys.len() as u64)
    }

    async fn info(&self, section: &str) -> DbResult<String> {
        let mut conn = self.conn.get()?;
        redis::cmd("INFO")
            .arg(section)
            .query_async::<String>(&mut conn)
            .await
            .map_err(redis_error)
    }
}

fn group_by_prefix(keys: Vec<String>) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for key in keys {
        groups.entry(key_prefix(&key).to_string()).or_default().push(key);
    }
    groups
}

#[async_trait]
impl DatabaseAdapter for RedisAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Redis
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn transaction_support(&self) -> TransactionSupport {
        TransactionSupport::Emulated
    }

    async fn connect(&self) -> DbResult<()> {
        let url = self.connection_url()?;
        let client = redis::Client::open(url.as_str()).map_err(|e| {
            DbError::connection(
                BACKEND,
                format!("Invalid connection string: {e}"),
                "Check the connection URL format: redis://[:password@]host:6379[/db]",
            )
        })?;

        let limit = self.config.pool.acquire_timeout_or_default();
        let manager = with_timeout("Redis connect", limit, async {
            ConnectionManager::new(client)
                .await
                .map_err(|e| connection_failed(DatabaseKind::Redis, e))
        })
        .await?;

        self.conn.set(manager);
        info!(connection = %self.config.name, endpoint = %self.config.endpoint(), "Connected to Redis");
        Ok(())
    }

    async fn disconnect(&self) -> DbResult<()> {
        self.tx.reset();
        if self.conn.take().is_some() {
            debug!(connection = %self.config.name, "Dropped Redis connection");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    async fn execute_query(&self, input: &QueryInput) -> DbResult<QueryResult> {
        self.conn.get()?;
        let (text, params) = input.as_native(BACKEND)?;
        let args = substitute_params(tokenize(text)?, params)?;
        let reply = self.command(&args).await?;
        Ok(reply_to_result(reply))
    }

    async fn get_tables(&self) -> DbResult<Vec<TableInfo>> {
        let groups = group_by_prefix(self.scan_keys("*").await?);
        let mut tables = Vec::with_capacity(groups.len());
        for (prefix, keys) in &groups {
            tables.push(self.describe_prefix(prefix, keys).await);
        }
        Ok(tables)
    }

    async fn get_table_info(&self, name: &str, _schema: Option<&str>) -> DbResult<Option<TableInfo>> {
        let pattern = format!("{}*", escape_glob(name));
        let keys: Vec<String> = self
            .scan_keys(&pattern)
            .await?
            .into_iter()
            .filter(|key| key_prefix(key) == name)
            .collect();
        if keys.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.describe_prefix(name, &keys).await))
    }

    async fn get_database_stats(&self) -> DbResult<DatabaseStats> {
        let prefixes = group_by_prefix(self.scan_keys("*").await?).len() as u64;
        let memory = self.info("memory").await?;
        let size = info_field(&memory, "used_memory_human")
            .unwrap_or("unknown")
            .to_string();

        let mut stats = DatabaseStats::new(prefixes, 0, 0, size);
        if let Ok(clients) = self.info("clients").await {
            if let Some(count) = info_field(&clients, "connected_clients").and_then(|v| v.parse().ok()) {
                stats = stats.with_connections(count);
            }
        }
        Ok(stats)
    }

    async fn validate_connection(&self) -> bool {
        let Ok(mut conn) = self.conn.get() else {
            return false;
        };
        let limit = self.config.pool.acquire_timeout_or_default();
        with_timeout("Redis probe", limit, async {
            redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .map_err(redis_error)
        })
        .await
        .is_ok()
    }

    async fn begin_transaction(&self) -> DbResult<()> {
        self.conn.get()?;
        self.tx.begin()
    }

    async fn commit_transaction(&self) -> DbResult<()> {
        self.tx.end()
    }

    async fn rollback_transaction(&self) -> DbResult<()> {
        self.tx.end()?;
        warn!(connection = %self.config.name, "Redis rollback is a no-op; earlier commands remain applied");
        Ok(())
    }

    fn is_in_transaction(&self) -> bool {
        self.tx.is_active()
    }
}

//! Cassandra / ScyllaDB adapter over the scylla driver.
//!
//! CQL has no multi-statement transactions, so begin/commit/rollback only track ordering.
//! Parameterized statements are prepared so `?` values can be coerced to the column types
//! the server reports.

use super::connection_failed;
use crate::db::adapter::{DatabaseAdapter, NativeHandle, TransactionSupport, TxState, with_timeout};
use crate::db::types::{encode_binary, float_value};
use crate::error::{DbError, DbResult};
use crate::models::{
    BackendOptions, ColumnInfo, ConnectionConfig, ConstraintInfo, ConstraintKind, DatabaseKind,
    DatabaseStats, FieldInfo, IndexInfo, QueryInput, QueryParam, QueryResult, TableInfo, TableType,
};
use async_trait::async_trait;
use scylla::frame::response::result::{ColumnType, CqlValue, Row};
use scylla::transport::ExecutionProfile;
use scylla::transport::errors::QueryError;
use scylla::transport::load_balancing::DefaultPolicy;
use scylla::{Session, SessionBuilder};
use serde_json::{Map, Value as JsonValue, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

const BACKEND: &str = "Cassandra";

const SYSTEM_KEYSPACES: &[&str] = &[
    "system",
    "system_auth",
    "system_distributed",
    "system_schema",
    "system_traces",
    "system_views",
    "system_virtual_schema",
];

fn query_error(err: QueryError) -> DbError {
    match err {
        QueryError::IoError(e) => connection_failed(DatabaseKind::Cassandra, e),
        QueryError::TimeoutError | QueryError::RequestTimeout(_) => DbError::timeout("Cassandra request", 0),
        QueryError::DbError(db_err, message) => DbError::backend_with_code(
            BACKEND,
            message,
            Some(format!("{db_err:?}")),
            "Check the CQL syntax, keyspace and table names",
        ),
        other => DbError::backend(BACKEND, other.to_string()),
    }
}

/// Coerce one positional parameter to the type the prepared statement expects.
fn coerce_param(param: &QueryParam, typ: &ColumnType) -> DbResult<Option<CqlValue>> {
    let mismatch = || {
        DbError::invalid_input(format!(
            "Cannot bind {} parameter to a {typ:?} column",
            param.type_name()
        ))
    };
    let value = match (param, typ) {
        (QueryParam::Null, _) => return Ok(None),

        (QueryParam::Bool(b), ColumnType::Boolean) => CqlValue::Boolean(*b),

        (QueryParam::Int(i), ColumnType::TinyInt) => CqlValue::TinyInt(i8::try_from(*i).map_err(|_| mismatch())?),
        (QueryParam::Int(i), ColumnType::SmallInt) => CqlValue::SmallInt(i16::try_from(*i).map_err(|_| mismatch())?),
        (QueryParam::Int(i), ColumnType::Int) => CqlValue::Int(i32::try_from(*i).map_err(|_| mismatch())?),
        (QueryParam::Int(i), ColumnType::BigInt) => CqlValue::BigInt(*i),
        (QueryParam::Int(i), ColumnType::Float) => CqlValue::Float(*i as f32),
        (QueryParam::Int(i), ColumnType::Double) => CqlValue::Double(*i as f64),
        (QueryParam::Int(i), ColumnType::Timestamp) => {
            CqlValue::Timestamp(scylla::frame::value::CqlTimestamp(*i))
        }

        (QueryParam::Float(f), ColumnType::Float) => CqlValue::Float(*f as f32),
        (QueryParam::Float(f), ColumnType::Double) => CqlValue::Double(*f),

        (QueryParam::String(s), ColumnType::Text) => CqlValue::Text(s.clone()),
        (QueryParam::String(s), ColumnType::Ascii) => CqlValue::Ascii(s.clone()),
        (QueryParam::String(s), ColumnType::Blob) => CqlValue::Blob(s.as_bytes().to_vec()),
        (QueryParam::String(s), ColumnType::Inet) => CqlValue::Inet(s.parse().map_err(|_| mismatch())?),
        (QueryParam::String(s), ColumnType::Boolean) => CqlValue::Boolean(s.parse().map_err(|_| mismatch())?),
        (QueryParam::String(s), ColumnType::Int) => CqlValue::Int(s.parse().map_err(|_| mismatch())?),
        (QueryParam::String(s), ColumnType::BigInt) => CqlValue::BigInt(s.parse().map_err(|_| mismatch())?),
        (QueryParam::String(s), ColumnType::Double) => CqlValue::Double(s.parse().map_err(|_| mismatch())?),
        (QueryParam::String(s), ColumnType::Timestamp) => {
            let ts = chrono::DateTime::parse_from_rfc3339(s).map_err(|_| mismatch())?;
            CqlValue::Timestamp(scylla::frame::value::CqlTimestamp(ts.timestamp_millis()))
        }

        (scalar, ColumnType::Text) => CqlValue::Text(scalar.to_plain_string()),

        (QueryParam::Json(JsonValue::Array(items)), ColumnType::List(inner) | ColumnType::Set(inner)) => {
            let values = items
                .iter()
                .map(|item| {
                    coerce_param(&QueryParam::from_json(item.clone()), inner)?
                        .ok_or_else(|| DbError::invalid_input("Collections cannot contain null"))
                })
                .collect::<DbResult<Vec<_>>>()?;
            if matches!(typ, ColumnType::Set(_)) {
                CqlValue::Set(values)
            } else {
                CqlValue::List(values)
            }
        }

        _ => return Err(mismatch()),
    };
    Ok(Some(value))
}

fn cql_to_json(value: CqlValue) -> JsonValue {
    match value {
        CqlValue::Empty => JsonValue::Null,
        CqlValue::Ascii(s) | CqlValue::Text(s) => JsonValue::String(s),
        CqlValue::Boolean(b) => JsonValue::Bool(b),
        CqlValue::Blob(bytes) => encode_binary(&bytes),
        CqlValue::TinyInt(i) => json!(i),
        CqlValue::SmallInt(i) => json!(i),
        CqlValue::Int(i) => json!(i),
        CqlValue::BigInt(i) => json!(i),
        CqlValue::Counter(c) => json!(c.0),
        CqlValue::Float(f) => float_value(f as f64),
        CqlValue::Double(f) => float_value(f),
        CqlValue::Inet(addr) => JsonValue::String(addr.to_string()),
        CqlValue::Uuid(id) => JsonValue::String(id.to_string()),
        CqlValue::Timestamp(ts) => match chrono::DateTime::from_timestamp_millis(ts.0) {
            Some(dt) => JsonValue::String(dt.to_rfc3339()),
            None => json!(ts.0),
        },
        CqlValue::List(items) | CqlValue::Set(items) => {
            JsonValue::Array(items.into_iter().map(cql_to_json).collect())
        }
        CqlValue::Map(pairs) => {
            let mut map = Map::new();
            for (k, v) in pairs {
                let key = match cql_to_json(k) {
                    JsonValue::String(s) => s,
                    other => other.to_string(),
                };
                map.insert(key, cql_to_json(v));
            }
            JsonValue::Object(map)
        }
        CqlValue::Tuple(items) => JsonValue::Array(
            items
                .into_iter()
                .map(|v| v.map(cql_to_json).unwrap_or(JsonValue::Null))
                .collect(),
        ),
        CqlValue::UserDefinedType { fields, .. } => JsonValue::Object(
            fields
                .into_iter()
                .map(|(name, v)| (name, v.map(cql_to_json).unwrap_or(JsonValue::Null)))
                .collect(),
        ),
        other => JsonValue::String(format!("{other:?}")),
    }
}

fn cql_type_name(typ: &ColumnType) -> String {
    format!("{typ:?}").to_lowercase()
}

fn text_at(row: &Row, idx: usize) -> Option<String> {
    row.columns
        .get(idx)
        .and_then(Option::as_ref)
        .and_then(CqlValue::as_text)
        .cloned()
}

fn int_at(row: &Row, idx: usize) -> Option<i32> {
    row.columns.get(idx).and_then(Option::as_ref).and_then(CqlValue::as_int)
}

pub struct CassandraAdapter {
    config: ConnectionConfig,
    session: NativeHandle<Arc<Session>>,
    tx: TxState,
}

impl CassandraAdapter {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            session: NativeHandle::new(DatabaseKind::Cassandra),
            tx: TxState::default(),
        }
    }

    fn known_nodes(&self) -> Vec<String> {
        let port = self.config.port_or_default();
        let contact_points = match &self.config.options {
            BackendOptions::Cassandra(opts) => opts.contact_points.clone(),
            _ => Vec::new(),
        };
        if contact_points.is_empty() {
            return vec![format!("{}:{port}", self.config.host_or_default())];
        }
        contact_points
            .into_iter()
            .map(|node| if node.contains(':') { node } else { format!("{node}:{port}") })
            .collect()
    }

    fn local_datacenter(&self) -> Option<&str> {
        match &self.config.options {
            BackendOptions::Cassandra(opts) => opts.local_datacenter.as_deref(),
            _ => None,
        }
    }

    fn keyspace(&self) -> Option<&str> {
        self.config.database.as_deref().filter(|k| !k.is_empty())
    }

    /// Run a catalog query with text arguments.
    async fn select(&self, session: &Session, cql: &str, args: &[&str]) -> DbResult<Vec<Row>> {
        let values: Vec<CqlValue> = args.iter().map(|a| CqlValue::Text(a.to_string())).collect();
        let result = session.query(cql, values).await.map_err(query_error)?;
        Ok(result.rows.unwrap_or_default())
    }

    async fn describe_table(&self, session: &Session, keyspace: &str, name: &str) -> DbResult<Option<TableInfo>> {
        let table_type = if !self
            .select(
                session,
                "SELECT table_name FROM system_schema.tables WHERE keyspace_name = ? AND table_name = ?",
                &[keyspace, name],
            )
            .await?
            .is_empty()
        {
            TableType::Table
        } else if !self
            .select(
                session,
                "SELECT view_name FROM system_schema.views WHERE keyspace_name = ? AND view_name = ?",
                &[keyspace, name],
            )
            .await?
            .is_empty()
        {
            TableType::MaterializedView
        } else {
            return Ok(None);
        };

        let column_rows = self
            .select(
                session,
                "SELECT column_name, kind, type, position FROM system_schema.columns WHERE keyspace_name = ? AND table_name = ?",
                &[keyspace, name],
            )
            .await?;

        // partition keys, then clustering keys, then regular columns
        let mut described: Vec<(u8, i32, ColumnInfo)> = column_rows
            .iter()
            .filter_map(|row| {
                let column = text_at(row, 0)?;
                let kind = text_at(row, 1).unwrap_or_default();
                let data_type = text_at(row, 2).unwrap_or_default();
                let position = int_at(row, 3).unwrap_or(-1);
                let rank = match kind.as_str() {
                    "partition_key" => 0,
                    "clustering" => 1,
                    _ => 2,
                };
                let info = ColumnInfo::new(column, data_type, rank == 2).with_primary_key(rank < 2);
                Some((rank, position, info))
            })
            .collect();
        described.sort_by(|a, b| (a.0, a.1, &a.2.name).cmp(&(b.0, b.1, &b.2.name)));

        let key_columns: Vec<String> = described
            .iter()
            .filter(|(rank, _, _)| *rank < 2)
            .map(|(_, _, c)| c.name.clone())
            .collect();
        let columns: Vec<ColumnInfo> = described.into_iter().map(|(_, _, c)| c).collect();

        let indexes = self
            .select(
                session,
                "SELECT index_name, kind, options FROM system_schema.indexes WHERE keyspace_name = ? AND table_name = ?",
                &[keyspace, name],
            )
            .await?
            .into_iter()
            .filter_map(|row| {
                let index_name = text_at(&row, 0)?;
                let kind = text_at(&row, 1).unwrap_or_default();
                let target = match row.columns.get(2).cloned().flatten() {
                    Some(CqlValue::Map(pairs)) => pairs.into_iter().find_map(|(k, v)| {
                        (k.as_text().map(String::as_str) == Some("target"))
                            .then(|| v.as_text().cloned())
                            .flatten()
                    }),
                    _ => None,
                };
                Some(IndexInfo::new(index_name, target.into_iter().collect()).with_type(kind.to_lowercase()))
            })
            .collect();

        let mut constraints = Vec::new();
        if !key_columns.is_empty() {
            constraints.push(ConstraintInfo::new(
                format!("{name}_pkey"),
                ConstraintKind::PrimaryKey,
                key_columns,
            ));
        }

        Ok(Some(
            TableInfo::new(name, table_type)
                .with_schema(keyspace)
                .with_columns(columns)
                .with_indexes(indexes)
                .with_constraints(constraints),
        ))
    }

    /// (keyspace, table) pairs visible to this connection.
    async fn table_names(&self, session: &Session) -> DbResult<Vec<(String, String)>> {
        let rows = match self.keyspace() {
            Some(keyspace) => {
                self.select(
                    session,
                    "SELECT keyspace_name, table_name FROM system_schema.tables WHERE keyspace_name = ?",
                    &[keyspace],
                )
                .await?
            }
            None => {
                self.select(session, "SELECT keyspace_name, table_name FROM system_schema.tables", &[])
                    .await?
            }
        };
        let mut names: Vec<(String, String)> = rows
            .iter()
            .filter_map(|row| Some((text_at(row, 0)?, text_at(row, 1)?)))
            .filter(|(keyspace, _)| !SYSTEM_KEYSPACES.contains(&keyspace.as_str()))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn run(&self, session: &Session, cql: &str, params: &[QueryParam]) -> DbResult<QueryResult> {
        let result = if params.is_empty() {
            session.query(cql, ()).await.map_err(query_error)?
        } else {
            let prepared = session.prepare(cql).await.map_err(query_error)?;
            let specs = prepared.get_variable_col_specs();
            if specs.len() != params.len() {
                return Err(DbError::invalid_input(format!(
                    "Statement has {} placeholder(s) but {} parameter(s) were given",
                    specs.len(),
                    params.len()
                )));
            }
            let values = params
                .iter()
                .zip(specs)
                .map(|(param, spec)| coerce_param(param, &spec.typ))
                .collect::<DbResult<Vec<Option<CqlValue>>>>()?;
            session.execute(&prepared, values).await.map_err(query_error)?
        };

        let Some(rows) = result.rows else {
            return Ok(QueryResult::affected(0));
        };
        let fields: Vec<FieldInfo> = result
            .col_specs
            .iter()
            .map(|spec| FieldInfo::new(spec.name.clone(), cql_type_name(&spec.typ)))
            .collect();
        let rows = rows
            .into_iter()
            .map(|row| {
                fields
                    .iter()
                    .zip(row.columns)
                    .map(|(field, value)| (field.name.clone(), value.map(cql_to_json).unwrap_or(JsonValue::Null)))
                    .collect()
            })
            .collect();
        Ok(QueryResult::from_rows(rows, fields))
    }
}

#[async_trait]
impl DatabaseAdapter for CassandraAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Cassandra
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn transaction_support(&self) -> TransactionSupport {
        TransactionSupport::Emulated
    }

    async fn connect(&self) -> DbResult<()> {
        let pool = &self.config.pool;
        let mut policy = DefaultPolicy::builder().token_aware(true);
        if let Some(dc) = self.local_datacenter() {
            policy = policy.prefer_datacenter(dc.to_string()).permit_dc_failover(true);
        }
        let profile = ExecutionProfile::builder()
            .load_balancing_policy(policy.build())
            .request_timeout(Some(pool.request_timeout_or_default()))
            .build();

        let mut builder = SessionBuilder::new()
            .known_nodes(self.known_nodes())
            .connection_timeout(pool.acquire_timeout_or_default())
            .default_execution_profile_handle(profile.into_handle());
        if let Some(username) = &self.config.username {
            builder = builder.user(username, self.config.password.as_deref().unwrap_or_default());
        }
        if let Some(keyspace) = self.keyspace() {
            builder = builder.use_keyspace(keyspace, false);
        }

        let limit = pool.acquire_timeout_or_default();
        let session = with_timeout("Cassandra connect", limit, async {
            builder
                .build()
                .await
                .map_err(|e| connection_failed(DatabaseKind::Cassandra, e))
        })
        .await?;

        self.session.set(Arc::new(session));
        info!(connection = %self.config.name, nodes = ?self.known_nodes(), "Connected to Cassandra");
        Ok(())
    }

    async fn disconnect(&self) -> DbResult<()> {
        self.tx.reset();
        if self.session.take().is_some() {
            debug!(connection = %self.config.name, "Dropped Cassandra session");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    async fn execute_query(&self, input: &QueryInput) -> DbResult<QueryResult> {
        let session = self.session.get()?;
        let (cql, params) = input.as_native(BACKEND)?;
        let limit = self.config.pool.request_timeout_or_default();
        with_timeout("Cassandra query", limit, self.run(&session, cql, params)).await
    }

    async fn get_tables(&self) -> DbResult<Vec<TableInfo>> {
        let session = self.session.get()?;
        let names = self.table_names(&session).await?;
        let mut tables = Vec::with_capacity(names.len());
        for (keyspace, name) in names {
            match self.describe_table(&session, &keyspace, &name).await {
                Ok(Some(table)) => tables.push(table),
                Ok(None) => {}
                Err(e) => {
                    warn!(table = %name, error = %e, "Failed to describe table");
                    tables.push(TableInfo::new(name, TableType::Table).with_schema(keyspace));
                }
            }
        }
        Ok(tables)
    }

    async fn get_table_info(&self, name: &str, schema: Option<&str>) -> DbResult<Option<TableInfo>> {
        let session = self.session.get()?;
        let Some(keyspace) = schema.or(self.keyspace()) else {
            return Err(DbError::invalid_input(
                "A keyspace is required: pass a schema or configure the connection's database",
            ));
        };
        self.describe_table(&session, keyspace, name).await
    }

    async fn get_database_stats(&self) -> DbResult<DatabaseStats> {
        let session = self.session.get()?;
        let tables = self.table_names(&session).await?.len() as u64;

        let (views, indexes) = match self.keyspace() {
            Some(keyspace) => {
                let views = self
                    .select(&session, "SELECT view_name FROM system_schema.views WHERE keyspace_name = ?", &[keyspace])
                    .await?
                    .len() as u64;
                let indexes = self
                    .select(&session, "SELECT index_name FROM system_schema.indexes WHERE keyspace_name = ?", &[keyspace])
                    .await?
                    .len() as u64;
                (views, indexes)
            }
            None => (0, 0),
        };

        let nodes = session.get_cluster_data().get_nodes_info().len() as u64;
        Ok(DatabaseStats::new(tables, views, indexes, "N/A").with_connections(nodes))
    }

    async fn validate_connection(&self) -> bool {
        let Ok(session) = self.session.get() else {
            return false;
        };
        let limit = self.config.pool.acquire_timeout_or_default();
        with_timeout("Cassandra probe", limit, async {
            session
                .query("SELECT release_version FROM system.local", ())
                .await
                .map_err(query_error)
        })
        .await
        .is_ok()
    }

    async fn begin_transaction(&self) -> DbResult<()> {
        self.session.get()?;
        self.tx.begin()
    }

    async fn commit_transaction(&self) -> DbResult<()> {
        self.tx.end()
    }

    async fn rollback_transaction(&self) -> DbResult<()> {
        self.tx.end()?;
        warn!(connection = %self.config.name, "Cassandra rollback is a no-op; earlier statements remain applied");
        Ok(())
    }

    fn is_in_transaction(&self) -> bool {
        self.tx.is_active()
    }
}

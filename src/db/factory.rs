//! Adapter construction and configuration checks.

use crate::db::adapter::DatabaseAdapter;
use crate::db::adapters::{
    CassandraAdapter, DynamoDbAdapter, MongoDbAdapter, MsSqlAdapter, MySqlAdapter,
    PostgresAdapter, RedisAdapter, SqliteAdapter,
};
use crate::error::{DbError, DbResult};
use crate::models::{BackendOptions, ConnectionConfig, DatabaseKind};
use schemars::JsonSchema;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

/// Result of [`DatabaseAdapterFactory::validate_config`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ConfigValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Turn an invalid result into a configuration error.
    pub fn into_result(self) -> DbResult<()> {
        if self.valid {
            Ok(())
        } else {
            Err(DbError::configuration(self.errors))
        }
    }
}

/// Maps a [`ConnectionConfig`] to the adapter for its kind.
pub struct DatabaseAdapterFactory;

impl DatabaseAdapterFactory {
    /// Construct an unconnected adapter. No network calls are made.
    pub fn create_database(config: ConnectionConfig) -> DbResult<Arc<dyn DatabaseAdapter>> {
        let adapter: Arc<dyn DatabaseAdapter> = match config.kind() {
            DatabaseKind::Postgres => Arc::new(PostgresAdapter::new(config)),
            DatabaseKind::MySql => Arc::new(MySqlAdapter::new(config)),
            DatabaseKind::Sqlite => Arc::new(SqliteAdapter::new(config)),
            DatabaseKind::Redis => Arc::new(RedisAdapter::new(config)),
            DatabaseKind::MongoDb => Arc::new(MongoDbAdapter::new(config)),
            DatabaseKind::Cassandra => Arc::new(CassandraAdapter::new(config)),
            DatabaseKind::MsSql => Arc::new(MsSqlAdapter::new(config)),
            DatabaseKind::DynamoDb => Arc::new(DynamoDbAdapter::new(config)),
        };
        Ok(adapter)
    }

    /// Collect every problem with a configuration. Never fails.
    pub fn validate_config(config: &ConnectionConfig) -> ConfigValidation {
        let mut errors = Vec::new();
        let has = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        let has_url = has(&config.url);
        let kind = config.kind();

        match &config.options {
            BackendOptions::Postgres(_)
            | BackendOptions::MySql(_)
            | BackendOptions::MsSql(_)
            | BackendOptions::MongoDb(_) => {
                if !has_url && !has(&config.host) {
                    errors.push(format!("{}: host or url is required", kind.display_name()));
                }
                if !has_url && !has(&config.database) {
                    errors.push(format!("{}: database or url is required", kind.display_name()));
                }
            }
            BackendOptions::Sqlite(opts) => {
                if !has_url && !has(&opts.filename) && !has(&config.database) {
                    errors.push("SQLite: filename, database or url is required".to_string());
                }
            }
            BackendOptions::Redis(opts) => {
                if !has_url && !has(&config.host) {
                    errors.push("Redis: host or url is required".to_string());
                }
                if opts.db.is_some_and(|db| db < 0) {
                    errors.push("Redis: db must not be negative".to_string());
                }
            }
            BackendOptions::Cassandra(opts) => {
                if !has_url && !has(&config.host) && opts.contact_points.is_empty() {
                    errors.push("Cassandra: host, contact_points or url is required".to_string());
                }
            }
            BackendOptions::DynamoDb(opts) => {
                if !has(&opts.region) && !has(&opts.endpoint) {
                    errors.push("DynamoDB: region or endpoint is required".to_string());
                }
                if opts.access_key_id.is_some() != opts.secret_access_key.is_some() {
                    errors.push(
                        "DynamoDB: access_key_id and secret_access_key must be given together"
                            .to_string(),
                    );
                }
            }
        }

        if config.port == Some(0) {
            errors.push("port must be greater than 0".to_string());
        }
        if let Err(e) = config.pool.validate() {
            errors.push(e);
        }
        if let Some(raw) = config.url.as_deref().filter(|u| !u.trim().is_empty()) {
            match Url::parse(raw) {
                Ok(url) => match DatabaseKind::from_scheme(url.scheme()) {
                    Some(scheme_kind) if scheme_kind != kind => errors.push(format!(
                        "url scheme '{}' does not match type '{}'",
                        url.scheme(),
                        kind.as_str()
                    )),
                    _ => {}
                },
                // sqlite urls such as "sqlite::memory:" are not hierarchical
                Err(_) if kind == DatabaseKind::Sqlite && raw.starts_with("sqlite:") => {}
                Err(e) => errors.push(format!("url is invalid: {e}")),
            }
        }

        ConfigValidation::from_errors(errors)
    }

    pub fn supported_types() -> Vec<DatabaseKind> {
        DatabaseKind::ALL.to_vec()
    }

    /// A seed configuration for a kind, pointing at a local default install.
    pub fn default_config(kind: DatabaseKind) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(kind.as_str(), BackendOptions::empty(kind));
        if let Some(port) = kind.default_port() {
            config.host = Some("localhost".to_string());
            config.port = Some(port);
        }
        match &mut config.options {
            BackendOptions::Sqlite(opts) => opts.filename = Some(":memory:".to_string()),
            BackendOptions::DynamoDb(opts) => opts.region = Some("us-east-1".to_string()),
            BackendOptions::Redis(opts) => opts.db = Some(0),
            BackendOptions::MongoDb(opts) => opts.auth_source = Some("admin".to_string()),
            BackendOptions::Cassandra(opts) => {
                opts.local_datacenter = Some("datacenter1".to_string())
            }
            _ => {}
        }
        config
    }
}

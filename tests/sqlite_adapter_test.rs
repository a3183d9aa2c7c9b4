//! SQLite adapter tests against in-memory and file-backed databases.

use db_gateway::db::adapters::SqliteAdapter;
use db_gateway::db::{DatabaseAdapter, DatabaseAdapterFactory, SafeExecution, TransactionSupport};
use db_gateway::error::DbError;
use db_gateway::models::{
    BackendOptions, ConnectionConfig, ConstraintKind, DatabaseKind, QueryInput, QueryParam,
    SqliteOptions, TableType,
};
use serde_json::json;

async fn memory_adapter() -> SqliteAdapter {
    let adapter = SqliteAdapter::new(DatabaseAdapterFactory::default_config(DatabaseKind::Sqlite));
    adapter.connect().await.unwrap();
    adapter
}

async fn run(adapter: &SqliteAdapter, sql: &str) {
    adapter
        .safe_execute_query(&QueryInput::native(sql))
        .await
        .unwrap_or_else(|e| panic!("{sql}: {e}"));
}

async fn count_rows(adapter: &SqliteAdapter, table: &str) -> i64 {
    let result = adapter
        .execute_query(&QueryInput::native(format!("SELECT COUNT(*) AS n FROM {table}")))
        .await
        .unwrap();
    result.rows[0]["n"].as_i64().unwrap()
}

#[tokio::test]
async fn test_not_connected_before_connect() {
    let adapter = SqliteAdapter::new(DatabaseAdapterFactory::default_config(DatabaseKind::Sqlite));
    assert!(!adapter.is_connected());

    let err = adapter
        .execute_query(&QueryInput::native("SELECT 1"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotConnected { .. }));
    assert!(matches!(adapter.get_tables().await, Err(DbError::NotConnected { .. })));
    assert!(!adapter.validate_connection().await);
}

#[tokio::test]
async fn test_select_with_params() {
    let adapter = memory_adapter().await;
    run(&adapter, "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER)").await;
    run(&adapter, "INSERT INTO users (name, age) VALUES ('ada', 36), ('alan', 41)").await;

    let result = adapter
        .safe_execute_query(&QueryInput::with_params(
            "SELECT name, age FROM users WHERE age > ? ORDER BY name",
            vec![QueryParam::Int(40)],
        ))
        .await
        .unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(result.rows[0]["name"], json!("alan"));
    let names: Vec<&str> = result.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["name", "age"]);

    let update = adapter
        .safe_execute_query(&QueryInput::native("UPDATE users SET age = age + 1"))
        .await
        .unwrap();
    assert_eq!(update.row_count, 2);
    assert!(update.rows.is_empty());
}

#[tokio::test]
async fn test_row_count_follows_what_the_statement_did() {
    let adapter = memory_adapter().await;
    run(&adapter, "CREATE TABLE jobs (id INTEGER PRIMARY KEY, note TEXT)").await;

    let inserted = adapter
        .safe_execute_query(&QueryInput::native(
            "INSERT INTO jobs (note) VALUES ('a'), ('b') RETURNING id",
        ))
        .await
        .unwrap();
    assert_eq!(inserted.row_count, 2);
    assert_eq!(inserted.rows.len(), 2);

    // Keywords inside literals say nothing about the statement
    let update = adapter
        .safe_execute_query(&QueryInput::native(
            "UPDATE jobs SET note = 'no output yet, returning soon' WHERE id = 1",
        ))
        .await
        .unwrap();
    assert_eq!(update.row_count, 1);
    assert!(update.rows.is_empty());

    let cte_write = adapter
        .safe_execute_query(&QueryInput::native(
            "WITH stale AS (SELECT id FROM jobs) UPDATE jobs SET note = 'x' WHERE id IN (SELECT id FROM stale)",
        ))
        .await
        .unwrap();
    assert_eq!(cte_write.row_count, 2);

    let empty = adapter
        .safe_execute_query(&QueryInput::native("SELECT id, note FROM jobs WHERE id > 100"))
        .await
        .unwrap();
    assert_eq!(empty.row_count, 0);
    assert!(empty.rows.is_empty());
    let names: Vec<&str> = empty.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["id", "note"]);
}

#[tokio::test]
async fn test_backend_error_is_prefixed() {
    let adapter = memory_adapter().await;
    let err = adapter
        .safe_execute_query(&QueryInput::native("SELECT * FROM missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Backend { .. }));
    assert!(err.to_string().starts_with("SQLite error:"), "{err}");
}

#[tokio::test]
async fn test_structured_command_rejected() {
    let adapter = memory_adapter().await;
    let command = serde_json::from_value(json!({"collection": "users", "operation": "find"})).unwrap();
    let err = adapter
        .safe_execute_query(&QueryInput::Command(command))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_transaction_state_errors() {
    let adapter = memory_adapter().await;
    assert_eq!(adapter.transaction_support(), TransactionSupport::Native);

    assert!(matches!(adapter.commit_transaction().await, Err(DbError::Transaction { .. })));
    assert!(matches!(adapter.rollback_transaction().await, Err(DbError::Transaction { .. })));

    adapter.begin_transaction().await.unwrap();
    assert!(adapter.is_in_transaction());
    assert!(matches!(adapter.begin_transaction().await, Err(DbError::Transaction { .. })));

    adapter.rollback_transaction().await.unwrap();
    assert!(!adapter.is_in_transaction());
}

#[tokio::test]
async fn test_rollback_discards_writes() {
    let adapter = memory_adapter().await;
    run(&adapter, "CREATE TABLE t (v INTEGER)").await;

    adapter.begin_transaction().await.unwrap();
    run(&adapter, "INSERT INTO t VALUES (1)").await;
    assert_eq!(count_rows(&adapter, "t").await, 1);
    adapter.rollback_transaction().await.unwrap();
    assert_eq!(count_rows(&adapter, "t").await, 0);

    adapter.begin_transaction().await.unwrap();
    run(&adapter, "INSERT INTO t VALUES (2)").await;
    adapter.commit_transaction().await.unwrap();
    assert_eq!(count_rows(&adapter, "t").await, 1);
}

#[tokio::test]
async fn test_failing_batch_rolls_back_earlier_operations() {
    let adapter = memory_adapter().await;
    run(&adapter, "CREATE TABLE t (v INTEGER PRIMARY KEY)").await;

    let err = adapter
        .execute_batch(&[
            QueryInput::native("INSERT INTO t VALUES (1)"),
            QueryInput::native("INSERT INTO no_such_table VALUES (2)"),
            QueryInput::native("INSERT INTO t VALUES (3)"),
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Backend { .. }));
    assert!(err.to_string().contains("no_such_table"), "{err}");
    assert!(!adapter.is_in_transaction());
    assert_eq!(count_rows(&adapter, "t").await, 0);

    let outcome = adapter
        .execute_batch(&[
            QueryInput::native("INSERT INTO t VALUES (1)"),
            QueryInput::native("INSERT INTO t VALUES (2)"),
        ])
        .await
        .unwrap();
    assert!(outcome.atomic);
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(count_rows(&adapter, "t").await, 2);
}

#[tokio::test]
async fn test_table_listing_and_description_agree() {
    let adapter = memory_adapter().await;
    run(&adapter, "CREATE TABLE teams (id INTEGER PRIMARY KEY, name TEXT UNIQUE)").await;
    run(
        &adapter,
        "CREATE TABLE players (id INTEGER PRIMARY KEY, team_id INTEGER REFERENCES teams(id), score REAL DEFAULT 0)",
    )
    .await;
    run(&adapter, "CREATE INDEX idx_players_score ON players (score)").await;
    run(&adapter, "CREATE VIEW top_players AS SELECT * FROM players WHERE score > 10").await;

    let tables = adapter.get_tables().await.unwrap();
    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["players", "teams", "top_players"]);

    for listed in &tables {
        let described = adapter.get_table_info(&listed.name, None).await.unwrap().unwrap();
        assert_eq!(described.column_names(), listed.column_names(), "{}", listed.name);
    }

    let players = adapter.get_table_info("players", None).await.unwrap().unwrap();
    assert_eq!(players.table_type, TableType::Table);
    assert!(players.columns.iter().any(|c| c.name == "id" && c.is_primary_key));
    assert!(players.columns.iter().any(|c| c.name == "team_id" && c.is_foreign_key));
    assert!(players.indexes.iter().any(|i| i.name == "idx_players_score"));
    assert!(
        players
            .constraints
            .iter()
            .any(|c| c.kind == ConstraintKind::ForeignKey && c.referenced_table.as_deref() == Some("teams"))
    );

    let view = adapter.get_table_info("top_players", None).await.unwrap().unwrap();
    assert_eq!(view.table_type, TableType::View);

    assert!(adapter.get_table_info("nope", None).await.unwrap().is_none());

    let stats = adapter.get_database_stats().await.unwrap();
    assert_eq!(stats.table_count, 2);
    assert_eq!(stats.view_count, 1);
    assert!(stats.index_count >= 1);
}

#[tokio::test]
async fn test_file_backed_database_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gateway.db");
    let config = ConnectionConfig::new(
        "file",
        BackendOptions::Sqlite(SqliteOptions {
            filename: Some(path.to_string_lossy().into_owned()),
            read_only: false,
        }),
    );

    let adapter = SqliteAdapter::new(config);
    adapter.connect().await.unwrap();
    run(&adapter, "CREATE TABLE notes (body TEXT)").await;
    run(&adapter, "INSERT INTO notes VALUES ('kept')").await;
    adapter.disconnect().await.unwrap();
    assert!(!adapter.is_connected());

    // safe_execute_query reconnects on its own
    let result = adapter
        .safe_execute_query(&QueryInput::native("SELECT body FROM notes"))
        .await
        .unwrap();
    assert_eq!(result.rows[0]["body"], json!("kept"));
    adapter.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_discards_open_transaction() {
    let adapter = memory_adapter().await;
    adapter.begin_transaction().await.unwrap();
    adapter.disconnect().await.unwrap();
    assert!(!adapter.is_in_transaction());
    assert!(!adapter.is_connected());
}

//! Every adapter must refuse work before `connect` without touching the network.

use db_gateway::db::{DatabaseAdapter, DatabaseAdapterFactory};
use db_gateway::error::DbError;
use db_gateway::models::{Command, CommandAction, DatabaseKind, QueryInput};
use serde_json::json;

fn sample_input(kind: DatabaseKind) -> QueryInput {
    match kind {
        DatabaseKind::MongoDb | DatabaseKind::DynamoDb => QueryInput::command(Command::new(
            "items",
            CommandAction::CountDocuments { filter: None },
        )),
        DatabaseKind::Redis => QueryInput::native("PING"),
        _ => QueryInput::native("SELECT 1"),
    }
}

#[tokio::test]
async fn test_every_adapter_fails_not_connected_before_connect() {
    for kind in DatabaseKind::ALL {
        let adapter =
            DatabaseAdapterFactory::create_database(DatabaseAdapterFactory::default_config(kind))
                .unwrap();
        assert!(!adapter.is_connected(), "{kind}");

        let err = adapter.execute_query(&sample_input(kind)).await.unwrap_err();
        assert!(
            matches!(err, DbError::NotConnected { .. }),
            "{kind}: expected NotConnected, got {err:?}"
        );
        assert!(
            matches!(adapter.get_tables().await, Err(DbError::NotConnected { .. })),
            "{kind}: get_tables"
        );
        assert!(
            matches!(adapter.get_database_stats().await, Err(DbError::NotConnected { .. })),
            "{kind}: get_database_stats"
        );
        assert!(
            matches!(adapter.begin_transaction().await, Err(DbError::NotConnected { .. })),
            "{kind}: begin_transaction"
        );
        assert!(!adapter.is_in_transaction(), "{kind}");
        assert!(!adapter.validate_connection().await, "{kind}: validate_connection");

        // Disconnecting an unconnected adapter is a no-op
        adapter.disconnect().await.unwrap();
    }
}

#[tokio::test]
async fn test_connection_checked_before_input_shape() {
    // Commands sent to text backends, and text sent to command backends, still report
    // the missing connection first.
    for kind in DatabaseKind::ALL {
        let adapter =
            DatabaseAdapterFactory::create_database(DatabaseAdapterFactory::default_config(kind))
                .unwrap();
        let inputs = [
            QueryInput::command(Command::new("items", CommandAction::GetItem { key: json!({ "id": 1 }) })),
            QueryInput::native("not a query at all"),
        ];
        for input in &inputs {
            let err = adapter.execute_query(input).await.unwrap_err();
            assert!(
                matches!(err, DbError::NotConnected { .. }),
                "{kind}: expected NotConnected for {input:?}, got {err:?}"
            );
        }
    }
}

#[tokio::test]
async fn test_not_connected_error_names_the_backend() {
    let adapter = DatabaseAdapterFactory::create_database(DatabaseAdapterFactory::default_config(
        DatabaseKind::Redis,
    ))
    .unwrap();
    let err = adapter.get_tables().await.unwrap_err();
    assert_eq!(err.to_string(), "Redis error: not connected");
    assert!(err.is_retryable());
}

//! Tests for batch execution and the rollback-on-failure contract.

mod common;

use common::ScriptedAdapter;
use db_gateway::db::{DatabaseAdapter, SafeExecution};
use db_gateway::error::DbError;
use db_gateway::models::QueryInput;
use std::sync::atomic::Ordering;

fn ops(queries: &[&str]) -> Vec<QueryInput> {
    queries.iter().map(|q| QueryInput::native(*q)).collect()
}

#[tokio::test]
async fn test_batch_commits_when_every_operation_succeeds() {
    let adapter = ScriptedAdapter::new("batch");
    let outcome = adapter
        .execute_batch(&ops(&["INSERT a", "INSERT b", "INSERT c"]))
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 3);
    assert!(outcome.atomic);
    assert_eq!(adapter.commits.load(Ordering::SeqCst), 1);
    assert_eq!(adapter.rollbacks.load(Ordering::SeqCst), 0);
    assert!(!adapter.is_in_transaction());
}

#[tokio::test]
async fn test_failing_batch_rolls_back_and_surfaces_original_error() {
    let adapter = ScriptedAdapter::new("batch").failing_on("INSERT b");
    let err = adapter
        .execute_batch(&ops(&["INSERT a", "INSERT b", "INSERT c"]))
        .await
        .unwrap_err();

    match err {
        DbError::Backend { message, code, .. } => {
            assert_eq!(message, "cannot run INSERT b");
            assert_eq!(code.as_deref(), Some("42000"));
        }
        other => panic!("expected the op2 backend error, got {other:?}"),
    }
    assert_eq!(adapter.rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(adapter.commits.load(Ordering::SeqCst), 0);
    // op3 never ran
    assert_eq!(adapter.executed(), ["INSERT a"]);
    assert!(!adapter.is_in_transaction());
}

#[tokio::test]
async fn test_emulated_backend_reports_non_atomic_batch() {
    let adapter = ScriptedAdapter::new("kv").emulated();
    let outcome = adapter.execute_batch(&ops(&["SET a 1"])).await.unwrap();
    assert!(!outcome.atomic);
}

#[tokio::test]
async fn test_failing_emulated_batch_leaves_earlier_writes_applied() {
    let adapter = ScriptedAdapter::new("kv").emulated().failing_on("SET b 2");
    let err = adapter
        .execute_batch(&ops(&["SET a 1", "SET b 2", "SET c 3"]))
        .await
        .unwrap_err();

    match err {
        DbError::Backend { message, code, .. } => {
            assert_eq!(message, "cannot run SET b 2");
            assert_eq!(code.as_deref(), Some("42000"));
        }
        other => panic!("expected the op2 backend error, got {other:?}"),
    }
    // Rollback is still attempted, but the emulated backend cannot undo op1
    assert_eq!(adapter.rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(adapter.commits.load(Ordering::SeqCst), 0);
    assert_eq!(adapter.executed(), ["SET a 1"]);
    assert!(!adapter.is_in_transaction());
}

#[tokio::test]
async fn test_batch_validates_every_operation_before_running_any() {
    let adapter = ScriptedAdapter::new("batch");
    let err = adapter
        .execute_batch(&ops(&["INSERT a", "SELECT 1; DROP TABLE users"]))
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::InvalidInput { .. }));
    assert!(adapter.executed().is_empty());
    assert_eq!(adapter.connect_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_batch_refused_inside_open_transaction() {
    let adapter = ScriptedAdapter::new("batch");
    adapter.ensure_connection().await.unwrap();
    adapter.begin_transaction().await.unwrap();

    let err = adapter.execute_batch(&ops(&["INSERT a"])).await.unwrap_err();
    assert!(matches!(err, DbError::Transaction { .. }));
    assert!(adapter.executed().is_empty());
    // The caller's transaction is untouched
    assert!(adapter.is_in_transaction());
}

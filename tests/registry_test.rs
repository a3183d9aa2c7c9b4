//! Integration tests for the connection registry.

mod common;

use common::ScriptedAdapter;
use db_gateway::db::{ConnectionRegistry, DatabaseAdapter, DatabaseAdapterFactory, SafeExecution};
use db_gateway::error::DbError;
use db_gateway::models::{DatabaseKind, QueryInput};
use std::sync::Arc;
use std::sync::atomic::Ordering;

async fn registry_with(adapters: Vec<(&str, ScriptedAdapter)>) -> ConnectionRegistry {
    let registry = ConnectionRegistry::new();
    for (name, adapter) in adapters {
        registry.register(name, Arc::new(adapter)).await.unwrap();
    }
    registry
}

#[tokio::test]
async fn test_current_follows_first_registration() {
    let registry = registry_with(vec![
        ("alpha", ScriptedAdapter::new("alpha")),
        ("beta", ScriptedAdapter::new("beta")),
    ])
    .await;

    assert_eq!(registry.current_connection_name().await.as_deref(), Some("alpha"));
    let current = registry.get_connection(None).await.unwrap();
    assert_eq!(current.config().name, "alpha");

    registry.set_current_connection("beta").await.unwrap();
    assert_eq!(registry.current_connection_name().await.as_deref(), Some("beta"));
}

#[tokio::test]
async fn test_removal_moves_current_to_remaining_entry() {
    let registry = registry_with(vec![
        ("alpha", ScriptedAdapter::new("alpha")),
        ("beta", ScriptedAdapter::new("beta")),
        ("gamma", ScriptedAdapter::new("gamma")),
    ])
    .await;

    assert!(registry.remove_connection("alpha").await.unwrap());
    assert_eq!(registry.current_connection_name().await.as_deref(), Some("beta"));

    // Removing a non-current entry leaves current alone
    assert!(registry.remove_connection("gamma").await.unwrap());
    assert_eq!(registry.current_connection_name().await.as_deref(), Some("beta"));

    assert!(registry.remove_connection("beta").await.unwrap());
    assert_eq!(registry.current_connection_name().await, None);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_duplicate_name_rejected_without_touching_existing() {
    let registry = registry_with(vec![("alpha", ScriptedAdapter::new("alpha"))]).await;
    let original = registry.get_connection(Some("alpha")).await.unwrap();

    let err = registry
        .register("alpha", Arc::new(ScriptedAdapter::new("alpha")))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::DuplicateConnection { .. }));

    let still = registry.get_connection(Some("alpha")).await.unwrap();
    assert!(Arc::ptr_eq(&original, &still));
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_failed_connect_is_not_registered() {
    let registry = ConnectionRegistry::new();
    let err = registry
        .register("down", Arc::new(ScriptedAdapter::new("down").failing_connect()))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Registration { .. }));
    assert!(err.to_string().contains("down"));
    assert!(!registry.has_connection("down").await);
    assert_eq!(registry.current_connection_name().await, None);
}

#[tokio::test]
async fn test_switch_to_unknown_connection_fails() {
    let registry = registry_with(vec![("alpha", ScriptedAdapter::new("alpha"))]).await;
    let err = registry.set_current_connection("nope").await.unwrap_err();
    assert!(matches!(err, DbError::ConnectionNotFound { .. }));
    assert_eq!(registry.current_connection_name().await.as_deref(), Some("alpha"));
}

#[tokio::test]
async fn test_validate_all_maps_each_connection() {
    let registry = registry_with(vec![
        ("live", ScriptedAdapter::new("live")),
        ("broken", ScriptedAdapter::new("broken").unhealthy()),
    ])
    .await;

    let results = registry.validate_all_connections().await;
    assert_eq!(results.len(), 2);
    assert_eq!(results.get("live"), Some(&true));
    assert_eq!(results.get("broken"), Some(&false));
}

#[tokio::test]
async fn test_disconnect_all_clears_even_when_a_disconnect_fails() {
    let registry = registry_with(vec![
        ("ok", ScriptedAdapter::new("ok")),
        ("flaky", ScriptedAdapter::new("flaky").failing_disconnect()),
    ])
    .await;

    let failures = registry.disconnect_all().await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].name, "flaky");
    assert!(failures[0].error.contains("socket already closed"));

    assert!(registry.is_empty().await);
    assert_eq!(registry.current_connection_name().await, None);
    assert!(registry.list_connections().await.is_empty());
}

#[tokio::test]
async fn test_list_connections_marks_current() {
    let registry = registry_with(vec![
        ("alpha", ScriptedAdapter::new("alpha")),
        ("beta", ScriptedAdapter::new("beta")),
    ])
    .await;

    let summaries = registry.list_connections().await;
    let names: Vec<&str> = summaries.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["alpha", "beta"]);
    assert!(summaries[0].current);
    assert!(!summaries[1].current);
    assert!(summaries.iter().all(|s| s.connected));
}

#[tokio::test]
async fn test_ensure_connection_reconnects_once() {
    let adapter = Arc::new(ScriptedAdapter::new("lazy"));
    adapter.ensure_connection().await.unwrap();
    adapter.ensure_connection().await.unwrap();
    assert_eq!(adapter.connect_calls.load(Ordering::SeqCst), 1);

    adapter.disconnect().await.unwrap();
    adapter
        .safe_execute_query(&QueryInput::native("SELECT 1"))
        .await
        .unwrap();
    assert_eq!(adapter.connect_calls.load(Ordering::SeqCst), 2);

    let down = ScriptedAdapter::new("down").failing_connect();
    assert!(down.ensure_connection().await.is_err());
    assert_eq!(down.connect_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_add_connection_builds_adapter_from_config() {
    let registry = ConnectionRegistry::new();
    registry
        .add_connection("mem", DatabaseAdapterFactory::default_config(DatabaseKind::Sqlite))
        .await
        .unwrap();

    let adapter = registry.resolve(Some("mem")).await.unwrap();
    assert_eq!(adapter.kind(), DatabaseKind::Sqlite);
    assert_eq!(adapter.config().name, "mem");
    assert!(adapter.is_connected());

    registry.disconnect_all().await;
    assert!(!adapter.is_connected());
}

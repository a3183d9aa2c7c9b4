//! Named connection registry.
//!
//! Holds every live adapter by name plus a "current" pointer used when a tool call omits
//! the connection name. Cheap to clone; all clones share one map.

use crate::db::adapter::DatabaseAdapter;
use crate::db::factory::DatabaseAdapterFactory;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, ConnectionSummary};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// A disconnect that failed during [`ConnectionRegistry::disconnect_all`].
#[derive(Debug, Clone, Serialize, schemars::JsonSchema)]
pub struct TeardownFailure {
    pub name: String,
    pub error: String,
}

#[derive(Default)]
struct RegistryState {
    /// Insertion order decides which entry becomes current after a removal.
    entries: Vec<(String, Arc<dyn DatabaseAdapter>)>,
    current: Option<String>,
}

impl RegistryState {
    fn find(&self, name: &str) -> Option<&Arc<dyn DatabaseAdapter>> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, adapter)| adapter)
    }

    fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an adapter for `config`, connect it and register it under `name`.
    pub async fn add_connection(&self, name: &str, mut config: ConnectionConfig) -> DbResult<()> {
        if self.has_connection(name).await {
            return Err(DbError::duplicate_connection(name));
        }
        config.name = name.to_string();
        let adapter = DatabaseAdapterFactory::create_database(config)?;
        self.register(name, adapter).await
    }

    /// Connect an already constructed adapter and register it under `name`.
    pub async fn register(&self, name: &str, adapter: Arc<dyn DatabaseAdapter>) -> DbResult<()> {
        if self.has_connection(name).await {
            return Err(DbError::duplicate_connection(name));
        }

        info!(connection = %name, backend = %adapter.kind(), "Connecting");
        if !adapter.is_connected() {
            adapter
                .connect()
                .await
                .map_err(|e| DbError::registration(name, e))?;
        }

        // Re-check after the connect await; another caller may have taken the name.
        let lost_race = {
            let mut state = self.state.write().await;
            if state.contains(name) {
                true
            } else {
                state.entries.push((name.to_string(), Arc::clone(&adapter)));
                if state.current.is_none() {
                    state.current = Some(name.to_string());
                }
                false
            }
        };

        if lost_race {
            if let Err(e) = adapter.disconnect().await {
                warn!(connection = %name, error = %e, "Failed to close duplicate connection");
            }
            return Err(DbError::duplicate_connection(name));
        }

        info!(connection = %name, "Connection registered");
        Ok(())
    }

    /// Disconnect and drop a connection. Returns false if the name is unknown.
    pub async fn remove_connection(&self, name: &str) -> DbResult<bool> {
        let removed = {
            let mut state = self.state.write().await;
            let Some(idx) = state.entries.iter().position(|(entry, _)| entry == name) else {
                return Ok(false);
            };
            let (_, adapter) = state.entries.remove(idx);
            if state.current.as_deref() == Some(name) {
                state.current = state.entries.first().map(|(entry, _)| entry.clone());
            }
            adapter
        };

        if let Err(e) = removed.disconnect().await {
            warn!(connection = %name, error = %e, "Disconnect failed during removal");
        }
        info!(connection = %name, "Connection removed");
        Ok(true)
    }

    /// The named connection, or the current one when `name` is `None`.
    pub async fn get_connection(&self, name: Option<&str>) -> Option<Arc<dyn DatabaseAdapter>> {
        let state = self.state.read().await;
        let name = match name {
            Some(name) => name,
            None => state.current.as_deref()?,
        };
        state.find(name).cloned()
    }

    /// Like [`get_connection`](Self::get_connection), but a miss is an error.
    pub async fn resolve(&self, name: Option<&str>) -> DbResult<Arc<dyn DatabaseAdapter>> {
        self.resolve_named(name).await.map(|(_, adapter)| adapter)
    }

    /// Resolve a connection and report the registry name it was found under.
    pub async fn resolve_named(
        &self,
        name: Option<&str>,
    ) -> DbResult<(String, Arc<dyn DatabaseAdapter>)> {
        let state = self.state.read().await;
        let name = match name {
            Some(name) => name,
            None => state.current.as_deref().ok_or(DbError::NoCurrentConnection)?,
        };
        state
            .find(name)
            .cloned()
            .map(|adapter| (name.to_string(), adapter))
            .ok_or_else(|| DbError::connection_not_found(name))
    }

    pub async fn set_current_connection(&self, name: &str) -> DbResult<()> {
        let mut state = self.state.write().await;
        if !state.contains(name) {
            return Err(DbError::connection_not_found(name));
        }
        state.current = Some(name.to_string());
        Ok(())
    }

    pub async fn current_connection_name(&self) -> Option<String> {
        self.state.read().await.current.clone()
    }

    pub async fn has_connection(&self, name: &str) -> bool {
        self.state.read().await.contains(name)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn list_connections(&self) -> Vec<ConnectionSummary> {
        let state = self.state.read().await;
        state
            .entries
            .iter()
            .map(|(name, adapter)| ConnectionSummary {
                name: name.clone(),
                kind: adapter.kind(),
                connected: adapter.is_connected(),
                current: state.current.as_deref() == Some(name.as_str()),
            })
            .collect()
    }

    /// Probe every connection concurrently.
    pub async fn validate_all_connections(&self) -> BTreeMap<String, bool> {
        let entries: Vec<(String, Arc<dyn DatabaseAdapter>)> = self.state.read().await.entries.clone();
        let probes = entries.into_iter().map(|(name, adapter)| async move {
            let ok = adapter.validate_connection().await;
            (name, ok)
        });
        join_all(probes).await.into_iter().collect()
    }

    /// Disconnect everything and clear the registry, collecting failures.
    pub async fn disconnect_all(&self) -> Vec<TeardownFailure> {
        let entries = {
            let mut state = self.state.write().await;
            state.current = None;
            std::mem::take(&mut state.entries)
        };

        let mut failures = Vec::new();
        for (name, adapter) in entries {
            info!(connection = %name, "Closing connection");
            if let Err(e) = adapter.disconnect().await {
                warn!(connection = %name, error = %e, "Disconnect failed");
                failures.push(TeardownFailure {
                    name,
                    error: e.to_string(),
                });
            }
        }
        info!(failed = failures.len(), "All connections closed");
        failures
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseKind;

    fn memory_sqlite() -> ConnectionConfig {
        DatabaseAdapterFactory::default_config(DatabaseKind::Sqlite)
    }

    #[tokio::test]
    async fn test_first_registration_becomes_current() {
        let registry = ConnectionRegistry::new();
        registry.add_connection("a", memory_sqlite()).await.unwrap();
        registry.add_connection("b", memory_sqlite()).await.unwrap();
        assert_eq!(registry.current_connection_name().await.as_deref(), Some("a"));
        assert_eq!(registry.len().await, 2);

        let err = registry.add_connection("a", memory_sqlite()).await.unwrap_err();
        assert!(matches!(err, DbError::DuplicateConnection { .. }));
        registry.disconnect_all().await;
    }

    #[tokio::test]
    async fn test_resolve_without_connections() {
        let registry = ConnectionRegistry::new();
        assert!(matches!(registry.resolve(None).await, Err(DbError::NoCurrentConnection)));
        assert!(matches!(
            registry.resolve(Some("x")).await,
            Err(DbError::ConnectionNotFound { .. })
        ));
        assert!(registry.get_connection(None).await.is_none());
        assert!(!registry.remove_connection("x").await.unwrap());
    }
}

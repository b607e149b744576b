//! Storage backend implementations and abstractions.
//!
//! Provides LSH bucket storage with in-memory, remote-kv and column-store
//! backends behind one trait, selected by [`StorageFactory`].

pub mod codec;
pub mod column_store;
pub mod instrumented;
pub mod memory;
pub mod pattern;
#[cfg(feature = "redis-backend")]
pub mod redis_client;
pub mod remote_kv;
pub mod traits;

pub use column_store::{
    ColumnStoreConnector, ColumnStoreParams, ColumnStoreStorage, CqlSession, CqlValue, Row,
    Statement,
};
pub use memory::MemoryStorage;
pub use remote_kv::{KvClient, RemoteKvConnector, RemoteKvParams, RemoteKvStorage};
pub use traits::*;

use crate::config::StorageConfig;
use crate::metrics::Metrics;
use instrumented::Instrumented;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

/// Reserved parameter field that receives the namespace id.
pub const NAMESPACE_FIELD: &str = "db";

/// Creates storage handles from configuration.
///
/// Network backends need a registered connector; a backend without one is
/// reported as `BackendUnsupported` when a handle is requested.
#[derive(Clone)]
pub struct StorageFactory {
    remote_kv: Option<Arc<dyn RemoteKvConnector>>,
    column_store: Option<Arc<dyn ColumnStoreConnector>>,
}

impl Default for StorageFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageFactory {
    /// Factory with the connectors compiled into this build.
    pub fn new() -> Self {
        let factory = Self::empty();
        #[cfg(feature = "redis-backend")]
        let factory = factory.with_remote_kv_connector(redis_client::RedisConnector);
        factory
    }

    /// Factory with no network connectors; only in-memory storage works.
    pub fn empty() -> Self {
        Self {
            remote_kv: None,
            column_store: None,
        }
    }

    pub fn with_remote_kv_connector(mut self, connector: impl RemoteKvConnector + 'static) -> Self {
        self.remote_kv = Some(Arc::new(connector));
        self
    }

    pub fn with_column_store_connector(
        mut self,
        connector: impl ColumnStoreConnector + 'static,
    ) -> Self {
        self.column_store = Some(Arc::new(connector));
        self
    }

    /// Whether a client for `kind` is available.
    pub fn supports(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::InMemory => true,
            BackendKind::RemoteKv => self.remote_kv.is_some(),
            BackendKind::ColumnStore => self.column_store.is_some(),
        }
    }

    /// Open the single backend named in `config` for the index `namespace_id`.
    ///
    /// The namespace id is written into the `db` field of network backend
    /// parameters, so independently hashed tables sharing one cluster get
    /// separate databases. `config` itself is left untouched.
    pub fn create(
        &self,
        config: &StorageConfig,
        namespace_id: u32,
    ) -> Result<Box<dyn StorageBackend>, StorageError> {
        let (kind, params) = select_backend(config)?;

        let storage: Box<dyn StorageBackend> = match kind {
            BackendKind::InMemory => Box::new(MemoryStorage::new()),
            BackendKind::RemoteKv => {
                let params: RemoteKvParams = backend_params(kind, params, namespace_id)?;
                let connector = self.remote_kv.as_deref().ok_or_else(|| unsupported(kind))?;
                Box::new(RemoteKvStorage::open(connector, params)?)
            }
            BackendKind::ColumnStore => {
                let params: ColumnStoreParams = backend_params(kind, params, namespace_id)?;
                // A missing or malformed keyspace is reported even without a client.
                column_store::checked_keyspace(&params)?;
                let connector = self
                    .column_store
                    .as_deref()
                    .ok_or_else(|| unsupported(kind))?;
                Box::new(ColumnStoreStorage::open(connector, params)?)
            }
        };

        info!(backend = %kind, namespace = namespace_id, "storage handle created");
        Metrics::get().record_handle_opened(kind.as_str());
        Ok(Box::new(Instrumented::new(storage)))
    }
}

/// Open storage with the default factory.
pub fn storage(
    config: &StorageConfig,
    namespace_id: u32,
) -> Result<Box<dyn StorageBackend>, StorageError> {
    StorageFactory::new().create(config, namespace_id)
}

fn select_backend(config: &StorageConfig) -> Result<(BackendKind, &Value), StorageError> {
    let mut entries = config.entries();
    let (name, params) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        (None, _) => {
            return Err(StorageError::Configuration(
                "no storage backend configured".to_string(),
            ))
        }
        (Some(_), Some(_)) => {
            return Err(StorageError::Configuration(format!(
                "exactly one storage backend must be configured, found: {}",
                config.backend_names().join(", ")
            )))
        }
    };

    let kind = BackendKind::from_name(name).ok_or_else(|| {
        StorageError::Configuration(format!(
            "unrecognized storage backend {:?}; expected one of in-memory, remote-kv, column-store",
            name
        ))
    })?;
    Ok((kind, params))
}

fn backend_params<T: DeserializeOwned>(
    kind: BackendKind,
    params: &Value,
    namespace_id: u32,
) -> Result<T, StorageError> {
    let mut map = match params {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(StorageError::Configuration(format!(
                "parameters for {} must be a map, got {}",
                kind, other
            )))
        }
    };
    map.insert(NAMESPACE_FIELD.to_string(), Value::from(namespace_id));

    serde_json::from_value(Value::Object(map))
        .map_err(|e| StorageError::Configuration(format!("invalid {} parameters: {}", kind, e)))
}

fn unsupported(kind: BackendKind) -> StorageError {
    StorageError::BackendUnsupported {
        backend: kind,
        reason: "no client for this backend is available in this build".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> StorageConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_select_requires_exactly_one_backend() {
        let factory = StorageFactory::empty();

        assert!(matches!(
            factory.create(&config(json!({})), 0),
            Err(StorageError::Configuration(_))
        ));
        assert!(matches!(
            factory.create(&config(json!({"in-memory": {}, "remote-kv": {}})), 0),
            Err(StorageError::Configuration(_))
        ));
        assert!(matches!(
            factory.create(&config(json!({"sqlite": {}})), 0),
            Err(StorageError::Configuration(_))
        ));
    }

    #[test]
    fn test_in_memory_ignores_params() {
        let storage = StorageFactory::empty()
            .create(&config(json!({"dict": {"anything": 1}})), 7)
            .unwrap();
        assert_eq!(storage.name(), BackendKind::InMemory);
    }

    #[test]
    fn test_missing_connector_is_unsupported() {
        let factory = StorageFactory::empty();
        assert!(!factory.supports(BackendKind::ColumnStore));

        assert!(matches!(
            factory.create(&config(json!({"column-store": {"keyspace": "ks"}})), 0),
            Err(StorageError::BackendUnsupported { backend: BackendKind::ColumnStore, .. })
        ));
        assert!(matches!(
            factory.create(&config(json!({"remote-kv": {}})), 0),
            Err(StorageError::BackendUnsupported { backend: BackendKind::RemoteKv, .. })
        ));
    }

    #[test]
    fn test_keyspace_is_checked_before_capability() {
        let factory = StorageFactory::empty();

        assert!(matches!(
            factory.create(&config(json!({"column-store": {"host": "cql"}})), 0),
            Err(StorageError::BackendUnavailable { backend: BackendKind::ColumnStore, .. })
        ));
        assert!(matches!(
            factory.create(&config(json!({"column-store": {"keyspace": "1bad"}})), 0),
            Err(StorageError::BackendUnavailable { backend: BackendKind::ColumnStore, .. })
        ));
    }

    #[test]
    fn test_namespace_overrides_db_field() {
        let params: RemoteKvParams =
            backend_params(BackendKind::RemoteKv, &json!({"host": "h", "db": 9}), 3).unwrap();
        assert_eq!(params.db, 3);
        assert_eq!(params.host, "h");
        assert_eq!(params.port, 6379);
    }

    #[test]
    fn test_malformed_params() {
        assert!(matches!(
            backend_params::<RemoteKvParams>(BackendKind::RemoteKv, &json!("localhost"), 0),
            Err(StorageError::Configuration(_))
        ));
        assert!(matches!(
            backend_params::<RemoteKvParams>(BackendKind::RemoteKv, &json!({"port": "x"}), 0),
            Err(StorageError::Configuration(_))
        ));
    }
}

use super::codec::{decode_json, encode_json};
use super::{BackendKind, BoxError, HashKey, StorageBackend, StorageError, StoredValue};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Primitive operations of a Redis-protocol client.
///
/// One client is one connection; the adapter never shares it between
/// threads without holding its lock.
pub trait KvClient: Send {
    /// Native key scan (`KEYS pattern`).
    fn keys(&mut self, pattern: &str) -> Result<Vec<Bytes>, BoxError>;

    fn set(&mut self, key: &[u8], val: &[u8]) -> Result<(), BoxError>;

    fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>, BoxError>;

    /// Native right push. The server appends atomically.
    fn rpush(&mut self, key: &[u8], val: &[u8]) -> Result<(), BoxError>;

    /// Native range read; `stop == -1` reads to the end.
    fn lrange(&mut self, key: &[u8], start: isize, stop: isize) -> Result<Vec<Bytes>, BoxError>;
}

/// Opens [`KvClient`] connections from connection parameters.
pub trait RemoteKvConnector: Send + Sync {
    fn connect(&self, params: &RemoteKvParams) -> Result<Box<dyn KvClient>, BoxError>;
}

/// Connection parameters for the remote-kv backend.
///
/// `db` is the reserved field the factory overwrites with the namespace id.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteKvParams {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub db: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    6379
}

impl Default for RemoteKvParams {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db: 0,
            username: None,
            password: None,
            timeout_ms: None,
        }
    }
}

impl fmt::Debug for RemoteKvParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteKvParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Storage backed by a remote key/value store.
///
/// Values are JSON-encoded before they leave the process and decoded on
/// read, for both scalars and list entries.
pub struct RemoteKvStorage {
    client: Mutex<Option<Box<dyn KvClient>>>,
    params: RemoteKvParams,
}

impl RemoteKvStorage {
    /// Connect through `connector`. Connect failures are `BackendUnavailable`.
    pub fn open(
        connector: &dyn RemoteKvConnector,
        params: RemoteKvParams,
    ) -> Result<Self, StorageError> {
        let client = connector.connect(&params).map_err(|e| {
            warn!(host = %params.host, port = params.port, db = params.db, "remote-kv connect failed: {}", e);
            StorageError::BackendUnavailable {
                backend: BackendKind::RemoteKv,
                reason: e.to_string(),
            }
        })?;

        info!(host = %params.host, port = params.port, db = params.db, "remote-kv storage opened");
        Ok(Self::with_client(client, params))
    }

    /// Wrap an already connected client.
    pub fn with_client(client: Box<dyn KvClient>, params: RemoteKvParams) -> Self {
        Self {
            client: Mutex::new(Some(client)),
            params,
        }
    }

    /// Effective connection parameters, including the injected `db`.
    pub fn params(&self) -> &RemoteKvParams {
        &self.params
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn KvClient>>> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_client_mut<T>(
        &self,
        f: impl FnOnce(&mut dyn KvClient) -> Result<T, BoxError>,
    ) -> Result<T, StorageError> {
        let mut guard = self.lock();
        let client = guard.as_mut().ok_or(StorageError::Closed {
            backend: BackendKind::RemoteKv,
        })?;
        f(client.as_mut()).map_err(StorageError::Backend)
    }
}

impl StorageBackend for RemoteKvStorage {
    fn name(&self) -> BackendKind {
        BackendKind::RemoteKv
    }

    fn keys_matching(&self, pattern: &str) -> Result<Vec<HashKey>, StorageError> {
        let keys = self.with_client_mut(|client| client.keys(pattern))?;
        Ok(keys.into_iter().map(HashKey::from).collect())
    }

    fn set_val(&self, key: &HashKey, val: StoredValue) -> Result<(), StorageError> {
        let payload = encode_json(&val)?;
        self.with_client_mut(|client| client.set(key.as_bytes(), &payload))
    }

    fn get_val(&self, key: &HashKey) -> Result<Option<StoredValue>, StorageError> {
        match self.with_client_mut(|client| client.get(key.as_bytes()))? {
            Some(payload) => Ok(Some(decode_json(&payload)?)),
            None => Ok(None),
        }
    }

    fn append_val(&self, key: &HashKey, val: StoredValue) -> Result<(), StorageError> {
        let payload = encode_json(&val)?;
        debug!(key = %key, bytes = payload.len(), "rpush");
        self.with_client_mut(|client| client.rpush(key.as_bytes(), &payload))
    }

    fn get_list(&self, key: &HashKey) -> Result<Vec<StoredValue>, StorageError> {
        let entries = self.with_client_mut(|client| client.lrange(key.as_bytes(), 0, -1))?;
        entries.iter().map(|entry| decode_json(entry)).collect()
    }

    fn close(&self) -> Result<(), StorageError> {
        if self.lock().take().is_some() {
            info!(host = %self.params.host, db = self.params.db, "remote-kv storage closed");
        }
        Ok(())
    }
}

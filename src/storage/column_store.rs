//! Column-store (CQL) backend.
//!
//! Rows live in a pre-existing table in the configured keyspace:
//!
//! ```sql
//! CREATE TABLE lsh (key blob, id timeuuid, val blob, PRIMARY KEY (key, id));
//! ```
//!
//! The schema is never created or migrated here. Every write is one more
//! row under the partition key, stamped with a server-side `now()`, so
//! identical values appended twice are both kept. A bucket list is every
//! row of the partition in write order. A scalar read returns the newest
//! row, which makes the latest `set_val` win.

use super::codec::{decode_frame, encode_numeric, encode_record};
use super::{BackendKind, BoxError, HashKey, StorageBackend, StorageError, StoredValue};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

const SELECT_KEYS: &str = "SELECT DISTINCT key FROM lsh";
const INSERT_ROW: &str = "INSERT INTO lsh (key, id, val) VALUES (:key, now(), :val)";
const SELECT_ONE: &str = "SELECT val FROM lsh WHERE key = :key ORDER BY id DESC LIMIT 1";
const SELECT_ALL: &str = "SELECT val FROM lsh WHERE key = :key";

const MAX_KEYSPACE_LEN: usize = 48;

/// A bound value in a statement or a cell in a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum CqlValue {
    Blob(Bytes),
    Text(String),
    Null,
}

/// A statement with named bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub query: &'static str,
    pub params: Vec<(&'static str, CqlValue)>,
}

impl Statement {
    pub fn new(query: &'static str) -> Self {
        Self {
            query,
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, name: &'static str, value: CqlValue) -> Self {
        self.params.push((name, value));
        self
    }
}

/// One result row; cells in projection order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row(pub Vec<CqlValue>);

impl Row {
    fn blob(&self, column: usize) -> Result<&Bytes, StorageError> {
        match self.0.get(column) {
            Some(CqlValue::Blob(bytes)) => Ok(bytes),
            other => Err(StorageError::Serialization(format!(
                "expected blob in column {}, got {:?}",
                column, other
            ))),
        }
    }
}

/// An open session to a column-store cluster.
pub trait CqlSession: Send {
    /// Make `keyspace` the target of later statements (`USE keyspace`).
    fn use_keyspace(&mut self, keyspace: &str) -> Result<(), BoxError>;

    /// Execute a statement and drain its result cursor.
    fn execute(&mut self, statement: &Statement) -> Result<Vec<Row>, BoxError>;
}

/// Opens [`CqlSession`]s from connection parameters.
pub trait ColumnStoreConnector: Send + Sync {
    fn connect(&self, params: &ColumnStoreParams) -> Result<Box<dyn CqlSession>, BoxError>;
}

/// Connection parameters for the column-store backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnStoreParams {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyspace: Option<String>,
    #[serde(default)]
    pub db: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_cql_version")]
    pub cql_version: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9042
}

fn default_cql_version() -> String {
    "3.0.0".to_string()
}

impl Default for ColumnStoreParams {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            keyspace: None,
            db: 0,
            username: None,
            password: None,
            cql_version: default_cql_version(),
        }
    }
}

impl fmt::Debug for ColumnStoreParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnStoreParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("keyspace", &self.keyspace)
            .field("db", &self.db)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("cql_version", &self.cql_version)
            .finish()
    }
}

/// Keyspace names are interpolated into `USE`, so only plain identifiers pass.
fn is_valid_keyspace(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && name.len() <= MAX_KEYSPACE_LEN
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The configured keyspace, if present and a valid identifier.
pub(crate) fn checked_keyspace(params: &ColumnStoreParams) -> Result<&str, StorageError> {
    match params.keyspace.as_deref() {
        Some(ks) if is_valid_keyspace(ks) => Ok(ks),
        Some(ks) => Err(unavailable(format!("invalid keyspace name {:?}", ks))),
        None => Err(unavailable("no keyspace configured")),
    }
}

fn unavailable(reason: impl Into<String>) -> StorageError {
    StorageError::BackendUnavailable {
        backend: BackendKind::ColumnStore,
        reason: reason.into(),
    }
}

/// Storage backed by a column-store table.
pub struct ColumnStoreStorage {
    session: Mutex<Option<Box<dyn CqlSession>>>,
    keyspace: String,
}

impl ColumnStoreStorage {
    /// Validate the keyspace, connect, and select the keyspace.
    ///
    /// Every failure here is `BackendUnavailable`. A missing or malformed
    /// keyspace is rejected before any connection is attempted.
    pub fn open(
        connector: &dyn ColumnStoreConnector,
        params: ColumnStoreParams,
    ) -> Result<Self, StorageError> {
        let keyspace = checked_keyspace(&params)?.to_string();

        let mut session = connector.connect(&params).map_err(|e| {
            warn!(host = %params.host, port = params.port, "column-store connect failed: {}", e);
            unavailable(e.to_string())
        })?;
        session.use_keyspace(&keyspace).map_err(|e| {
            warn!(keyspace = %keyspace, "cannot select keyspace: {}", e);
            unavailable(format!("cannot select keyspace {}: {}", keyspace, e))
        })?;

        info!(host = %params.host, port = params.port, keyspace = %keyspace, "column-store storage opened");
        Ok(Self {
            session: Mutex::new(Some(session)),
            keyspace,
        })
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn CqlSession>>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn execute(&self, statement: Statement) -> Result<Vec<Row>, StorageError> {
        let mut guard = self.lock();
        let session = guard.as_mut().ok_or(StorageError::Closed {
            backend: BackendKind::ColumnStore,
        })?;
        debug!(query = statement.query, "execute");
        session.execute(&statement).map_err(StorageError::Backend)
    }

    fn insert(&self, key: &HashKey, frame: Bytes) -> Result<(), StorageError> {
        let statement = Statement::new(INSERT_ROW)
            .bind("key", CqlValue::Blob(key.clone().into_bytes()))
            .bind("val", CqlValue::Blob(frame));
        self.execute(statement).map(|_| ())
    }
}

impl StorageBackend for ColumnStoreStorage {
    fn name(&self) -> BackendKind {
        BackendKind::ColumnStore
    }

    fn keys_matching(&self, pattern: &str) -> Result<Vec<HashKey>, StorageError> {
        if pattern != "*" {
            return Err(StorageError::PatternUnsupported {
                backend: BackendKind::ColumnStore,
                pattern: pattern.to_string(),
            });
        }
        self.execute(Statement::new(SELECT_KEYS))?
            .iter()
            .map(|row| row.blob(0).map(|b| HashKey::from(b.clone())))
            .collect()
    }

    fn set_val(&self, key: &HashKey, val: StoredValue) -> Result<(), StorageError> {
        self.insert(key, encode_record(&val)?)
    }

    fn get_val(&self, key: &HashKey) -> Result<Option<StoredValue>, StorageError> {
        let statement =
            Statement::new(SELECT_ONE).bind("key", CqlValue::Blob(key.clone().into_bytes()));
        match self.execute(statement)?.first() {
            Some(row) => Ok(Some(decode_frame(row.blob(0)?)?)),
            None => Ok(None),
        }
    }

    fn append_val(&self, key: &HashKey, val: StoredValue) -> Result<(), StorageError> {
        let frame = encode_numeric(&val)?;
        debug!(key = %key, bytes = frame.len(), "append row");
        self.insert(key, frame)
    }

    fn get_list(&self, key: &HashKey) -> Result<Vec<StoredValue>, StorageError> {
        let statement =
            Statement::new(SELECT_ALL).bind("key", CqlValue::Blob(key.clone().into_bytes()));
        self.execute(statement)?
            .iter()
            .map(|row| decode_frame(row.blob(0)?))
            .collect()
    }

    fn close(&self) -> Result<(), StorageError> {
        if self.lock().take().is_some() {
            info!(keyspace = %self.keyspace, "column-store storage closed");
        }
        Ok(())
    }
}

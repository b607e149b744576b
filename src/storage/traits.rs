use bytes::Bytes;
use std::fmt;

/// Value stored in a bucket or under a scalar key.
///
/// Scalars, vectors and structured records are all representable. The
/// in-memory backend holds values as-is; network backends serialize them.
pub type StoredValue = serde_json::Value;

/// Boxed error produced by an external client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Binary bucket identifier produced by the hashing layer.
///
/// Treated as an opaque byte sequence on every backend. Displays as text
/// when the bytes are UTF-8 and as `0x`-prefixed hex otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashKey(Bytes);

impl HashKey {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl AsRef<[u8]> for HashKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for HashKey {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for HashKey {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl From<&[u8]> for HashKey {
    fn from(b: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for HashKey {
    fn from(b: Vec<u8>) -> Self {
        Self(Bytes::from(b))
    }
}

impl From<Bytes> for HashKey {
    fn from(b: Bytes) -> Self {
        Self(b)
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => {
                f.write_str("0x")?;
                for b in self.0.iter() {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// Physical medium behind a storage handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    InMemory,
    RemoteKv,
    ColumnStore,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::InMemory, Self::RemoteKv, Self::ColumnStore];

    /// Canonical configuration key for this backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InMemory => "in-memory",
            Self::RemoteKv => "remote-kv",
            Self::ColumnStore => "column-store",
        }
    }

    /// Resolve a configuration key, accepting the legacy product names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "in-memory" | "dict" => Some(Self::InMemory),
            "remote-kv" | "redis" => Some(Self::RemoteKv),
            "column-store" | "cassandra" => Some(Self::ColumnStore),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common contract for LSH bucket storage.
///
/// All operations are synchronous and block until the medium answers.
/// Implementations are `Send + Sync` so a handle can be shared behind an
/// `Arc`; network adapters serialise their own requests internally.
pub trait StorageBackend: Send + Sync {
    /// Backend kind of this handle.
    fn name(&self) -> BackendKind;

    /// Keys matching a Redis-style glob pattern. No ordering guarantee.
    fn keys_matching(&self, pattern: &str) -> Result<Vec<HashKey>, StorageError>;

    /// All keys currently present.
    fn keys(&self) -> Result<Vec<HashKey>, StorageError> {
        self.keys_matching("*")
    }

    /// Overwrite the scalar value at `key`.
    fn set_val(&self, key: &HashKey, val: StoredValue) -> Result<(), StorageError>;

    /// Scalar value at `key`, or `None` if absent.
    fn get_val(&self, key: &HashKey) -> Result<Option<StoredValue>, StorageError>;

    /// Append `val` to the list at `key`, creating the list if needed.
    ///
    /// Each call is atomic: concurrent appends never lose entries.
    fn append_val(&self, key: &HashKey, val: StoredValue) -> Result<(), StorageError>;

    /// Every value appended at `key`, or an empty list if absent.
    fn get_list(&self, key: &HashKey) -> Result<Vec<StoredValue>, StorageError>;

    /// Release the underlying client. Idempotent.
    fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Backend {backend} unavailable: {reason}")]
    BackendUnavailable { backend: BackendKind, reason: String },
    #[error("Backend {backend} unsupported: {reason}")]
    BackendUnsupported { backend: BackendKind, reason: String },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Key {key} holds a value of the wrong type")]
    WrongType { key: HashKey },
    #[error("Backend {backend} cannot filter keys by pattern {pattern:?}")]
    PatternUnsupported { backend: BackendKind, pattern: String },
    #[error("Backend {backend} handle is closed")]
    Closed { backend: BackendKind },
    #[error("Backend error: {0}")]
    Backend(#[source] BoxError),
}

impl StorageError {
    /// Short label used for error metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::BackendUnsupported { .. } => "backend_unsupported",
            Self::Serialization(_) => "serialization",
            Self::WrongType { .. } => "wrong_type",
            Self::PatternUnsupported { .. } => "pattern_unsupported",
            Self::Closed { .. } => "closed",
            Self::Backend(_) => "backend",
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

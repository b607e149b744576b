pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod storage;
pub mod telemetry;

pub use config::{Config, StorageConfig};
pub use storage::{storage, BackendKind, HashKey, StorageBackend, StorageError, StorageFactory, StoredValue};

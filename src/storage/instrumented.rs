use super::{BackendKind, HashKey, StorageBackend, StorageError, StoredValue};
use crate::metrics::{Metrics, Timer};
use tracing::{debug, debug_span};

/// Wraps a backend and records a metric and a span for every call.
///
/// Behaviour of the wrapped backend is unchanged; errors pass through.
pub struct Instrumented {
    inner: Box<dyn StorageBackend>,
}

impl Instrumented {
    pub fn new(inner: Box<dyn StorageBackend>) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> Box<dyn StorageBackend> {
        self.inner
    }

    fn observe<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&dyn StorageBackend) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let backend = self.inner.name().as_str();
        let _span = debug_span!("storage", operation, backend).entered();

        let timer = Timer::new();
        let result = f(self.inner.as_ref());
        let metrics = Metrics::get();
        metrics.record_storage_operation(operation, backend, timer.elapsed_seconds());

        if let Err(err) = &result {
            debug!("{} failed: {}", operation, err);
            metrics.record_storage_error(operation, backend, err.kind());
        }
        result
    }
}

impl StorageBackend for Instrumented {
    fn name(&self) -> BackendKind {
        self.inner.name()
    }

    fn keys_matching(&self, pattern: &str) -> Result<Vec<HashKey>, StorageError> {
        self.observe("keys", |s| s.keys_matching(pattern))
    }

    fn set_val(&self, key: &HashKey, val: StoredValue) -> Result<(), StorageError> {
        self.observe("set_val", |s| s.set_val(key, val))
    }

    fn get_val(&self, key: &HashKey) -> Result<Option<StoredValue>, StorageError> {
        self.observe("get_val", |s| s.get_val(key))
    }

    fn append_val(&self, key: &HashKey, val: StoredValue) -> Result<(), StorageError> {
        self.observe("append_val", |s| s.append_val(key, val))
    }

    fn get_list(&self, key: &HashKey) -> Result<Vec<StoredValue>, StorageError> {
        self.observe("get_list", |s| s.get_list(key))
    }

    fn close(&self) -> Result<(), StorageError> {
        self.observe("close", |s| s.close())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use serde_json::json;

    #[test]
    fn test_instrumented_delegates() {
        let storage = Instrumented::new(Box::new(MemoryStorage::new()));
        let key = HashKey::from("h");
        storage.append_val(&key, json!(1)).unwrap();

        assert_eq!(storage.name(), BackendKind::InMemory);
        assert_eq!(storage.get_list(&key).unwrap(), vec![json!(1)]);
        assert!(matches!(storage.get_val(&key), Err(StorageError::WrongType { .. })));
        assert_eq!(storage.into_inner().keys().unwrap(), vec![key]);
    }
}

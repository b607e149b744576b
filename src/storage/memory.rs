use super::pattern::glob_match;
use super::{BackendKind, HashKey, StorageBackend, StorageError, StoredValue};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Contents held under one key.
#[derive(Debug, Clone)]
enum Slot {
    Scalar(StoredValue),
    List(Vec<StoredValue>),
}

/// In-memory storage backend using a concurrent hashmap.
///
/// Values are held as given, without serialization. Data lives as long as
/// the handle. This is the reference backend: the other adapters mirror its
/// return values and absent-key behaviour.
pub struct MemoryStorage {
    data: DashMap<HashKey, Slot>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl StorageBackend for MemoryStorage {
    fn name(&self) -> BackendKind {
        BackendKind::InMemory
    }

    fn keys_matching(&self, pattern: &str) -> Result<Vec<HashKey>, StorageError> {
        let pattern = pattern.as_bytes();
        Ok(self
            .data
            .iter()
            .filter(|entry| glob_match(pattern, entry.key().as_bytes()))
            .map(|entry| entry.key().clone())
            .collect())
    }

    fn set_val(&self, key: &HashKey, val: StoredValue) -> Result<(), StorageError> {
        self.data.insert(key.clone(), Slot::Scalar(val));
        Ok(())
    }

    fn get_val(&self, key: &HashKey) -> Result<Option<StoredValue>, StorageError> {
        match self.data.get(key).as_deref() {
            Some(Slot::Scalar(val)) => Ok(Some(val.clone())),
            Some(Slot::List(_)) => Err(StorageError::WrongType { key: key.clone() }),
            None => Ok(None),
        }
    }

    fn append_val(&self, key: &HashKey, val: StoredValue) -> Result<(), StorageError> {
        // The entry holds the shard lock until the push completes.
        match self.data.entry(key.clone()) {
            Entry::Occupied(mut entry) => match entry.get_mut() {
                Slot::List(list) => {
                    list.push(val);
                    Ok(())
                }
                Slot::Scalar(_) => Err(StorageError::WrongType { key: key.clone() }),
            },
            Entry::Vacant(entry) => {
                entry.insert(Slot::List(vec![val]));
                Ok(())
            }
        }
    }

    fn get_list(&self, key: &HashKey) -> Result<Vec<StoredValue>, StorageError> {
        match self.data.get(key).as_deref() {
            Some(Slot::List(list)) => Ok(list.clone()),
            Some(Slot::Scalar(_)) => Err(StorageError::WrongType { key: key.clone() }),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_memory_append_and_list() {
        let storage = MemoryStorage::new();
        let key = HashKey::from("h1");
        storage.append_val(&key, json!("x")).unwrap();
        storage.append_val(&key, json!("y")).unwrap();

        assert_eq!(storage.get_list(&key).unwrap(), vec![json!("x"), json!("y")]);
        assert_eq!(storage.keys().unwrap(), vec![key]);
    }

    #[test]
    fn test_memory_absent_key() {
        let storage = MemoryStorage::new();
        let key = HashKey::from("missing");

        assert!(storage.get_list(&key).unwrap().is_empty());
        assert_eq!(storage.get_val(&key).unwrap(), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_memory_set_overwrites() {
        let storage = MemoryStorage::new();
        let key = HashKey::from("k");
        storage.set_val(&key, json!(1)).unwrap();
        storage.set_val(&key, json!({"v": 2})).unwrap();

        assert_eq!(storage.get_val(&key).unwrap(), Some(json!({"v": 2})));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_memory_wrong_type() {
        let storage = MemoryStorage::new();
        let scalar = HashKey::from("scalar");
        let list = HashKey::from("list");
        storage.set_val(&scalar, json!("s")).unwrap();
        storage.append_val(&list, json!("l")).unwrap();

        assert!(matches!(
            storage.append_val(&scalar, json!(1)),
            Err(StorageError::WrongType { .. })
        ));
        assert!(matches!(storage.get_list(&scalar), Err(StorageError::WrongType { .. })));
        assert!(matches!(storage.get_val(&list), Err(StorageError::WrongType { .. })));
    }

    #[test]
    fn test_memory_keys_pattern() {
        let storage = MemoryStorage::new();
        for key in ["0010", "0011", "1100"] {
            storage.append_val(&HashKey::from(key), json!(key)).unwrap();
        }

        let mut keys = storage.keys_matching("00*").unwrap();
        keys.sort();
        assert_eq!(keys, vec![HashKey::from("0010"), HashKey::from("0011")]);
        assert_eq!(storage.keys().unwrap().len(), 3);
    }

    #[test]
    fn test_memory_concurrent_appends() {
        let storage = Arc::new(MemoryStorage::new());
        let key = HashKey::from("bucket");

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let storage = Arc::clone(&storage);
                let key = key.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        storage.append_val(&key, json!([t, i])).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(storage.get_list(&key).unwrap().len(), 800);
    }
}

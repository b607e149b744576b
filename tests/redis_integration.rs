//! Remote-kv backend against a live Redis server.
//!
//! These tests require a running Redis server. Set `LSH_TEST_REDIS_URL` to
//! its `host:port` to enable them:
//!
//! ```bash
//! export LSH_TEST_REDIS_URL="localhost:6379"
//! cargo test --features redis-backend --test redis_integration
//! ```

#![cfg(feature = "redis-backend")]

use lsh_store::{BackendKind, HashKey, StorageConfig, StorageError, StorageFactory};
use serde_json::json;
use std::env;

const REDIS_URL_ENV: &str = "LSH_TEST_REDIS_URL";
// Databases far from 0 so tests do not touch application data.
const TEST_INDEX: u32 = 13;

fn redis_config() -> Option<StorageConfig> {
    let addr = env::var(REDIS_URL_ENV).ok()?;
    let (host, port) = addr.rsplit_once(':').unwrap_or((addr.as_str(), "6379"));
    let port: u16 = port.parse().ok()?;
    serde_json::from_value(json!({"remote-kv": {"host": host, "port": port}})).ok()
}

macro_rules! require_redis {
    () => {
        match redis_config() {
            Some(config) => config,
            None => {
                eprintln!("Skipping test: {} not set.", REDIS_URL_ENV);
                return;
            }
        }
    };
}

fn unique_key(name: &str) -> HashKey {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    HashKey::from(format!("lsh-test:{}:{}", name, nanos))
}

#[test]
fn test_redis_append_and_list() {
    let config = require_redis!();
    let storage = StorageFactory::new().create(&config, TEST_INDEX).unwrap();
    let key = unique_key("list");

    assert!(storage.get_list(&key).unwrap().is_empty());
    storage.append_val(&key, json!([1, 2, 3])).unwrap();
    storage.append_val(&key, json!("doc")).unwrap();

    assert_eq!(storage.get_list(&key).unwrap(), vec![json!([1, 2, 3]), json!("doc")]);
    storage.close().unwrap();
}

#[test]
fn test_redis_set_get_and_keys() {
    let config = require_redis!();
    let storage = StorageFactory::new().create(&config, TEST_INDEX).unwrap();
    let key = unique_key("scalar");

    storage.set_val(&key, json!({"n": 1})).unwrap();
    assert_eq!(storage.get_val(&key).unwrap(), Some(json!({"n": 1})));

    let pattern = format!("{}*", key);
    assert_eq!(storage.keys_matching(&pattern).unwrap(), vec![key]);
}

#[test]
fn test_redis_wrong_type_is_a_backend_error() {
    let config = require_redis!();
    let storage = StorageFactory::new().create(&config, TEST_INDEX).unwrap();
    let key = unique_key("wrongtype");

    storage.set_val(&key, json!(1)).unwrap();
    assert!(matches!(storage.append_val(&key, json!(2)), Err(StorageError::Backend(_))));
}

#[test]
fn test_redis_unreachable_server() {
    let config: StorageConfig =
        serde_json::from_value(json!({"remote-kv": {"host": "127.0.0.1", "port": 1, "timeout_ms": 200}}))
            .unwrap();

    assert!(matches!(
        StorageFactory::new().create(&config, TEST_INDEX),
        Err(StorageError::BackendUnavailable { backend: BackendKind::RemoteKv, .. })
    ));
}

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::storage::{BackendKind, ColumnStoreParams, RemoteKvParams};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend selection: backend name -> backend parameters.
///
/// A valid configuration names exactly one backend; the factory rejects
/// anything else. Names may be canonical (`in-memory`, `remote-kv`,
/// `column-store`) or legacy (`dict`, `redis`, `cassandra`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageConfig(Map<String, Value>);

impl StorageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration selecting only `kind` with the given parameters.
    pub fn single(kind: BackendKind, params: Map<String, Value>) -> Self {
        let mut map = Map::new();
        map.insert(kind.as_str().to_string(), Value::Object(params));
        Self(map)
    }

    pub fn in_memory() -> Self {
        Self::single(BackendKind::InMemory, Map::new())
    }

    pub fn remote_kv(params: &RemoteKvParams) -> Result<Self, ConfigError> {
        Self::from_params(BackendKind::RemoteKv, params)
    }

    pub fn column_store(params: &ColumnStoreParams) -> Result<Self, ConfigError> {
        Self::from_params(BackendKind::ColumnStore, params)
    }

    fn from_params<P: Serialize>(kind: BackendKind, params: &P) -> Result<Self, ConfigError> {
        match serde_json::to_value(params)? {
            Value::Object(map) => Ok(Self::single(kind, map)),
            _ => Err(ConfigError::Validation(format!(
                "{} parameters must serialize to a map",
                kind
            ))),
        }
    }

    /// Add or replace a backend entry. Adding a second backend makes the
    /// configuration invalid for the factory.
    pub fn insert(&mut self, name: impl Into<String>, params: Value) {
        self.0.insert(name.into(), params);
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parameters of the entry resolving to `kind`, under any of its names.
    pub fn params_for(&self, kind: BackendKind) -> Option<&Map<String, Value>> {
        self.0
            .iter()
            .find(|(name, _)| BackendKind::from_name(name) == Some(kind))
            .and_then(|(_, params)| params.as_object())
    }

    fn params_for_mut(&mut self, kind: BackendKind) -> Option<&mut Map<String, Value>> {
        self.0
            .iter_mut()
            .find(|(name, _)| BackendKind::from_name(name) == Some(kind))
            .and_then(|(_, params)| params.as_object_mut())
    }

    /// Single backend kind if exactly one recognized backend is configured.
    pub fn single_kind(&self) -> Option<BackendKind> {
        let mut names = self.0.keys();
        match (names.next(), names.next()) {
            (Some(name), None) => BackendKind::from_name(name),
            _ => None,
        }
    }
}

impl From<Map<String, Value>> for StorageConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Process configuration for the `lsh-store` binary.
///
/// Can be loaded from files, env vars, or CLI args with precedence order:
/// CLI > File > Environment > Defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Index (hash table) number; becomes the namespace of network backends.
    #[serde(default)]
    pub index: u32,
    #[serde(default = "StorageConfig::in_memory")]
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index: 0,
            storage: StorageConfig::in_memory(),
        }
    }
}

impl Config {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(index) = lookup("LSH_INDEX") {
            config.index = index
                .parse()
                .map_err(|_| ConfigError::Validation(format!("LSH_INDEX is not a number: {}", index)))?;
        }

        let kind = match lookup("LSH_STORAGE_BACKEND") {
            Some(name) => BackendKind::from_name(&name).ok_or_else(|| {
                ConfigError::Validation(format!("unknown LSH_STORAGE_BACKEND: {}", name))
            })?,
            None => return Ok(config),
        };

        let mut params = Map::new();
        if let Some(host) = lookup("LSH_HOST") {
            params.insert("host".to_string(), Value::String(host));
        }
        if let Some(port_str) = lookup("LSH_PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                params.insert("port".to_string(), Value::from(port));
            }
        }
        if let Some(password) = lookup("LSH_PASSWORD") {
            params.insert("password".to_string(), Value::String(password));
        }
        if kind == BackendKind::ColumnStore {
            if let Some(keyspace) = lookup("LSH_KEYSPACE") {
                params.insert("keyspace".to_string(), Value::String(keyspace));
            }
        }

        config.storage = if kind == BackendKind::InMemory {
            StorageConfig::in_memory()
        } else {
            StorageConfig::single(kind, params)
        };
        Ok(config)
    }

    /// Create config with CLI args taking precedence over environment and file.
    ///
    /// Precedence: CLI > File > Environment > Defaults
    pub fn from_sources(cli: &Cli) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;

        let file_config = cli
            .config
            .as_ref()
            .map(Self::load_from_file)
            .transpose()?;

        let index = cli
            .index
            .or_else(|| file_config.as_ref().map(|c| c.index))
            .unwrap_or(env_config.index);

        let storage = Self::resolve_storage(cli, file_config.as_ref(), &env_config)?;

        Ok(Config { index, storage })
    }

    fn resolve_storage(
        cli: &Cli,
        file_config: Option<&Config>,
        env_config: &Config,
    ) -> Result<StorageConfig, ConfigError> {
        let base = file_config.map_or(&env_config.storage, |c| &c.storage);

        let mut storage = match cli.storage {
            Some(choice) => {
                let kind = choice.kind();
                let params = base.params_for(kind).cloned().unwrap_or_default();
                StorageConfig::single(kind, params)
            }
            None => base.clone(),
        };

        let kind = storage.single_kind();
        cli.validate_for_storage(kind)?;

        if let Some(params) = kind
            .filter(|k| *k != BackendKind::InMemory)
            .and_then(|k| storage.params_for_mut(k))
        {
            if let Some(host) = &cli.host {
                params.insert("host".to_string(), Value::String(host.clone()));
            }
            if let Some(port) = cli.port {
                params.insert("port".to_string(), Value::from(port));
            }
            if let Some(keyspace) = &cli.keyspace {
                params.insert("keyspace".to_string(), Value::String(keyspace.clone()));
            }
        }

        Ok(storage)
    }

    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::json;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["lsh-store"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_default_is_in_memory() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.storage.single_kind(), Some(BackendKind::InMemory));
    }

    #[test]
    fn test_env_remote_kv() {
        let config = Config::from_lookup(lookup(&[
            ("LSH_STORAGE_BACKEND", "redis"),
            ("LSH_HOST", "cache"),
            ("LSH_PORT", "6380"),
            ("LSH_INDEX", "4"),
        ]))
        .unwrap();

        assert_eq!(config.index, 4);
        let params = config.storage.params_for(BackendKind::RemoteKv).unwrap();
        assert_eq!(params.get("host"), Some(&json!("cache")));
        assert_eq!(params.get("port"), Some(&json!(6380)));
    }

    #[test]
    fn test_env_rejects_unknown_backend() {
        assert!(Config::from_lookup(lookup(&[("LSH_STORAGE_BACKEND", "mongo")])).is_err());
        assert!(Config::from_lookup(lookup(&[("LSH_INDEX", "three")])).is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lsh.json");
        let config = Config {
            index: 2,
            storage: StorageConfig::column_store(&ColumnStoreParams {
                keyspace: Some("lsh_ks".to_string()),
                ..Default::default()
            })
            .unwrap(),
        };

        config.save_to_file(&path).unwrap();
        assert_eq!(Config::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_file_accepts_legacy_layout() {
        let config: Config =
            serde_json::from_value(json!({"storage": {"cassandra": {"keyspace": "ks"}}})).unwrap();

        assert_eq!(config.index, 0);
        assert_eq!(config.storage.single_kind(), Some(BackendKind::ColumnStore));
        assert_eq!(
            config.storage.params_for(BackendKind::ColumnStore).unwrap().get("keyspace"),
            Some(&json!("ks"))
        );
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lsh.json");
        let file = Config {
            index: 1,
            storage: StorageConfig::remote_kv(&RemoteKvParams {
                host: "from-file".to_string(),
                ..Default::default()
            })
            .unwrap(),
        };
        file.save_to_file(&path).unwrap();

        let path_str = path.to_str().unwrap();
        let config = Config::from_sources(&cli(&[
            "--config", path_str, "--host", "from-cli", "--index", "5", "keys",
        ]))
        .unwrap();

        assert_eq!(config.index, 5);
        let params = config.storage.params_for(BackendKind::RemoteKv).unwrap();
        assert_eq!(params.get("host"), Some(&json!("from-cli")));
    }

    #[test]
    fn test_cli_backend_switch_keeps_file_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lsh.json");
        let mut storage = StorageConfig::new();
        storage.insert("redis", json!({"host": "kv"}));
        storage.insert("cassandra", json!({"keyspace": "ks"}));
        Config { index: 0, storage }.save_to_file(&path).unwrap();

        let path_str = path.to_str().unwrap();
        let config = Config::from_sources(&cli(&[
            "--config",
            path_str,
            "--storage",
            "column-store",
            "list",
            "h1",
        ]))
        .unwrap();

        assert_eq!(config.storage.backend_names(), vec!["column-store"]);
        assert_eq!(
            config.storage.params_for(BackendKind::ColumnStore).unwrap().get("keyspace"),
            Some(&json!("ks"))
        );
    }

    #[test]
    fn test_keyspace_flag_requires_column_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lsh.json");
        Config::default().save_to_file(&path).unwrap();

        let path_str = path.to_str().unwrap();
        let result = Config::from_sources(&cli(&["--config", path_str, "--keyspace", "ks", "keys"]));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}

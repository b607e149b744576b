use crate::error::ConfigError;
use crate::storage::{BackendKind, HashKey, StorageBackend, StorageError, StoredValue};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "lsh-store")]
#[command(about = "Inspect and modify LSH bucket storage")]
#[command(long_about = "Runs one storage operation against the in-memory, remote-kv or column-store backend used by an LSH index")]
#[command(version)]
pub struct Cli {
    /// Storage backend to use
    #[arg(short, long)]
    pub storage: Option<BackendChoice>,

    /// Backend host
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Backend port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Keyspace (column-store backend only)
    #[arg(short, long)]
    pub keyspace: Option<String>,

    /// Index number; selects the database of network backends
    #[arg(short, long)]
    pub index: Option<u32>,

    /// Configuration file path (JSON format)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print Prometheus metrics to stderr after the command
    #[arg(long)]
    pub print_metrics: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendChoice {
    /// Process-local map (default, lost on exit)
    InMemory,
    /// Redis-protocol key/value store
    RemoteKv,
    /// CQL column store
    ColumnStore,
}

impl BackendChoice {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendChoice::InMemory => BackendKind::InMemory,
            BackendChoice::RemoteKv => BackendKind::RemoteKv,
            BackendChoice::ColumnStore => BackendKind::ColumnStore,
        }
    }
}

impl std::fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind().as_str())
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List keys, optionally filtered by a glob pattern
    Keys {
        #[arg(long, default_value = "*")]
        pattern: String,
    },
    /// Read the scalar value at KEY
    Get { key: String },
    /// Overwrite the scalar value at KEY
    Set { key: String, value: String },
    /// Append VALUE to the bucket at KEY
    Append { key: String, value: String },
    /// Print every value in the bucket at KEY
    List { key: String },
}

/// Parse a command-line value as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> StoredValue {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

impl Command {
    /// Run the command; the returned value, if any, is the command's output.
    pub fn execute(&self, storage: &dyn StorageBackend) -> Result<Option<Value>, StorageError> {
        match self {
            Command::Keys { pattern } => {
                let mut keys: Vec<String> = storage
                    .keys_matching(pattern)?
                    .iter()
                    .map(HashKey::to_string)
                    .collect();
                keys.sort();
                Ok(Some(Value::from(keys)))
            }
            Command::Get { key } => Ok(Some(
                storage.get_val(&HashKey::from(key.as_str()))?.unwrap_or(Value::Null),
            )),
            Command::Set { key, value } => {
                storage.set_val(&HashKey::from(key.as_str()), parse_value(value))?;
                Ok(None)
            }
            Command::Append { key, value } => {
                storage.append_val(&HashKey::from(key.as_str()), parse_value(value))?;
                Ok(None)
            }
            Command::List { key } => Ok(Some(Value::Array(
                storage.get_list(&HashKey::from(key.as_str()))?,
            ))),
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Validate the configuration after merging with file/env.
    pub fn validate_for_storage(&self, storage: Option<BackendKind>) -> Result<(), ConfigError> {
        if self.keyspace.is_some() && storage != Some(BackendKind::ColumnStore) {
            return Err(ConfigError::Validation(
                "--keyspace is only valid with the column-store backend".to_string(),
            ));
        }
        if storage == Some(BackendKind::InMemory) && (self.host.is_some() || self.port.is_some()) {
            return Err(ConfigError::Validation(
                "--host and --port are not used by the in-memory backend".to_string(),
            ));
        }
        Ok(())
    }

    /// Log level selected by the verbosity flags.
    pub fn log_level(&self) -> Level {
        if self.debug {
            Level::DEBUG
        } else if self.verbose {
            Level::INFO
        } else {
            Level::WARN
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("[1, 2]"), json!([1, 2]));
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("doc-1"), json!("doc-1"));
        assert_eq!(parse_value("\"quoted\""), json!("quoted"));
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["lsh-store", "-s", "remote-kv", "-i", "3", "append", "h1", "[1,2]"])
            .unwrap();
        assert_eq!(cli.storage, Some(BackendChoice::RemoteKv));
        assert_eq!(cli.index, Some(3));
        assert_eq!(
            cli.command,
            Command::Append {
                key: "h1".to_string(),
                value: "[1,2]".to_string()
            }
        );

        let cli = Cli::try_parse_from(["lsh-store", "keys"]).unwrap();
        assert_eq!(cli.command, Command::Keys { pattern: "*".to_string() });
        assert_eq!(cli.log_level(), Level::WARN);
    }

    #[test]
    fn test_execute_against_memory() {
        let storage = MemoryStorage::new();
        let append = |value: &str| Command::Append {
            key: "h1".to_string(),
            value: value.to_string(),
        };

        assert_eq!(append("x").execute(&storage).unwrap(), None);
        assert_eq!(append("[0.5]").execute(&storage).unwrap(), None);

        let list = Command::List { key: "h1".to_string() };
        assert_eq!(list.execute(&storage).unwrap(), Some(json!(["x", [0.5]])));

        let keys = Command::Keys { pattern: "h*".to_string() };
        assert_eq!(keys.execute(&storage).unwrap(), Some(json!(["h1"])));

        let get = Command::Get { key: "absent".to_string() };
        assert_eq!(get.execute(&storage).unwrap(), Some(Value::Null));
    }

    #[test]
    fn test_keys_output_marks_binary_keys() {
        let storage = MemoryStorage::new();
        storage.append_val(&HashKey::from("ff00"), json!(1)).unwrap();
        storage.append_val(&HashKey::from(vec![0xff, 0x00]), json!(2)).unwrap();

        let keys = Command::Keys { pattern: "*".to_string() };
        assert_eq!(keys.execute(&storage).unwrap(), Some(json!(["0xff00", "ff00"])));
    }

    #[test]
    fn test_validate_for_storage() {
        let cli = Cli::try_parse_from(["lsh-store", "--keyspace", "ks", "keys"]).unwrap();
        assert!(cli.validate_for_storage(Some(BackendKind::ColumnStore)).is_ok());
        assert!(cli.validate_for_storage(Some(BackendKind::RemoteKv)).is_err());

        let cli = Cli::try_parse_from(["lsh-store", "--port", "6380", "keys"]).unwrap();
        assert!(cli.validate_for_storage(Some(BackendKind::InMemory)).is_err());
        assert!(cli.validate_for_storage(Some(BackendKind::RemoteKv)).is_ok());
    }
}

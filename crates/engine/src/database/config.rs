//! Store configuration via `tripod.toml`
//!
//! One file describes a store: its identifiers, the namespaces used to
//! expand qnames, cardinality bounds, how each kind of materialized
//! document is regenerated, where the transaction log lives, and the
//! specifications themselves. The file is read once and validated; the
//! resulting objects are immutable and shared.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tripod_composites::{Namespaces, SpecificationRegistry};
use tripod_concurrency::CardinalityRules;
use tripod_core::{Error, Operation, Result};

/// Config file name placed in the store directory.
pub const CONFIG_FILE_NAME: &str = "tripod.toml";

/// Queue used for asynchronous regeneration when none is named.
pub const DEFAULT_QUEUE: &str = "tripod::regen";

/// How one kind of materialized document is regenerated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationConfig {
    /// Queue the work instead of running it inside `save_changes`
    #[serde(rename = "async", default)]
    pub is_async: bool,
    /// Target queue for asynchronous work
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
}

impl OperationConfig {
    fn sync() -> Self {
        OperationConfig {
            is_async: false,
            queue: None,
        }
    }

    fn queued() -> Self {
        OperationConfig {
            is_async: true,
            queue: None,
        }
    }

    /// Queue name, falling back to the default
    pub fn queue_name(&self) -> &str {
        self.queue.as_deref().unwrap_or(DEFAULT_QUEUE)
    }
}

fn default_views() -> OperationConfig {
    OperationConfig::sync()
}

fn default_queued() -> OperationConfig {
    OperationConfig::queued()
}

/// Dispatch settings per operation kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationsConfig {
    /// Views (default: synchronous)
    #[serde(default = "default_views")]
    pub views: OperationConfig,
    /// Tables (default: asynchronous)
    #[serde(default = "default_queued")]
    pub tables: OperationConfig,
    /// Search documents (default: asynchronous)
    #[serde(default = "default_queued")]
    pub search: OperationConfig,
}

impl Default for OperationsConfig {
    fn default() -> Self {
        OperationsConfig {
            views: default_views(),
            tables: default_queued(),
            search: default_queued(),
        }
    }
}

impl OperationsConfig {
    /// Settings for `operation`
    pub fn get(&self, operation: Operation) -> &OperationConfig {
        match operation {
            Operation::Views => &self.views,
            Operation::Tables => &self.tables,
            Operation::Search => &self.search,
        }
    }
}

/// Where transaction records are kept
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransactionLogConfig {
    /// In memory, lost on drop
    #[default]
    Memory,
    /// Append-only file
    File {
        /// Log file path, relative to the config file's directory
        path: PathBuf,
    },
}

fn default_store_id() -> String {
    "tripod".to_string()
}

fn default_pod_id() -> String {
    "default".to_string()
}

fn default_context() -> String {
    "http://talisaspire.com/".to_string()
}

fn default_max_joins() -> usize {
    tripod_composites::DEFAULT_MAX_JOINS
}

fn default_workers() -> usize {
    2
}

fn default_queue_depth() -> usize {
    4096
}

/// Store configuration loaded from `tripod.toml`.
///
/// # Example
///
/// ```toml
/// store_id = "tripod"
/// pod_id = "default"
/// default_context = "http://talisaspire.com/"
///
/// [namespaces]
/// dct = "http://purl.org/dc/terms/"
///
/// [cardinality]
/// "dct:created" = 1
///
/// [operations.tables]
/// async = true
/// queue = "tripod::tables"
///
/// [transaction_log]
/// type = "file"
/// path = "transactions.log"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripodConfig {
    /// Store identifier stamped on regeneration work
    #[serde(default = "default_store_id")]
    pub store_id: String,
    /// Pod identifier stamped on regeneration work
    #[serde(default = "default_pod_id")]
    pub pod_id: String,
    /// Context used when the caller names none
    #[serde(default = "default_context")]
    pub default_context: String,
    /// Targets followed per join unless the join says otherwise
    #[serde(default = "default_max_joins")]
    pub max_joins: usize,
    /// Prefix to base URI
    #[serde(default)]
    pub namespaces: BTreeMap<String, String>,
    /// Predicate to maximum number of values
    #[serde(default)]
    pub cardinality: BTreeMap<String, usize>,
    /// Dispatch per operation kind
    #[serde(default)]
    pub operations: OperationsConfig,
    /// Transaction log location
    #[serde(default)]
    pub transaction_log: TransactionLogConfig,
    /// Worker threads for queued regeneration
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Jobs held before enqueueing fails
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// View, table and search specifications
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specifications: Vec<serde_json::Value>,
}

impl Default for TripodConfig {
    fn default() -> Self {
        Self {
            store_id: default_store_id(),
            pod_id: default_pod_id(),
            default_context: default_context(),
            max_joins: default_max_joins(),
            namespaces: BTreeMap::new(),
            cardinality: BTreeMap::new(),
            operations: OperationsConfig::default(),
            transaction_log: TransactionLogConfig::default(),
            workers: default_workers(),
            queue_depth: default_queue_depth(),
            specifications: Vec::new(),
        }
    }
}

impl TripodConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tripod store configuration
#
# Identifiers stamped on regeneration work
store_id = "tripod"
pod_id = "default"

# Context used when callers do not name one
default_context = "http://talisaspire.com/"

# Targets followed per join unless a join sets max_joins
max_joins = 10

# Worker threads and queue depth for asynchronous regeneration
workers = 2
queue_depth = 4096

# Namespace prefixes used to expand qnames
[namespaces]
# dct = "http://purl.org/dc/terms/"

# Maximum number of values per predicate
[cardinality]
# "dct:created" = 1

# Views regenerate inside save_changes; tables and search are queued
[operations.views]
async = false

[operations.tables]
async = true

[operations.search]
async = true

# Transaction log: "memory" or "file"
[transaction_log]
type = "memory"
# type = "file"
# path = "transactions.log"
"#
    }

    /// Parse config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TripodConfig = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// A relative file log path is resolved against the config file's
    /// directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let mut config = Self::from_toml_str(&content).map_err(|e| {
            Error::configuration(format!("{} ({})", e, path.display()))
        })?;
        if let TransactionLogConfig::File { path: log_path } = &mut config.transaction_log {
            if log_path.is_relative() {
                if let Some(dir) = path.parent() {
                    *log_path = dir.join(&*log_path);
                }
            }
        }
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::configuration(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::configuration(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(Error::from)
    }

    /// Check every setting, including the specifications.
    pub fn validate(&self) -> Result<()> {
        if self.store_id.is_empty() || self.pod_id.is_empty() {
            return Err(Error::configuration("store_id and pod_id must not be empty"));
        }
        if self.default_context.is_empty() {
            return Err(Error::configuration("default_context must not be empty"));
        }
        if self.max_joins == 0 {
            return Err(Error::configuration("max_joins must be at least 1"));
        }
        if self.workers == 0 || self.queue_depth == 0 {
            return Err(Error::configuration("workers and queue_depth must be at least 1"));
        }
        if let Some((predicate, _)) = self.cardinality.iter().find(|(_, max)| **max == 0) {
            return Err(Error::configuration(format!(
                "cardinality for {} must be at least 1",
                predicate
            )));
        }
        for operation in Operation::ALL {
            if self.operations.get(operation).queue.as_deref() == Some("") {
                return Err(Error::configuration(format!(
                    "queue name for {} must not be empty",
                    operation
                )));
            }
        }
        self.registry().map(|_| ())
    }

    /// Namespace prefixes
    pub fn namespaces(&self) -> Namespaces {
        Namespaces::from(self.namespaces.clone())
    }

    /// Cardinality bounds
    pub fn cardinality_rules(&self) -> CardinalityRules {
        CardinalityRules::from(self.cardinality.clone())
    }

    /// Validated specifications
    pub fn registry(&self) -> Result<SpecificationRegistry> {
        SpecificationRegistry::from_json(self.specifications.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_toml_parses_correctly() {
        let config = TripodConfig::from_toml_str(TripodConfig::default_toml()).unwrap();
        assert_eq!(config.store_id, "tripod");
        assert_eq!(config.max_joins, 10);
        assert!(!config.operations.views.is_async);
        assert!(config.operations.tables.is_async);
        assert!(config.operations.search.is_async);
        assert_eq!(config.transaction_log, TransactionLogConfig::Memory);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TripodConfig::from_toml_str("").unwrap();
        assert_eq!(config.operations, OperationsConfig::default());
        assert_eq!(config.operations.tables.queue_name(), DEFAULT_QUEUE);
    }

    #[test]
    fn test_write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "store_id = \"custom\"\n").unwrap();
        TripodConfig::write_default_if_missing(&path).unwrap();

        let config = TripodConfig::from_file(&path).unwrap();
        assert_eq!(config.store_id, "custom");
    }

    #[test]
    fn test_file_log_path_resolves_against_config_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "[transaction_log]\ntype = \"file\"\npath = \"logs/txn.log\"\n",
        )
        .unwrap();

        let config = TripodConfig::from_file(&path).unwrap();
        assert_eq!(
            config.transaction_log,
            TransactionLogConfig::File {
                path: dir.path().join("logs/txn.log")
            }
        );
    }

    #[test]
    fn test_specifications_in_toml() {
        let config = TripodConfig::from_toml_str(
            r#"
[operations.search]
async = false
queue = "search"

[[specifications]]
id = "v_resource"
kind = "view"
types = ["acorn:Resource"]
include = ["dct:title"]
"#,
        )
        .unwrap();
        assert!(!config.operations.search.is_async);
        assert_eq!(config.operations.search.queue_name(), "search");
        assert_eq!(config.registry().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(TripodConfig::from_toml_str("max_joins = 0").is_err());
        assert!(TripodConfig::from_toml_str("[cardinality]\n\"dct:created\" = 0").is_err());
        assert!(TripodConfig::from_toml_str(
            "[[specifications]]\nid = \"t\"\nkind = \"table\"\ntypes = [\"a\"]\ncounts = [{name = \"n\", property = \"p\"}]"
        )
        .is_err());
    }

    #[test]
    fn test_write_to_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = TripodConfig::default();
        config.namespaces.insert("dct".into(), "http://purl.org/dc/terms/".into());
        config.operations.views.is_async = true;

        config.write_to_file(&path).unwrap();
        let loaded = TripodConfig::from_file(&path).unwrap();
        assert_eq!(loaded.namespaces, config.namespaces);
        assert!(loaded.operations.views.is_async);
    }
}

//! Configuration schema (meshrun.toml)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use crate::model::{Access, Materialization};

/// File name looked up in the project directory
pub const CONFIG_FILE_NAME: &str = "meshrun.toml";

/// SQL dialect used to validate resolved model bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectConfig {
    /// DuckDB SQL dialect
    #[default]
    DuckDb,

    /// PostgreSQL SQL dialect
    Postgres,

    /// Generic ANSI SQL
    Ansi,
}

/// Warehouse connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Database file, relative to the project root, or `:memory:`
    #[serde(default = "default_warehouse_path")]
    pub path: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            path: default_warehouse_path(),
        }
    }
}

impl WarehouseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

/// A declared source table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Logical namespace, first argument of `source()`
    pub namespace: String,

    /// Logical table name, second argument of `source()`
    pub name: String,

    /// Physical table name; defaults to `<namespace>.<name>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl SourceConfig {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            table: None,
        }
    }

    /// Physical table a `source()` marker expands to
    pub fn physical_table(&self) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| format!("{}.{}", self.namespace, self.name))
    }
}

/// Per-model overrides from the `[models.<name>]` tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materialized: Option<Materialization>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Access>,
}

/// An upstream project whose public models may be referenced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Upstream project name, first argument of two-argument `ref()`
    pub project: String,

    /// Path to the upstream manifest.json, relative to the project root
    pub manifest: PathBuf,
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Project name, used in manifest unique_ids
    #[serde(default = "default_name")]
    pub name: String,

    /// Directory holding model files
    #[serde(default = "default_models_path")]
    pub models_path: PathBuf,

    /// Directory for generated artifacts
    #[serde(default = "default_target_path")]
    pub target_path: PathBuf,

    /// Schema models are materialized into
    #[serde(default = "default_target_schema")]
    pub target_schema: String,

    /// Materialization for models without a config block or override
    #[serde(default)]
    pub default_materialization: Materialization,

    /// SQL dialect
    #[serde(default)]
    pub dialect: DialectConfig,

    /// Warehouse connection
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Declared sources
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Per-model overrides
    #[serde(default)]
    pub models: BTreeMap<String, ModelOverrides>,

    /// Upstream projects for cross-project refs
    #[serde(default)]
    pub upstream: Vec<UpstreamConfig>,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

fn default_name() -> String {
    "meshrun_project".to_string()
}

fn default_models_path() -> PathBuf {
    PathBuf::from("models")
}

fn default_target_path() -> PathBuf {
    PathBuf::from("target")
}

fn default_target_schema() -> String {
    "main".to_string()
}

fn default_warehouse_path() -> String {
    "target/warehouse.duckdb".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            models_path: default_models_path(),
            target_path: default_target_path(),
            target_schema: default_target_schema(),
            default_materialization: Materialization::default(),
            dialect: DialectConfig::default(),
            warehouse: WarehouseConfig::default(),
            sources: Vec::new(),
            models: BTreeMap::new(),
            upstream: Vec::new(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load `meshrun.toml` from a project directory
    pub fn from_project_dir(dir: &Path) -> Result<Self, ConfigError> {
        Self::from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Apply `MESHRUN_*` overrides from the given lookup (normally `std::env::var`)
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("MESHRUN_WAREHOUSE_PATH") {
            self.warehouse.path = path;
        }
        if let Some(schema) = lookup("MESHRUN_TARGET_SCHEMA") {
            self.target_schema = schema;
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !crate::model::Relation::is_valid_identifier(&self.target_schema) {
            return Err(ConfigError::InvalidValue(format!(
                "target_schema '{}' is not a valid identifier",
                self.target_schema
            )));
        }
        if self.name.is_empty() || self.name.contains('.') {
            return Err(ConfigError::InvalidValue(format!(
                "project name '{}' must be non-empty and contain no '.'",
                self.name
            )));
        }
        Ok(())
    }

    /// Absolute models directory
    pub fn models_dir(&self) -> PathBuf {
        self.project_root.join(&self.models_path)
    }

    /// Absolute target directory
    pub fn target_dir(&self) -> PathBuf {
        self.project_root.join(&self.target_path)
    }

    /// Where `compile` and `run` write the manifest
    pub fn manifest_path(&self) -> PathBuf {
        self.target_dir().join("manifest.json")
    }

    /// Where `run` writes the run report
    pub fn run_results_path(&self) -> PathBuf {
        self.target_dir().join("run_results.json")
    }

    /// Warehouse location, resolved against the project root
    pub fn warehouse_location(&self) -> String {
        if self.warehouse.is_in_memory() {
            return self.warehouse.path.clone();
        }
        self.project_root
            .join(&self.warehouse.path)
            .display()
            .to_string()
    }

    /// Materialization from `[models.<name>]`, falling back to the project default
    pub fn materialization_for(&self, model: &str) -> Materialization {
        self.models
            .get(model)
            .and_then(|o| o.materialized)
            .unwrap_or(self.default_materialization)
    }

    /// Access from `[models.<name>]`, falling back to private
    pub fn access_for(&self, model: &str) -> Access {
        self.models
            .get(model)
            .and_then(|o| o.access)
            .unwrap_or_default()
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration: {0}")]
    InvalidValue(String),
}

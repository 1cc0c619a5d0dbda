//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `DATASEARCH_*` environment overrides.

use crate::query::{FieldTranslation, QueryMode, TranslationTable, ValueTransform};
use crate::time::{parse_timezone, UserTimezone};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub translations: Vec<TranslationConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Search defaults for the configured datatype
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_datatype")]
    pub datatype: String,

    #[serde(default)]
    pub query_mode: QueryMode,

    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Fixed offset or `UTC`, e.g. `+02:00`
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_time_field")]
    pub time_field: String,

    /// Sort field for requests naming none; the time field when unset
    pub sort_path_default: Option<String>,

    #[serde(default)]
    pub groupby_default: Vec<String>,

    /// Fields listed first in results
    #[serde(default)]
    pub default_columns: Vec<String>,
}

fn default_datatype() -> String {
    "events".to_string()
}

fn default_limit() -> usize {
    30
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_time_field() -> String {
    "timestamp".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            datatype: default_datatype(),
            query_mode: QueryMode::default(),
            default_limit: default_limit(),
            timezone: default_timezone(),
            time_field: default_time_field(),
            sort_path_default: None,
            groupby_default: Vec::new(),
            default_columns: Vec::new(),
        }
    }
}

/// Where records are loaded from
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    #[serde(default = "default_dataset_path")]
    pub path: String,
}

fn default_dataset_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("datasearch").join("events.json").to_string_lossy().to_string())
        .unwrap_or_else(|| "./events.json".to_string())
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: default_dataset_path(),
        }
    }
}

/// A logical field backed by one or more physical fields
#[derive(Debug, Clone, Deserialize)]
pub struct TranslationConfig {
    pub field: String,
    /// Qualified physical paths, e.g. `events.src_ip`
    pub paths: Vec<String>,
    /// Name of a builtin value transform (`lowercase`, `uppercase`, `trim`)
    pub transform: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("datasearch").join("config.toml")),
            Some(PathBuf::from("/etc/datasearch/config.toml")),
            Some(PathBuf::from("./datasearch.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(datatype) = var("DATASEARCH_DATATYPE") {
            self.search.datatype = datatype;
        }
        if let Some(mode) = var("DATASEARCH_QUERY_MODE").and_then(|m| QueryMode::from_str(&m)) {
            self.search.query_mode = mode;
        }
        if let Some(limit) = var("DATASEARCH_DEFAULT_LIMIT").and_then(|l| l.parse().ok()) {
            self.search.default_limit = limit;
        }
        if let Some(tz) = var("DATASEARCH_TIMEZONE") {
            self.search.timezone = tz;
        }

        if let Some(path) = var("DATASEARCH_DATASET") {
            self.dataset.path = path;
        }

        if let Some(level) = var("DATASEARCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("DATASEARCH_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// The configured timezone: an offset or an IANA zone name
    pub fn timezone(&self) -> Result<UserTimezone, ConfigError> {
        parse_timezone(&self.search.timezone)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown timezone: {}", self.search.timezone)))
    }

    /// Build the translation table from `[[translations]]`
    pub fn translation_table(&self) -> Result<TranslationTable, ConfigError> {
        let mut builder = TranslationTable::builder();

        for entry in &self.translations {
            if entry.paths.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "translation for '{}' has no paths",
                    entry.field
                )));
            }

            let mut translation = FieldTranslation::new(entry.paths.iter().cloned());
            if let Some(name) = &entry.transform {
                let transform = ValueTransform::builtin(name).ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "unknown transform '{}' for field '{}'",
                        name, entry.field
                    ))
                })?;
                translation = translation.with_transform(transform);
            }
            builder = builder.translate(entry.field.clone(), translation);
        }

        Ok(builder.build())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Datasearch Configuration
#
# Environment variables override these settings:
# - DATASEARCH_DATATYPE
# - DATASEARCH_QUERY_MODE
# - DATASEARCH_DEFAULT_LIMIT
# - DATASEARCH_TIMEZONE
# - DATASEARCH_DATASET
# - DATASEARCH_LOG_LEVEL
# - DATASEARCH_LOG_FORMAT

[search]
# Datatype searched by default
datatype = "events"

# Query language: "lucene" or "criterion"
query_mode = "lucene"

# Rows per page
default_limit = 30

# Timezone for time buckets and displayed dates ("UTC", "+02:00" or "Europe/Paris")
timezone = "UTC"

# Field time windows and buckets apply to
time_field = "timestamp"

# Fields listed first in results
default_columns = ["timestamp", "severity", "message"]

[dataset]
# JSON (array or one object per line) or CSV file
path = "./events.json"

# Logical fields searching several physical fields
# [[translations]]
# field = "source"
# paths = ["events.src_ip", "events.src_host"]
# transform = "lowercase"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty, json
format = "pretty"

# Optional log file (logs to stderr when unset)
# file = "/var/log/datasearch.log"
"#
    .to_string()
}

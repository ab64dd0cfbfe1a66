//! ragdb Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with sensible defaults for development (in-memory backend).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::{DistanceMetric, RagDbError};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Vector backend selection and options
    pub database: VectorDbConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|message| ConfigError::ParseError { path, message })
    }

    fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())?;
        Ok(self)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let database = &mut self.database;

        if let Some(provider) = lookup("VECTOR_DB_PROVIDER") {
            database.provider = provider;
        }
        if let Some(dimension) = lookup("VECTOR_DIMENSION") {
            let parsed = dimension
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "VECTOR_DIMENSION".to_string(),
                    value: dimension.clone(),
                })?;
            database.options.dimension = Some(parsed);
        }
        if let Some(metric) = lookup("VECTOR_METRIC") {
            database.options.metric = Some(metric.parse()?);
        }
        if let Some(path) = lookup("VECTOR_STORE_PATH") {
            database.options.path = Some(PathBuf::from(path));
        }

        // Qdrant
        if let Some(url) = lookup("QDRANT_URL") {
            database.options.url = Some(url);
        }
        if let Some(collection) = lookup("QDRANT_COLLECTION") {
            database.options.collection = Some(collection);
        }
        if let Some(key) = lookup("QDRANT_API_KEY") {
            database.options.api_key = Some(key);
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.json_format = format.eq_ignore_ascii_case("json");
        }

        Ok(())
    }
}

/// Backend selection: which adapter to build and how
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    /// Registered provider name (e.g. "memory", "qdrant")
    pub provider: String,

    /// Backend-specific settings
    pub options: AdapterOptions,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            provider: "memory".to_string(),
            options: AdapterOptions::default(),
        }
    }
}

impl VectorDbConfig {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            options: AdapterOptions::default(),
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.options.dimension = Some(dimension);
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.options.metric = Some(metric);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.path = Some(path.into());
        self
    }
}

/// Options passed to an adapter at construction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterOptions {
    /// Embedding length; adapters fall back to `DEFAULT_DIMENSION`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,

    /// Similarity metric
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<DistanceMetric>,

    /// Backend endpoint URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Collection / table name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    /// Backend API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Local storage path for file-backed adapters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Anything else, interpreted by the concrete adapter
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl From<ConfigError> for RagDbError {
    fn from(err: ConfigError) -> Self {
        RagDbError::ConfigurationError(err.to_string())
    }
}

//! Configuration management system for mapsync
//!
//! This crate provides layered configuration for mapsync: built-in defaults,
//! an optional YAML/TOML/JSON file and `MAPSYNC__*` environment overrides,
//! merged with the `config` crate and validated before use.
//!
//! # Features
//!
//! - **Multiple formats**: YAML, TOML and JSON configuration files
//! - **Validation**: Repository URLs, extensions, limits and log levels are checked
//! - **Environment overrides**: `MAPSYNC__SYNC__ROOT=/srv/game` style variables
//! - **Defaults**: Values that match the public map repository layout
//!
//! # Examples
//!
//! ```rust,no_run
//! use mapsync_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("mapsync.yaml")
//!     .add_env_prefix("MAPSYNC")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Repository: {}", config.repository.base_url);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use mapsync_types::{
    ChunkSize, ColumnOrder, Concurrency, HashAlgorithm, ReplyMode, RetryConfig, TimeoutConfig,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Default public map repository
pub const DEFAULT_REPOSITORY: &str = "http://ufoai.ninex.info/maps";

/// Branch value that is derived from the local tool version
pub const AUTO_BRANCH: &str = "auto";

/// Main configuration structure for mapsync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the catalog lives
    pub repository: RepositoryConfig,
    /// The local tool whose identity guards the sync
    pub tool: ToolConfig,
    /// Local tree layout and reconciliation behavior
    pub sync: SyncConfig,
    /// Network configuration
    pub network: NetworkConfig,
    /// Console output switches
    pub display: DisplayConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Base URL (`http`, `https`, `file`) or local mirror directory
    pub base_url: String,
    /// Branch segment appended to the base URL, or `auto`
    pub branch: String,
    /// Resource holding the reference tool description
    pub metadata_resource: String,
    /// Resource holding the catalog
    pub catalog_resource: String,
    /// Order of the hash columns in catalog lines
    pub column_order: ColumnOrder,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REPOSITORY.to_string(),
            branch: AUTO_BRANCH.to_string(),
            metadata_resource: "UFO2MAP".to_string(),
            catalog_resource: "MAPS".to_string(),
            column_order: ColumnOrder::default(),
        }
    }
}

/// Local tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Tool identifier; catalog lines with this name are skipped
    pub name: String,
    /// Read the local description from this file instead of running the tool
    pub metadata_file: Option<PathBuf>,
    /// Program to run, defaults to `<root>/<name>`
    pub program: Option<PathBuf>,
    /// Arguments that make the tool print its description
    pub args: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            name: "ufo2map".to_string(),
            metadata_file: None,
            program: None,
            args: vec!["--version".to_string()],
        }
    }
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local tree the catalog names are relative to
    pub root: PathBuf,
    /// Extension of source assets
    pub source_extension: String,
    /// Extension of compiled artifacts
    pub artifact_extension: String,
    /// Extension appended to artifact names for compressed payloads
    pub payload_extension: String,
    /// Digest used for local files
    pub hash_algorithm: HashAlgorithm,
    /// Persist memoized digests here between runs
    pub hash_cache_file: Option<PathBuf>,
    /// Entries evaluated and fetched at the same time
    pub concurrency: Concurrency,
    /// Read size for downloads and hashing
    pub chunk_size: ChunkSize,
    /// Check decoded payloads against the catalog before installing
    pub verify_artifacts: bool,
    /// Report stale entries without fetching them
    pub dry_run: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            source_extension: "map".to_string(),
            artifact_extension: "bsp".to_string(),
            payload_extension: "gz".to_string(),
            hash_algorithm: HashAlgorithm::default(),
            hash_cache_file: None,
            concurrency: Concurrency::default(),
            chunk_size: ChunkSize::default(),
            verify_artifacts: true,
            dry_run: false,
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Connection timeout configuration
    pub timeouts: TimeoutConfig,
    /// Retry configuration for network operations
    pub retry: RetryConfig,
    /// Override for the User-Agent header
    pub user_agent: Option<String>,
}

/// Console output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Show live byte counters while downloading
    pub download_status: bool,
    /// Print a line for every entry that is already up to date
    pub show_up_to_date: bool,
    /// Print a line for every entry whose source is not checked out
    pub show_not_present: bool,
    /// How the tool-mismatch question is answered
    pub reply: ReplyMode,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            download_status: true,
            show_up_to_date: true,
            show_not_present: true,
            reply: ReplyMode::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Also write logs to this file
    pub file: Option<PathBuf>,
    /// Enable JSON formatting
    pub json_format: bool,
    /// Enable colored output
    pub colored_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
            json_format: false,
            colored_output: true,
        }
    }
}

impl Config {
    /// Check every section; called after all sources are merged
    pub fn validate(&self) -> ConfigResult<()> {
        validate_repository(&self.repository)?;

        if self.tool.name.trim().is_empty() {
            return Err(ConfigError::invalid_value("tool.name", "must not be empty"));
        }

        let sync = &self.sync;
        for (key, ext) in [
            ("sync.source_extension", &sync.source_extension),
            ("sync.artifact_extension", &sync.artifact_extension),
            ("sync.payload_extension", &sync.payload_extension),
        ] {
            if ext.is_empty() || ext.contains(['.', '/', '\\']) {
                return Err(ConfigError::invalid_value(
                    key,
                    "must be a bare extension without dots or separators",
                ));
            }
        }
        if sync.source_extension == sync.artifact_extension {
            return Err(ConfigError::validation(
                "Source and artifact extensions must differ",
            ));
        }

        Concurrency::new(sync.concurrency.get())
            .map_err(|e| ConfigError::invalid_value("sync.concurrency", e.as_str()))?;
        ChunkSize::new(sync.chunk_size.get())
            .map_err(|e| ConfigError::invalid_value("sync.chunk_size", e.as_str()))?;

        self.network
            .retry
            .validate()
            .map_err(|e| ConfigError::invalid_value("network.retry", e.as_str()))?;

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(ConfigError::validation(
                "Log level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }
}

fn validate_repository(repository: &RepositoryConfig) -> ConfigResult<()> {
    let base = repository.base_url.trim();
    if base.is_empty() {
        return Err(ConfigError::invalid_value(
            "repository.base_url",
            "must not be empty",
        ));
    }
    if base.contains("://") {
        let parsed = url::Url::parse(base).map_err(|e| {
            ConfigError::invalid_value("repository.base_url", e.to_string().as_str())
        })?;
        if !matches!(parsed.scheme(), "http" | "https" | "file") {
            return Err(ConfigError::invalid_value(
                "repository.base_url",
                "scheme must be http, https or file",
            ));
        }
    }

    let branch = repository.branch.trim();
    if branch.is_empty() || branch.contains(char::is_whitespace) {
        return Err(ConfigError::invalid_value(
            "repository.branch",
            "must be a single path segment or 'auto'",
        ));
    }
    if branch.starts_with('/') || branch.ends_with('/') || branch.split('/').any(|s| s == "..") {
        return Err(ConfigError::invalid_value(
            "repository.branch",
            "must be a relative segment without '..'",
        ));
    }

    for (key, resource) in [
        ("repository.metadata_resource", &repository.metadata_resource),
        ("repository.catalog_resource", &repository.catalog_resource),
    ] {
        if resource.trim().is_empty() {
            return Err(ConfigError::invalid_value(key, "must not be empty"));
        }
    }

    Ok(())
}

//! # dfs-config
//!
//! Configuration management for dfsctl.
//!
//! Loads configuration from:
//! 1. `~/.dfsctl/config.toml` (global)
//! 2. `.dfsctl/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority below CLI flags)

pub mod logging;
pub mod path;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub use path::validate_base_path;

/// Environment variable overriding `storage.base_path`
pub const ENV_BASE_PATH: &str = "DFSCTL_BASE_PATH";
/// Environment variable overriding `storage.blobstore`
pub const ENV_BLOBSTORE: &str = "DFSCTL_BLOBSTORE";
/// Environment variable overriding `storage.s3ng_bucket_path`
pub const ENV_S3NG_BUCKET_PATH: &str = "DFSCTL_S3NG_BUCKET_PATH";
/// Environment variable holding the tracing filter
pub const ENV_LOG: &str = "DFSCTL_LOG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[error("invalid base path {path}: {reason}")]
    InvalidBasePath { path: PathBuf, reason: String },
    #[error("no base path configured (use --basepath or DFSCTL_BASE_PATH)")]
    MissingBasePath,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub revisions: RevisionsConfig,
    pub trash: TrashConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Global config (~/.dfsctl/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::from_file(&global_path)?;
            }
        }

        // 2. Project config (.dfsctl/config.toml)
        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            config.merge(Self::from_file(&project_path)?);
        }

        // 3. Environment
        config.apply_env_overrides();

        Ok(config)
    }

    /// Parse a single config file without merging or env overrides
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.dfsctl/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".dfsctl/config.toml"))
    }

    /// Project config path: ./.dfsctl/config.toml
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".dfsctl/config.toml")
    }

    /// Merge a project config over this one.
    ///
    /// Optional values override when set, plain values override when they
    /// differ from their defaults.
    pub fn merge(&mut self, other: Config) {
        let defaults = Config::default();

        if other.storage.base_path.is_some() {
            self.storage.base_path = other.storage.base_path;
        }
        if other.storage.s3ng_bucket_path.is_some() {
            self.storage.s3ng_bucket_path = other.storage.s3ng_bucket_path;
        }
        if other.storage.blobstore != defaults.storage.blobstore {
            self.storage.blobstore = other.storage.blobstore;
        }
        if other.revisions.dry_run != defaults.revisions.dry_run {
            self.revisions.dry_run = other.revisions.dry_run;
        }
        if other.revisions.verbose != defaults.revisions.verbose {
            self.revisions.verbose = other.revisions.verbose;
        }
        if other.revisions.strategy != defaults.revisions.strategy {
            self.revisions.strategy = other.revisions.strategy;
        }
        if other.trash.dry_run != defaults.trash.dry_run {
            self.trash.dry_run = other.trash.dry_run;
        }
        if other.log.level != defaults.log.level {
            self.log.level = other.log.level;
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_BASE_PATH).filter(|v| !v.is_empty()) {
            self.storage.base_path = Some(PathBuf::from(path));
        }
        if let Some(kind) = lookup(ENV_BLOBSTORE).filter(|v| !v.is_empty()) {
            self.storage.blobstore = kind;
        }
        if let Some(path) = lookup(ENV_S3NG_BUCKET_PATH).filter(|v| !v.is_empty()) {
            self.storage.s3ng_bucket_path = Some(PathBuf::from(path));
        }
    }

    /// Resolve the storage base path, preferring an explicit value.
    pub fn base_path(&self, explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let candidate = match explicit {
            Some(p) => p.to_path_buf(),
            None => self
                .storage
                .base_path
                .clone()
                .ok_or(ConfigError::MissingBasePath)?,
        };
        validate_base_path(path::expand_home(&candidate))
    }

    /// Render the effective config as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the decomposed filesystem (contains `spaces/`)
    pub base_path: Option<PathBuf>,
    /// Blobstore flavour: ocis, s3ng or none
    pub blobstore: String,
    /// Local mount of the s3ng bucket
    pub s3ng_bucket_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: None,
            blobstore: "ocis".to_string(),
            s3ng_bucket_path: None,
        }
    }
}

/// Revision purge defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevisionsConfig {
    /// Only report what would be deleted
    pub dry_run: bool,
    /// Print one line per purged entry
    pub verbose: bool,
    /// Traversal strategy: glob, walk or list
    pub strategy: String,
}

impl Default for RevisionsConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            verbose: false,
            strategy: "glob".to_string(),
        }
    }
}

/// Trash purge defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrashConfig {
    /// Only report abandoned trash entries
    pub dry_run: bool,
}

impl Default for TrashConfig {
    fn default() -> Self {
        Self { dry_run: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default tracing level when no filter env var is set
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

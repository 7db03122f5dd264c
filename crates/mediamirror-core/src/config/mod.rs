//! Configuration management for MediaMirror.
//!
//! Configuration is loaded once at startup from a TOML file (or defaults),
//! overridden by CLI flags, and then frozen behind an `Arc` for the run.
//! All config structs implement `Default`.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for MediaMirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input and output roots
    pub paths: PathsConfig,

    /// Image conversion settings
    pub image: ImageConfig,

    /// Video encoder parameters
    pub video: VideoConfig,

    /// Worker pool sizes
    pub scheduler: SchedulerConfig,

    /// Timeouts and retries
    pub limits: LimitsConfig,

    /// Re-run behavior
    pub idempotency: IdempotencyConfig,

    /// Run report settings
    pub report: ReportConfig,

    /// External tool locations
    pub tools: ToolsConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.mediamirror.mediamirror/config.toml
    /// - Linux: ~/.config/mediamirror/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\mediamirror\config\config.toml
    ///
    /// Falls back to ~/.mediamirror/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "mediamirror", "mediamirror")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".mediamirror").join("config.toml")
            })
    }

    /// Resolved input root (with ~ expansion).
    pub fn input_root(&self) -> PathBuf {
        expand(&self.paths.input_root)
    }

    /// Resolved output root (with ~ expansion).
    pub fn output_root(&self) -> PathBuf {
        expand(&self.paths.output_root)
    }

    /// Resolved log directory (with ~ expansion).
    pub fn log_dir(&self) -> PathBuf {
        expand(&self.logging.dir)
    }

    /// Resolved report path (with ~ expansion), if a report file is configured.
    pub fn report_path(&self) -> Option<PathBuf> {
        self.report.path.as_deref().map(expand)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(&path_str);
    PathBuf::from(expanded.into_owned())
}

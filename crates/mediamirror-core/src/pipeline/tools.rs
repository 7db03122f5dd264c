//! External tool detection.
//!
//! The video pipeline needs `ffmpeg` and `ffprobe`. Both are located once at
//! startup; a missing tool aborts the run before any job is dispatched.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::ToolsConfig;
use crate::error::StartupError;

/// Tool names the video pipeline depends on.
pub const REQUIRED_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Availability information for a tool, as shown by `mediamirror check`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line of `-version` output, if available
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Resolved paths of the external tools.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Toolchain {
    /// Locate every required tool, failing on the first missing one.
    pub fn discover(config: &ToolsConfig) -> Result<Self, StartupError> {
        let require = |name: &str| {
            resolve(name, custom_path(config, name)).ok_or_else(|| {
                StartupError::MissingDependency {
                    tool: name.to_string(),
                }
            })
        };

        let toolchain = Self {
            ffmpeg: require("ffmpeg")?,
            ffprobe: require("ffprobe")?,
        };
        tracing::debug!(
            "Using ffmpeg at {:?}, ffprobe at {:?}",
            toolchain.ffmpeg,
            toolchain.ffprobe
        );
        Ok(toolchain)
    }

    /// Check all required tools without failing, for diagnostics.
    pub async fn check_all(config: &ToolsConfig) -> Vec<ToolInfo> {
        let mut infos = Vec::with_capacity(REQUIRED_TOOLS.len());
        for &name in REQUIRED_TOOLS {
            let info = match resolve(name, custom_path(config, name)) {
                Some(path) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(&path).await,
                    path: Some(path),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            };
            infos.push(info);
        }
        infos
    }
}

fn custom_path<'a>(config: &'a ToolsConfig, name: &str) -> Option<&'a Path> {
    match name {
        "ffmpeg" => config.ffmpeg_path.as_deref(),
        "ffprobe" => config.ffprobe_path.as_deref(),
        _ => None,
    }
}

/// A configured path wins if it exists; otherwise search `PATH`.
fn resolve(name: &str, custom: Option<&Path>) -> Option<PathBuf> {
    match custom {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => {
            tracing::warn!("Configured {} path {:?} does not exist; searching PATH", name, p);
            which::which(name).ok()
        }
        None => which::which(name).ok(),
    }
}

/// First line of `<tool> -version`.
async fn detect_version(path: &Path) -> Option<String> {
    let mut cmd = super::command::ToolCommand::new(path.to_path_buf());
    cmd.arg("-version")
        .timeout(std::time::Duration::from_secs(10));
    let output = cmd.execute().await.ok()?;
    output.stdout.lines().next().map(|l| l.trim().to_string())
}

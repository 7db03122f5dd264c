//! Sub-configuration structs with defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Input and output tree roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the source tree to mirror
    pub input_root: PathBuf,

    /// Root of the mirrored output tree
    pub output_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("Input"),
            output_root: PathBuf::from("Output"),
        }
    }
}

/// Image conversion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Longest side of the output, in pixels. Smaller images are not upscaled.
    pub max_dimension: u32,

    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1920,
            jpeg_quality: 75,
        }
    }
}

/// Video encoder parameters passed to the external encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Video codec name (ffmpeg `-c:v`)
    pub video_codec: String,

    /// Constant rate factor (ffmpeg `-crf`)
    pub constant_rate_factor: u8,

    /// Encoder preset (ffmpeg `-preset`)
    pub preset: String,

    /// Audio codec name (ffmpeg `-c:a`)
    pub audio_codec: String,

    /// Carry container metadata tags through to the output
    pub metadata_passthrough: bool,

    /// Downscale videos whose longest side exceeds `image.max_dimension`
    pub downscale: bool,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            constant_rate_factor: 23,
            preset: "medium".to_string(),
            audio_codec: "aac".to_string(),
            metadata_passthrough: true,
            downscale: true,
        }
    }
}

/// Worker pool sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Concurrent image jobs (CPU-bound)
    pub image_workers: usize,

    /// Concurrent video jobs (each one occupies a full encoder process)
    pub video_workers: usize,

    /// Max discovered files buffered between traversal and dispatch
    pub queue_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            image_workers: 4,
            video_workers: 1,
            queue_size: 256,
        }
    }
}

/// Timeouts and retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Decode + resize + encode budget for one image, in milliseconds
    pub decode_timeout_ms: u64,

    /// Budget for one external encoder invocation, in milliseconds
    pub encode_timeout_ms: u64,

    /// Extra attempts after a failed or timed-out encoder invocation
    pub encode_retries: u32,

    /// Base delay between encoder attempts in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            decode_timeout_ms: 60_000,
            encode_timeout_ms: 3_600_000,
            encode_retries: 1,
            retry_delay_ms: 1000,
        }
    }
}

/// When an existing output counts as "already processed".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipPolicy {
    /// Any existing output is considered current
    #[default]
    Exists,
    /// The output must also carry the source's modification time
    Mtime,
}

impl std::fmt::Display for SkipPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipPolicy::Exists => write!(f, "exists"),
            SkipPolicy::Mtime => write!(f, "mtime"),
        }
    }
}

/// Re-run behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    pub skip_policy: SkipPolicy,
}

/// Run report settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Write one JSON line per source file to this path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Overrides for external tool locations. Unset tools are looked up on `PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffprobe_path: Option<PathBuf>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,

    /// Also write a per-run log file into `dir`
    pub file: bool,

    /// Directory for log files
    pub dir: PathBuf,

    /// Compress and expire old log files at startup
    pub maintenance: bool,

    /// Gzip log files older than this many days
    pub compress_after_days: u32,

    /// Delete log files older than this many days
    pub retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: false,
            dir: PathBuf::from("~/.mediamirror/logs"),
            maintenance: false,
            compress_after_days: 7,
            retention_days: 180,
        }
    }
}

//! Error types for the MediaMirror conversion pipeline.
//!
//! Errors are split by blast radius: [`StartupError`] and [`ConfigError`]
//! abort a run before any job is dispatched, while [`PipelineError`] is
//! scoped to a single file and is turned into a `Failed` outcome at the job
//! boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for MediaMirror operations.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Conditions that make the whole run impossible
    #[error("Startup error: {0}")]
    Startup(#[from] StartupError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Fatal conditions detected before (or promoted during) a run.
#[derive(Error, Debug)]
pub enum StartupError {
    /// A required external tool is not installed
    #[error("Missing dependency: {tool} not found; is it installed and in PATH?")]
    MissingDependency { tool: String },

    /// The input root cannot be listed
    #[error("Input root {path} is not readable: {message}")]
    InputUnreadable { path: PathBuf, message: String },

    /// The output root cannot be created or written
    #[error("Output root {path} is not writable: {message}")]
    OutputUnwritable { path: PathBuf, message: String },

    /// Input and output roots overlap, so the run would re-ingest its own output
    #[error("Input root {input} and output root {output} overlap")]
    OverlappingRoots { input: PathBuf, output: PathBuf },
}

/// Per-file pipeline errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Source could not be decoded (corrupt, truncated, unsupported variant)
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Re-encoding or the external encoder failed
    #[error("Encode error for {path}: {message}")]
    Encode { path: PathBuf, message: String },

    /// Metadata or timestamps could not be written to the output
    #[error("Metadata write failed for {path}: {message}")]
    MetadataWrite { path: PathBuf, message: String },

    /// Filesystem error while reading the source or writing the output
    #[error("IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Operation timed out
    #[error("Timeout in {stage} stage for {path} after {timeout_ms}ms")]
    Timeout {
        path: PathBuf,
        stage: String,
        timeout_ms: u64,
    },

    /// Extension is not one the classifier maps to a pipeline
    #[error("Unsupported format for {path}: {format}")]
    UnsupportedFormat { path: PathBuf, format: String },
}

/// Failures of an external tool invocation (ffmpeg, ffprobe).
#[derive(Error, Debug)]
pub enum ToolError {
    /// The process could not be started
    #[error("{tool}: failed to spawn: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited unsuccessfully
    #[error("{tool} exited with status {status}: {stderr}")]
    Failed {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// The process did not finish in time and was killed
    #[error("{tool} timed out after {timeout_ms}ms")]
    TimedOut { tool: String, timeout_ms: u64 },

    /// Waiting on the process failed
    #[error("{tool}: I/O error waiting for process: {source}")]
    Wait {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Map a failed encoder invocation onto the per-file taxonomy.
    pub fn from_tool(path: impl Into<PathBuf>, stage: &str, err: ToolError) -> Self {
        match err {
            ToolError::TimedOut { timeout_ms, .. } => Self::Timeout {
                path: path.into(),
                stage: stage.to_string(),
                timeout_ms,
            },
            other => Self::Encode {
                path: path.into(),
                message: other.to_string(),
            },
        }
    }

    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable name of the error kind, used in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::Encode { .. } => "encode",
            Self::MetadataWrite { .. } => "metadata_write",
            Self::Io { .. } => "io",
            Self::Timeout { .. } => "timeout",
            Self::UnsupportedFormat { .. } => "unsupported_format",
        }
    }
}

/// Convenience type alias for MediaMirror results.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_kind() {
        let err = PipelineError::Decode {
            path: PathBuf::from("a.png"),
            message: "bad header".into(),
        };
        assert_eq!(err.kind(), "decode");

        let err = PipelineError::io("b.jpg", std::io::Error::other("disk full"));
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_missing_dependency_message() {
        let err = StartupError::MissingDependency {
            tool: "ffmpeg".into(),
        };
        assert!(err.to_string().contains("ffmpeg not found"));
    }

    #[test]
    fn test_tool_timeout_maps_to_timeout() {
        let err = ToolError::TimedOut {
            tool: "ffmpeg".into(),
            timeout_ms: 500,
        };
        let err = PipelineError::from_tool("clip.mov", "encode", err);
        assert_eq!(err.kind(), "timeout");
        assert!(err.to_string().contains("encode stage"));
    }

}

//! Core data types for the MediaMirror conversion pipeline.
//!
//! A [`MediaFile`] is produced by traversal, wrapped into a [`ConversionJob`]
//! by the scheduler, and ends in exactly one [`Outcome`], which the reporter
//! turns into a [`FileRecord`] and folds into the [`RunSummary`].

use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::Config;

/// Media kind assigned by the classifier from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaKind {
    /// Already JPEG; still resized and re-encoded
    ImageDirect,
    /// Raster formats the standard decoder reads (PNG, TIFF, WebP, BMP)
    ImageConvertible,
    /// Camera RAW (ARW, NEF)
    Raw,
    /// HEIC/HEIF container
    Heic,
    /// Already MP4; still re-encoded with the configured parameters
    VideoDirect,
    /// Other containers (MOV, AVI, MKV, WMV, MTS)
    VideoConvertible,
    /// Anything else; never opened
    Unsupported,
}

/// Which conversion pipeline handles a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Image,
    Video,
}

/// Decoder variant for image kinds, selected once at classification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoderKind {
    /// Common raster formats via the `image` crate
    Standard,
    /// Camera RAW formats
    Raw,
    /// HEIC/HEIF
    Heic,
}

impl MediaKind {
    /// Pipeline that converts this kind, or `None` for unsupported files.
    pub fn pipeline(self) -> Option<PipelineKind> {
        match self {
            MediaKind::ImageDirect | MediaKind::ImageConvertible | MediaKind::Raw | MediaKind::Heic => {
                Some(PipelineKind::Image)
            }
            MediaKind::VideoDirect | MediaKind::VideoConvertible => Some(PipelineKind::Video),
            MediaKind::Unsupported => None,
        }
    }

    /// Decoder for image kinds.
    pub fn decoder(self) -> Option<DecoderKind> {
        match self {
            MediaKind::ImageDirect | MediaKind::ImageConvertible => Some(DecoderKind::Standard),
            MediaKind::Raw => Some(DecoderKind::Raw),
            MediaKind::Heic => Some(DecoderKind::Heic),
            _ => None,
        }
    }

    /// Extension of the output file (without the dot).
    pub fn target_extension(self) -> Option<&'static str> {
        self.pipeline().map(|p| match p {
            PipelineKind::Image => "jpg",
            PipelineKind::Video => "mp4",
        })
    }

    /// Stable name used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::ImageDirect => "image-direct",
            MediaKind::ImageConvertible => "image-convertible",
            MediaKind::Raw => "raw",
            MediaKind::Heic => "heic",
            MediaKind::VideoDirect => "video-direct",
            MediaKind::VideoConvertible => "video-convertible",
            MediaKind::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filesystem timestamps captured from a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTimestamps {
    pub modified: SystemTime,
    pub accessed: Option<SystemTime>,
    /// Not every platform/filesystem reports a birth time
    pub created: Option<SystemTime>,
}

impl FileTimestamps {
    /// Read timestamps from file metadata.
    ///
    /// Falls back to the Unix epoch when the platform cannot report an mtime.
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            accessed: meta.accessed().ok(),
            created: meta.created().ok(),
        }
    }
}

/// A source file discovered during traversal.
#[derive(Debug, Clone)]
pub struct MediaFile {
    /// Absolute (or input-root-joined) path to the source
    pub path: PathBuf,
    /// Path relative to the input root
    pub relative_path: PathBuf,
    /// Classified media kind
    pub kind: MediaKind,
    /// File size in bytes
    pub size: u64,
    /// Source timestamps, captured before any conversion
    pub timestamps: FileTimestamps,
}

/// One unit of work: a source file, where its output goes, and how.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub file: MediaFile,
    /// Final output path under the output root
    pub output_path: PathBuf,
    pub pipeline: PipelineKind,
    /// Shared, frozen run configuration
    pub config: Arc<Config>,
}

/// Terminal state of one source file.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Output written; non-fatal metadata problems are listed as warnings
    Converted {
        output: PathBuf,
        warnings: Vec<String>,
    },
    /// Extension not handled by any pipeline
    SkippedUnsupported,
    /// Output already exists and is current
    SkippedAlreadyProcessed { output: PathBuf },
    /// Per-file failure; siblings are unaffected
    Failed { kind: String, reason: String },
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Converted { .. } => OutcomeKind::Converted,
            Outcome::SkippedUnsupported => OutcomeKind::SkippedUnsupported,
            Outcome::SkippedAlreadyProcessed { .. } => OutcomeKind::SkippedAlreadyProcessed,
            Outcome::Failed { .. } => OutcomeKind::Failed,
        }
    }
}

/// Discriminant of [`Outcome`], as written to the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Converted,
    SkippedUnsupported,
    SkippedAlreadyProcessed,
    Failed,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeKind::Converted => write!(f, "converted"),
            OutcomeKind::SkippedUnsupported => write!(f, "skipped_unsupported"),
            OutcomeKind::SkippedAlreadyProcessed => write!(f, "skipped_already_processed"),
            OutcomeKind::Failed => write!(f, "failed"),
        }
    }
}

/// One line of the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Source path relative to the input root
    pub relative_path: PathBuf,

    /// Classified media kind
    pub media_kind: MediaKind,

    pub outcome: OutcomeKind,

    /// Output path, for converted and already-processed files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Error kind for failures ("decode", "encode", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    /// Failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Non-fatal problems (dropped tags, unset timestamps)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,

    /// Source size in bytes
    pub size: u64,
}

impl FileRecord {
    /// Build a report record from a file and its outcome.
    pub fn new(file: &MediaFile, outcome: &Outcome) -> Self {
        let (output, error_kind, reason, warnings) = match outcome {
            Outcome::Converted { output, warnings } => {
                (Some(output.clone()), None, None, warnings.clone())
            }
            Outcome::SkippedUnsupported => (None, None, None, vec![]),
            Outcome::SkippedAlreadyProcessed { output } => (Some(output.clone()), None, None, vec![]),
            Outcome::Failed { kind, reason } => {
                (None, Some(kind.clone()), Some(reason.clone()), vec![])
            }
        };
        Self {
            relative_path: file.relative_path.clone(),
            media_kind: file.kind,
            outcome: outcome.kind(),
            output,
            error_kind,
            reason,
            warnings,
            size: file.size,
        }
    }
}

/// Aggregate counts for a run.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RunSummary {
    pub converted: usize,
    pub skipped_unsupported: usize,
    pub skipped_already_processed: usize,
    pub failed: usize,

    /// Converted files that finished with warnings
    pub with_warnings: usize,

    /// Bytes of source data that went through a pipeline
    pub input_bytes: u64,

    /// Wall-clock duration of the run in seconds
    pub total_seconds: f64,
}

impl RunSummary {
    /// Total number of files that reached a terminal outcome.
    pub fn total(&self) -> usize {
        self.converted + self.skipped_unsupported + self.skipped_already_processed + self.failed
    }
}

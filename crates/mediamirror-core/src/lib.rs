//! MediaMirror Core - batch media conversion library.
//!
//! MediaMirror walks an input tree of photos and videos and writes a
//! mirrored tree of lightweight viewing copies: images become size-capped
//! JPEGs and videos become H.264 MP4s. Capture dates, filesystem timestamps
//! and permissions follow each file across.
//!
//! # Architecture
//!
//! ```text
//! Walk → Classify → Claim output → Skip if current → Image/Video pool → Preserve → Report
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use mediamirror_core::{Config, MediaMirror, Reporter, TracingSink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> mediamirror_core::Result<()> {
//!     let mirror = MediaMirror::new(Config::load()?)?;
//!     let reporter = Arc::new(Reporter::default().with_sink(Box::new(TracingSink)));
//!
//!     let summary = mirror.run(reporter).await?;
//!     println!("Converted {} files", summary.converted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod types;

pub use config::Config;
pub use error::{
    ConfigError, MirrorError, PipelineError, PipelineResult, Result, StartupError, ToolError,
};
pub use output::{OutputFormat, OutputWriter};
pub use pipeline::{DecoderSet, Scheduler, ToolInfo, Toolchain};
pub use report::{JsonlSink, ReportSink, Reporter, TracingSink};
pub use types::{FileRecord, MediaFile, MediaKind, Outcome, OutcomeKind, RunSummary};

use std::sync::Arc;
use std::time::Duration;

use pipeline::{FfmpegEncoder, FfprobeProbe};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// MediaMirror runner - the main entry point for a conversion run.
///
/// Construction validates the configuration and locates the external tools,
/// so everything that can fail before the first file is touched fails here.
pub struct MediaMirror {
    config: Arc<Config>,
    toolchain: Toolchain,
}

impl MediaMirror {
    /// Create a runner from a finished configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let toolchain = Toolchain::discover(&config.tools)?;
        tracing::debug!("Initializing MediaMirror v{}", VERSION);
        Ok(Self {
            config: Arc::new(config),
            toolchain,
        })
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolved ffmpeg/ffprobe paths.
    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Build a scheduler wired to the real ffmpeg and ffprobe.
    pub fn scheduler(&self, reporter: Arc<Reporter>) -> Scheduler {
        let limits = &self.config.limits;
        let probe = Arc::new(FfprobeProbe::new(
            self.toolchain.ffprobe.clone(),
            Duration::from_millis(limits.decode_timeout_ms),
        ));
        let encoder = Arc::new(FfmpegEncoder::new(
            self.toolchain.ffmpeg.clone(),
            Duration::from_millis(limits.encode_timeout_ms),
        ));
        Scheduler::new(
            Arc::clone(&self.config),
            DecoderSet::default(),
            probe,
            encoder,
            reporter,
        )
    }

    /// Run one full mirror pass, reporting every file to `reporter`.
    pub async fn run(&self, reporter: Arc<Reporter>) -> Result<RunSummary> {
        self.scheduler(reporter).run().await
    }
}

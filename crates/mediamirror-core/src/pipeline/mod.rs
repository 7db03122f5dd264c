//! Conversion pipeline components.
//!
//! - **classify** / **discovery**: find source files and assign a media kind
//! - **layout**: mirrored output paths and collision handling
//! - **resize**: the dimension ceiling
//! - **validate** / **decode** / **metadata** / **image**: the image pipeline
//! - **probe** / **encoder** / **command** / **tools** / **video**: the video
//!   pipeline and its external tools
//! - **preserve**: capture dates, timestamps and permissions
//! - **idempotency**: skip outputs that are already current
//! - **scheduler** / **channel** / **retry**: worker pools and backpressure

pub mod channel;
pub mod classify;
pub mod command;
pub mod decode;
pub mod discovery;
pub mod encoder;
pub mod idempotency;
pub mod image;
pub mod layout;
pub mod metadata;
pub mod preserve;
pub mod probe;
pub mod resize;
pub mod retry;
pub mod scheduler;
pub mod tools;
pub mod validate;
pub mod video;

#[cfg(test)]
pub(crate) mod fakes;

pub use classify::Classifier;
pub use decode::{DecodedImage, DecoderSet, ImageDecode};
pub use discovery::FileDiscovery;
pub use encoder::{EncodeParams, FfmpegEncoder, VideoEncoder};
pub use idempotency::IdempotencyChecker;
pub use self::image::ImagePipeline;
pub use layout::OutputLayout;
pub use metadata::{MetadataBundle, MetadataExtractor};
pub use preserve::Preserver;
pub use probe::{ContainerMetadata, FfprobeProbe, MediaProbe};
pub use resize::ResizeSpec;
pub use scheduler::Scheduler;
pub use tools::{ToolInfo, Toolchain};
pub use video::VideoPipeline;

use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};

/// What a pipeline hands to the preserver.
#[derive(Debug, Clone)]
pub struct Conversion {
    /// Final output path
    pub output: PathBuf,
    /// Capture date read from the source, to verify in the output
    pub capture_date: Option<String>,
    /// Non-fatal problems so far
    pub warnings: Vec<String>,
}

/// Hidden sibling of `output` used while it is being written.
pub fn partial_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".{name}.partial"))
}

/// Write `bytes` to a temporary sibling, then rename it over `output`.
///
/// Readers never observe a half-written output; a crash leaves at most a
/// `.partial` file behind.
pub async fn write_atomic(output: &Path, bytes: &[u8]) -> PipelineResult<()> {
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::io(parent, e))?;
    }
    let partial = partial_path(output);
    if let Err(e) = tokio::fs::write(&partial, bytes).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(PipelineError::io(&partial, e));
    }
    commit(&partial, output).await
}

/// Move a finished temporary file into place.
pub async fn commit(partial: &Path, output: &Path) -> PipelineResult<()> {
    if let Err(e) = tokio::fs::rename(partial, output).await {
        let _ = tokio::fs::remove_file(partial).await;
        return Err(PipelineError::io(output, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        assert_eq!(
            partial_path(Path::new("/out/2023/clip.mp4")),
            PathBuf::from("/out/2023/.clip.mp4.partial")
        );
    }

    #[tokio::test]
    async fn test_write_atomic_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("a/b/c.jpg");
        write_atomic(&output, b"jpeg").await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"jpeg");
        assert!(!partial_path(&output).exists());
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("c.jpg");
        std::fs::write(&output, b"old").unwrap();
        write_atomic(&output, b"new").await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"new");
    }
}

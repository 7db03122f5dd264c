//! In-process stand-ins for ffmpeg and ffprobe.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::encoder::{EncodeParams, VideoEncoder};
use super::probe::{ContainerMetadata, MediaProbe, CREATION_TIME_TAG};
use crate::error::{PipelineError, PipelineResult};

/// Returns the same metadata for every path, except files with the
/// `unreadable` extension, which fail like a damaged container.
pub struct FakeProbe {
    metadata: ContainerMetadata,
    unreadable: Option<&'static str>,
    pub calls: AtomicUsize,
}

impl FakeProbe {
    pub const CREATION_TIME: &'static str = "2023-06-01T10:00:00.000000Z";

    pub fn new(metadata: ContainerMetadata) -> Self {
        Self {
            metadata,
            unreadable: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every probe of a file with this extension.
    pub fn unreadable(mut self, extension: &'static str) -> Self {
        self.unreadable = Some(extension);
        self
    }

    /// A phone clip with a creation time.
    pub fn quicktime(width: u32, height: u32) -> Self {
        let mut metadata = ContainerMetadata {
            width: Some(width),
            height: Some(height),
            duration_secs: Some(3.0),
            ..Default::default()
        };
        metadata
            .tags
            .insert(CREATION_TIME_TAG.to_string(), Self::CREATION_TIME.to_string());
        Self::new(metadata)
    }
}

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn probe(&self, path: &Path) -> PipelineResult<ContainerMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let extension = path.extension().and_then(|e| e.to_str());
        if extension.is_some() && extension == self.unreadable {
            return Err(PipelineError::Decode {
                path: path.to_path_buf(),
                message: "moov atom not found".to_string(),
            });
        }
        Ok(self.metadata.clone())
    }
}

/// What one successful encode was asked to do.
#[derive(Debug, Clone)]
pub struct EncodeCall {
    pub input: PathBuf,
    pub codec: String,
    pub crf: u8,
    pub scale: Option<(u32, u32)>,
}

/// Writes a placeholder file instead of transcoding.
#[derive(Default)]
pub struct FakeEncoder {
    /// Number of leading attempts that fail with an encode error
    fail_first: usize,
    pub attempts: AtomicUsize,
    pub encodes: Mutex<Vec<EncodeCall>>,
    pub stamps: Mutex<Vec<(PathBuf, String)>>,
}

impl FakeEncoder {
    pub fn failing(fail_first: usize) -> Self {
        Self {
            fail_first,
            ..Default::default()
        }
    }

    pub fn encode_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoEncoder for FakeEncoder {
    async fn encode(
        &self,
        input: &Path,
        output: &Path,
        params: EncodeParams<'_>,
        _metadata: &ContainerMetadata,
    ) -> PipelineResult<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(PipelineError::Encode {
                path: input.to_path_buf(),
                message: "ffmpeg exited with status exit status: 1".to_string(),
            });
        }
        tokio::fs::write(output, b"\0\0\0\x18ftypisom fake mp4")
            .await
            .map_err(|e| PipelineError::io(output, e))?;
        self.encodes.lock().unwrap().push(EncodeCall {
            input: input.to_path_buf(),
            codec: params.video.video_codec.clone(),
            crf: params.video.constant_rate_factor,
            scale: params.scale,
        });
        Ok(())
    }

    async fn set_creation_time(&self, path: &Path, creation_time: &str) -> PipelineResult<()> {
        self.stamps
            .lock()
            .unwrap()
            .push((path.to_path_buf(), creation_time.to_string()));
        Ok(())
    }
}

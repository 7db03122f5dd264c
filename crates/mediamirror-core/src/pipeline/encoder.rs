//! The external video encoder.
//!
//! The video pipeline talks to the encoder through the narrow
//! [`VideoEncoder`] trait, so tests can substitute a fake and count calls.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::command::ToolCommand;
use super::probe::{ContainerMetadata, CREATION_TIME_TAG};
use crate::config::VideoConfig;
use crate::error::{PipelineError, PipelineResult};

/// Codec parameters for one encode.
#[derive(Debug, Clone, Copy)]
pub struct EncodeParams<'a> {
    pub video: &'a VideoConfig,
    /// Target frame size, when the source exceeds the dimension ceiling
    pub scale: Option<(u32, u32)>,
}

/// Transcodes video files. Implementations write exactly to `output`.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Transcode `input` into an MP4 at `output`.
    async fn encode(
        &self,
        input: &Path,
        output: &Path,
        params: EncodeParams<'_>,
        metadata: &ContainerMetadata,
    ) -> PipelineResult<()>;

    /// Rewrite the container-level creation time of an existing MP4
    /// without re-encoding.
    async fn set_creation_time(&self, path: &Path, creation_time: &str) -> PipelineResult<()>;
}

/// [`VideoEncoder`] backed by the `ffmpeg` CLI.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg_path: PathBuf,
    timeout: Duration,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            timeout,
        }
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(
        &self,
        input: &Path,
        output: &Path,
        params: EncodeParams<'_>,
        metadata: &ContainerMetadata,
    ) -> PipelineResult<()> {
        let mut cmd = ToolCommand::new(self.ffmpeg_path.clone());
        cmd.args(encode_args(input, output, params, metadata))
            .timeout(self.timeout);
        cmd.execute()
            .await
            .map_err(|e| PipelineError::from_tool(input, "encode", e))?;
        Ok(())
    }

    async fn set_creation_time(&self, path: &Path, creation_time: &str) -> PipelineResult<()> {
        let remuxed = super::partial_path(path);
        let mut cmd = ToolCommand::new(self.ffmpeg_path.clone());
        cmd.args(stamp_args(path, &remuxed, creation_time))
            .timeout(self.timeout);

        let result = cmd.execute().await;
        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&remuxed).await;
            return Err(PipelineError::MetadataWrite {
                path: path.to_path_buf(),
                message: format!("remux failed: {e}"),
            });
        }
        tokio::fs::rename(&remuxed, path)
            .await
            .map_err(|e| PipelineError::MetadataWrite {
                path: path.to_path_buf(),
                message: format!("cannot replace remuxed file: {e}"),
            })
    }
}

/// Arguments for a full transcode.
pub fn encode_args(
    input: &Path,
    output: &Path,
    params: EncodeParams<'_>,
    metadata: &ContainerMetadata,
) -> Vec<String> {
    let video = params.video;
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-c:v".into(),
        video.video_codec.clone(),
        "-crf".into(),
        video.constant_rate_factor.to_string(),
        "-preset".into(),
        video.preset.clone(),
        "-c:a".into(),
        video.audio_codec.clone(),
    ];

    if let Some((width, height)) = params.scale {
        args.push("-vf".into());
        args.push(format!("scale={width}:{height}"));
    }

    if video.metadata_passthrough {
        args.extend(["-map_metadata".into(), "0".into()]);
        args.extend(["-movflags".into(), "use_metadata_tags".into()]);
        if let Some(creation_time) = metadata.creation_time() {
            args.push("-metadata".into());
            args.push(format!("{CREATION_TIME_TAG}={creation_time}"));
        }
    }

    args.extend(["-f".into(), "mp4".into()]);
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Arguments for a stream-copy remux that only sets `creation_time`.
fn stamp_args(input: &Path, output: &Path, creation_time: &str) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-map".into(),
        "0".into(),
        "-c".into(),
        "copy".into(),
        "-map_metadata".into(),
        "0".into(),
        "-movflags".into(),
        "use_metadata_tags".into(),
        "-metadata".into(),
        format!("{CREATION_TIME_TAG}={creation_time}"),
        "-f".into(),
        "mp4".into(),
        output.to_string_lossy().into_owned(),
    ]
}

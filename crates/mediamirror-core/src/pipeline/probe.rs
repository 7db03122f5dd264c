//! Container metadata probing.
//!
//! [`FfprobeProbe`] shells out to
//! `ffprobe -v quiet -print_format json -show_format -show_streams` and maps
//! the JSON into [`ContainerMetadata`].

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::command::ToolCommand;
use crate::error::{PipelineError, PipelineResult};

/// Container-level tag holding the capture date.
pub const CREATION_TIME_TAG: &str = "creation_time";

/// What the video pipeline needs to know about a container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerMetadata {
    /// Width of the first video stream
    pub width: Option<u32>,
    /// Height of the first video stream
    pub height: Option<u32>,
    pub duration_secs: Option<f64>,
    /// Container-level tags (creation_time, location, make, ...)
    pub tags: BTreeMap<String, String>,
}

impl ContainerMetadata {
    /// Capture date as stored in the container.
    pub fn creation_time(&self) -> Option<&str> {
        self.tags.get(CREATION_TIME_TAG).map(String::as_str)
    }

    /// Video dimensions, if both are known and non-zero.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }
}

/// Reads container metadata from a media file.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> PipelineResult<ContainerMetadata>;
}

/// A probe backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeProbe {
    pub fn new(ffprobe_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffprobe_path,
            timeout,
        }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> PipelineResult<ContainerMetadata> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path.to_string_lossy())
        .timeout(self.timeout);

        let output = cmd.execute().await.map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("probe failed: {e}"),
        })?;
        parse_ffprobe_json(&output.stdout).map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("ffprobe JSON parse error: {e}"),
        })
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// Parse `ffprobe` JSON output.
///
/// Tag keys are lowercased (QuickTime files report `creation_time`, some
/// muxers `CREATION_TIME`). If the container has no `creation_time`, the
/// first stream that has one supplies it.
pub fn parse_ffprobe_json(json: &str) -> Result<ContainerMetadata, serde_json::Error> {
    let output: FfprobeOutput = serde_json::from_str(json)?;

    let mut tags: BTreeMap<String, String> = output
        .format
        .tags
        .into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v))
        .collect();

    if !tags.contains_key(CREATION_TIME_TAG) {
        let stream_time = output.streams.iter().find_map(|s| {
            s.tags
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(CREATION_TIME_TAG))
                .map(|(_, v)| v.clone())
        });
        if let Some(time) = stream_time {
            tags.insert(CREATION_TIME_TAG.to_string(), time);
        }
    }

    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    Ok(ContainerMetadata {
        width: video.and_then(|s| s.width),
        height: video.and_then(|s| s.height),
        duration_secs: output.format.duration.and_then(|d| d.parse().ok()),
        tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOV_JSON: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "audio", "codec_name": "aac"},
            {"index": 1, "codec_type": "video", "codec_name": "hevc",
             "width": 3840, "height": 2160,
             "tags": {"creation_time": "2023-06-01T10:00:00.000000Z"}}
        ],
        "format": {
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "12.345000",
            "tags": {
                "major_brand": "qt  ",
                "creation_time": "2023-06-01T10:00:00.000000Z",
                "com.apple.quicktime.make": "Apple"
            }
        }
    }"#;

    #[test]
    fn test_parse_quicktime() {
        let meta = parse_ffprobe_json(MOV_JSON).unwrap();
        assert_eq!(meta.dimensions(), Some((3840, 2160)));
        assert_eq!(meta.creation_time(), Some("2023-06-01T10:00:00.000000Z"));
        assert_eq!(meta.duration_secs, Some(12.345));
        assert_eq!(
            meta.tags.get("com.apple.quicktime.make").map(String::as_str),
            Some("Apple")
        );
    }

    #[test]
    fn test_creation_time_falls_back_to_stream() {
        let json = r#"{
            "streams": [{"codec_type": "video", "width": 640, "height": 480,
                         "tags": {"CREATION_TIME": "2019-01-01T00:00:00Z"}}],
            "format": {}
        }"#;
        let meta = parse_ffprobe_json(json).unwrap();
        assert_eq!(meta.creation_time(), Some("2019-01-01T00:00:00Z"));
    }

    #[test]
    fn test_missing_video_stream_has_no_dimensions() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {"tags": {}}}"#;
        let meta = parse_ffprobe_json(json).unwrap();
        assert_eq!(meta.dimensions(), None);
        assert_eq!(meta.creation_time(), None);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(parse_ffprobe_json("not json").is_err());
    }
}

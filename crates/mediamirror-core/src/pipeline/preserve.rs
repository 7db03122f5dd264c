//! Carries capture dates and filesystem timestamps from source to output.
//!
//! Runs last on every successful job. Nothing here fails a job: problems
//! are returned as warnings and the converted file is kept.

use std::fs::{File, FileTimes};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use super::encoder::VideoEncoder;
use super::metadata::{capture_date_payload, embed_exif, MetadataExtractor};
use super::probe::MediaProbe;
use super::{write_atomic, Conversion};
use crate::error::{PipelineError, PipelineResult};
use crate::types::{ConversionJob, FileTimestamps, PipelineKind};

/// Verifies the capture date and copies timestamps and permissions.
pub struct Preserver {
    probe: Arc<dyn MediaProbe>,
    encoder: Arc<dyn VideoEncoder>,
}

impl Preserver {
    pub fn new(probe: Arc<dyn MediaProbe>, encoder: Arc<dyn VideoEncoder>) -> Self {
        Self { probe, encoder }
    }

    /// Finish a converted file. Returns warnings for anything that could
    /// not be preserved.
    pub async fn preserve(&self, job: &ConversionJob, conversion: &Conversion) -> Vec<String> {
        let mut warnings = Vec::new();

        // Re-injection rewrites the file, so it goes before the timestamps
        if let Some(date) = &conversion.capture_date {
            let result = match job.pipeline {
                PipelineKind::Image => self.ensure_image_date(&conversion.output, date).await,
                PipelineKind::Video => self.ensure_video_date(&conversion.output, date).await,
            };
            if let Err(e) = result {
                tracing::warn!("{}", e);
                warnings.push(e.to_string());
            }
        }

        let output = conversion.output.clone();
        let source = job.file.path.clone();
        let timestamps = job.file.timestamps;
        let result = tokio::task::spawn_blocking(move || {
            copy_file_attributes(&source, &output, &timestamps)
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!("{}", e);
                warnings.push(e.to_string());
            }
            Err(e) => warnings.push(format!("timestamp task failed: {e}")),
        }

        warnings
    }

    async fn ensure_image_date(&self, output: &Path, date: &str) -> PipelineResult<()> {
        let bytes = tokio::fs::read(output)
            .await
            .map_err(|e| PipelineError::io(output, e))?;
        if MetadataExtractor::read_capture_date(&bytes).as_deref() == Some(date) {
            return Ok(());
        }

        tracing::debug!("Re-injecting capture date into {:?}", output);
        let payload = capture_date_payload(date).map_err(|e| PipelineError::MetadataWrite {
            path: output.to_path_buf(),
            message: e.to_string(),
        })?;
        let stamped = embed_exif(output, &bytes, &payload)?;
        write_atomic(output, &stamped).await
    }

    async fn ensure_video_date(&self, output: &Path, date: &str) -> PipelineResult<()> {
        let current = self.probe.probe(output).await.ok();
        if current.as_ref().and_then(|m| m.creation_time()) == Some(date) {
            return Ok(());
        }

        tracing::debug!("Re-injecting creation_time into {:?}", output);
        self.encoder.set_creation_time(output, date).await
    }
}

/// Copy permissions and timestamps from the source snapshot to the output.
///
/// The modification time is required; access and creation times are best
/// effort. Creation time can only be set on Windows and macOS.
pub fn copy_file_attributes(
    source: &Path,
    output: &Path,
    timestamps: &FileTimestamps,
) -> PipelineResult<()> {
    let metadata_err = |message: String| PipelineError::MetadataWrite {
        path: output.to_path_buf(),
        message,
    };

    let file = File::options()
        .write(true)
        .open(output)
        .map_err(|e| metadata_err(format!("cannot open for timestamp update: {e}")))?;
    file.set_times(file_times(timestamps))
        .map_err(|e| metadata_err(format!("cannot set timestamps: {e}")))?;
    drop(file);

    if timestamps.created.is_some() && cfg!(not(any(windows, target_os = "macos"))) {
        tracing::debug!("Creation time not settable on this platform for {:?}", output);
    }

    // Permissions last: a read-only source would otherwise block the
    // timestamp update
    let permissions = std::fs::metadata(source)
        .map_err(|e| metadata_err(format!("cannot read source permissions: {e}")))?
        .permissions();
    std::fs::set_permissions(output, permissions)
        .map_err(|e| metadata_err(format!("cannot copy permissions: {e}")))?;

    Ok(())
}

fn file_times(timestamps: &FileTimestamps) -> FileTimes {
    let mut times = FileTimes::new().set_modified(timestamps.modified);
    if let Some(accessed) = timestamps.accessed {
        times = times.set_accessed(accessed);
    }
    if let Some(created) = timestamps.created {
        times = with_created(times, created);
    }
    times
}

#[cfg(windows)]
fn with_created(times: FileTimes, created: SystemTime) -> FileTimes {
    use std::os::windows::fs::FileTimesExt;
    times.set_created(created)
}

#[cfg(target_os = "macos")]
fn with_created(times: FileTimes, created: SystemTime) -> FileTimes {
    use std::os::macos::fs::FileTimesExt;
    times.set_created(created)
}

#[cfg(not(any(windows, target_os = "macos")))]
fn with_created(times: FileTimes, _created: SystemTime) -> FileTimes {
    times
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pipeline::fakes::{FakeEncoder, FakeProbe};
    use crate::pipeline::metadata::tests::jpeg_bytes;
    use crate::pipeline::probe::ContainerMetadata;
    use crate::types::{MediaFile, MediaKind};
    use std::path::PathBuf;
    use std::time::Duration;

    fn job(source: &Path, output: &Path, pipeline: PipelineKind) -> ConversionJob {
        let meta = std::fs::metadata(source).unwrap();
        ConversionJob {
            file: MediaFile {
                path: source.to_path_buf(),
                relative_path: PathBuf::from(source.file_name().unwrap()),
                kind: match pipeline {
                    PipelineKind::Image => MediaKind::ImageDirect,
                    PipelineKind::Video => MediaKind::VideoConvertible,
                },
                size: meta.len(),
                timestamps: FileTimestamps::from_metadata(&meta),
            },
            output_path: output.to_path_buf(),
            pipeline,
            config: Arc::new(Config::default()),
        }
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_times(FileTimes::new().set_modified(time).set_accessed(time))
            .unwrap();
    }

    #[tokio::test]
    async fn test_copies_mtime_and_reinjects_image_date() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("IMG.jpg");
        let output = dir.path().join("out.jpg");
        std::fs::write(&source, b"source").unwrap();
        std::fs::write(&output, jpeg_bytes(4, 4)).unwrap();
        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        set_mtime(&source, old);

        let job = job(&source, &output, PipelineKind::Image);
        let conversion = Conversion {
            output: output.clone(),
            capture_date: Some("2023:06:01 10:00:00".into()),
            warnings: vec![],
        };
        let preserver = Preserver::new(
            Arc::new(FakeProbe::new(ContainerMetadata::default())),
            Arc::new(FakeEncoder::default()),
        );
        let warnings = preserver.preserve(&job, &conversion).await;
        assert!(warnings.is_empty(), "{warnings:?}");

        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(
            MetadataExtractor::read_capture_date(&bytes).as_deref(),
            Some("2023:06:01 10:00:00")
        );
        let out_meta = std::fs::metadata(&output).unwrap();
        assert_eq!(out_meta.modified().unwrap(), old);
    }

    #[tokio::test]
    async fn test_video_date_present_needs_no_remux() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.mov");
        let output = dir.path().join("clip.mp4");
        std::fs::write(&source, b"mov").unwrap();
        std::fs::write(&output, b"mp4").unwrap();

        let encoder = Arc::new(FakeEncoder::default());
        let preserver = Preserver::new(Arc::new(FakeProbe::quicktime(640, 480)), encoder.clone());
        let conversion = Conversion {
            output: output.clone(),
            capture_date: Some(FakeProbe::CREATION_TIME.into()),
            warnings: vec![],
        };
        let warnings = preserver
            .preserve(&job(&source, &output, PipelineKind::Video), &conversion)
            .await;
        assert!(warnings.is_empty());
        assert!(encoder.stamps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_video_date_missing_is_reinjected() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.mov");
        let output = dir.path().join("clip.mp4");
        std::fs::write(&source, b"mov").unwrap();
        std::fs::write(&output, b"mp4").unwrap();

        let encoder = Arc::new(FakeEncoder::default());
        let preserver = Preserver::new(
            Arc::new(FakeProbe::new(ContainerMetadata::default())),
            encoder.clone(),
        );
        let conversion = Conversion {
            output: output.clone(),
            capture_date: Some("2021-07-04T12:00:00Z".into()),
            warnings: vec![],
        };
        preserver
            .preserve(&job(&source, &output, PipelineKind::Video), &conversion)
            .await;

        let stamps = encoder.stamps.lock().unwrap();
        assert_eq!(stamps.len(), 1);
        assert_eq!(stamps[0].1, "2021-07-04T12:00:00Z");
    }

    #[tokio::test]
    async fn test_missing_output_is_warning_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.png");
        std::fs::write(&source, b"png").unwrap();
        let output = dir.path().join("vanished.jpg");

        let preserver = Preserver::new(
            Arc::new(FakeProbe::new(ContainerMetadata::default())),
            Arc::new(FakeEncoder::default()),
        );
        let conversion = Conversion {
            output: output.clone(),
            capture_date: None,
            warnings: vec![],
        };
        let warnings = preserver
            .preserve(&job(&source, &output, PipelineKind::Image), &conversion)
            .await;
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Metadata write failed"));
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_are_copied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.png");
        let output = dir.path().join("a.jpg");
        std::fs::write(&source, b"png").unwrap();
        std::fs::write(&output, b"jpg").unwrap();
        std::fs::set_permissions(&source, std::fs::Permissions::from_mode(0o640)).unwrap();

        let meta = std::fs::metadata(&source).unwrap();
        copy_file_attributes(&source, &output, &FileTimestamps::from_metadata(&meta)).unwrap();

        let mode = std::fs::metadata(&output).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }
}

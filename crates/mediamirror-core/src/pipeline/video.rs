//! Video conversion through the external encoder.

use std::sync::Arc;

use super::encoder::{EncodeParams, VideoEncoder};
use super::probe::{ContainerMetadata, MediaProbe};
use super::resize::ResizeSpec;
use super::retry::{backoff_duration, is_retryable};
use super::{commit, partial_path, Conversion};
use crate::error::{PipelineError, PipelineResult};
use crate::types::ConversionJob;

/// Tags every muxer rewrites; their absence in the output is not a loss.
const MUXER_TAGS: &[&str] = &["major_brand", "minor_version", "compatible_brands", "encoder"];

/// Converts one video job into an MP4 at the job's output path.
pub struct VideoPipeline {
    probe: Arc<dyn MediaProbe>,
    encoder: Arc<dyn VideoEncoder>,
}

impl VideoPipeline {
    pub fn new(probe: Arc<dyn MediaProbe>, encoder: Arc<dyn VideoEncoder>) -> Self {
        Self { probe, encoder }
    }

    /// Probe, encode to a temporary sibling, verify, then move into place.
    ///
    /// A source that cannot be probed is encoded at its own resolution with
    /// a warning; only the encoded output must pass the probe.
    pub async fn convert(&self, job: &ConversionJob) -> PipelineResult<Conversion> {
        let source = &job.file.path;
        let config = &job.config;
        let mut warnings = Vec::new();

        // A source ffprobe cannot read is still handed to the encoder as-is
        let metadata = match self.probe.probe(source).await {
            Ok(metadata) => metadata,
            Err(e) => {
                let warning = format!("could not read source stream info: {e}");
                tracing::warn!("{:?}: {}", job.file.relative_path, warning);
                warnings.push(warning);
                ContainerMetadata::default()
            }
        };
        let scale = self.scale_for(job, &metadata, &mut warnings);

        if let Some(parent) = job.output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::io(parent, e))?;
        }

        let partial = partial_path(&job.output_path);
        let params = EncodeParams {
            video: &config.video,
            scale,
        };

        let mut attempt = 0;
        loop {
            match self
                .encoder
                .encode(source, &partial, params, &metadata)
                .await
            {
                Ok(()) => break,
                Err(e) if is_retryable(&e) && attempt < config.limits.encode_retries => {
                    let delay = backoff_duration(attempt, config.limits.retry_delay_ms);
                    tracing::warn!(
                        "Encode attempt {} failed for {:?}, retrying in {:?}: {}",
                        attempt + 1,
                        job.file.relative_path,
                        delay,
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&partial).await;
                    return Err(e);
                }
            }
        }

        // A zero exit status with an unreadable result is still a failed encode
        let encoded = match self.verify(job, &partial).await {
            Ok(encoded) => encoded,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        if config.video.metadata_passthrough {
            let dropped = dropped_tags(&metadata, &encoded);
            if !dropped.is_empty() {
                let warning = format!("container dropped tags: {}", dropped.join(", "));
                tracing::warn!("{:?}: {}", job.file.relative_path, warning);
                warnings.push(warning);
            }
        }

        commit(&partial, &job.output_path).await?;

        Ok(Conversion {
            output: job.output_path.clone(),
            capture_date: metadata.creation_time().map(str::to_string),
            warnings,
        })
    }

    fn scale_for(
        &self,
        job: &ConversionJob,
        metadata: &ContainerMetadata,
        warnings: &mut Vec<String>,
    ) -> Option<(u32, u32)> {
        if !job.config.video.downscale {
            return None;
        }
        match metadata.dimensions() {
            Some((width, height)) => {
                let spec = ResizeSpec::compute_even(width, height, job.config.image.max_dimension);
                spec.needs_resize()
                    .then_some((spec.target_width, spec.target_height))
            }
            None => {
                let warning = "video dimensions unknown; encoding at source resolution".to_string();
                tracing::warn!("{:?}: {}", job.file.relative_path, warning);
                warnings.push(warning);
                None
            }
        }
    }

    async fn verify(
        &self,
        job: &ConversionJob,
        partial: &std::path::Path,
    ) -> PipelineResult<ContainerMetadata> {
        let size = tokio::fs::metadata(partial)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(PipelineError::Encode {
                path: job.file.path.clone(),
                message: "encoder produced no output".to_string(),
            });
        }
        self.probe
            .probe(partial)
            .await
            .map_err(|e| PipelineError::Encode {
                path: job.file.path.clone(),
                message: format!("encoded output is unreadable: {e}"),
            })
    }
}

fn dropped_tags(source: &ContainerMetadata, output: &ContainerMetadata) -> Vec<String> {
    source
        .tags
        .keys()
        .filter(|k| !MUXER_TAGS.contains(&k.as_str()))
        .filter(|k| !output.tags.contains_key(*k))
        .cloned()
        .collect()
}

//! Image conversion: decode, resize, JPEG encode, reattach EXIF.

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage};
use std::path::Path;
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::timeout;

use super::decode::{DecoderSet, ImageDecode};
use super::metadata::{embed_exif, MetadataBundle, MetadataExtractor};
use super::resize::ResizeSpec;
use super::validate::Validator;
use super::{write_atomic, Conversion};
use crate::error::{PipelineError, PipelineResult};
use crate::types::{ConversionJob, DecoderKind};

/// Converts one image job into a JPEG at the job's output path.
pub struct ImagePipeline {
    decoders: DecoderSet,
}

struct Encoded {
    jpeg: Vec<u8>,
    metadata: MetadataBundle,
    resize: ResizeSpec,
}

impl ImagePipeline {
    pub fn new(decoders: DecoderSet) -> Self {
        Self { decoders }
    }

    /// Run the pipeline for one job.
    ///
    /// The output is written atomically; on failure nothing is left at the
    /// output path.
    pub async fn convert(&self, job: &ConversionJob) -> PipelineResult<Conversion> {
        self.convert_in_slot(job, None).await
    }

    /// Like [`convert`](Self::convert), holding `slot` until the blocking
    /// decode has returned.
    ///
    /// A decode that overruns its budget fails the job at once but keeps
    /// running on the blocking pool; the slot stays taken until it ends.
    pub async fn convert_in_slot(
        &self,
        job: &ConversionJob,
        slot: Option<OwnedSemaphorePermit>,
    ) -> PipelineResult<Conversion> {
        let source = &job.file.path;
        let decoder_kind = job.file.kind.decoder().ok_or_else(|| {
            PipelineError::UnsupportedFormat {
                path: source.clone(),
                format: job.file.kind.to_string(),
            }
        })?;

        let bytes = tokio::fs::read(source)
            .await
            .map_err(|e| PipelineError::io(source, e))?;
        // RAW containers are checked by the RAW developer itself
        if decoder_kind != DecoderKind::Raw {
            Validator::check_header(source, &bytes)?;
        }

        let decoder = self.decoders.get(decoder_kind);
        let max_dimension = job.config.image.max_dimension;
        let quality = job.config.image.jpeg_quality;
        let timeout_ms = job.config.limits.decode_timeout_ms;
        let path = source.clone();

        let result = timeout(Duration::from_millis(timeout_ms), async move {
            tokio::task::spawn_blocking(move || {
                let _slot = slot;
                encode_sync(decoder.as_ref(), &path, &bytes, max_dimension, quality)
            })
            .await
        })
        .await;

        let encoded = match result {
            Ok(Ok(Ok(encoded))) => encoded,
            Ok(Ok(Err(e))) => return Err(e),
            Ok(Err(e)) => {
                return Err(PipelineError::Decode {
                    path: source.clone(),
                    message: format!("Task join error: {}", e),
                })
            }
            Err(_) => {
                return Err(PipelineError::Timeout {
                    path: source.clone(),
                    stage: "decode".to_string(),
                    timeout_ms,
                })
            }
        };

        tracing::debug!(
            "Image {:?}: {}x{} -> {}x{}, {} EXIF fields",
            job.file.relative_path,
            encoded.resize.source_width,
            encoded.resize.source_height,
            encoded.resize.target_width,
            encoded.resize.target_height,
            encoded.metadata.field_count()
        );

        let mut warnings = Vec::new();
        let output_bytes = attach_metadata(
            &job.output_path,
            encoded.jpeg,
            &encoded.metadata,
            &mut warnings,
        );

        write_atomic(&job.output_path, &output_bytes).await?;

        Ok(Conversion {
            output: job.output_path.clone(),
            capture_date: encoded.metadata.capture_date,
            warnings,
        })
    }
}

/// Decode, resize and encode. Runs on the blocking pool.
fn encode_sync(
    decoder: &dyn ImageDecode,
    path: &Path,
    bytes: &[u8],
    max_dimension: u32,
    quality: u8,
) -> PipelineResult<Encoded> {
    let mut metadata = MetadataExtractor::extract(bytes);
    let decoded = decoder.decode(path, bytes)?;
    if decoder.applies_orientation() {
        metadata.reset_orientation();
    }

    let resize = ResizeSpec::compute(decoded.width, decoded.height, max_dimension);
    let image = to_jpeg_color(resize.apply(decoded.image));

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode_image(&image)
        .map_err(|e| PipelineError::Encode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(Encoded {
        jpeg,
        metadata,
        resize,
    })
}

/// JPEG has no alpha and only 8-bit samples.
fn to_jpeg_color(image: DynamicImage) -> DynamicImage {
    match image.color() {
        ColorType::L8 | ColorType::Rgb8 => image,
        ColorType::La8 | ColorType::L16 | ColorType::La16 => {
            DynamicImage::ImageLuma8(image.to_luma8())
        }
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

/// Reattach source EXIF. Failures downgrade to a warning and the JPEG is
/// kept without metadata.
fn attach_metadata(
    output: &Path,
    jpeg: Vec<u8>,
    metadata: &MetadataBundle,
    warnings: &mut Vec<String>,
) -> Vec<u8> {
    let payload = match metadata.exif_payload() {
        Ok(Some(payload)) => payload,
        Ok(None) => return jpeg,
        Err(e) => {
            let err = PipelineError::MetadataWrite {
                path: output.to_path_buf(),
                message: format!("cannot serialize EXIF: {e}"),
            };
            tracing::warn!("{}", err);
            warnings.push(err.to_string());
            return jpeg;
        }
    };

    match embed_exif(output, &jpeg, &payload) {
        Ok(with_exif) => with_exif,
        Err(e) => {
            tracing::warn!("{}", e);
            warnings.push(e.to_string());
            jpeg
        }
    }
}

//! Image decoders, one per [`DecoderKind`].
//!
//! Decoding is synchronous and CPU-bound; callers run it on the blocking
//! pool (see [`ImagePipeline`](super::image::ImagePipeline)).

use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::types::DecoderKind;

/// Result of decoding an image.
pub struct DecodedImage {
    /// The decoded image data
    pub image: DynamicImage,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl DecodedImage {
    pub fn new(image: DynamicImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            image,
            width,
            height,
        }
    }
}

/// Turns the bytes of a source file into a raster.
///
/// `path` is used for error messages and by decoders that need to reopen
/// the file themselves; `bytes` is the full file content.
pub trait ImageDecode: Send + Sync {
    fn decode(&self, path: &Path, bytes: &[u8]) -> PipelineResult<DecodedImage>;

    /// Whether the returned pixels already have the source's EXIF
    /// orientation applied.
    fn applies_orientation(&self) -> bool {
        false
    }
}

/// Common raster formats through the `image` crate.
///
/// The format is detected from content, so a PNG named `.jpg` still decodes.
pub struct StandardDecoder;

impl ImageDecode for StandardDecoder {
    fn decode(&self, path: &Path, bytes: &[u8]) -> PipelineResult<DecodedImage> {
        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| PipelineError::Decode {
                path: path.to_path_buf(),
                message: format!("Cannot detect image format: {}", e),
            })?;
        if reader.format().is_none() && ImageFormat::from_path(path).is_err() {
            return Err(PipelineError::UnsupportedFormat {
                path: path.to_path_buf(),
                format: path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }
        let image = reader.decode().map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(DecodedImage::new(image))
    }
}

/// Camera RAW (ARW, NEF) developed to 8-bit sRGB.
pub struct RawDecoder;

#[cfg(feature = "raw")]
impl ImageDecode for RawDecoder {
    fn decode(&self, path: &Path, _bytes: &[u8]) -> PipelineResult<DecodedImage> {
        // 0x0 means full resolution; the resize policy runs afterwards
        let developed =
            imagepipe::simple_decode_8bit(path, 0, 0).map_err(|e| PipelineError::Decode {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        let buffer = image::RgbImage::from_raw(
            developed.width as u32,
            developed.height as u32,
            developed.data,
        )
        .ok_or_else(|| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!(
                "RAW developer returned a short buffer for {}x{}",
                developed.width, developed.height
            ),
        })?;
        Ok(DecodedImage::new(DynamicImage::ImageRgb8(buffer)))
    }

    // imagepipe's pipeline rotates by the RAW orientation
    fn applies_orientation(&self) -> bool {
        true
    }
}

#[cfg(not(feature = "raw"))]
impl ImageDecode for RawDecoder {
    fn decode(&self, path: &Path, _bytes: &[u8]) -> PipelineResult<DecodedImage> {
        Err(PipelineError::Decode {
            path: path.to_path_buf(),
            message: "RAW support not compiled - enable the raw feature".to_string(),
        })
    }
}

/// HEIC/HEIF through libheif.
pub struct HeicDecoder;

#[cfg(feature = "heif")]
impl ImageDecode for HeicDecoder {
    fn decode(&self, path: &Path, bytes: &[u8]) -> PipelineResult<DecodedImage> {
        use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

        let decode_err = |message: String| PipelineError::Decode {
            path: path.to_path_buf(),
            message,
        };

        let lib = LibHeif::new();
        let ctx = HeifContext::read_from_bytes(bytes).map_err(|e| decode_err(e.to_string()))?;
        let handle = ctx
            .primary_image_handle()
            .map_err(|e| decode_err(e.to_string()))?;
        let decoded = lib
            .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
            .map_err(|e| decode_err(e.to_string()))?;

        let planes = decoded.planes();
        let plane = planes
            .interleaved
            .ok_or_else(|| decode_err("no interleaved RGB plane".to_string()))?;

        // Rows may be padded; copy width*3 bytes from each stride-long row
        let row_len = plane.width as usize * 3;
        let mut data = Vec::with_capacity(row_len * plane.height as usize);
        for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
            let row = row
                .get(..row_len)
                .ok_or_else(|| decode_err("truncated HEIC plane".to_string()))?;
            data.extend_from_slice(row);
        }

        let buffer = image::RgbImage::from_raw(plane.width, plane.height, data)
            .ok_or_else(|| decode_err("HEIC plane size mismatch".to_string()))?;
        Ok(DecodedImage::new(DynamicImage::ImageRgb8(buffer)))
    }

    // libheif applies the irot/imir transforms while decoding
    fn applies_orientation(&self) -> bool {
        true
    }
}

#[cfg(not(feature = "heif"))]
impl ImageDecode for HeicDecoder {
    fn decode(&self, path: &Path, _bytes: &[u8]) -> PipelineResult<DecodedImage> {
        Err(PipelineError::Decode {
            path: path.to_path_buf(),
            message: "HEIC support not compiled - enable the heif feature".to_string(),
        })
    }
}

/// One decoder per [`DecoderKind`], shared across jobs.
#[derive(Clone)]
pub struct DecoderSet {
    standard: Arc<dyn ImageDecode>,
    raw: Arc<dyn ImageDecode>,
    heic: Arc<dyn ImageDecode>,
}

impl Default for DecoderSet {
    fn default() -> Self {
        Self {
            standard: Arc::new(StandardDecoder),
            raw: Arc::new(RawDecoder),
            heic: Arc::new(HeicDecoder),
        }
    }
}

impl DecoderSet {
    /// Replace the decoder for one kind.
    pub fn with(mut self, kind: DecoderKind, decoder: Arc<dyn ImageDecode>) -> Self {
        match kind {
            DecoderKind::Standard => self.standard = decoder,
            DecoderKind::Raw => self.raw = decoder,
            DecoderKind::Heic => self.heic = decoder,
        }
        self
    }

    pub fn get(&self, kind: DecoderKind) -> Arc<dyn ImageDecode> {
        match kind {
            DecoderKind::Standard => Arc::clone(&self.standard),
            DecoderKind::Raw => Arc::clone(&self.raw),
            DecoderKind::Heic => Arc::clone(&self.heic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgb8(width, height);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_standard_decodes_png() {
        let decoded = StandardDecoder
            .decode(Path::new("a.png"), &png_bytes(12, 7))
            .unwrap();
        assert_eq!((decoded.width, decoded.height), (12, 7));
    }

    #[test]
    fn test_format_detected_by_content() {
        // PNG bytes behind a .jpg name
        let decoded = StandardDecoder
            .decode(Path::new("misnamed.jpg"), &png_bytes(3, 3))
            .unwrap();
        assert_eq!(decoded.width, 3);
    }

    #[test]
    fn test_truncated_input_is_decode_error() {
        let mut bytes = png_bytes(64, 64);
        bytes.truncate(40);
        let err = StandardDecoder
            .decode(Path::new("cut.png"), &bytes)
            .err()
            .unwrap();
        assert_eq!(err.kind(), "decode");
    }

    #[cfg(not(feature = "heif"))]
    #[test]
    fn test_heic_without_feature_names_it() {
        let err = HeicDecoder
            .decode(Path::new("IMG.HEIC"), b"\0\0\0\x18ftypheic")
            .err()
            .unwrap();
        assert!(err.to_string().contains("heif feature"));
    }

    #[test]
    fn test_decoder_set_override() {
        struct Fixed;
        impl ImageDecode for Fixed {
            fn decode(&self, _path: &Path, _bytes: &[u8]) -> PipelineResult<DecodedImage> {
                Ok(DecodedImage::new(DynamicImage::new_rgb8(5, 4)))
            }
        }

        let set = DecoderSet::default().with(DecoderKind::Raw, Arc::new(Fixed));
        let decoded = set
            .get(DecoderKind::Raw)
            .decode(Path::new("x.nef"), b"")
            .unwrap();
        assert_eq!((decoded.width, decoded.height), (5, 4));
    }

    #[test]
    fn test_standard_decoder_leaves_orientation_to_viewer() {
        assert!(!StandardDecoder.applies_orientation());
    }

    #[cfg(feature = "raw")]
    #[test]
    fn test_raw_decoder_applies_orientation() {
        assert!(RawDecoder.applies_orientation());
    }
}

//! EXIF metadata: extraction from the source, re-serialization, and
//! embedding into the re-encoded JPEG.
//!
//! The re-encoded image has a new pixel layout, so tags that describe the
//! old one (strip offsets, dimensions, the embedded thumbnail) are dropped.
//! Everything else in the primary IFD is carried over. If the result does
//! not fit into a single APP1 segment, only the tags that matter for a
//! viewing copy are kept (see [`MINIMAL_TAGS`]).

use exif::experimental::Writer;
use exif::{Context, Field, In, Reader, Tag, Value};
use std::io::Cursor;
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};

/// Largest TIFF payload that fits in one APP1 segment: 65535 minus the
/// length field (2) and the `Exif\0\0` header (6).
pub const MAX_APP1_PAYLOAD: usize = 65_527;

const EXIF_HEADER: &[u8] = b"Exif\0\0";

// TIFF layout tags kamadak-exif has no constants for
const TILE_WIDTH: Tag = Tag(Context::Tiff, 0x142);
const TILE_LENGTH: Tag = Tag(Context::Tiff, 0x143);
const SUB_IFDS: Tag = Tag(Context::Tiff, 0x14A);

/// Tags that describe the source's encoding rather than the photo.
const LAYOUT_TAGS: &[Tag] = &[
    Tag::ExifIFDPointer,
    Tag::GPSInfoIFDPointer,
    Tag::InteropIFDPointer,
    Tag::JPEGInterchangeFormat,
    Tag::JPEGInterchangeFormatLength,
    Tag::StripOffsets,
    Tag::StripByteCounts,
    Tag::RowsPerStrip,
    Tag::TileOffsets,
    Tag::TileByteCounts,
    TILE_WIDTH,
    TILE_LENGTH,
    SUB_IFDS,
    Tag::ImageWidth,
    Tag::ImageLength,
    Tag::PixelXDimension,
    Tag::PixelYDimension,
    Tag::Compression,
    Tag::BitsPerSample,
    Tag::PhotometricInterpretation,
    Tag::SamplesPerPixel,
    Tag::PlanarConfiguration,
    Tag::MakerNote,
];

/// Tags kept when the full set does not fit.
const MINIMAL_TAGS: &[Tag] = &[
    Tag::DateTimeOriginal,
    Tag::DateTimeDigitized,
    Tag::DateTime,
    Tag::OffsetTimeOriginal,
    Tag::Orientation,
    Tag::Make,
    Tag::Model,
    Tag::GPSLatitudeRef,
    Tag::GPSLatitude,
    Tag::GPSLongitudeRef,
    Tag::GPSLongitude,
    Tag::GPSAltitudeRef,
    Tag::GPSAltitude,
];

/// Metadata carried from a source image to its output.
#[derive(Debug, Clone, Default)]
pub struct MetadataBundle {
    /// Raw `DateTimeOriginal` (or `DateTime`) value, e.g. `2023:06:01 10:00:00`
    pub capture_date: Option<String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub orientation: Option<u32>,
    /// Primary-IFD fields that can be written to the output
    fields: Vec<Field>,
}

impl MetadataBundle {
    /// Whether the source carried any transferable EXIF.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields that will be written.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Mark the pixels as already upright.
    ///
    /// Used when the decoder applied the source orientation itself, so
    /// viewers must not rotate the output a second time.
    pub fn reset_orientation(&mut self) {
        if self.orientation.is_none() {
            return;
        }
        self.orientation = Some(1);
        for field in self.fields.iter_mut().filter(|f| f.tag == Tag::Orientation) {
            field.value = Value::Short(vec![1]);
        }
    }

    /// Serialize the bundle as a TIFF payload for an APP1 segment.
    ///
    /// Returns `Ok(None)` when there is nothing to write.
    pub fn exif_payload(&self) -> Result<Option<Vec<u8>>, exif::Error> {
        if self.fields.is_empty() {
            return Ok(None);
        }

        let full = serialize(self.fields.iter())?;
        if full.len() <= MAX_APP1_PAYLOAD {
            return Ok(Some(full));
        }

        tracing::debug!(
            "EXIF payload is {} bytes, falling back to minimal tag set",
            full.len()
        );
        let minimal = serialize(
            self.fields
                .iter()
                .filter(|f| MINIMAL_TAGS.contains(&f.tag)),
        )?;
        Ok(Some(minimal))
    }
}

/// A payload holding only a capture date, used to re-inject a date the
/// output lost.
pub fn capture_date_payload(capture_date: &str) -> Result<Vec<u8>, exif::Error> {
    let field = Field {
        tag: Tag::DateTimeOriginal,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![capture_date.as_bytes().to_vec()]),
    };
    serialize(std::iter::once(&field))
}

fn serialize<'a>(fields: impl Iterator<Item = &'a Field>) -> Result<Vec<u8>, exif::Error> {
    let mut writer = Writer::new();
    for field in fields {
        writer.push_field(field);
    }
    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, false)?;
    Ok(buf.into_inner())
}

/// Extracts EXIF metadata from image files.
pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Extract the metadata bundle from an in-memory file.
    ///
    /// Lenient: a file without EXIF (or with unreadable EXIF) yields an
    /// empty bundle rather than an error.
    pub fn extract(bytes: &[u8]) -> MetadataBundle {
        let Ok(exif) = Reader::new().read_from_container(&mut Cursor::new(bytes)) else {
            return MetadataBundle::default();
        };

        let fields = exif
            .fields()
            .filter(|f| f.ifd_num == In::PRIMARY)
            .filter(|f| !LAYOUT_TAGS.contains(&f.tag))
            .filter(|f| !matches!(f.value, Value::Unknown(..)))
            .cloned()
            .collect();

        MetadataBundle {
            capture_date: Self::get_capture_date(&exif),
            camera_make: Self::get_string(&exif, Tag::Make),
            camera_model: Self::get_string(&exif, Tag::Model),
            gps_latitude: Self::get_gps_coord(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef),
            gps_longitude: Self::get_gps_coord(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef),
            orientation: Self::get_u32(&exif, Tag::Orientation),
            fields,
        }
    }

    /// Read only the capture date from an in-memory file.
    pub fn read_capture_date(bytes: &[u8]) -> Option<String> {
        let exif = Reader::new()
            .read_from_container(&mut Cursor::new(bytes))
            .ok()?;
        Self::get_capture_date(&exif)
    }

    /// Raw ASCII of the capture date, preferring DateTimeOriginal over DateTime.
    fn get_capture_date(exif: &exif::Exif) -> Option<String> {
        let field = exif
            .get_field(Tag::DateTimeOriginal, In::PRIMARY)
            .or_else(|| exif.get_field(Tag::DateTime, In::PRIMARY))?;
        match &field.value {
            Value::Ascii(parts) => parts
                .first()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    fn get_string(exif: &exif::Exif, tag: Tag) -> Option<String> {
        exif.get_field(tag, In::PRIMARY).map(|f| {
            let s = f.display_value().to_string();
            s.trim_matches('"').to_string()
        })
    }

    fn get_u32(exif: &exif::Exif, tag: Tag) -> Option<u32> {
        exif.get_field(tag, In::PRIMARY)
            .and_then(|f| f.value.get_uint(0))
    }

    /// Get GPS coordinate, converting from degrees/minutes/seconds to decimal.
    fn get_gps_coord(exif: &exif::Exif, coord_tag: Tag, ref_tag: Tag) -> Option<f64> {
        let coord = exif.get_field(coord_tag, In::PRIMARY)?;
        let reference = exif.get_field(ref_tag, In::PRIMARY)?;

        let degrees = match &coord.value {
            Value::Rational(r) if r.len() >= 3 => {
                r[0].to_f64() + r[1].to_f64() / 60.0 + r[2].to_f64() / 3600.0
            }
            _ => return None,
        };
        let ref_str = reference.display_value().to_string();

        // S and W are negative
        let sign = if ref_str.contains('S') || ref_str.contains('W') {
            -1.0
        } else {
            1.0
        };

        Some(sign * degrees)
    }
}

/// Insert an EXIF payload into a JPEG as its APP1 segment.
///
/// Any existing EXIF APP1 is removed. The new segment goes right after the
/// leading APP0 (JFIF) segments; everything from the first scan onwards is
/// copied unchanged.
pub fn embed_exif(path: &Path, jpeg: &[u8], payload: &[u8]) -> PipelineResult<Vec<u8>> {
    let malformed = |message: &str| PipelineError::MetadataWrite {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    if payload.len() > MAX_APP1_PAYLOAD {
        return Err(malformed("EXIF payload exceeds APP1 segment limit"));
    }
    if !jpeg.starts_with(&[0xFF, 0xD8]) {
        return Err(malformed("output is not a JPEG stream"));
    }

    let mut head: Vec<&[u8]> = Vec::new();
    let mut tail: Vec<&[u8]> = Vec::new();
    let mut in_head = true;
    let mut pos = 2;

    let rest = loop {
        if pos + 1 >= jpeg.len() || jpeg[pos] != 0xFF {
            return Err(malformed("truncated JPEG header"));
        }
        let marker = jpeg[pos + 1];

        // Start of scan or end of image: the rest is copied as-is
        if marker == 0xDA || marker == 0xD9 {
            break &jpeg[pos..];
        }
        // Standalone markers carry no length
        if (0xD0..=0xD7).contains(&marker) || marker == 0x01 || marker == 0xFF {
            tail.push(&jpeg[pos..pos + 2]);
            pos += 2;
            continue;
        }

        let len = jpeg
            .get(pos + 2..pos + 4)
            .map(|b| u16::from_be_bytes([b[0], b[1]]) as usize)
            .ok_or_else(|| malformed("truncated JPEG segment"))?;
        let end = pos + 2 + len;
        let segment = jpeg
            .get(pos..end)
            .ok_or_else(|| malformed("JPEG segment runs past end of file"))?;

        let is_exif = marker == 0xE1 && segment.get(4..10) == Some(EXIF_HEADER);
        if !is_exif {
            if in_head && marker == 0xE0 {
                head.push(segment);
            } else {
                in_head = false;
                tail.push(segment);
            }
        }
        pos = end;
    };

    let segment_len = (payload.len() + EXIF_HEADER.len() + 2) as u16;
    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 10);
    out.extend_from_slice(&[0xFF, 0xD8]);
    for segment in head {
        out.extend_from_slice(segment);
    }
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(payload);
    for segment in tail {
        out.extend_from_slice(segment);
    }
    out.extend_from_slice(rest);
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::DynamicImage;

    pub(crate) fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgb8(width, height);
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, 90)
            .encode_image(&img)
            .unwrap();
        buf
    }

    /// A JPEG whose EXIF carries the given capture date plus camera tags.
    pub(crate) fn jpeg_with_exif(width: u32, height: u32, capture_date: &str) -> Vec<u8> {
        let fields = [
            Field {
                tag: Tag::DateTimeOriginal,
                ifd_num: In::PRIMARY,
                value: Value::Ascii(vec![capture_date.as_bytes().to_vec()]),
            },
            Field {
                tag: Tag::Make,
                ifd_num: In::PRIMARY,
                value: Value::Ascii(vec![b"ACME".to_vec()]),
            },
            Field {
                tag: Tag::PixelXDimension,
                ifd_num: In::PRIMARY,
                value: Value::Long(vec![width]),
            },
        ];
        jpeg_with_fields(width, height, &fields)
    }

    /// Bare TIFF payload for the given fields, as stored in an APP1 or eXIf.
    pub(crate) fn tiff_payload(fields: &[Field]) -> Vec<u8> {
        serialize(fields.iter()).unwrap()
    }

    pub(crate) fn jpeg_with_fields(width: u32, height: u32, fields: &[Field]) -> Vec<u8> {
        let payload = tiff_payload(fields);
        embed_exif(Path::new("src.jpg"), &jpeg_bytes(width, height), &payload).unwrap()
    }

    pub(crate) fn ascii(tag: Tag, value: &str) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![value.as_bytes().to_vec()]),
        }
    }

    /// GPS position in degrees/minutes/seconds, as cameras write it.
    pub(crate) fn gps_fields(lat: [(u32, u32); 3], lon: [(u32, u32); 3]) -> Vec<Field> {
        let dms = |parts: [(u32, u32); 3]| {
            Value::Rational(parts.iter().map(|&part| part.into()).collect())
        };
        vec![
            ascii(Tag::GPSLatitudeRef, "N"),
            Field {
                tag: Tag::GPSLatitude,
                ifd_num: In::PRIMARY,
                value: dms(lat),
            },
            ascii(Tag::GPSLongitudeRef, "E"),
            Field {
                tag: Tag::GPSLongitude,
                ifd_num: In::PRIMARY,
                value: dms(lon),
            },
        ]
    }

    pub(crate) fn orientation_field(orientation: u16) -> Field {
        Field {
            tag: Tag::Orientation,
            ifd_num: In::PRIMARY,
            value: Value::Short(vec![orientation]),
        }
    }

    #[test]
    fn test_extract_without_exif_is_empty() {
        let bundle = MetadataExtractor::extract(&jpeg_bytes(8, 8));
        assert!(bundle.is_empty());
        assert!(bundle.capture_date.is_none());
        assert!(bundle.exif_payload().unwrap().is_none());
    }

    #[test]
    fn test_extract_garbage_is_empty() {
        assert!(MetadataExtractor::extract(b"not an image").is_empty());
    }

    #[test]
    fn test_extract_drops_layout_tags() {
        let source = jpeg_with_exif(16, 16, "2023:06:01 10:00:00");
        let bundle = MetadataExtractor::extract(&source);
        assert_eq!(bundle.capture_date.as_deref(), Some("2023:06:01 10:00:00"));
        assert_eq!(bundle.camera_make.as_deref(), Some("ACME"));
        assert!(bundle.fields.iter().all(|f| f.tag != Tag::PixelXDimension));
        assert!(bundle.fields.iter().all(|f| f.tag != Tag::ExifIFDPointer));
    }

    #[test]
    fn test_extract_drops_tile_and_sub_ifd_offsets() {
        let mut fields = vec![ascii(Tag::Model, "A7")];
        for tag in [TILE_WIDTH, TILE_LENGTH, SUB_IFDS] {
            fields.push(Field {
                tag,
                ifd_num: In::PRIMARY,
                value: Value::Long(vec![256]),
            });
        }
        let bundle = MetadataExtractor::extract(&jpeg_with_fields(8, 8, &fields));

        assert_eq!(bundle.camera_model.as_deref(), Some("A7"));
        assert_eq!(bundle.field_count(), 1);
        assert!(bundle.fields.iter().all(|f| !LAYOUT_TAGS.contains(&f.tag)));
    }

    #[test]
    fn test_gps_position_is_decimal() {
        let fields = gps_fields([(35, 1), (40, 1), (12, 1)], [(139, 1), (45, 1), (288, 10)]);
        let bundle = MetadataExtractor::extract(&jpeg_with_fields(8, 8, &fields));

        let lat = bundle.gps_latitude.unwrap();
        let lon = bundle.gps_longitude.unwrap();
        assert!((lat - 35.67).abs() < 1e-6, "latitude {lat}");
        assert!((lon - 139.758).abs() < 1e-6, "longitude {lon}");
    }

    #[test]
    fn test_reset_orientation() {
        let source = jpeg_with_fields(8, 8, &[orientation_field(6)]);
        let mut bundle = MetadataExtractor::extract(&source);
        assert_eq!(bundle.orientation, Some(6));

        bundle.reset_orientation();
        assert_eq!(bundle.orientation, Some(1));
        let payload = bundle.exif_payload().unwrap().unwrap();
        let output = embed_exif(Path::new("out.jpg"), &jpeg_bytes(4, 4), &payload).unwrap();
        assert_eq!(MetadataExtractor::extract(&output).orientation, Some(1));
    }

    #[test]
    fn test_reset_orientation_without_tag_adds_nothing() {
        let mut bundle = MetadataExtractor::extract(&jpeg_with_exif(8, 8, "2023:06:01 10:00:00"));
        let before = bundle.field_count();
        bundle.reset_orientation();
        assert_eq!(bundle.orientation, None);
        assert_eq!(bundle.field_count(), before);
    }

    #[test]
    fn test_capture_date_survives_reembedding() {
        let source = jpeg_with_exif(16, 16, "2023:06:01 10:00:00");
        let bundle = MetadataExtractor::extract(&source);
        let payload = bundle.exif_payload().unwrap().unwrap();

        let output = embed_exif(Path::new("out.jpg"), &jpeg_bytes(4, 4), &payload).unwrap();
        assert_eq!(
            MetadataExtractor::read_capture_date(&output).as_deref(),
            Some("2023:06:01 10:00:00")
        );
        // still decodes as an image
        let img = image::load_from_memory(&output).unwrap();
        assert_eq!(img.width(), 4);
    }

    #[test]
    fn test_embed_replaces_existing_exif() {
        let source = jpeg_with_exif(8, 8, "2001:01:01 00:00:00");
        let payload = capture_date_payload("2024:12:24 18:30:00").unwrap();
        let output = embed_exif(Path::new("x.jpg"), &source, &payload).unwrap();

        assert_eq!(
            MetadataExtractor::read_capture_date(&output).as_deref(),
            Some("2024:12:24 18:30:00")
        );
        let count = output
            .windows(EXIF_HEADER.len())
            .filter(|w| *w == EXIF_HEADER)
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_embed_rejects_non_jpeg() {
        let err = embed_exif(Path::new("x.jpg"), b"\x89PNG....", b"II*\0").unwrap_err();
        assert_eq!(err.kind(), "metadata_write");
    }

    #[test]
    fn test_oversized_payload_falls_back_to_minimal() {
        let mut bundle = MetadataBundle {
            capture_date: Some("2023:06:01 10:00:00".into()),
            ..Default::default()
        };
        bundle.fields.push(Field {
            tag: Tag::DateTimeOriginal,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![b"2023:06:01 10:00:00".to_vec()]),
        });
        bundle.fields.push(Field {
            tag: Tag::ImageDescription,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![vec![b'x'; 70_000]]),
        });

        let payload = bundle.exif_payload().unwrap().unwrap();
        assert!(payload.len() <= MAX_APP1_PAYLOAD);

        let output = embed_exif(Path::new("x.jpg"), &jpeg_bytes(2, 2), &payload).unwrap();
        assert_eq!(
            MetadataExtractor::read_capture_date(&output).as_deref(),
            Some("2023:06:01 10:00:00")
        );
    }
}

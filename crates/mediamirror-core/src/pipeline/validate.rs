//! Content sniffing before a full decode.

use std::path::Path;

use crate::error::{PipelineError, PipelineResult};

/// Checks that a file's leading bytes look like an image container.
///
/// A supported extension with the wrong content (an HTML page saved as
/// `.jpg`, a zero-byte file) fails here instead of deep inside a decoder.
pub struct Validator;

impl Validator {
    /// Validate the header of an in-memory file.
    pub fn check_header(path: &Path, bytes: &[u8]) -> PipelineResult<()> {
        if bytes.len() < 4 {
            return Err(PipelineError::Decode {
                path: path.to_path_buf(),
                message: "File too small to be a valid image".to_string(),
            });
        }

        if !Self::is_valid_image_header(bytes) {
            return Err(PipelineError::Decode {
                path: path.to_path_buf(),
                message: "Unrecognized image format (invalid magic bytes)".to_string(),
            });
        }

        Ok(())
    }

    /// Check if the header bytes match known image formats.
    ///
    /// RAW formats handled here (ARW, NEF) are TIFF containers.
    fn is_valid_image_header(header: &[u8]) -> bool {
        let starts = |magic: &[u8]| header.starts_with(magic);

        // JPEG, PNG, GIF, BMP
        if starts(&[0xFF, 0xD8, 0xFF])
            || starts(&[0x89, b'P', b'N', b'G'])
            || starts(b"GIF8")
            || starts(b"BM")
        {
            return true;
        }

        // WebP: RIFF....WEBP
        if starts(b"RIFF") {
            return header.get(8..12).map_or(true, |tag| tag == b"WEBP");
        }

        // TIFF: II (little-endian) or MM (big-endian) followed by version 42
        if starts(&[b'I', b'I', 0x2A, 0x00]) || starts(&[b'M', b'M', 0x00, 0x2A]) {
            return true;
        }

        // HEIC/HEIF: ftyp box at offset 4
        header.get(4..8) == Some(b"ftyp".as_slice())
    }
}

//! Extension-driven classification of source files.

use std::path::Path;

use crate::types::MediaKind;

/// Extension table. Lookups are case-insensitive.
const EXTENSION_TABLE: &[(&str, MediaKind)] = &[
    ("jpg", MediaKind::ImageDirect),
    ("jpeg", MediaKind::ImageDirect),
    ("png", MediaKind::ImageConvertible),
    ("tiff", MediaKind::ImageConvertible),
    ("tif", MediaKind::ImageConvertible),
    ("webp", MediaKind::ImageConvertible),
    ("bmp", MediaKind::ImageConvertible),
    ("arw", MediaKind::Raw),
    ("nef", MediaKind::Raw),
    ("heic", MediaKind::Heic),
    ("heif", MediaKind::Heic),
    ("mp4", MediaKind::VideoDirect),
    ("mov", MediaKind::VideoConvertible),
    ("avi", MediaKind::VideoConvertible),
    ("mkv", MediaKind::VideoConvertible),
    ("wmv", MediaKind::VideoConvertible),
    ("mts", MediaKind::VideoConvertible),
];

/// Maps file extensions to media kinds.
pub struct Classifier;

impl Classifier {
    /// Classify a path by its extension. Never touches the file.
    pub fn classify(path: &Path) -> MediaKind {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| Self::classify_extension(ext))
            .unwrap_or(MediaKind::Unsupported)
    }

    /// Classify a bare extension (without the leading dot).
    pub fn classify_extension(ext: &str) -> MediaKind {
        let ext_lower = ext.to_ascii_lowercase();
        EXTENSION_TABLE
            .iter()
            .find(|(known, _)| *known == ext_lower)
            .map(|(_, kind)| *kind)
            .unwrap_or(MediaKind::Unsupported)
    }

    /// All extensions handled by a pipeline.
    pub fn supported_extensions() -> impl Iterator<Item = &'static str> {
        EXTENSION_TABLE.iter().map(|(ext, _)| *ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_images() {
        assert_eq!(Classifier::classify(Path::new("a.jpg")), MediaKind::ImageDirect);
        assert_eq!(Classifier::classify(Path::new("a.JPEG")), MediaKind::ImageDirect);
        assert_eq!(Classifier::classify(Path::new("a.png")), MediaKind::ImageConvertible);
        assert_eq!(Classifier::classify(Path::new("scan.TIFF")), MediaKind::ImageConvertible);
        assert_eq!(Classifier::classify(Path::new("DSC0001.ARW")), MediaKind::Raw);
        assert_eq!(Classifier::classify(Path::new("DSC0001.nef")), MediaKind::Raw);
        assert_eq!(Classifier::classify(Path::new("IMG_1234.HEIC")), MediaKind::Heic);
    }

    #[test]
    fn test_classify_videos() {
        assert_eq!(Classifier::classify(Path::new("clip.mp4")), MediaKind::VideoDirect);
        assert_eq!(Classifier::classify(Path::new("clip.MOV")), MediaKind::VideoConvertible);
        assert_eq!(Classifier::classify(Path::new("00001.MTS")), MediaKind::VideoConvertible);
    }

    #[test]
    fn test_classify_unsupported() {
        assert_eq!(Classifier::classify(Path::new("doc.txt")), MediaKind::Unsupported);
        assert_eq!(Classifier::classify(Path::new("Makefile")), MediaKind::Unsupported);
        assert_eq!(Classifier::classify(Path::new(".hidden")), MediaKind::Unsupported);
        assert_eq!(Classifier::classify(Path::new("archive.jpg.zip")), MediaKind::Unsupported);
    }

    #[test]
    fn test_supported_extensions_are_lowercase() {
        assert!(Classifier::supported_extensions().all(|e| e == e.to_ascii_lowercase()));
        assert!(Classifier::supported_extensions().any(|e| e == "heic"));
    }
}

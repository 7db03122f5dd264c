//! Lazy, deterministic traversal of the input tree.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::classify::Classifier;
use crate::types::{FileTimestamps, MediaFile};

/// Walks the input root and yields classified files.
///
/// Entries are sorted by file name within each directory and a directory's
/// contents are visited before its next sibling, so repeated runs over the
/// same tree visit files in the same order. That is path order compared
/// component by component, not a plain string sort of the relative paths:
/// `a/b.jpg` comes before `a-b.jpg`. Symlinks are not followed.
pub struct FileDiscovery {
    root: PathBuf,
}

impl FileDiscovery {
    /// Create a new discovery instance rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Iterate over every regular file under the root, lazily.
    ///
    /// Unreadable entries are logged and skipped.
    pub fn iter(&self) -> impl Iterator<Item = MediaFile> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(move |entry| self.describe(entry.path(), entry.metadata().ok()?))
    }

    /// Collect all files. Convenience for tests and small trees.
    pub fn discover(&self) -> Vec<MediaFile> {
        self.iter().collect()
    }

    fn describe(&self, path: &Path, meta: std::fs::Metadata) -> Option<MediaFile> {
        let relative_path = path.strip_prefix(&self.root).ok()?.to_path_buf();
        Some(MediaFile {
            path: path.to_path_buf(),
            kind: Classifier::classify(path),
            relative_path,
            size: meta.len(),
            timestamps: FileTimestamps::from_metadata(&meta),
        })
    }
}

//! Mirrored output paths.
//!
//! A source at `<input>/<rel>` maps to `<output>/<rel>` with the extension
//! replaced by the pipeline's target extension. When two sources map to the
//! same output (`a.png` and `a.jpg`), the first one seen in traversal order
//! keeps the plain name and the rest get `<stem>_<ext>.<target>`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Mirrored output path for a relative source path, ignoring collisions.
pub fn mirrored_path(output_root: &Path, relative: &Path, target_ext: &str) -> PathBuf {
    output_root.join(relative).with_extension(target_ext)
}

/// Mirrored output path that keeps the original extension in the file stem.
fn disambiguated_path(output_root: &Path, relative: &Path, target_ext: &str) -> PathBuf {
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let original_ext = relative
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let file_name = format!("{stem}_{original_ext}.{target_ext}");
    match relative.parent() {
        Some(parent) => output_root.join(parent).join(file_name),
        None => output_root.join(file_name),
    }
}

/// Tracks output paths claimed during one run.
///
/// Claims are made in traversal order, which is deterministic, so the same
/// tree always resolves to the same outputs.
#[derive(Debug)]
pub struct OutputLayout {
    output_root: PathBuf,
    claimed: HashSet<PathBuf>,
}

impl OutputLayout {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            claimed: HashSet::new(),
        }
    }

    /// Claim an output path for a source.
    ///
    /// Returns `None` only if both the plain and the disambiguated names are
    /// already taken, which requires two sources differing only in the case
    /// of their extension.
    pub fn claim(&mut self, relative: &Path, target_ext: &str) -> Option<PathBuf> {
        let plain = mirrored_path(&self.output_root, relative, target_ext);
        if self.claimed.insert(plain.clone()) {
            return Some(plain);
        }

        let alternate = disambiguated_path(&self.output_root, relative, target_ext);
        if self.claimed.insert(alternate.clone()) {
            tracing::debug!(
                "Output {:?} already claimed; using {:?} for {:?}",
                plain,
                alternate,
                relative
            );
            return Some(alternate);
        }
        None
    }
}

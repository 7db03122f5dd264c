//! Decides whether a source already has a current output.

use std::path::Path;

use crate::config::SkipPolicy;
use crate::types::MediaFile;

/// Applies the configured [`SkipPolicy`] to a source/output pair.
#[derive(Debug, Clone, Copy)]
pub struct IdempotencyChecker {
    policy: SkipPolicy,
}

impl IdempotencyChecker {
    pub fn new(policy: SkipPolicy) -> Self {
        Self { policy }
    }

    /// Whether `output` already holds a finished conversion of `file`.
    ///
    /// Finished outputs carry the source mtime (the preserver copies it), so
    /// under [`SkipPolicy::Mtime`] a mismatch means the source changed after
    /// conversion or the previous run stopped before preserving.
    pub fn is_current(&self, file: &MediaFile, output: &Path) -> bool {
        let Ok(meta) = std::fs::metadata(output) else {
            return false;
        };
        if !meta.is_file() {
            return false;
        }
        match self.policy {
            SkipPolicy::Exists => true,
            SkipPolicy::Mtime => meta
                .modified()
                .map(|m| m == file.timestamps.modified)
                .unwrap_or(false),
        }
    }
}

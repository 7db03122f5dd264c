//! Resize policy: fit within a maximum dimension, never upscale.

use image::imageops::FilterType;
use image::DynamicImage;

/// Source and target dimensions for one resize decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeSpec {
    pub source_width: u32,
    pub source_height: u32,
    pub max_dimension: u32,
    pub target_width: u32,
    pub target_height: u32,
}

impl ResizeSpec {
    /// Compute target dimensions preserving aspect ratio.
    ///
    /// If the longest side is within `max_dimension` the target equals the
    /// source. Otherwise the longest side becomes exactly `max_dimension` and
    /// the shorter side is scaled by the same factor, rounding down (never
    /// below 1).
    pub fn compute(width: u32, height: u32, max_dimension: u32) -> Self {
        let longest = width.max(height);
        let (target_width, target_height) = if longest <= max_dimension || longest == 0 {
            (width, height)
        } else {
            let scale = |side: u32| -> u32 {
                let scaled = (side as u64 * max_dimension as u64) / longest as u64;
                (scaled as u32).max(1)
            };
            if width >= height {
                (max_dimension, scale(height))
            } else {
                (scale(width), max_dimension)
            }
        };

        Self {
            source_width: width,
            source_height: height,
            max_dimension,
            target_width,
            target_height,
        }
    }

    /// Like [`compute`](Self::compute), with both sides rounded down to even
    /// numbers as required by 4:2:0 video encoders.
    ///
    /// An odd-sized source within the bound is trimmed by one pixel on the
    /// odd side; an even-sized source within the bound is left untouched.
    pub fn compute_even(width: u32, height: u32, max_dimension: u32) -> Self {
        let mut spec = Self::compute(width, height, max_dimension);
        if spec.target_width >= 2 {
            spec.target_width &= !1;
        }
        if spec.target_height >= 2 {
            spec.target_height &= !1;
        }
        spec
    }

    /// Whether the target differs from the source.
    pub fn needs_resize(&self) -> bool {
        self.target_width != self.source_width || self.target_height != self.source_height
    }

    /// Apply the resize to an image, returning it unchanged if no resize is needed.
    pub fn apply(&self, image: DynamicImage) -> DynamicImage {
        if !self.needs_resize() {
            return image;
        }
        image.resize_exact(self.target_width, self.target_height, FilterType::Lanczos3)
    }
}

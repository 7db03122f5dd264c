//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.max_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "image.max_dimension must be > 0".into(),
            ));
        }
        if !(1..=100).contains(&self.image.jpeg_quality) {
            return Err(ConfigError::ValidationError(
                "image.jpeg_quality must be between 1 and 100".into(),
            ));
        }
        if self.video.constant_rate_factor > 51 {
            return Err(ConfigError::ValidationError(
                "video.constant_rate_factor must be between 0 and 51".into(),
            ));
        }
        for (name, value) in [
            ("video.video_codec", &self.video.video_codec),
            ("video.preset", &self.video.preset),
            ("video.audio_codec", &self.video.audio_codec),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must not be empty"
                )));
            }
        }
        if self.scheduler.image_workers == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.image_workers must be > 0".into(),
            ));
        }
        if self.scheduler.video_workers == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.video_workers must be > 0".into(),
            ));
        }
        if self.scheduler.queue_size == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.queue_size must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        if self.limits.encode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.encode_timeout_ms must be > 0".into(),
            ));
        }
        if self.logging.compress_after_days > self.logging.retention_days {
            return Err(ConfigError::ValidationError(
                "logging.compress_after_days must not exceed logging.retention_days".into(),
            ));
        }
        Ok(())
    }
}

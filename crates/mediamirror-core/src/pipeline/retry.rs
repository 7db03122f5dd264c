//! Retry utilities for transient encoder failures.
//!
//! Provides classification of retryable errors and exponential backoff.

use crate::error::PipelineError;
use std::time::Duration;

/// Determine whether a pipeline error is worth retrying.
///
/// Retryable: timeouts and encoder failures (the external encoder can fail
/// transiently under memory or disk pressure). Decode, I/O and metadata
/// errors will fail the same way again.
pub fn is_retryable(error: &PipelineError) -> bool {
    matches!(
        error,
        PipelineError::Timeout { .. } | PipelineError::Encode { .. }
    )
}

/// Calculate exponential backoff duration for a given attempt.
///
/// Uses `base_delay * 2^attempt` with a cap at 30 seconds.
pub fn backoff_duration(attempt: u32, base_delay_ms: u64) -> Duration {
    let delay = base_delay_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay.min(30_000))
}

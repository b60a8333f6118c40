//! Stage retry policy.

use std::time::Duration;

use crate::config::PipelineConfig;

/// Exponential backoff between attempts of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per stage, including the first.
    pub max_attempts: u32,
    /// Initial delay before first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (e.g., 2.0 for exponential backoff).
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub const fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self { max_attempts, initial_delay, max_delay, multiplier }
    }

    /// Policy described by the pipeline settings. At least one attempt is always made.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.backoff_multiplier,
        }
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    pub const fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Calculate the delay for a given retry attempt.
    ///
    /// Uses exponential backoff: `initial_delay * multiplier^retry_count`, capped at `max_delay`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn calculate_delay(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let delay_ms = (self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent))
            .min(self.max_delay.as_millis() as f64)
            .max(0.0) as u64;
        Duration::from_millis(delay_ms)
    }
}

//! Bounded wait-and-retry for observations that are briefly unavailable.
use super::ProviderError;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
}

impl BackoffStrategy {
    pub const ALL: [BackoffStrategy; 3] = [
        BackoffStrategy::Fixed,
        BackoffStrategy::Linear,
        BackoffStrategy::Exponential,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackoffStrategy::Fixed => "fixed",
            BackoffStrategy::Linear => "linear",
            BackoffStrategy::Exponential => "exponential",
        }
    }

    pub fn parse(value: &str) -> Option<BackoffStrategy> {
        let wanted = value.trim();
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str().eq_ignore_ascii_case(wanted))
    }
}

/// How many times a transient observation gap is retried and how long to
/// wait between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub strategy: BackoffStrategy,
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, strategy: BackoffStrategy, base_delay_ms: u64) -> Self {
        RetryPolicy {
            max_retries,
            strategy,
            base_delay_ms,
        }
    }

    /// Whether the given retry number (0-indexed) is within budget.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay before the given retry. Retry 0 follows the first failure.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay_ms,
            BackoffStrategy::Linear => self.base_delay_ms.saturating_mul(u64::from(attempt) + 1),
            BackoffStrategy::Exponential => self
                .base_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt)),
        }
    }

    /// Run `op`, retrying only transient errors until the budget runs out.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Result<T, ProviderError>,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Err(err) if err.is_transient() && self.should_retry(attempt) => {
                    let delay = self.delay_ms(attempt);
                    tracing::debug!(label, attempt, delay_ms = delay, error = %err, "retrying observation");
                    if delay > 0 {
                        thread::sleep(Duration::from_millis(delay));
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl Default for RetryPolicy {
    /// Default: 3 retries, exponential backoff, 500ms base delay.
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            strategy: BackoffStrategy::Exponential,
            base_delay_ms: 500,
        }
    }
}

//! Retry policy for failed deal checks and proposals.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Always wait `base_ms`.
    Fixed,
    /// `base_ms * 2^(attempt - 1)`, capped at `max_ms`, with jitter.
    Exponential,
}

const fn default_strategy() -> RetryStrategy {
    RetryStrategy::Exponential
}

const fn default_base_ms() -> u64 {
    60 * 1_000
}

const fn default_max_ms() -> u64 {
    6 * 60 * 60 * 1_000
}

const fn default_jitter_ratio() -> f64 {
    0.25
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_strategy")]
    pub strategy: RetryStrategy,

    #[serde(default = "default_base_ms")]
    pub base_ms: u64,

    #[serde(default = "default_max_ms")]
    pub max_ms: u64,

    /// Fraction of the delay randomised in each direction.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            base_ms: default_base_ms(),
            max_ms: default_max_ms(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

impl RetryConfig {
    pub const fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub const fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let config = RetryConfig::default();
        assert_eq!(config.strategy, RetryStrategy::Exponential);
        assert_eq!(config.base(), Duration::from_secs(60));
        assert_eq!(config.max(), Duration::from_secs(6 * 60 * 60));
    }
}

//! Retry delays for failed deal checks and deal proposals.
//!
//! The delay for a queue entry depends only on the entry and its consecutive
//! failure count, so two processes computing the next attempt for the same
//! failure agree on it and a restart does not reset the schedule.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use quay_config::{RetryConfig, RetryStrategy};
use quay_core::ids::ContentId;
use quay_core::store::latest_schedule;

/// Computes how long to wait before retrying an entry.
pub trait BackoffPolicy: Send + Sync + fmt::Debug {
    /// Delay after `attempts` consecutive failures (`attempts >= 1`).
    fn delay(&self, content_id: ContentId, attempts: u32) -> Duration;
}

/// Always wait the same amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    pub delay: Duration,
}

impl BackoffPolicy for FixedBackoff {
    fn delay(&self, _content_id: ContentId, _attempts: u32) -> Duration {
        self.delay
    }
}

/// Doubling delay capped at `max`, spread by a per-entry jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
    /// Fraction of the anchor delay the jitter may add or remove.
    pub jitter_ratio: f64,
}

impl ExponentialBackoff {
    fn anchor_ms(&self, attempts: u32) -> u64 {
        if attempts == 0 {
            return 0;
        }
        let base = duration_ms(self.base);
        let max = duration_ms(self.max);
        let shift = attempts.saturating_sub(1).min(63);
        base.checked_mul(1_u64 << shift).unwrap_or(max).min(max)
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn jittered_ms(&self, anchor_ms: u64, content_id: ContentId, attempts: u32) -> u64 {
        if anchor_ms == 0 {
            return 0;
        }
        let max = duration_ms(self.max) as f64;
        let span = (anchor_ms as f64) * self.jitter_ratio.clamp(0.0, 1.0);
        let lower = (anchor_ms as f64 - span).max(0.0);
        let upper = (anchor_ms as f64 + span).min(max);
        if upper <= lower {
            return lower.round() as u64;
        }
        let unit = deterministic_unit(content_id, attempts);
        (lower + (upper - lower) * unit).round() as u64
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, content_id: ContentId, attempts: u32) -> Duration {
        let anchor = self.anchor_ms(attempts);
        Duration::from_millis(self.jittered_ms(anchor, content_id, attempts))
    }
}

/// Build the policy selected by `[retry]`.
#[must_use]
pub fn from_config(config: &RetryConfig) -> Arc<dyn BackoffPolicy> {
    match config.strategy {
        RetryStrategy::Fixed => Arc::new(FixedBackoff {
            delay: config.base(),
        }),
        RetryStrategy::Exponential => Arc::new(ExponentialBackoff {
            base: config.base(),
            max: config.max(),
            jitter_ratio: config.jitter_ratio,
        }),
    }
}

/// `now + delay`, saturating at [`latest_schedule`].
#[must_use]
pub fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    let ceiling = latest_schedule();
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .map_or(ceiling, |at| at.min(ceiling))
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[allow(clippy::cast_precision_loss)]
fn deterministic_unit(content_id: ContentId, attempts: u32) -> f64 {
    let mut hasher = DefaultHasher::new();
    content_id.hash(&mut hasher);
    attempts.hash(&mut hasher);
    (hasher.finish() as f64) / (u64::MAX as f64)
}

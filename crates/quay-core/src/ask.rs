//! Storage provider asks and price ceilings.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A provider's advertised price and acceptable piece size range.
///
/// Prices are attoFIL per GiB per epoch.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Ask {
    pub price: u64,
    pub verified_price: u64,
    pub min_piece_size: u64,
    pub max_piece_size: u64,
}

impl Ask {
    /// Whether the applicable price exceeds the ceiling.
    ///
    /// Verified deals are charged `verified_price`, everything else `price`.
    #[must_use]
    pub const fn price_is_too_high(&self, verified: bool, ceiling: &PriceCeiling) -> bool {
        if verified {
            self.verified_price > ceiling.verified
        } else {
            self.price > ceiling.unverified
        }
    }

    /// Whether `piece_size` falls inside the accepted range (inclusive).
    #[must_use]
    pub const fn size_is_close_enough(&self, piece_size: u64) -> bool {
        piece_size >= self.min_piece_size && piece_size <= self.max_piece_size
    }
}

/// Maximum acceptable ask price, per verification mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PriceCeiling {
    pub unverified: u64,
    pub verified: u64,
}

/// An ask together with when it was fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAsk {
    pub ask: Ask,
    pub fetched_at: DateTime<Utc>,
}

impl CachedAsk {
    /// Whether the ask is still usable at `now` given `max_staleness`.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, max_staleness: chrono::Duration) -> bool {
        now.signed_duration_since(self.fetched_at) <= max_staleness
    }
}

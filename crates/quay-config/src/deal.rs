//! Deal making policy.

use std::time::Duration;

use quay_core::ask::PriceCeiling;
use serde::{Deserialize, Serialize};

const fn default_replication() -> u32 {
    6
}

const fn default_true() -> bool {
    true
}

fn default_enabled_protocols() -> Vec<String> {
    vec![
        "/fil/storage/mk/1.1.0".to_string(),
        "/fil/storage/mk/1.2.0".to_string(),
    ]
}

/// 0.0000000005 FIL per GiB per epoch.
const fn default_max_price() -> u64 {
    500_000_000
}

const fn default_max_verified_price() -> u64 {
    0
}

const fn default_ask_max_staleness_secs() -> u64 {
    30 * 60
}

const fn default_recheck_interval_secs() -> u64 {
    6 * 60 * 60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct DealConfig {
    /// Target number of deals per content.
    #[serde(default = "default_replication")]
    pub replication: u32,

    /// Whether deals are made as verified deals.
    #[serde(default = "default_true")]
    pub verified: bool,

    /// Whether provider selection drops providers above the price ceiling.
    #[serde(default = "default_true")]
    pub filter_by_price: bool,

    /// Stops the make worker from proposing deals.
    #[serde(default)]
    pub disabled: bool,

    /// Deal protocol ids providers must speak.
    #[serde(default = "default_enabled_protocols")]
    pub enabled_protocols: Vec<String>,

    /// Ceiling for unverified asks (attoFIL per GiB per epoch).
    #[serde(default = "default_max_price")]
    pub max_price: u64,

    /// Ceiling for verified asks (attoFIL per GiB per epoch).
    #[serde(default = "default_max_verified_price")]
    pub max_verified_price: u64,

    /// How old a cached provider ask may be before it is refetched.
    #[serde(default = "default_ask_max_staleness_secs")]
    pub ask_max_staleness_secs: u64,

    /// Delay before a content's deals are checked again after a success.
    #[serde(default = "default_recheck_interval_secs")]
    pub recheck_interval_secs: u64,
}

impl Default for DealConfig {
    fn default() -> Self {
        Self {
            replication: default_replication(),
            verified: true,
            filter_by_price: true,
            disabled: false,
            enabled_protocols: default_enabled_protocols(),
            max_price: default_max_price(),
            max_verified_price: default_max_verified_price(),
            ask_max_staleness_secs: default_ask_max_staleness_secs(),
            recheck_interval_secs: default_recheck_interval_secs(),
        }
    }
}

impl DealConfig {
    pub const fn price_ceiling(&self) -> PriceCeiling {
        PriceCeiling {
            unverified: self.max_price,
            verified: self.max_verified_price,
        }
    }

    pub const fn ask_max_staleness(&self) -> Duration {
        Duration::from_secs(self.ask_max_staleness_secs)
    }

    pub const fn recheck_interval(&self) -> Duration {
        Duration::from_secs(self.recheck_interval_secs)
    }

    pub fn is_protocol_enabled(&self, protocol: &str) -> bool {
        self.enabled_protocols.iter().any(|p| p == protocol)
    }
}

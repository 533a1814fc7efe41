//! Timer and paging settings shared by the deal workers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const fn default_deal_interval_secs() -> u64 {
    30
}

const fn default_page_size() -> u32 {
    2000
}

const fn default_claim_lease_secs() -> u64 {
    10 * 60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Tick interval for the backfill, check and make loops.
    #[serde(default = "default_deal_interval_secs")]
    pub deal_interval_secs: u64,

    /// Contents enqueued per backfill tick.
    #[serde(default = "default_page_size")]
    pub backfill_page_size: u32,

    /// Queue rows processed per check/make tick.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// How long a claimed queue row stays invisible to other workers.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            deal_interval_secs: default_deal_interval_secs(),
            backfill_page_size: default_page_size(),
            page_size: default_page_size(),
            claim_lease_secs: default_claim_lease_secs(),
        }
    }
}

impl WorkerConfig {
    pub const fn deal_interval(&self) -> Duration {
        Duration::from_secs(self.deal_interval_secs)
    }

    pub const fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_secs)
    }
}

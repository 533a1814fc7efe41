//! Size window for content that may be dealt on its own.

use serde::{Deserialize, Serialize};

const fn default_min_size() -> u64 {
    1
}

/// 31 GiB: leaves headroom under a 32 GiB sector once padded.
const fn default_max_size() -> u64 {
    31 << 30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContentConfig {
    /// Smallest content (bytes) the backfill enqueues.
    #[serde(default = "default_min_size")]
    pub min_size: u64,

    /// Largest content (bytes) the backfill enqueues.
    #[serde(default = "default_max_size")]
    pub max_size: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
            max_size: default_max_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let config = ContentConfig::default();
        assert_eq!(config.min_size, 1);
        assert_eq!(config.max_size, 31 << 30);
    }
}

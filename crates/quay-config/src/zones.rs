//! Staging zone sizing.

use serde::{Deserialize, Serialize};

const fn default_max_size() -> u64 {
    31 << 30
}

const fn default_min_size() -> u64 {
    4 << 30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ZoneConfig {
    /// Hard ceiling on the summed size of a zone's members.
    #[serde(default = "default_max_size")]
    pub max_size: u64,

    /// Size at which an open zone is ready to be aggregated.
    #[serde(default = "default_min_size")]
    pub min_size: u64,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            min_size: default_min_size(),
        }
    }
}

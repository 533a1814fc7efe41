//! Provider registry seeding and ask caching.

use serde::{Deserialize, Serialize};

const fn default_ask_cache_capacity() -> usize {
    4096
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersConfig {
    /// Addresses registered when the provider table is empty.
    #[serde(default)]
    pub default_addresses: Vec<String>,

    /// Maximum number of provider asks kept in memory.
    #[serde(default = "default_ask_cache_capacity")]
    pub ask_cache_capacity: usize,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default_addresses: Vec::new(),
            ask_cache_capacity: default_ask_cache_capacity(),
        }
    }
}

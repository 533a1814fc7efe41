//! # quay-config
//!
//! Layered configuration loading for Quay using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`QUAY_*` prefix, `__` as separator)
//! 2. Project-level `.quay/config.toml`
//! 3. User-level `~/.config/quay/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `QUAY_DEAL__REPLICATION` -> `deal.replication`,
//! `QUAY_WORKERS__PAGE_SIZE` -> `workers.page_size`, etc.
//! The `__` (double underscore) separates nested config sections.
//!
//! # Usage
//!
//! ```no_run
//! use quay_config::QuayConfig;
//!
//! let config = QuayConfig::load_with_dotenv().expect("config");
//! config.validate().expect("valid config");
//!
//! println!("dealing every {:?}", config.workers.deal_interval());
//! ```

mod content;
mod database;
mod deal;
mod error;
mod providers;
mod retry;
mod workers;
mod zones;

pub use content::ContentConfig;
pub use database::DatabaseConfig;
pub use deal::DealConfig;
pub use error::ConfigError;
pub use providers::ProvidersConfig;
pub use retry::{RetryConfig, RetryStrategy};
pub use workers::WorkerConfig;
pub use zones::ZoneConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upper bound on any configured retry, recheck, or lease delay.
pub const MAX_DELAY_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct QuayConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub zones: ZoneConfig,
    #[serde(default)]
    pub deal: DealConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl QuayConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] if you need
    /// `.env` file loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Figment` if a source cannot be read or a value
    /// does not fit its field.
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment().extract().map_err(ConfigError::from)
    }

    /// Load configuration with `.env` file support.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// This is public so tests can inspect the figment directly or add
    /// additional providers on top.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Layer 1: User-global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        // Layer 2: Project-local config
        let local_path = PathBuf::from(".quay/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        // Layer 3: Environment variables (highest priority)
        figment = figment.merge(Env::prefixed("QUAY_").split("__"));

        figment
    }

    /// Reject combinations the workers cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.content.min_size > self.content.max_size {
            return Err(ConfigError::invalid(
                "content.min_size",
                "must not exceed content.max_size",
            ));
        }
        if self.zones.max_size == 0 {
            return Err(ConfigError::invalid("zones.max_size", "must be positive"));
        }
        if self.zones.min_size > self.zones.max_size {
            return Err(ConfigError::invalid(
                "zones.min_size",
                "must not exceed zones.max_size",
            ));
        }
        if self.deal.enabled_protocols.is_empty() {
            return Err(ConfigError::invalid(
                "deal.enabled_protocols",
                "at least one deal protocol must be enabled",
            ));
        }
        if self.workers.deal_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "workers.deal_interval_secs",
                "must be positive",
            ));
        }
        if self.workers.page_size == 0 || self.workers.backfill_page_size == 0 {
            return Err(ConfigError::invalid("workers.page_size", "must be positive"));
        }
        if self.providers.ask_cache_capacity == 0 {
            return Err(ConfigError::invalid(
                "providers.ask_cache_capacity",
                "must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            return Err(ConfigError::invalid(
                "retry.jitter_ratio",
                "must be between 0 and 1",
            ));
        }
        if self.retry.base_ms > self.retry.max_ms {
            return Err(ConfigError::invalid(
                "retry.base_ms",
                "must not exceed retry.max_ms",
            ));
        }
        let delays = [
            ("retry.max_ms", self.retry.max_ms / 1_000),
            ("deal.recheck_interval_secs", self.deal.recheck_interval_secs),
            ("workers.claim_lease_secs", self.workers.claim_lease_secs),
        ];
        for (field, secs) in delays {
            if secs > MAX_DELAY_SECS {
                return Err(ConfigError::invalid(field, "must not exceed one year"));
            }
        }
        Ok(())
    }

    /// Path to the user-global config file.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("quay").join("config.toml"))
    }

    /// Load `.env` from the workspace root.
    ///
    /// Walks up from `CARGO_MANIFEST_DIR` (if available) or current dir looking
    /// for a `.env` file. Silently does nothing if no `.env` is found.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            // crate -> crates/ -> workspace root
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }

        let _ = dotenvy::dotenv();
    }
}

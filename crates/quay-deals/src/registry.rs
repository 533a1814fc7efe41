//! Known storage providers and their eligibility.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use quay_core::ask::Ask;
use quay_core::entities::ProviderRecord;
use quay_core::store::{Store, StoreError};

/// Read-mostly view over the provider table.
#[derive(Clone)]
pub struct ProviderRegistry {
    store: Arc<dyn Store>,
}

impl ProviderRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// All providers that may currently receive deals.
    ///
    /// # Errors
    ///
    /// Store failures are returned unchanged, as in every method here.
    pub async fn eligible(&self) -> Result<Vec<ProviderRecord>, StoreError> {
        self.store.list_providers(false).await
    }

    /// Every known provider, suspended ones included.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn all(&self) -> Result<Vec<ProviderRecord>, StoreError> {
        self.store.list_providers(true).await
    }

    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn get(&self, address: &str) -> Result<Option<ProviderRecord>, StoreError> {
        self.store.get_provider(address).await
    }

    /// Register an address. Registering a known address changes nothing.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn register(&self, address: &str) -> Result<bool, StoreError> {
        self.store.upsert_provider(address).await
    }

    /// # Errors
    ///
    /// Returns `StoreError::NotFound` for an unknown address.
    pub async fn suspend(&self, address: &str) -> Result<(), StoreError> {
        self.set_suspended(address, true).await
    }

    /// # Errors
    ///
    /// Returns `StoreError::NotFound` for an unknown address.
    pub async fn unsuspend(&self, address: &str) -> Result<(), StoreError> {
        self.set_suspended(address, false).await
    }

    async fn set_suspended(&self, address: &str, suspended: bool) -> Result<(), StoreError> {
        if !self.store.set_provider_suspended(address, suspended).await? {
            return Err(StoreError::not_found("provider", address));
        }
        tracing::info!(provider = address, suspended, "provider suspension changed");
        Ok(())
    }

    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn record_ask(
        &self,
        address: &str,
        ask: &Ask,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.store.record_provider_ask(address, ask, fetched_at).await
    }

    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn record_protocol(&self, address: &str, protocol: &str) -> Result<(), StoreError> {
        self.store.record_provider_protocol(address, protocol).await
    }

    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn record_version(&self, address: &str, version: &str) -> Result<(), StoreError> {
        self.store.record_provider_version(address, version).await
    }

    /// Register `addresses` when the registry is empty.
    ///
    /// Returns how many providers were added; a populated registry is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Propagates store failures; providers added before the failure stay.
    pub async fn seed_defaults(&self, addresses: &[String]) -> Result<usize, StoreError> {
        if self.store.count_providers().await? > 0 {
            return Ok(0);
        }
        let mut added = 0;
        for address in addresses {
            if self.store.upsert_provider(address).await? {
                added += 1;
            }
        }
        tracing::info!(added, "seeded default providers");
        Ok(added)
    }
}

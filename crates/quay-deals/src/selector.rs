//! Storage provider selection for deal proposals.
//!
//! Candidates are visited in a fresh random order on every call so that load
//! spreads across providers. Each candidate must speak an enabled deal
//! protocol, have a resolvable ask, pass the price ceiling (when price
//! filtering is on) and accept the piece size.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use quay_config::DealConfig;
use quay_core::ask::Ask;
use quay_core::client::{ClientError, SelectedProvider, StorageClient};
use quay_core::entities::ProviderRecord;
use quay_core::store::StoreError;
use rand::seq::SliceRandom;

use crate::ask_cache::AskCache;
use crate::error::DealError;
use crate::registry::ProviderRegistry;

pub struct ProviderSelector {
    registry: ProviderRegistry,
    client: Arc<dyn StorageClient>,
    asks: AskCache,
    deal: DealConfig,
}

impl ProviderSelector {
    pub fn new(
        registry: ProviderRegistry,
        client: Arc<dyn StorageClient>,
        deal: DealConfig,
        ask_cache_capacity: NonZeroUsize,
    ) -> Self {
        Self {
            registry,
            client,
            asks: AskCache::new(ask_cache_capacity, deal.ask_max_staleness()),
            deal,
        }
    }

    pub const fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Pick up to `n` distinct providers able to store a piece of
    /// `piece_size` bytes.
    ///
    /// Addresses in `exclude` are skipped and every accepted address is added
    /// to it. Returning fewer than `n` providers is not an error; only a
    /// failure to list the registry is.
    ///
    /// # Errors
    ///
    /// Returns `DealError::Store` if the registry cannot be listed.
    pub async fn select_providers(
        &self,
        n: usize,
        piece_size: u64,
        exclude: &mut HashSet<String>,
        filter_by_price: bool,
    ) -> Result<Vec<SelectedProvider>, StoreError> {
        self.select_providers_at(n, piece_size, exclude, filter_by_price, Utc::now())
            .await
    }

    pub(crate) async fn select_providers_at(
        &self,
        n: usize,
        piece_size: u64,
        exclude: &mut HashSet<String>,
        filter_by_price: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<SelectedProvider>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut candidates = self.registry.eligible().await?;
        if candidates.is_empty() {
            tracing::warn!("no eligible storage providers registered");
            return Ok(Vec::new());
        }
        candidates.shuffle(&mut rand::rng());

        let ceiling = self.deal.price_ceiling();
        let mut selected = Vec::with_capacity(n.min(candidates.len()));
        for record in candidates {
            if selected.len() >= n {
                break;
            }
            let address = record.address.as_str();
            if exclude.contains(address) {
                continue;
            }

            let protocol = match self.resolve_protocol(&record).await {
                Ok(protocol) => protocol,
                Err(error) => {
                    tracing::warn!(provider = address, %error, "failed to resolve deal protocol");
                    continue;
                }
            };
            if !self.deal.is_protocol_enabled(&protocol) {
                tracing::debug!(provider = address, %protocol, "deal protocol not enabled");
                continue;
            }

            let ask = match self.resolve_ask(&record, now).await {
                Ok(ask) => ask,
                Err(error) => {
                    tracing::warn!(provider = address, %error, "failed to get ask");
                    continue;
                }
            };
            if filter_by_price && ask.price_is_too_high(self.deal.verified, &ceiling) {
                tracing::debug!(provider = address, price = ask.price, "ask price too high");
                continue;
            }
            if !ask.size_is_close_enough(piece_size) {
                tracing::debug!(
                    provider = address,
                    piece_size,
                    min = ask.min_piece_size,
                    max = ask.max_piece_size,
                    "piece size outside ask range"
                );
                continue;
            }

            exclude.insert(record.address.clone());
            selected.push(SelectedProvider {
                address: record.address,
                protocol,
                ask,
            });
        }

        if selected.len() < n {
            tracing::info!(wanted = n, found = selected.len(), piece_size, "short provider selection");
        }
        Ok(selected)
    }

    /// Ask the provider for its software version and persist it.
    ///
    /// Empty versions are ignored and returned as `None`.
    ///
    /// # Errors
    ///
    /// Returns `DealError::Client` if the provider does not answer and
    /// `DealError::Store` if the version cannot be saved.
    pub async fn refresh_provider_version(&self, address: &str) -> Result<Option<String>, DealError> {
        let version = self.client.provider_version(address).await?;
        let version = version.trim();
        if version.is_empty() {
            return Ok(None);
        }
        self.registry.record_version(address, version).await?;
        Ok(Some(version.to_string()))
    }

    async fn resolve_protocol(&self, record: &ProviderRecord) -> Result<String, ClientError> {
        let protocol = self.client.resolve_protocol(&record.address).await?;
        if record.protocol.as_deref() != Some(protocol.as_str()) {
            if let Err(error) = self.registry.record_protocol(&record.address, &protocol).await {
                tracing::warn!(provider = %record.address, %error, "failed to persist protocol");
            }
        }
        Ok(protocol)
    }

    async fn resolve_ask(&self, record: &ProviderRecord, now: DateTime<Utc>) -> Result<Ask, ClientError> {
        let address = record.address.as_str();
        if let Some(ask) = self.asks.get(address, now) {
            return Ok(ask);
        }
        if let Some(persisted) = record.cached_ask() {
            self.asks.warm(address, persisted);
            if let Some(ask) = self.asks.get(address, now) {
                return Ok(ask);
            }
        }

        let ask = self
            .client
            .get_ask(address, self.deal.ask_max_staleness())
            .await?;
        self.asks.insert(address, ask.clone(), now);
        if let Err(error) = self.registry.record_ask(address, &ask, now).await {
            tracing::warn!(provider = address, %error, "failed to persist ask");
        }
        Ok(ask)
    }
}

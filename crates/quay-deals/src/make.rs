//! Deal-make worker: proposes deals for entries that still need them.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use quay_config::{DealConfig, WorkerConfig};
use quay_core::client::StorageClient;
use quay_core::entities::DealQueueEntry;
use quay_core::errors::CoreError;
use quay_core::ids::padded_piece_size;
use quay_core::store::Store;

use crate::backoff::{BackoffPolicy, after};
use crate::error::DealError;
use crate::selector::ProviderSelector;
use crate::tick::TickSummary;

pub struct DealMakeWorker {
    store: Arc<dyn Store>,
    client: Arc<dyn StorageClient>,
    selector: Arc<ProviderSelector>,
    backoff: Arc<dyn BackoffPolicy>,
    page_size: u32,
    claim_lease: Duration,
    recheck_interval: Duration,
    filter_by_price: bool,
    disabled: AtomicBool,
}

impl DealMakeWorker {
    pub fn new(
        store: Arc<dyn Store>,
        client: Arc<dyn StorageClient>,
        selector: Arc<ProviderSelector>,
        backoff: Arc<dyn BackoffPolicy>,
        workers: &WorkerConfig,
        deal: &DealConfig,
    ) -> Self {
        Self {
            store,
            client,
            selector,
            backoff,
            page_size: workers.page_size,
            claim_lease: workers.claim_lease(),
            recheck_interval: deal.recheck_interval(),
            filter_by_price: deal.filter_by_price,
            disabled: AtomicBool::new(deal.disabled),
        }
    }

    /// Stop or resume deal making. Takes effect from the next tick; a tick
    /// already past the check finishes its page.
    pub fn set_deal_making_disabled(&self, disabled: bool) {
        let was = self.disabled.swap(disabled, Ordering::SeqCst);
        if was != disabled {
            tracing::info!(disabled, "deal making toggled");
        }
    }

    pub fn is_deal_making_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    /// # Errors
    ///
    /// See [`Self::tick_at`].
    pub async fn tick(&self) -> Result<TickSummary, DealError> {
        self.tick_at(Utc::now()).await
    }

    /// Process one page of entries due for deal making at `now`.
    ///
    /// # Errors
    ///
    /// Returns `DealError::Store` when the store fails. Selection and
    /// proposal failures are recorded on the entry with a backoff instead.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickSummary, DealError> {
        if self.is_deal_making_disabled() {
            tracing::debug!("deal making is disabled");
            return Ok(TickSummary::default());
        }

        let entries = self
            .store
            .find_eligible_for_deal(now, self.page_size)
            .await?;
        let mut summary = TickSummary {
            selected: entries.len(),
            ..TickSummary::default()
        };
        if entries.is_empty() {
            return Ok(summary);
        }
        tracing::debug!(entries = entries.len(), "running deal worker");

        let lease_until = after(now, self.claim_lease);
        for entry in entries {
            let content_id = entry.content_id;
            if !self.store.claim_for_deal(content_id, now, lease_until).await? {
                tracing::debug!(content_id, "entry claimed elsewhere");
                continue;
            }
            summary.claimed += 1;

            match self.make_deals(&entry).await {
                Ok(proposed) => {
                    let next_check_at = after(now, self.recheck_interval);
                    self.store
                        .record_deal_success(content_id, next_check_at)
                        .await?;
                    tracing::info!(content_id, proposed, wanted = entry.deal_count, "deals proposed");
                    summary.succeeded += 1;
                }
                Err(error) if error.is_store() => return Err(error),
                Err(error) => {
                    let attempts = entry.deal_attempts.saturating_add(1);
                    let next_deal_at = after(now, self.backoff.delay(content_id, attempts));
                    self.store
                        .record_deal_failure(content_id, attempts, next_deal_at)
                        .await?;
                    tracing::warn!(content_id, attempts, %error, %next_deal_at, "deal making failed");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Select providers and propose deals. Returns how many were proposed.
    async fn make_deals(&self, entry: &DealQueueEntry) -> Result<usize, DealError> {
        let content_id = entry.content_id;
        if entry.deal_count == 0 {
            return Ok(0);
        }
        let content = self
            .store
            .get_content(content_id)
            .await?
            .ok_or(CoreError::ContentNotFound(content_id))?;

        let piece_size = padded_piece_size(content.size);
        let mut exclude = HashSet::new();
        let providers = self
            .selector
            .select_providers(
                entry.deal_count as usize,
                piece_size,
                &mut exclude,
                self.filter_by_price,
            )
            .await?;
        if providers.is_empty() {
            return Err(DealError::NoProviders(content_id));
        }

        self.client.propose_deals(content_id, &providers).await?;
        Ok(providers.len())
    }
}

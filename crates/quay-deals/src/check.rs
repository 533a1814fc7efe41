//! Deal-check worker: asks the storage network how many more deals each
//! queued content needs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use quay_config::{DealConfig, WorkerConfig};
use quay_core::client::StorageClient;
use quay_core::store::Store;

use crate::backoff::{BackoffPolicy, after};
use crate::error::DealError;
use crate::tick::TickSummary;

pub struct DealCheckWorker {
    store: Arc<dyn Store>,
    client: Arc<dyn StorageClient>,
    backoff: Arc<dyn BackoffPolicy>,
    page_size: u32,
    claim_lease: Duration,
    recheck_interval: Duration,
    replication: u32,
}

impl DealCheckWorker {
    pub fn new(
        store: Arc<dyn Store>,
        client: Arc<dyn StorageClient>,
        backoff: Arc<dyn BackoffPolicy>,
        workers: &WorkerConfig,
        deal: &DealConfig,
    ) -> Self {
        Self {
            store,
            client,
            backoff,
            page_size: workers.page_size,
            claim_lease: workers.claim_lease(),
            recheck_interval: deal.recheck_interval(),
            replication: deal.replication,
        }
    }

    /// # Errors
    ///
    /// See [`Self::tick_at`].
    pub async fn tick(&self) -> Result<TickSummary, DealError> {
        self.tick_at(Utc::now()).await
    }

    /// Process one page of entries due for a check at `now`.
    ///
    /// Client failures are recorded on the entry and do not end the tick;
    /// store failures do.
    ///
    /// # Errors
    ///
    /// Returns `DealError::Store` on the first store failure.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickSummary, DealError> {
        let entries = self
            .store
            .find_eligible_for_check(now, self.page_size)
            .await?;
        let mut summary = TickSummary {
            selected: entries.len(),
            ..TickSummary::default()
        };
        if entries.is_empty() {
            return Ok(summary);
        }
        tracing::debug!(entries = entries.len(), "running deal check worker");

        let lease_until = after(now, self.claim_lease);
        for entry in entries {
            let content_id = entry.content_id;
            if !self.store.claim_for_check(content_id, now, lease_until).await? {
                tracing::debug!(content_id, "entry claimed elsewhere");
                continue;
            }
            summary.claimed += 1;

            match self.client.check_deals(content_id, self.replication).await {
                Ok(deficit) => {
                    let next_check_at = after(now, self.recheck_interval);
                    self.store
                        .record_check_success(content_id, deficit, now, next_check_at)
                        .await?;
                    tracing::debug!(content_id, deficit, "deal check complete");
                    summary.succeeded += 1;
                }
                Err(error) => {
                    let attempts = entry.deal_check_attempts.saturating_add(1);
                    let next_check_at = after(now, self.backoff.delay(content_id, attempts));
                    self.store
                        .record_check_failure(content_id, attempts, next_check_at)
                        .await?;
                    tracing::warn!(content_id, attempts, %error, %next_check_at, "deal check failed");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}

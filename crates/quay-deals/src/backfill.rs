//! One-time backfill of historical content into the deal queue.
//!
//! A singleton tracker row holds the cursor. It is created on first use with
//! `stop_at` set to the newest sized content at that moment; content created
//! later is queued by the ingestion path, not by the backfill. Each tick
//! queues one page and advances the cursor past every queued id, so a
//! restart resumes where the last tick stopped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use quay_config::ContentConfig;
use quay_core::entities::DealQueueTracker;
use quay_core::ids::ContentId;
use quay_core::store::{Store, StoreError};

use crate::error::DealError;

/// Result of one backfill tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillProgress {
    /// A page was processed and more may remain.
    Advanced {
        enqueued: usize,
        last_content_id: ContentId,
    },
    /// This tick finished the backfill.
    Finished,
    /// The backfill was already complete.
    AlreadyDone,
}

impl BackfillProgress {
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Finished | Self::AlreadyDone)
    }
}

pub struct BackfillWorker {
    store: Arc<dyn Store>,
    min_size: u64,
    max_size: u64,
    page_size: u32,
}

impl BackfillWorker {
    pub fn new(store: Arc<dyn Store>, content: &ContentConfig, page_size: u32) -> Self {
        Self {
            store,
            min_size: content.min_size,
            max_size: content.max_size,
            page_size,
        }
    }

    /// # Errors
    ///
    /// See [`Self::tick_at`].
    pub async fn tick(&self) -> Result<BackfillProgress, DealError> {
        self.tick_at(Utc::now()).await
    }

    /// Enqueue one page of content past the tracker cursor.
    ///
    /// # Errors
    ///
    /// Returns `DealError::Store` if the page cannot be read or the cursor
    /// cannot be advanced. The cursor only moves past enqueued content.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<BackfillProgress, DealError> {
        let tracker = self.tracker().await?;
        if tracker.backfill_done {
            return Ok(BackfillProgress::AlreadyDone);
        }
        if tracker.is_corrupt() {
            tracing::warn!(
                last_content_id = tracker.last_content_id,
                stop_at = tracker.stop_at,
                "deal queue tracker cursor is past its horizon, ending backfill"
            );
            return self.finish().await;
        }
        if tracker.reached_horizon() {
            return self.finish().await;
        }

        tracing::debug!(from = tracker.last_content_id, stop_at = tracker.stop_at, "backfilling deal queue");
        let page = self
            .store
            .find_backfill_page(
                tracker.last_content_id,
                tracker.stop_at,
                self.min_size,
                self.max_size,
                self.page_size,
            )
            .await?;
        if page.is_empty() {
            self.store.set_tracker_stop_at(tracker.last_content_id).await?;
            return self.finish().await;
        }

        let mut enqueued = 0;
        let mut last_content_id = tracker.last_content_id;
        for content in &page {
            if let Err(error) = self.store.enqueue(content.id, false, now).await {
                tracing::warn!(content_id = content.id, %error, "failed to backfill deal queue entry");
                break;
            }
            self.store.advance_tracker(content.id).await?;
            last_content_id = content.id;
            enqueued += 1;
        }

        if last_content_id >= tracker.stop_at {
            return self.finish().await;
        }
        Ok(BackfillProgress::Advanced {
            enqueued,
            last_content_id,
        })
    }

    /// Load the tracker, creating it on first use.
    async fn tracker(&self) -> Result<DealQueueTracker, StoreError> {
        if let Some(tracker) = self.store.get_tracker().await? {
            return Ok(tracker);
        }
        let stop_at = self.store.max_content_id().await?.unwrap_or(0);
        self.store.create_tracker(stop_at).await
    }

    async fn finish(&self) -> Result<BackfillProgress, DealError> {
        self.store.mark_backfill_done().await?;
        tracing::info!("deal queue backfill is done");
        Ok(BackfillProgress::Finished)
    }
}

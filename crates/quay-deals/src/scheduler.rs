//! Background runtime for the backfill, check and make loops.
//!
//! Each loop owns its own fixed-interval timer and processes at most one
//! page per tick. All three observe one [`CancellationToken`]; an entry that
//! is being processed when the token fires finishes before the loop exits.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quay_config::QuayConfig;
use quay_core::client::StorageClient;
use quay_core::store::Store;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backfill::BackfillWorker;
use crate::backoff::{self, BackoffPolicy};
use crate::check::DealCheckWorker;
use crate::error::DealError;
use crate::make::DealMakeWorker;
use crate::registry::ProviderRegistry;
use crate::selector::ProviderSelector;

/// Owns the three deal queue workers and their task handles.
pub struct DealScheduler {
    backfill: Arc<BackfillWorker>,
    check: Arc<DealCheckWorker>,
    make: Arc<DealMakeWorker>,
    selector: Arc<ProviderSelector>,
    default_providers: Vec<String>,
    interval: Duration,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DealScheduler {
    /// Build the workers with the backoff policy named in `config.retry`.
    pub fn new(
        store: Arc<dyn Store>,
        client: Arc<dyn StorageClient>,
        config: &QuayConfig,
    ) -> Self {
        Self::with_backoff(store, client, config, backoff::from_config(&config.retry))
    }

    pub fn with_backoff(
        store: Arc<dyn Store>,
        client: Arc<dyn StorageClient>,
        config: &QuayConfig,
        backoff: Arc<dyn BackoffPolicy>,
    ) -> Self {
        let registry = ProviderRegistry::new(store.clone());
        let capacity =
            NonZeroUsize::new(config.providers.ask_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        let selector = Arc::new(ProviderSelector::new(
            registry,
            client.clone(),
            config.deal.clone(),
            capacity,
        ));

        let backfill = Arc::new(BackfillWorker::new(
            store.clone(),
            &config.content,
            config.workers.backfill_page_size,
        ));
        let check = Arc::new(DealCheckWorker::new(
            store.clone(),
            client.clone(),
            backoff.clone(),
            &config.workers,
            &config.deal,
        ));
        let make = Arc::new(DealMakeWorker::new(
            store,
            client,
            selector.clone(),
            backoff,
            &config.workers,
            &config.deal,
        ));

        Self {
            backfill,
            check,
            make,
            selector,
            default_providers: config.providers.default_addresses.clone(),
            interval: config.workers.deal_interval(),
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Override the tick interval of all three loops.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn selector(&self) -> &Arc<ProviderSelector> {
        &self.selector
    }

    pub fn registry(&self) -> &ProviderRegistry {
        self.selector.registry()
    }

    /// Pause or resume the deal-make loop without stopping the scheduler.
    /// Backfill and deal checks keep running.
    pub fn set_deal_making_disabled(&self, disabled: bool) {
        self.make.set_deal_making_disabled(disabled);
    }

    pub fn is_deal_making_disabled(&self) -> bool {
        self.make.is_deal_making_disabled()
    }

    /// Seed the provider registry and spawn the loops.
    ///
    /// Calling `start` on a running scheduler does nothing.
    ///
    /// # Errors
    ///
    /// Returns `DealError` if seeding the provider registry fails.
    pub async fn start(&self) -> Result<(), DealError> {
        if self.is_running() {
            return Ok(());
        }
        let seeded = self
            .selector
            .registry()
            .seed_defaults(&self.default_providers)
            .await?;
        if seeded > 0 {
            tracing::info!(seeded, "registered default storage providers");
        }

        let backfill = self.backfill.clone();
        let backfill_handle = self.spawn_loop("backfill", move || {
            let backfill = backfill.clone();
            async move {
                match backfill.tick().await {
                    Ok(progress) => {
                        tracing::debug!(?progress, "backfill tick");
                        progress.is_done()
                    }
                    Err(error) => {
                        tracing::error!(%error, "backfill tick failed");
                        false
                    }
                }
            }
        });

        let check = self.check.clone();
        let check_handle = self.spawn_loop("deal check", move || {
            let check = check.clone();
            async move {
                match check.tick().await {
                    Ok(summary) if summary.selected > 0 => {
                        tracing::info!(
                            claimed = summary.claimed,
                            skipped = summary.skipped(),
                            succeeded = summary.succeeded,
                            failed = summary.failed,
                            "deal check tick"
                        );
                    }
                    Ok(_) => {}
                    Err(error) => tracing::error!(%error, "deal check tick failed"),
                }
                false
            }
        });

        let make = self.make.clone();
        let make_handle = self.spawn_loop("deal make", move || {
            let make = make.clone();
            async move {
                match make.tick().await {
                    Ok(summary) if summary.selected > 0 => {
                        tracing::info!(
                            claimed = summary.claimed,
                            skipped = summary.skipped(),
                            succeeded = summary.succeeded,
                            failed = summary.failed,
                            "deal make tick"
                        );
                    }
                    Ok(_) => {}
                    Err(error) => tracing::error!(%error, "deal make tick failed"),
                }
                false
            }
        });

        self.lock_handles()
            .extend([backfill_handle, check_handle, make_handle]);
        tracing::info!(interval = ?self.interval, "deal scheduler started");
        Ok(())
    }

    /// Cancel all loops and wait for them to finish their current entry.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handles: Vec<_> = self.lock_handles().drain(..).collect();
        for handle in handles {
            if let Err(error) = handle.await {
                tracing::warn!(%error, "scheduler loop ended abnormally");
            }
        }
        tracing::info!("deal scheduler stopped");
    }

    /// Whether any loop is still running.
    pub fn is_running(&self) -> bool {
        self.lock_handles().iter().any(|h| !h.is_finished())
    }

    /// Token observed by every loop. Cancelling it stops the scheduler.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn lock_handles(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Run `tick` every interval until cancelled or until it reports done.
    fn spawn_loop<F, Fut>(&self, name: &'static str, tick: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let period = self.interval;
        tokio::spawn(async move {
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        tracing::info!(worker = name, "worker shutting down");
                        break;
                    }
                    _ = timer.tick() => {
                        if tick().await {
                            tracing::info!(worker = name, "worker finished");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::FixedBackoff;
    use crate::test_support::{FakeClient, MemoryStore, ask, init_tracing};
    use quay_core::store::{DealQueueStore, ProviderStore, TrackerStore};

    fn config() -> QuayConfig {
        let mut config = QuayConfig::default();
        config.providers.default_addresses = vec!["f01000".into(), "f02000".into()];
        config
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn loops_drive_content_to_proposals() {
        init_tracing();
        let store = Arc::new(MemoryStore::default());
        let client = Arc::new(FakeClient::default());
        for address in ["f01000", "f02000"] {
            client.set_provider(address, "/fil/storage/mk/1.2.0", ask(0));
        }
        let ids = store.seed_contents(3, 1 << 20).await;
        for id in &ids {
            client.set_deficit(*id, 2);
        }

        let scheduler = DealScheduler::with_backoff(
            store.clone(),
            client.clone(),
            &config(),
            Arc::new(FixedBackoff {
                delay: Duration::from_millis(10),
            }),
        )
        .with_interval(Duration::from_millis(20));
        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        assert_eq!(store.count_providers().await.unwrap(), 2);

        // Content is enqueued without a commitment; the commp step is external.
        wait_until(|| store.queued_ids().len() == 3).await;
        for id in &ids {
            store.mark_commp_done(*id).await.unwrap();
        }
        wait_until(|| client.proposals().len() == 3).await;

        for (_, providers) in client.proposals() {
            assert_eq!(providers.len(), 2);
        }
        let tracker = store.get_tracker().await.unwrap().unwrap();
        assert!(tracker.backfill_done);

        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn paused_deal_making_resumes_without_restart() {
        let store = Arc::new(MemoryStore::default());
        let client = Arc::new(FakeClient::default());
        client.set_provider("f01000", "/fil/storage/mk/1.2.0", ask(0));
        let ids = store.seed_contents(2, 1 << 20).await;
        for id in &ids {
            client.set_deficit(*id, 1);
        }

        let scheduler = DealScheduler::new(store.clone(), client.clone(), &config())
            .with_interval(Duration::from_millis(10));
        scheduler.set_deal_making_disabled(true);
        scheduler.start().await.unwrap();
        assert!(scheduler.is_deal_making_disabled());

        wait_until(|| store.queued_ids().len() == 2).await;
        for id in &ids {
            store.mark_commp_done(*id).await.unwrap();
        }
        wait_until(|| client.check_calls().len() >= 2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(client.proposals().is_empty());
        for id in &ids {
            assert!(store.get_entry(*id).await.unwrap().unwrap().can_deal);
        }

        scheduler.set_deal_making_disabled(false);
        wait_until(|| client.proposals().len() == 2).await;
        assert!(scheduler.is_running());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_before_first_tick_does_no_work() {
        let store = Arc::new(MemoryStore::default());
        let client = Arc::new(FakeClient::default());
        store.seed_contents(2, 1 << 20).await;

        let scheduler = DealScheduler::new(store.clone(), client, &config())
            .with_interval(Duration::from_secs(3_600));
        scheduler.start().await.unwrap();
        scheduler.stop().await;

        assert!(!scheduler.is_running());
        assert!(store.queued_ids().is_empty());
        assert!(store.get_tracker().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_errors_do_not_stop_loops() {
        let store = Arc::new(MemoryStore::default());
        let client = Arc::new(FakeClient::default());
        store.seed_contents(1, 1 << 20).await;
        store.set_unavailable(true);

        let scheduler = DealScheduler::new(store.clone(), client, &config())
            .with_interval(Duration::from_millis(10));
        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(scheduler.is_running());

        store.set_unavailable(false);
        wait_until(|| store.queued_ids().len() == 1).await;
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn external_cancellation_stops_loops() {
        let store = Arc::new(MemoryStore::default());
        let scheduler = DealScheduler::new(store, Arc::new(FakeClient::default()), &config())
            .with_interval(Duration::from_millis(10));
        scheduler.start().await.unwrap();

        scheduler.shutdown_token().cancel();
        wait_until(|| !scheduler.is_running()).await;
        scheduler.stop().await;
    }
}

//! Staging zones: grouping content into size-bounded batches.
//!
//! Placement decisions go through one async mutex, so two concurrent adds
//! never both open a new zone or both fill the same zone past its cap. The
//! store re-checks the cap and the `open` status on every member insert,
//! which also covers writers in other processes.
//!
//! Consolidation and aggregation each run one zone at a time behind their
//! own lock. A zone leaves `open` only through a conditional status update
//! and returns to `open` if the finalizer fails.

use std::sync::Arc;

use chrono::Utc;
use quay_config::ZoneConfig;
use quay_core::client::ZoneFinalizer;
use quay_core::entities::{Content, Zone};
use quay_core::enums::{ZoneOperation, ZoneStatus};
use quay_core::errors::CoreError;
use quay_core::ids::{ContentId, ZoneId};
use quay_core::store::{Store, StoreError};
use tokio::sync::Mutex;

use crate::error::{DealError, ZoneError};
use crate::inflight::InFlightSet;

pub struct ZoneAggregator {
    store: Arc<dyn Store>,
    finalizer: Arc<dyn ZoneFinalizer>,
    max_size: u64,
    min_size: u64,
    placement: Mutex<()>,
    consolidation: Mutex<()>,
    aggregation: Mutex<()>,
    consolidating: InFlightSet,
    aggregating: InFlightSet,
}

impl ZoneAggregator {
    pub fn new(store: Arc<dyn Store>, finalizer: Arc<dyn ZoneFinalizer>, config: &ZoneConfig) -> Self {
        Self {
            store,
            finalizer,
            max_size: config.max_size,
            min_size: config.min_size,
            placement: Mutex::new(()),
            consolidation: Mutex::new(()),
            aggregation: Mutex::new(()),
            consolidating: InFlightSet::default(),
            aggregating: InFlightSet::default(),
        }
    }

    /// Place `content` in an open zone with room, opening a new zone if none
    /// has any. Returns the zone it joined.
    ///
    /// # Errors
    ///
    /// Returns `ZoneError` for inactive, oversize, or already staged content,
    /// and `DealError::Store` on store failures.
    pub async fn add_content(&self, content: &Content) -> Result<ZoneId, DealError> {
        if !content.active {
            return Err(ZoneError::InactiveContent(content.id).into());
        }
        if content.size > self.max_size {
            return Err(ZoneError::ContentTooLarge {
                content_id: content.id,
                size: content.size,
                max: self.max_size,
            }
            .into());
        }

        let _placement = self.placement.lock().await;
        if let Some(zone_id) = self.store.active_zone_for_content(content.id).await? {
            return Err(ZoneError::AlreadyStaged {
                content_id: content.id,
                zone_id,
            }
            .into());
        }

        let now = Utc::now();
        if let Some(zone) = self
            .store
            .find_open_zone_with_room(content.size, self.max_size)
            .await?
        {
            if self
                .store
                .add_zone_member(zone.id, content.id, content.size, self.max_size, now)
                .await?
            {
                tracing::debug!(content_id = content.id, zone_id = zone.id, "content staged");
                return Ok(zone.id);
            }
            tracing::debug!(zone_id = zone.id, "zone changed before insert, opening a new one");
        }

        let zone = self.store.create_zone(now).await?;
        if self
            .store
            .add_zone_member(zone.id, content.id, content.size, self.max_size, now)
            .await?
        {
            tracing::debug!(content_id = content.id, zone_id = zone.id, "content staged in new zone");
            return Ok(zone.id);
        }
        Err(StoreError::Conflict(format!(
            "new zone {} rejected content {}",
            zone.id, content.id
        ))
        .into())
    }

    /// Gather a zone's members onto one location and close it.
    ///
    /// # Errors
    ///
    /// Returns `ZoneError::ZoneBusy` while the zone is already being
    /// finalized, `ZoneError::NotFound` or `ZoneError::ZoneNotOpen` for a zone
    /// that cannot be finalized, and the finalizer or store error otherwise.
    /// On any failure after the zone was marked in progress it is reopened.
    pub async fn consolidate(&self, zone_id: ZoneId) -> Result<(), DealError> {
        self.finalize(ZoneOperation::Consolidate, zone_id).await?;
        Ok(())
    }

    /// Combine a zone's members into one object, close the zone and queue the
    /// combined object for dealing. Returns the new content id.
    ///
    /// # Errors
    ///
    /// Same as [`Self::consolidate`].
    pub async fn aggregate(&self, zone_id: ZoneId) -> Result<ContentId, DealError> {
        self.finalize(ZoneOperation::Aggregate, zone_id)
            .await?
            .ok_or_else(|| {
                CoreError::invalid("aggregate", format!("zone {zone_id} produced no content")).into()
            })
    }

    /// Open zones that reached the minimum size, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn ready_zones(&self, limit: u32) -> Result<Vec<Zone>, DealError> {
        Ok(self
            .store
            .list_zones(ZoneStatus::Open, self.min_size, limit)
            .await?)
    }

    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn open_zones(&self) -> Result<Vec<Zone>, DealError> {
        Ok(self.store.list_zones(ZoneStatus::Open, 0, u32::MAX).await?)
    }

    /// Whether a consolidation or aggregation currently holds `zone_id`.
    pub fn is_processing(&self, zone_id: ZoneId) -> bool {
        self.consolidating.contains(zone_id) || self.aggregating.contains(zone_id)
    }

    async fn finalize(
        &self,
        op: ZoneOperation,
        zone_id: ZoneId,
    ) -> Result<Option<ContentId>, DealError> {
        let (in_flight, class_lock) = match op {
            ZoneOperation::Consolidate => (&self.consolidating, &self.consolidation),
            ZoneOperation::Aggregate => (&self.aggregating, &self.aggregation),
        };
        let _guard = in_flight
            .try_acquire(zone_id)
            .ok_or(ZoneError::ZoneBusy(zone_id))?;
        let _class = class_lock.lock().await;

        let zone = self
            .store
            .get_zone(zone_id)
            .await?
            .ok_or(ZoneError::NotFound(zone_id))?;
        if zone.status != ZoneStatus::Open {
            return Err(ZoneError::ZoneNotOpen {
                zone_id,
                status: zone.status,
            }
            .into());
        }

        let in_progress = op.in_progress_status();
        if !self
            .store
            .transition_zone(zone_id, ZoneStatus::Open, in_progress, Utc::now())
            .await?
        {
            let status = self
                .store
                .get_zone(zone_id)
                .await?
                .map_or(ZoneStatus::Closed, |z| z.status);
            return Err(ZoneError::ZoneNotOpen { zone_id, status }.into());
        }
        tracing::info!(zone_id, %op, members = zone.members.len(), size = zone.size, "zone finalization started");

        let outcome = match op {
            ZoneOperation::Consolidate => self.finalizer.consolidate(&zone).await.map(|()| None),
            ZoneOperation::Aggregate => self.finalizer.aggregate(&zone).await.map(Some),
        };

        let aggregate_id = match outcome {
            Ok(aggregate_id) => aggregate_id,
            Err(error) => {
                tracing::warn!(zone_id, %op, %error, "zone finalization failed, reopening zone");
                self.reopen(zone_id, in_progress).await;
                return Err(error.into());
            }
        };

        // The zone only closes once its aggregate is queued.
        let now = Utc::now();
        if let Some(content_id) = aggregate_id {
            if let Err(error) = self.store.enqueue(content_id, false, now).await {
                tracing::warn!(zone_id, %op, content_id, %error, "failed to queue aggregate, reopening zone");
                self.reopen(zone_id, in_progress).await;
                return Err(error.into());
            }
        }
        match self.store.close_zone(zone_id, in_progress, aggregate_id, now).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(zone_id, %op, "zone left {in_progress} before it could be closed");
            }
            Err(error) => {
                tracing::warn!(zone_id, %op, %error, "failed to close zone, reopening zone");
                self.reopen(zone_id, in_progress).await;
                return Err(error.into());
            }
        }
        tracing::info!(zone_id, %op, ?aggregate_id, "zone closed");
        Ok(aggregate_id)
    }

    /// Best-effort return of a zone from `in_progress` to open so a later
    /// pass can retry it.
    async fn reopen(&self, zone_id: ZoneId, in_progress: ZoneStatus) {
        match self
            .store
            .transition_zone(zone_id, in_progress, ZoneStatus::Open, Utc::now())
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(zone_id, "zone left {in_progress} before it could be reopened"),
            Err(error) => tracing::error!(zone_id, %error, "failed to reopen zone"),
        }
    }
}

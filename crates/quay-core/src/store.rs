//! Repository traits over persisted state.
//!
//! Every entity gets a narrow, named interface instead of a general query
//! builder. `quay-db` implements all of them on top of libSQL; the scheduler
//! tests implement them in memory.
//!
//! Methods that mutate shared rows are conditional updates: they report
//! whether the row still matched its predicate (`true`) or was changed by
//! someone else first (`false`). Callers treat `false` as "skip", never as
//! an error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ask::Ask;
use crate::entities::{Content, DealQueueEntry, DealQueueTracker, ProviderRecord, Zone};
use crate::enums::ZoneStatus;
use crate::ids::{ContentId, ZoneId};

/// Unix seconds of 9999-12-31T23:59:59Z, the last instant whose stored
/// text form keeps a four-digit year.
pub const LATEST_SCHEDULE_SECS: i64 = 253_402_300_799;

/// Latest instant a store schedules work for. Later times are clamped to it.
#[must_use]
pub fn latest_schedule() -> DateTime<Utc> {
    DateTime::from_timestamp(LATEST_SCHEDULE_SECS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Errors surfaced by any store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store failed (unreachable, query error, bad row).
    #[error("Store backend error: {0}")]
    Backend(String),

    /// A row that must exist was missing.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness or conditional-write conflict.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Persisted data violates an invariant.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl StoreError {
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Register a content record; the store assigns the next id.
    async fn insert_content(&self, size: u64, active: bool) -> Result<Content, StoreError>;

    async fn get_content(&self, id: ContentId) -> Result<Option<Content>, StoreError>;

    /// Highest id among contents with a non-zero size.
    async fn max_content_id(&self) -> Result<Option<ContentId>, StoreError>;

    /// Active content with `after < id <= up_to` and
    /// `min_size <= size <= max_size`, ascending by id.
    async fn find_backfill_page(
        &self,
        after: ContentId,
        up_to: ContentId,
        min_size: u64,
        max_size: u64,
        limit: u32,
    ) -> Result<Vec<Content>, StoreError>;
}

#[async_trait]
pub trait ZoneStore: Send + Sync {
    async fn create_zone(&self, now: DateTime<Utc>) -> Result<Zone, StoreError>;

    async fn get_zone(&self, id: ZoneId) -> Result<Option<Zone>, StoreError>;

    /// Lowest-id open zone that can take `size` more bytes under `max_size`.
    async fn find_open_zone_with_room(
        &self,
        size: u64,
        max_size: u64,
    ) -> Result<Option<Zone>, StoreError>;

    /// Add a content to an open zone and point the content at it.
    ///
    /// Applies only while the zone is open and `zone.size + size <= max_size`.
    async fn add_zone_member(
        &self,
        zone_id: ZoneId,
        content_id: ContentId,
        size: u64,
        max_size: u64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Non-closed zone that currently lists `content_id` as a member.
    async fn active_zone_for_content(
        &self,
        content_id: ContentId,
    ) -> Result<Option<ZoneId>, StoreError>;

    /// Move a zone from `from` to `to`; applies only while it is in `from`.
    async fn transition_zone(
        &self,
        zone_id: ZoneId,
        from: ZoneStatus,
        to: ZoneStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Close a zone that is in `from`, recording the aggregate object if any.
    async fn close_zone(
        &self,
        zone_id: ZoneId,
        from: ZoneStatus,
        aggregate_content_id: Option<ContentId>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Zones in `status` with `size >= min_size`, ascending by id.
    async fn list_zones(
        &self,
        status: ZoneStatus,
        min_size: u64,
        limit: u32,
    ) -> Result<Vec<Zone>, StoreError>;
}

#[async_trait]
pub trait DealQueueStore: Send + Sync {
    /// Insert a queue row unless one exists. Returns whether a row was created.
    async fn enqueue(
        &self,
        content_id: ContentId,
        commp_done: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn get_entry(&self, content_id: ContentId)
    -> Result<Option<DealQueueEntry>, StoreError>;

    async fn mark_commp_done(&self, content_id: ContentId) -> Result<bool, StoreError>;

    /// `commp_done AND NOT can_deal AND deal_check_next_attempt_at <= now`.
    async fn find_eligible_for_check(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<DealQueueEntry>, StoreError>;

    /// `commp_done AND can_deal AND deal_next_attempt_at <= now`.
    async fn find_eligible_for_deal(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<DealQueueEntry>, StoreError>;

    /// Atomically push `deal_check_next_attempt_at` to `lease_until` if the
    /// row is still eligible for checking at `now`.
    async fn claim_for_check(
        &self,
        content_id: ContentId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Atomically push `deal_next_attempt_at` to `lease_until` if the row is
    /// still eligible for dealing at `now`.
    async fn claim_for_deal(
        &self,
        content_id: ContentId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Record a successful deal check. A positive `deficit` opens the row to
    /// the make worker starting at `now`.
    async fn record_check_success(
        &self,
        content_id: ContentId,
        deficit: u32,
        now: DateTime<Utc>,
        next_check_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn record_check_failure(
        &self,
        content_id: ContentId,
        attempts: u32,
        next_check_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Deals were proposed: close the row to the make worker and schedule the
    /// next check.
    async fn record_deal_success(
        &self,
        content_id: ContentId,
        next_check_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn record_deal_failure(
        &self,
        content_id: ContentId,
        attempts: u32,
        next_deal_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TrackerStore: Send + Sync {
    async fn get_tracker(&self) -> Result<Option<DealQueueTracker>, StoreError>;

    /// Create the singleton tracker if missing and return the stored row.
    async fn create_tracker(&self, stop_at: ContentId) -> Result<DealQueueTracker, StoreError>;

    /// Move the cursor forward; never moves it backwards.
    async fn advance_tracker(&self, last_content_id: ContentId) -> Result<(), StoreError>;

    async fn set_tracker_stop_at(&self, stop_at: ContentId) -> Result<(), StoreError>;

    async fn mark_backfill_done(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ProviderStore: Send + Sync {
    async fn list_providers(&self, include_suspended: bool)
    -> Result<Vec<ProviderRecord>, StoreError>;

    async fn get_provider(&self, address: &str) -> Result<Option<ProviderRecord>, StoreError>;

    /// Register an address. Returns whether it was new.
    async fn upsert_provider(&self, address: &str) -> Result<bool, StoreError>;

    async fn count_providers(&self) -> Result<u64, StoreError>;

    async fn set_provider_suspended(
        &self,
        address: &str,
        suspended: bool,
    ) -> Result<bool, StoreError>;

    async fn record_provider_ask(
        &self,
        address: &str,
        ask: &Ask,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn record_provider_protocol(&self, address: &str, protocol: &str)
    -> Result<(), StoreError>;

    async fn record_provider_version(&self, address: &str, version: &str)
    -> Result<(), StoreError>;
}

/// Everything the scheduler needs from persistence.
pub trait Store: ContentStore + ZoneStore + DealQueueStore + TrackerStore + ProviderStore {}

impl<T> Store for T where T: ContentStore + ZoneStore + DealQueueStore + TrackerStore + ProviderStore
{}

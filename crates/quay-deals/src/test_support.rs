//! In-memory store and collaborator fakes for scheduler unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use quay_core::ask::Ask;
use quay_core::client::{ClientError, SelectedProvider, StorageClient, ZoneFinalizer};
use quay_core::entities::{Content, DealQueueEntry, DealQueueTracker, ProviderRecord, Zone};
use quay_core::enums::ZoneStatus;
use quay_core::ids::{ContentId, TRACKER_ID, ZoneId};
use quay_core::store::{
    ContentStore, DealQueueStore, ProviderStore, StoreError, TrackerStore, ZoneStore,
};

/// An ask accepting 256 B to 32 GiB pieces at `price` (verified or not).
pub fn ask(price: u64) -> Ask {
    Ask {
        price,
        verified_price: price,
        min_piece_size: 256,
        max_piece_size: 32 << 30,
    }
}

/// A fixed instant so scheduling assertions do not depend on the clock.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + chrono::Duration::seconds(secs)
}

/// Install a fmt subscriber when `QUAY_LOG` is set.
pub fn init_tracing() {
    if let Ok(filter) = std::env::var("QUAY_LOG") {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
            .with_test_writer()
            .try_init();
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    contents: BTreeMap<ContentId, Content>,
    zones: BTreeMap<ZoneId, Zone>,
    queue: BTreeMap<ContentId, DealQueueEntry>,
    tracker: Option<DealQueueTracker>,
    providers: BTreeMap<String, ProviderRecord>,
}

/// Store with the same conditional-update semantics as the libSQL one.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
    failing_enqueues: Mutex<HashSet<ContentId>>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store unavailable".into()));
        }
        Ok(())
    }

    /// Make paging queries and zone closes fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `enqueue(content_id, ..)` fail.
    pub fn fail_enqueue(&self, content_id: ContentId) {
        self.failing_enqueues.lock().unwrap().insert(content_id);
    }

    pub fn clear_enqueue_failures(&self) {
        self.failing_enqueues.lock().unwrap().clear();
    }

    /// Insert `count` active contents of `size` bytes.
    pub async fn seed_contents(&self, count: usize, size: u64) -> Vec<ContentId> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(self.insert_content(size, true).await.unwrap().id);
        }
        ids
    }

    pub fn queued_ids(&self) -> Vec<ContentId> {
        self.lock().queue.keys().copied().collect()
    }

    /// Overwrite a queue row.
    pub fn put_entry(&self, entry: DealQueueEntry) {
        self.lock().queue.insert(entry.content_id, entry);
    }

    pub fn put_tracker(&self, tracker: DealQueueTracker) {
        self.lock().tracker = Some(tracker);
    }
}

fn latest_zone(inner: &Inner, content_id: ContentId) -> Option<ZoneId> {
    inner
        .zones
        .values()
        .rev()
        .find(|z| z.members.contains(&content_id))
        .map(|z| z.id)
}

fn entry_mut<'a>(
    inner: &'a mut Inner,
    content_id: ContentId,
) -> Result<&'a mut DealQueueEntry, StoreError> {
    inner
        .queue
        .get_mut(&content_id)
        .ok_or_else(|| StoreError::not_found("deal queue entry", content_id))
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn insert_content(&self, size: u64, active: bool) -> Result<Content, StoreError> {
        let mut inner = self.lock();
        let id = inner.contents.keys().next_back().map_or(1, |id| id + 1);
        let content = Content {
            id,
            size,
            active,
            zone_id: None,
            created_at: Utc::now(),
        };
        inner.contents.insert(id, content.clone());
        Ok(content)
    }

    async fn get_content(&self, id: ContentId) -> Result<Option<Content>, StoreError> {
        let inner = self.lock();
        Ok(inner.contents.get(&id).map(|c| Content {
            zone_id: latest_zone(&inner, id),
            ..c.clone()
        }))
    }

    async fn max_content_id(&self) -> Result<Option<ContentId>, StoreError> {
        let inner = self.lock();
        Ok(inner.contents.values().filter(|c| c.size > 0).map(|c| c.id).max())
    }

    async fn find_backfill_page(
        &self,
        after: ContentId,
        up_to: ContentId,
        min_size: u64,
        max_size: u64,
        limit: u32,
    ) -> Result<Vec<Content>, StoreError> {
        self.check_available()?;
        if up_to <= after {
            return Ok(Vec::new());
        }
        let inner = self.lock();
        Ok(inner
            .contents
            .range(after + 1..=up_to)
            .map(|(_, c)| c)
            .filter(|c| c.active && c.size >= min_size && c.size <= max_size)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ZoneStore for MemoryStore {
    async fn create_zone(&self, now: DateTime<Utc>) -> Result<Zone, StoreError> {
        let mut inner = self.lock();
        let id = inner.zones.keys().next_back().map_or(1, |id| id + 1);
        let zone = Zone {
            id,
            size: 0,
            status: ZoneStatus::Open,
            members: Vec::new(),
            aggregate_content_id: None,
            created_at: now,
            updated_at: now,
        };
        inner.zones.insert(id, zone.clone());
        Ok(zone)
    }

    async fn get_zone(&self, id: ZoneId) -> Result<Option<Zone>, StoreError> {
        Ok(self.lock().zones.get(&id).cloned())
    }

    async fn find_open_zone_with_room(
        &self,
        size: u64,
        max_size: u64,
    ) -> Result<Option<Zone>, StoreError> {
        Ok(self
            .lock()
            .zones
            .values()
            .find(|z| z.status == ZoneStatus::Open && z.has_room_for(size, max_size))
            .cloned())
    }

    async fn add_zone_member(
        &self,
        zone_id: ZoneId,
        content_id: ContentId,
        size: u64,
        max_size: u64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(zone) = inner.zones.get_mut(&zone_id) else {
            return Ok(false);
        };
        if zone.status != ZoneStatus::Open || !zone.has_room_for(size, max_size) {
            return Ok(false);
        }
        if zone.members.contains(&content_id) {
            return Err(StoreError::Conflict(format!(
                "content {content_id} already in zone {zone_id}"
            )));
        }
        zone.size += size;
        zone.members.push(content_id);
        zone.updated_at = now;
        Ok(true)
    }

    async fn active_zone_for_content(
        &self,
        content_id: ContentId,
    ) -> Result<Option<ZoneId>, StoreError> {
        Ok(self
            .lock()
            .zones
            .values()
            .rev()
            .find(|z| z.status.is_active() && z.members.contains(&content_id))
            .map(|z| z.id))
    }

    async fn transition_zone(
        &self,
        zone_id: ZoneId,
        from: ZoneStatus,
        to: ZoneStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidState(format!(
                "zone {zone_id}: cannot transition from {from} to {to}"
            )));
        }
        let mut inner = self.lock();
        match inner.zones.get_mut(&zone_id) {
            Some(zone) if zone.status == from => {
                zone.status = to;
                zone.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn close_zone(
        &self,
        zone_id: ZoneId,
        from: ZoneStatus,
        aggregate_content_id: Option<ContentId>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut inner = self.lock();
        match inner.zones.get_mut(&zone_id) {
            Some(zone) if zone.status == from && from.can_transition_to(ZoneStatus::Closed) => {
                zone.status = ZoneStatus::Closed;
                zone.aggregate_content_id = aggregate_content_id;
                zone.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_zones(
        &self,
        status: ZoneStatus,
        min_size: u64,
        limit: u32,
    ) -> Result<Vec<Zone>, StoreError> {
        Ok(self
            .lock()
            .zones
            .values()
            .filter(|z| z.status == status && z.size >= min_size)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DealQueueStore for MemoryStore {
    async fn enqueue(
        &self,
        content_id: ContentId,
        commp_done: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if self.failing_enqueues.lock().unwrap().contains(&content_id) {
            return Err(StoreError::Backend(format!("enqueue {content_id} failed")));
        }
        let mut inner = self.lock();
        if inner.queue.contains_key(&content_id) {
            return Ok(false);
        }
        inner
            .queue
            .insert(content_id, DealQueueEntry::new(content_id, commp_done, now));
        Ok(true)
    }

    async fn get_entry(
        &self,
        content_id: ContentId,
    ) -> Result<Option<DealQueueEntry>, StoreError> {
        Ok(self.lock().queue.get(&content_id).cloned())
    }

    async fn mark_commp_done(&self, content_id: ContentId) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        match inner.queue.get_mut(&content_id) {
            Some(entry) if !entry.commp_done => {
                entry.commp_done = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_eligible_for_check(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<DealQueueEntry>, StoreError> {
        self.check_available()?;
        let mut due: Vec<_> = self
            .lock()
            .queue
            .values()
            .filter(|e| e.is_due_for_check(now))
            .cloned()
            .collect();
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn find_eligible_for_deal(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<DealQueueEntry>, StoreError> {
        self.check_available()?;
        let mut due: Vec<_> = self
            .lock()
            .queue
            .values()
            .filter(|e| e.is_due_for_deal(now))
            .cloned()
            .collect();
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn claim_for_check(
        &self,
        content_id: ContentId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        match inner.queue.get_mut(&content_id) {
            Some(entry) if entry.is_due_for_check(now) => {
                entry.deal_check_next_attempt_at = lease_until;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_for_deal(
        &self,
        content_id: ContentId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        match inner.queue.get_mut(&content_id) {
            Some(entry) if entry.is_due_for_deal(now) => {
                entry.deal_next_attempt_at = lease_until;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_check_success(
        &self,
        content_id: ContentId,
        deficit: u32,
        now: DateTime<Utc>,
        next_check_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let entry = entry_mut(&mut inner, content_id)?;
        entry.deal_count = deficit;
        entry.can_deal = deficit > 0;
        if deficit > 0 {
            entry.deal_next_attempt_at = now;
        }
        entry.deal_check_next_attempt_at = next_check_at;
        entry.deal_check_attempts = 0;
        Ok(())
    }

    async fn record_check_failure(
        &self,
        content_id: ContentId,
        attempts: u32,
        next_check_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let entry = entry_mut(&mut inner, content_id)?;
        entry.deal_check_attempts = attempts;
        entry.deal_check_next_attempt_at = next_check_at;
        Ok(())
    }

    async fn record_deal_success(
        &self,
        content_id: ContentId,
        next_check_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let entry = entry_mut(&mut inner, content_id)?;
        entry.can_deal = false;
        entry.deal_count = 0;
        entry.deal_attempts = 0;
        entry.deal_check_next_attempt_at = next_check_at;
        Ok(())
    }

    async fn record_deal_failure(
        &self,
        content_id: ContentId,
        attempts: u32,
        next_deal_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let entry = entry_mut(&mut inner, content_id)?;
        entry.deal_attempts = attempts;
        entry.deal_next_attempt_at = next_deal_at;
        Ok(())
    }
}

#[async_trait]
impl TrackerStore for MemoryStore {
    async fn get_tracker(&self) -> Result<Option<DealQueueTracker>, StoreError> {
        Ok(self.lock().tracker.clone())
    }

    async fn create_tracker(&self, stop_at: ContentId) -> Result<DealQueueTracker, StoreError> {
        let mut inner = self.lock();
        Ok(inner
            .tracker
            .get_or_insert(DealQueueTracker {
                id: TRACKER_ID,
                last_content_id: 0,
                stop_at,
                backfill_done: false,
            })
            .clone())
    }

    async fn advance_tracker(&self, last_content_id: ContentId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let tracker = inner
            .tracker
            .as_mut()
            .ok_or_else(|| StoreError::not_found("deal queue tracker", TRACKER_ID))?;
        tracker.last_content_id = tracker.last_content_id.max(last_content_id);
        Ok(())
    }

    async fn set_tracker_stop_at(&self, stop_at: ContentId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let tracker = inner
            .tracker
            .as_mut()
            .ok_or_else(|| StoreError::not_found("deal queue tracker", TRACKER_ID))?;
        tracker.stop_at = stop_at;
        Ok(())
    }

    async fn mark_backfill_done(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let tracker = inner
            .tracker
            .as_mut()
            .ok_or_else(|| StoreError::not_found("deal queue tracker", TRACKER_ID))?;
        tracker.backfill_done = true;
        Ok(())
    }
}

#[async_trait]
impl ProviderStore for MemoryStore {
    async fn list_providers(
        &self,
        include_suspended: bool,
    ) -> Result<Vec<ProviderRecord>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock()
            .providers
            .values()
            .filter(|p| include_suspended || !p.suspended)
            .cloned()
            .collect())
    }

    async fn get_provider(&self, address: &str) -> Result<Option<ProviderRecord>, StoreError> {
        Ok(self.lock().providers.get(address).cloned())
    }

    async fn upsert_provider(&self, address: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if inner.providers.contains_key(address) {
            return Ok(false);
        }
        inner
            .providers
            .insert(address.to_string(), ProviderRecord::new(address));
        Ok(true)
    }

    async fn count_providers(&self) -> Result<u64, StoreError> {
        Ok(self.lock().providers.len() as u64)
    }

    async fn set_provider_suspended(
        &self,
        address: &str,
        suspended: bool,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        Ok(inner.providers.get_mut(address).is_some_and(|p| {
            p.suspended = suspended;
            true
        }))
    }

    async fn record_provider_ask(
        &self,
        address: &str,
        ask: &Ask,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner
            .providers
            .get_mut(address)
            .ok_or_else(|| StoreError::not_found("provider", address))?;
        record.ask = Some(ask.clone());
        record.ask_updated_at = Some(fetched_at);
        Ok(())
    }

    async fn record_provider_protocol(
        &self,
        address: &str,
        protocol: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner
            .providers
            .get_mut(address)
            .ok_or_else(|| StoreError::not_found("provider", address))?;
        record.protocol = Some(protocol.to_string());
        Ok(())
    }

    async fn record_provider_version(
        &self,
        address: &str,
        version: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner
            .providers
            .get_mut(address)
            .ok_or_else(|| StoreError::not_found("provider", address))?;
        record.version = Some(version.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeClient
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ClientState {
    protocols: HashMap<String, String>,
    asks: HashMap<String, Ask>,
    versions: HashMap<String, String>,
    failing_protocols: HashSet<String>,
    failing_asks: HashSet<String>,
    ask_calls: HashMap<String, usize>,
    deficits: HashMap<ContentId, u32>,
    active_deals: HashMap<ContentId, u32>,
    failing_checks: HashSet<ContentId>,
    check_calls: Vec<ContentId>,
    proposals: Vec<(ContentId, Vec<String>)>,
    failing_proposals: HashSet<ContentId>,
}

/// Scriptable storage network.
#[derive(Default)]
pub struct FakeClient {
    state: Mutex<ClientState>,
}

impl FakeClient {
    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap()
    }

    pub fn set_provider(&self, address: &str, protocol: &str, ask: Ask) {
        let mut state = self.state();
        state.protocols.insert(address.into(), protocol.into());
        state.asks.insert(address.into(), ask);
    }

    pub fn fail_protocol(&self, address: &str) {
        self.state().failing_protocols.insert(address.into());
    }

    pub fn fail_ask(&self, address: &str) {
        self.state().failing_asks.insert(address.into());
    }

    pub fn set_version(&self, address: &str, version: &str) {
        self.state().versions.insert(address.into(), version.into());
    }

    pub fn ask_calls(&self, address: &str) -> usize {
        self.state().ask_calls.get(address).copied().unwrap_or(0)
    }

    pub fn set_deficit(&self, content_id: ContentId, deficit: u32) {
        self.state().deficits.insert(content_id, deficit);
    }

    /// Report `active` deals for `content_id`; its deficit then follows the
    /// replication target the checker asks with.
    pub fn set_active_deals(&self, content_id: ContentId, active: u32) {
        self.state().active_deals.insert(content_id, active);
    }

    pub fn fail_checks(&self, content_id: ContentId, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing_checks.insert(content_id);
        } else {
            state.failing_checks.remove(&content_id);
        }
    }

    pub fn check_calls(&self) -> Vec<ContentId> {
        self.state().check_calls.clone()
    }

    pub fn fail_proposals(&self, content_id: ContentId, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing_proposals.insert(content_id);
        } else {
            state.failing_proposals.remove(&content_id);
        }
    }

    /// Successful proposals as `(content, providers)`.
    pub fn proposals(&self) -> Vec<(ContentId, Vec<String>)> {
        self.state().proposals.clone()
    }
}

#[async_trait]
impl StorageClient for FakeClient {
    async fn resolve_protocol(&self, address: &str) -> Result<String, ClientError> {
        let state = self.state();
        if state.failing_protocols.contains(address) {
            return Err(ClientError::Unavailable(address.into()));
        }
        state
            .protocols
            .get(address)
            .cloned()
            .ok_or_else(|| ClientError::Unavailable(address.into()))
    }

    async fn get_ask(&self, address: &str, _max_staleness: Duration) -> Result<Ask, ClientError> {
        let mut state = self.state();
        *state.ask_calls.entry(address.into()).or_default() += 1;
        if state.failing_asks.contains(address) {
            return Err(ClientError::Timeout);
        }
        state
            .asks
            .get(address)
            .cloned()
            .ok_or_else(|| ClientError::Rejected(format!("{address} has no ask")))
    }

    async fn check_deals(
        &self,
        content_id: ContentId,
        replication: u32,
    ) -> Result<u32, ClientError> {
        let mut state = self.state();
        state.check_calls.push(content_id);
        if state.failing_checks.contains(&content_id) {
            return Err(ClientError::Unavailable("chain".into()));
        }
        if let Some(active) = state.active_deals.get(&content_id) {
            return Ok(replication.saturating_sub(*active));
        }
        Ok(state.deficits.get(&content_id).copied().unwrap_or(0))
    }

    async fn propose_deals(
        &self,
        content_id: ContentId,
        providers: &[SelectedProvider],
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        if state.failing_proposals.contains(&content_id) {
            return Err(ClientError::Rejected(format!("proposal for {content_id}")));
        }
        state.proposals.push((
            content_id,
            providers.iter().map(|p| p.address.clone()).collect(),
        ));
        Ok(())
    }

    async fn provider_version(&self, address: &str) -> Result<String, ClientError> {
        self.state()
            .versions
            .get(address)
            .cloned()
            .ok_or_else(|| ClientError::Unavailable(address.into()))
    }
}

// ---------------------------------------------------------------------------
// FakeFinalizer
// ---------------------------------------------------------------------------

/// Zone finalizer that can be paused or made to fail.
pub struct FakeFinalizer {
    gate: tokio::sync::Mutex<()>,
    failures: AtomicU32,
    next_aggregate: AtomicU64,
}

impl Default for FakeFinalizer {
    fn default() -> Self {
        Self {
            gate: tokio::sync::Mutex::new(()),
            failures: AtomicU32::new(0),
            next_aggregate: AtomicU64::new(1_000_000),
        }
    }
}

impl FakeFinalizer {
    /// Fail the next `count` calls.
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Block finalizer calls while the returned guard lives.
    pub async fn hold(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    async fn pass(&self) -> Result<(), ClientError> {
        let _open = self.gate.lock().await;
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ClientError::Unavailable("staging node".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ZoneFinalizer for FakeFinalizer {
    async fn consolidate(&self, _zone: &Zone) -> Result<(), ClientError> {
        self.pass().await
    }

    async fn aggregate(&self, _zone: &Zone) -> Result<ContentId, ClientError> {
        self.pass().await?;
        Ok(self.next_aggregate.fetch_add(1, Ordering::SeqCst))
    }
}

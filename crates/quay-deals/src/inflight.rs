//! Zones currently held by a consolidation or aggregation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use quay_core::ids::ZoneId;

/// Set of zone ids with RAII membership.
#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    zones: Arc<Mutex<HashSet<ZoneId>>>,
}

impl InFlightSet {
    /// Mark `zone_id` in flight. Returns `None` if it already is.
    pub fn try_acquire(&self, zone_id: ZoneId) -> Option<InFlightGuard> {
        let mut zones = self.zones.lock().ok()?;
        if !zones.insert(zone_id) {
            return None;
        }
        Some(InFlightGuard {
            zones: Arc::clone(&self.zones),
            zone_id,
        })
    }

    pub fn contains(&self, zone_id: ZoneId) -> bool {
        self.zones.lock().is_ok_and(|zones| zones.contains(&zone_id))
    }

    pub fn len(&self) -> usize {
        self.zones.lock().map_or(0, |zones| zones.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its zone from the set when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    zones: Arc<Mutex<HashSet<ZoneId>>>,
    zone_id: ZoneId,
}

impl InFlightGuard {
    pub const fn zone_id(&self) -> ZoneId {
        self.zone_id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut zones) = self.zones.lock() {
            zones.remove(&self.zone_id);
        }
    }
}

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::ZoneStatus;
use crate::ids::{ContentId, ZoneId};

/// A size-bounded staging batch of content.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Zone {
    pub id: ZoneId,
    pub size: u64,
    pub status: ZoneStatus,
    pub members: Vec<ContentId>,
    /// Combined object produced when the zone was aggregated.
    pub aggregate_content_id: Option<ContentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Zone {
    /// Whether `size` more bytes fit under `max_size`.
    #[must_use]
    pub const fn has_room_for(&self, size: u64, max_size: u64) -> bool {
        match self.size.checked_add(size) {
            Some(total) => total <= max_size,
            None => false,
        }
    }
}

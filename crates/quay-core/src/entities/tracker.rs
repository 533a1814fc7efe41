use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::ContentId;

/// Singleton cursor for the one-time deal queue backfill.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct DealQueueTracker {
    pub id: u64,
    pub last_content_id: ContentId,
    /// Highest content id that existed when the tracker was created.
    pub stop_at: ContentId,
    pub backfill_done: bool,
}

impl DealQueueTracker {
    /// The cursor has reached (or passed) its horizon.
    #[must_use]
    pub const fn reached_horizon(&self) -> bool {
        self.last_content_id >= self.stop_at
    }

    /// The cursor ran past its horizon, which a healthy tracker never does.
    #[must_use]
    pub const fn is_corrupt(&self) -> bool {
        self.last_content_id > self.stop_at
    }
}

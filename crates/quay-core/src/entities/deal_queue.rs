use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::ContentId;

/// One persisted deal queue row per content eligible for dealing.
///
/// The check worker owns rows with `can_deal = false`, the make worker rows
/// with `can_deal = true`; both only pick rows whose respective next attempt
/// time has elapsed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct DealQueueEntry {
    pub content_id: ContentId,
    /// Outstanding deals the make worker should propose.
    pub deal_count: u32,
    pub commp_done: bool,
    pub can_deal: bool,
    pub deal_next_attempt_at: DateTime<Utc>,
    pub deal_check_next_attempt_at: DateTime<Utc>,
    /// Consecutive make failures since the last success.
    pub deal_attempts: u32,
    /// Consecutive check failures since the last success.
    pub deal_check_attempts: u32,
}

impl DealQueueEntry {
    /// A freshly queued row, due for checking at `now`.
    #[must_use]
    pub const fn new(content_id: ContentId, commp_done: bool, now: DateTime<Utc>) -> Self {
        Self {
            content_id,
            deal_count: 0,
            commp_done,
            can_deal: false,
            deal_next_attempt_at: now,
            deal_check_next_attempt_at: now,
            deal_attempts: 0,
            deal_check_attempts: 0,
        }
    }

    #[must_use]
    pub fn is_due_for_check(&self, now: DateTime<Utc>) -> bool {
        self.commp_done && !self.can_deal && self.deal_check_next_attempt_at <= now
    }

    #[must_use]
    pub fn is_due_for_deal(&self, now: DateTime<Utc>) -> bool {
        self.commp_done && self.can_deal && self.deal_next_attempt_at <= now
    }
}

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{ContentId, ZoneId};

/// A stored object produced by the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Content {
    pub id: ContentId,
    pub size: u64,
    pub active: bool,
    pub zone_id: Option<ZoneId>,
    pub created_at: DateTime<Utc>,
}

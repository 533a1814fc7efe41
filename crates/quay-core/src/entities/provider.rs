use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ask::{Ask, CachedAsk};

/// A known storage provider.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ProviderRecord {
    pub address: String,
    pub suspended: bool,
    /// Last reported software version.
    pub version: Option<String>,
    /// Last resolved deal protocol id.
    pub protocol: Option<String>,
    pub ask: Option<Ask>,
    pub ask_updated_at: Option<DateTime<Utc>>,
}

impl ProviderRecord {
    /// A freshly registered, unsuspended provider with nothing resolved yet.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            suspended: false,
            version: None,
            protocol: None,
            ask: None,
            ask_updated_at: None,
        }
    }

    /// The persisted ask with its fetch time, if both are present.
    #[must_use]
    pub fn cached_ask(&self) -> Option<CachedAsk> {
        match (&self.ask, self.ask_updated_at) {
            (Some(ask), Some(fetched_at)) => Some(CachedAsk {
                ask: ask.clone(),
                fetched_at,
            }),
            _ => None,
        }
    }
}

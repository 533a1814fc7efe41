//! Error types for quay-deals.

use quay_core::client::ClientError;
use quay_core::enums::ZoneStatus;
use quay_core::errors::CoreError;
use quay_core::ids::{ContentId, ZoneId};
use quay_core::store::StoreError;
use thiserror::Error;

/// Errors from staging zone operations.
#[derive(Debug, Error)]
pub enum ZoneError {
    /// The content can never fit in a zone.
    #[error("content {content_id} of {size} bytes exceeds the zone limit of {max} bytes")]
    ContentTooLarge {
        content_id: ContentId,
        size: u64,
        max: u64,
    },

    /// The content already belongs to a zone that has not closed.
    #[error("content {content_id} is already staged in zone {zone_id}")]
    AlreadyStaged {
        content_id: ContentId,
        zone_id: ZoneId,
    },

    #[error("content {0} is not active")]
    InactiveContent(ContentId),

    /// Another consolidation or aggregation holds the zone.
    #[error("zone {0} is already being processed")]
    ZoneBusy(ZoneId),

    #[error("zone {zone_id} is {status}, expected open")]
    ZoneNotOpen { zone_id: ZoneId, status: ZoneStatus },

    #[error("zone {0} not found")]
    NotFound(ZoneId),
}

/// Errors surfaced by the scheduler components.
#[derive(Debug, Error)]
pub enum DealError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Zone(#[from] ZoneError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// No registered provider could take the content.
    #[error("no eligible storage providers for content {0}")]
    NoProviders(ContentId),
}

impl DealError {
    /// Whether the error came from the persistence layer.
    #[must_use]
    pub const fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

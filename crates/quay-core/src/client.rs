//! Collaborator traits for the storage network and zone finalization.
//!
//! Neither trait describes a wire protocol. Implementations talk to the
//! storage network (deal negotiation, chain state) and to the staging nodes
//! that hold zone members; Quay only needs the outcomes.

use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ask::Ask;
use crate::entities::Zone;
use crate::ids::ContentId;

/// Errors reported by external collaborators.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The remote could not be reached or did not answer.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// The call exceeded its deadline.
    #[error("Timed out")]
    Timeout,

    /// The remote answered but refused the request.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A provider picked for a deal, with the facts it was picked on.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SelectedProvider {
    pub address: String,
    pub protocol: String,
    pub ask: Ask,
}

/// Access to the storage network.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Deal protocol id the provider speaks.
    async fn resolve_protocol(&self, address: &str) -> Result<String, ClientError>;

    /// The provider's current ask, no older than `max_staleness`.
    async fn get_ask(&self, address: &str, max_staleness: Duration) -> Result<Ask, ClientError>;

    /// How many more deals `content_id` needs to reach `replication` active
    /// deals. Zero once the target is met.
    async fn check_deals(
        &self,
        content_id: ContentId,
        replication: u32,
    ) -> Result<u32, ClientError>;

    /// Propose one deal per provider for `content_id`.
    async fn propose_deals(
        &self,
        content_id: ContentId,
        providers: &[SelectedProvider],
    ) -> Result<(), ClientError>;

    /// Software version the provider reports.
    async fn provider_version(&self, address: &str) -> Result<String, ClientError>;
}

/// The side effects that close a staging zone.
#[async_trait]
pub trait ZoneFinalizer: Send + Sync {
    /// Gather all members of `zone` onto one location.
    async fn consolidate(&self, zone: &Zone) -> Result<(), ClientError>;

    /// Build the single combined object for `zone` and return its content id.
    async fn aggregate(&self, zone: &Zone) -> Result<ContentId, ClientError>;
}

//! Errors shared by every Quay crate.
//!
//! Store and collaborator failures have their own types
//! ([`crate::store::StoreError`], [`crate::client::ClientError`]). This one
//! covers domain facts that are wrong regardless of where they came from.

use thiserror::Error;

use crate::ids::ContentId;

#[derive(Debug, Error)]
pub enum CoreError {
    /// A queue row or zone points at content that does not exist.
    #[error("content {0} not found")]
    ContentNotFound(ContentId),

    /// A value broke a domain rule, e.g. a zone aggregate without content.
    #[error("invalid {what}: {reason}")]
    Invalid { what: &'static str, reason: String },

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    #[must_use]
    pub fn invalid(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            what,
            reason: reason.into(),
        }
    }
}

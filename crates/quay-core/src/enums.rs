//! Status enums for Quay.
//!
//! All enums use `snake_case` serialization via `#[serde(rename_all = "snake_case")]`.
//! Status enums with state machines provide `allowed_next_states()` to enforce
//! valid transitions at the application layer.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ZoneStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a staging zone.
///
/// ```text
/// open → consolidating → closed
///                      → open (finalizer failed)
/// open → aggregating   → closed
///                      → open (finalizer failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ZoneStatus {
    Open,
    Consolidating,
    Aggregating,
    Closed,
}

impl ZoneStatus {
    /// Valid next states from the current state.
    #[must_use]
    #[allow(clippy::match_same_arms)]
    pub const fn allowed_next_states(self) -> &'static [Self] {
        match self {
            Self::Open => &[Self::Consolidating, Self::Aggregating],
            Self::Consolidating => &[Self::Closed, Self::Open],
            Self::Aggregating => &[Self::Closed, Self::Open],
            Self::Closed => &[],
        }
    }

    /// Check whether transitioning to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next_states().contains(&next)
    }

    /// Whether members of a zone in this state still count as staged.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Closed)
    }

    /// Return the string representation used in SQL storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Consolidating => "consolidating",
            Self::Aggregating => "aggregating",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ZoneOperation
// ---------------------------------------------------------------------------

/// The two ways a zone leaves `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ZoneOperation {
    Consolidate,
    Aggregate,
}

impl ZoneOperation {
    /// Status a zone holds while this operation is in progress.
    #[must_use]
    pub const fn in_progress_status(self) -> ZoneStatus {
        match self {
            Self::Consolidate => ZoneStatus::Consolidating,
            Self::Aggregate => ZoneStatus::Aggregating,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Consolidate => "consolidate",
            Self::Aggregate => "aggregate",
        }
    }
}

impl fmt::Display for ZoneOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! # quay-deals
//!
//! Staging zones, deal queue scheduling and storage provider selection.
//!
//! - [`ZoneAggregator`] packs content into size-bounded staging zones and
//!   drives them through consolidation and aggregation.
//! - [`BackfillWorker`] walks historical content once and enqueues it.
//! - [`DealCheckWorker`] asks the storage network how many deals each queued
//!   content still needs.
//! - [`DealMakeWorker`] picks providers with [`ProviderSelector`] and proposes
//!   the missing deals.
//! - [`DealScheduler`] runs the three workers as cancellable periodic loops.
//!
//! Every component takes an `Arc<dyn Store>` and the external collaborators
//! from `quay_core::client`, so the same code runs against `quay-db` or an
//! in-memory store.

pub mod ask_cache;
pub mod backfill;
pub mod backoff;
pub mod check;
pub mod error;
pub mod inflight;
pub mod make;
pub mod registry;
pub mod scheduler;
pub mod selector;
pub mod tick;
pub mod zones;

#[cfg(test)]
mod test_support;

pub use backfill::{BackfillProgress, BackfillWorker};
pub use backoff::{BackoffPolicy, ExponentialBackoff, FixedBackoff};
pub use check::DealCheckWorker;
pub use error::{DealError, ZoneError};
pub use make::DealMakeWorker;
pub use registry::ProviderRegistry;
pub use scheduler::DealScheduler;
pub use selector::ProviderSelector;
pub use tick::TickSummary;
pub use zones::ZoneAggregator;

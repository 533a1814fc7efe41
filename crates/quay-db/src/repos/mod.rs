//! Repository implementations of the `quay_core::store` traits.
//!
//! Each module keeps its SQL in private functions returning
//! [`DatabaseError`](crate::error::DatabaseError) and exposes them through a
//! thin `#[async_trait]` impl on [`QuayDb`](crate::QuayDb).

pub mod content;
pub mod deal_queue;
pub mod provider;
pub mod tracker;
pub mod zone;

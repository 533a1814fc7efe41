//! Entity structs for all Quay domain objects.
//!
//! Each entity maps to a table in the libSQL database (see `quay-db`
//! migrations). All structs derive `Serialize`, `Deserialize`, and
//! `JsonSchema` for JSON roundtrip and schema validation.

mod content;
mod deal_queue;
mod provider;
mod tracker;
mod zone;

pub use content::Content;
pub use deal_queue::DealQueueEntry;
pub use provider::ProviderRecord;
pub use tracker::DealQueueTracker;
pub use zone::Zone;

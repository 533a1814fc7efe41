//! Shared test utilities for quay-db repo tests.

pub(crate) mod helpers {
    use chrono::{DateTime, TimeZone, Utc};

    use crate::QuayDb;

    /// Create an in-memory database with migrations applied.
    pub async fn test_db() -> QuayDb {
        QuayDb::open_local(":memory:").await.unwrap()
    }

    /// A fixed instant so ordering assertions do not depend on the clock.
    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    /// `t0()` shifted by `secs` seconds.
    pub fn at(secs: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(secs)
    }
}

//! Deal queue repository.
//!
//! Rows are claimed by pushing the relevant next-attempt timestamp forward
//! with a single conditional `UPDATE`. Whoever changes the row owns it until
//! the lease expires or an outcome is recorded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use quay_core::entities::DealQueueEntry;
use quay_core::ids::ContentId;
use quay_core::store::{DealQueueStore, StoreError};

use crate::QuayDb;
use crate::error::DatabaseError;
use crate::helpers::{fmt_datetime, get_bool, get_u32, get_u64, parse_datetime, to_sql_int};

const SELECT_COLS: &str = "content_id, deal_count, commp_done, can_deal, deal_next_attempt_at, \
     deal_check_next_attempt_at, deal_attempts, deal_check_attempts";

fn row_to_entry(row: &libsql::Row) -> Result<DealQueueEntry, DatabaseError> {
    Ok(DealQueueEntry {
        content_id: get_u64(row, 0)?,
        deal_count: get_u32(row, 1)?,
        commp_done: get_bool(row, 2)?,
        can_deal: get_bool(row, 3)?,
        deal_next_attempt_at: parse_datetime(&row.get::<String>(4)?)?,
        deal_check_next_attempt_at: parse_datetime(&row.get::<String>(5)?)?,
        deal_attempts: get_u32(row, 6)?,
        deal_check_attempts: get_u32(row, 7)?,
    })
}

fn missing(content_id: ContentId) -> DatabaseError {
    DatabaseError::NotFound {
        entity: "deal queue entry",
        id: content_id.to_string(),
    }
}

async fn collect(mut rows: libsql::Rows) -> Result<Vec<DealQueueEntry>, DatabaseError> {
    let mut entries = Vec::new();
    while let Some(row) = rows.next().await? {
        entries.push(row_to_entry(&row)?);
    }
    Ok(entries)
}

/// Run an update keyed by content id and fail if no row matched.
async fn update_existing(
    db: &QuayDb,
    content_id: ContentId,
    sql: &str,
    params: Vec<libsql::Value>,
) -> Result<(), DatabaseError> {
    let changed = db
        .execute_with(sql, || libsql::params_from_iter(params.clone()))
        .await?;
    if changed == 0 {
        return Err(missing(content_id));
    }
    Ok(())
}

async fn enqueue(
    db: &QuayDb,
    content_id: ContentId,
    commp_done: bool,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let params: Vec<libsql::Value> = vec![
        to_sql_int(content_id)?.into(),
        i64::from(commp_done).into(),
        fmt_datetime(&now).into(),
    ];
    let changed = db
        .execute_with(
            "INSERT INTO deal_queue (content_id, commp_done, deal_next_attempt_at, deal_check_next_attempt_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT (content_id) DO NOTHING",
            || libsql::params_from_iter(params.clone()),
        )
        .await?;
    Ok(changed > 0)
}

async fn get(db: &QuayDb, content_id: ContentId) -> Result<Option<DealQueueEntry>, DatabaseError> {
    let sql = format!("SELECT {SELECT_COLS} FROM deal_queue WHERE content_id = ?1");
    let id = to_sql_int(content_id)?;
    let rows = db.query_with(&sql, || [id]).await?;
    Ok(collect(rows).await?.into_iter().next())
}

async fn mark_commp_done(db: &QuayDb, content_id: ContentId) -> Result<bool, DatabaseError> {
    let id = to_sql_int(content_id)?;
    let changed = db
        .execute_with(
            "UPDATE deal_queue SET commp_done = 1 WHERE content_id = ?1 AND commp_done = 0",
            || [id],
        )
        .await?;
    Ok(changed > 0)
}

async fn eligible(
    db: &QuayDb,
    can_deal: bool,
    now: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<DealQueueEntry>, DatabaseError> {
    let column = if can_deal {
        "deal_next_attempt_at"
    } else {
        "deal_check_next_attempt_at"
    };
    let sql = format!(
        "SELECT {SELECT_COLS} FROM deal_queue
         WHERE commp_done = 1 AND can_deal = ?1 AND {column} <= ?2
         ORDER BY content_id ASC LIMIT ?3"
    );
    let params: Vec<libsql::Value> = vec![
        i64::from(can_deal).into(),
        fmt_datetime(&now).into(),
        i64::from(limit).into(),
    ];
    let rows = db
        .query_with(&sql, || libsql::params_from_iter(params.clone()))
        .await?;
    collect(rows).await
}

async fn claim(
    db: &QuayDb,
    can_deal: bool,
    content_id: ContentId,
    now: DateTime<Utc>,
    lease_until: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let column = if can_deal {
        "deal_next_attempt_at"
    } else {
        "deal_check_next_attempt_at"
    };
    let sql = format!(
        "UPDATE deal_queue SET {column} = ?4
         WHERE content_id = ?1 AND commp_done = 1 AND can_deal = ?2 AND {column} <= ?3"
    );
    let params: Vec<libsql::Value> = vec![
        to_sql_int(content_id)?.into(),
        i64::from(can_deal).into(),
        fmt_datetime(&now).into(),
        fmt_datetime(&lease_until).into(),
    ];
    let changed = db
        .execute_with(&sql, || libsql::params_from_iter(params.clone()))
        .await?;
    Ok(changed > 0)
}

async fn record_check_success(
    db: &QuayDb,
    content_id: ContentId,
    deficit: u32,
    now: DateTime<Utc>,
    next_check_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let id = to_sql_int(content_id)?;
    if deficit > 0 {
        update_existing(
            db,
            content_id,
            "UPDATE deal_queue
             SET deal_count = ?2, can_deal = 1, deal_next_attempt_at = ?3,
                 deal_check_next_attempt_at = ?4, deal_check_attempts = 0
             WHERE content_id = ?1",
            vec![
                id.into(),
                i64::from(deficit).into(),
                fmt_datetime(&now).into(),
                fmt_datetime(&next_check_at).into(),
            ],
        )
        .await
    } else {
        update_existing(
            db,
            content_id,
            "UPDATE deal_queue
             SET deal_count = 0, can_deal = 0, deal_check_next_attempt_at = ?2,
                 deal_check_attempts = 0
             WHERE content_id = ?1",
            vec![id.into(), fmt_datetime(&next_check_at).into()],
        )
        .await
    }
}

async fn record_check_failure(
    db: &QuayDb,
    content_id: ContentId,
    attempts: u32,
    next_check_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    update_existing(
        db,
        content_id,
        "UPDATE deal_queue SET deal_check_attempts = ?2, deal_check_next_attempt_at = ?3
         WHERE content_id = ?1",
        vec![
            to_sql_int(content_id)?.into(),
            i64::from(attempts).into(),
            fmt_datetime(&next_check_at).into(),
        ],
    )
    .await
}

async fn record_deal_success(
    db: &QuayDb,
    content_id: ContentId,
    next_check_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    update_existing(
        db,
        content_id,
        "UPDATE deal_queue
         SET can_deal = 0, deal_count = 0, deal_attempts = 0, deal_check_next_attempt_at = ?2
         WHERE content_id = ?1",
        vec![
            to_sql_int(content_id)?.into(),
            fmt_datetime(&next_check_at).into(),
        ],
    )
    .await
}

async fn record_deal_failure(
    db: &QuayDb,
    content_id: ContentId,
    attempts: u32,
    next_deal_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    update_existing(
        db,
        content_id,
        "UPDATE deal_queue SET deal_attempts = ?2, deal_next_attempt_at = ?3 WHERE content_id = ?1",
        vec![
            to_sql_int(content_id)?.into(),
            i64::from(attempts).into(),
            fmt_datetime(&next_deal_at).into(),
        ],
    )
    .await
}

#[async_trait]
impl DealQueueStore for QuayDb {
    async fn enqueue(
        &self,
        content_id: ContentId,
        commp_done: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        enqueue(self, content_id, commp_done, now)
            .await
            .map_err(StoreError::from)
    }

    async fn get_entry(
        &self,
        content_id: ContentId,
    ) -> Result<Option<DealQueueEntry>, StoreError> {
        get(self, content_id).await.map_err(StoreError::from)
    }

    async fn mark_commp_done(&self, content_id: ContentId) -> Result<bool, StoreError> {
        mark_commp_done(self, content_id)
            .await
            .map_err(StoreError::from)
    }

    async fn find_eligible_for_check(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<DealQueueEntry>, StoreError> {
        eligible(self, false, now, limit)
            .await
            .map_err(StoreError::from)
    }

    async fn find_eligible_for_deal(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<DealQueueEntry>, StoreError> {
        eligible(self, true, now, limit)
            .await
            .map_err(StoreError::from)
    }

    async fn claim_for_check(
        &self,
        content_id: ContentId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        claim(self, false, content_id, now, lease_until)
            .await
            .map_err(StoreError::from)
    }

    async fn claim_for_deal(
        &self,
        content_id: ContentId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        claim(self, true, content_id, now, lease_until)
            .await
            .map_err(StoreError::from)
    }

    async fn record_check_success(
        &self,
        content_id: ContentId,
        deficit: u32,
        now: DateTime<Utc>,
        next_check_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        record_check_success(self, content_id, deficit, now, next_check_at)
            .await
            .map_err(StoreError::from)
    }

    async fn record_check_failure(
        &self,
        content_id: ContentId,
        attempts: u32,
        next_check_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        record_check_failure(self, content_id, attempts, next_check_at)
            .await
            .map_err(StoreError::from)
    }

    async fn record_deal_success(
        &self,
        content_id: ContentId,
        next_check_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        record_deal_success(self, content_id, next_check_at)
            .await
            .map_err(StoreError::from)
    }

    async fn record_deal_failure(
        &self,
        content_id: ContentId,
        attempts: u32,
        next_deal_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        record_deal_failure(self, content_id, attempts, next_deal_at)
            .await
            .map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::helpers::{at, t0, test_db};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn enqueue_is_idempotent() {
        let db = test_db().await;
        assert!(db.enqueue(1, true, t0()).await.unwrap());
        assert!(!db.enqueue(1, false, at(10)).await.unwrap());

        let entry = db.get_entry(1).await.unwrap().unwrap();
        assert_eq!(entry, DealQueueEntry::new(1, true, t0()));
    }

    #[tokio::test]
    async fn entries_without_commp_are_invisible() {
        let db = test_db().await;
        db.enqueue(1, false, t0()).await.unwrap();
        assert!(db.find_eligible_for_check(at(1), 10).await.unwrap().is_empty());

        assert!(db.mark_commp_done(1).await.unwrap());
        assert!(!db.mark_commp_done(1).await.unwrap());
        assert_eq!(db.find_eligible_for_check(at(1), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn check_and_deal_sets_are_disjoint() {
        let db = test_db().await;
        db.enqueue(1, true, t0()).await.unwrap();
        db.enqueue(2, true, t0()).await.unwrap();
        db.record_check_success(2, 3, t0(), at(3600)).await.unwrap();

        let check: Vec<_> = db
            .find_eligible_for_check(at(1), 10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.content_id)
            .collect();
        let deal: Vec<_> = db
            .find_eligible_for_deal(at(1), 10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.content_id)
            .collect();
        assert_eq!(check, vec![1]);
        assert_eq!(deal, vec![2]);

        let entry = db.get_entry(2).await.unwrap().unwrap();
        assert_eq!(entry.deal_count, 3);
        assert!(entry.can_deal);
    }

    #[tokio::test]
    async fn future_attempts_are_not_eligible() {
        let db = test_db().await;
        db.enqueue(1, true, t0()).await.unwrap();
        db.record_check_failure(1, 1, at(60)).await.unwrap();

        assert!(db.find_eligible_for_check(at(59), 10).await.unwrap().is_empty());
        assert_eq!(db.find_eligible_for_check(at(60), 10).await.unwrap().len(), 1);
        assert_eq!(db.get_entry(1).await.unwrap().unwrap().deal_check_attempts, 1);
    }

    #[tokio::test]
    async fn claims_are_exclusive() {
        let db = test_db().await;
        db.enqueue(1, true, t0()).await.unwrap();

        assert!(db.claim_for_check(1, at(1), at(600)).await.unwrap());
        assert!(!db.claim_for_check(1, at(2), at(600)).await.unwrap());
        // A deal claim never applies to a row owned by the check side.
        assert!(!db.claim_for_deal(1, at(2), at(600)).await.unwrap());
        // The lease expires.
        assert!(db.claim_for_check(1, at(601), at(1200)).await.unwrap());
    }

    #[tokio::test]
    async fn deal_success_hands_row_back_to_checker() {
        let db = test_db().await;
        db.enqueue(1, true, t0()).await.unwrap();
        db.record_check_success(1, 2, t0(), at(3600)).await.unwrap();
        db.record_deal_failure(1, 1, at(30)).await.unwrap();
        assert_eq!(db.get_entry(1).await.unwrap().unwrap().deal_attempts, 1);

        assert!(db.claim_for_deal(1, at(30), at(630)).await.unwrap());
        db.record_deal_success(1, at(7200)).await.unwrap();

        let entry = db.get_entry(1).await.unwrap().unwrap();
        assert!(!entry.can_deal);
        assert_eq!(entry.deal_count, 0);
        assert_eq!(entry.deal_attempts, 0);
        assert_eq!(entry.deal_check_next_attempt_at, at(7200));
    }

    #[tokio::test]
    async fn satisfied_check_stays_on_check_side() {
        let db = test_db().await;
        db.enqueue(1, true, t0()).await.unwrap();
        db.record_check_failure(1, 4, t0()).await.unwrap();
        db.record_check_success(1, 0, at(1), at(3600)).await.unwrap();

        let entry = db.get_entry(1).await.unwrap().unwrap();
        assert!(!entry.can_deal);
        assert_eq!(entry.deal_check_attempts, 0);
        assert_eq!(entry.deal_check_next_attempt_at, at(3600));
    }

    #[tokio::test]
    async fn outcomes_for_unknown_rows_are_not_found() {
        let db = test_db().await;
        let err = db.record_deal_success(99, t0()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn eligible_respects_limit_and_order() {
        let db = test_db().await;
        for id in 1..=5 {
            db.enqueue(id, true, at(i64::try_from(id).unwrap())).await.unwrap();
        }
        let page = db.find_eligible_for_check(at(100), 3).await.unwrap();
        let ids: Vec<_> = page.iter().map(|e| e.content_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}

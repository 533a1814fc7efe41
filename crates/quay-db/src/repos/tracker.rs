//! Deal queue tracker repository (singleton row).

use async_trait::async_trait;

use quay_core::entities::DealQueueTracker;
use quay_core::ids::{ContentId, TRACKER_ID};
use quay_core::store::{StoreError, TrackerStore};

use crate::QuayDb;
use crate::error::DatabaseError;
use crate::helpers::{get_bool, get_u64, to_sql_int};

fn row_to_tracker(row: &libsql::Row) -> Result<DealQueueTracker, DatabaseError> {
    Ok(DealQueueTracker {
        id: get_u64(row, 0)?,
        last_content_id: get_u64(row, 1)?,
        stop_at: get_u64(row, 2)?,
        backfill_done: get_bool(row, 3)?,
    })
}

fn missing() -> DatabaseError {
    DatabaseError::NotFound {
        entity: "deal queue tracker",
        id: TRACKER_ID.to_string(),
    }
}

async fn get(db: &QuayDb) -> Result<Option<DealQueueTracker>, DatabaseError> {
    let id = to_sql_int(TRACKER_ID)?;
    let mut rows = db
        .query_with(
            "SELECT id, last_cont_id, stop_at, backfill_done FROM deal_queue_tracker WHERE id = ?1",
            || [id],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row_to_tracker(&row)?)),
        None => Ok(None),
    }
}

async fn create(db: &QuayDb, stop_at: ContentId) -> Result<DealQueueTracker, DatabaseError> {
    let id = to_sql_int(TRACKER_ID)?;
    let stop = to_sql_int(stop_at)?;
    let created = db
        .execute_with(
            "INSERT INTO deal_queue_tracker (id, last_cont_id, stop_at, backfill_done)
             VALUES (?1, 0, ?2, 0)
             ON CONFLICT (id) DO NOTHING",
            || [id, stop],
        )
        .await?;
    if created > 0 {
        tracing::info!(stop_at, "deal queue tracker created");
    }
    get(db).await?.ok_or(DatabaseError::NoResult)
}

async fn update(db: &QuayDb, sql: &str, value: i64) -> Result<(), DatabaseError> {
    let id = to_sql_int(TRACKER_ID)?;
    let changed = db.execute_with(sql, || [id, value]).await?;
    if changed == 0 {
        return Err(missing());
    }
    Ok(())
}

#[async_trait]
impl TrackerStore for QuayDb {
    async fn get_tracker(&self) -> Result<Option<DealQueueTracker>, StoreError> {
        get(self).await.map_err(StoreError::from)
    }

    async fn create_tracker(&self, stop_at: ContentId) -> Result<DealQueueTracker, StoreError> {
        create(self, stop_at).await.map_err(StoreError::from)
    }

    async fn advance_tracker(&self, last_content_id: ContentId) -> Result<(), StoreError> {
        let last = to_sql_int(last_content_id)?;
        update(
            self,
            "UPDATE deal_queue_tracker SET last_cont_id = MAX(last_cont_id, ?2) WHERE id = ?1",
            last,
        )
        .await
        .map_err(StoreError::from)
    }

    async fn set_tracker_stop_at(&self, stop_at: ContentId) -> Result<(), StoreError> {
        let stop = to_sql_int(stop_at)?;
        update(
            self,
            "UPDATE deal_queue_tracker SET stop_at = ?2 WHERE id = ?1",
            stop,
        )
        .await
        .map_err(StoreError::from)
    }

    async fn mark_backfill_done(&self) -> Result<(), StoreError> {
        update(
            self,
            "UPDATE deal_queue_tracker SET backfill_done = ?2 WHERE id = ?1",
            1,
        )
        .await
        .map_err(StoreError::from)
    }
}

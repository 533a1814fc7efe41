//! Content repository: registration, lookup and backfill paging.

use async_trait::async_trait;
use chrono::Utc;

use quay_core::entities::Content;
use quay_core::ids::ContentId;
use quay_core::store::{ContentStore, StoreError};

use crate::QuayDb;
use crate::error::DatabaseError;
use crate::helpers::{fmt_datetime, get_bool, get_opt_u64, get_u64, parse_datetime, to_sql_int};

/// `zone_id` is derived from membership: the most recent zone holding the content.
const SELECT_COLS: &str = "c.id, c.size, c.active, c.created_at, \
     (SELECT zm.zone_id FROM zone_members zm WHERE zm.content_id = c.id \
      ORDER BY zm.zone_id DESC LIMIT 1)";

fn row_to_content(row: &libsql::Row) -> Result<Content, DatabaseError> {
    Ok(Content {
        id: get_u64(row, 0)?,
        size: get_u64(row, 1)?,
        active: get_bool(row, 2)?,
        created_at: parse_datetime(&row.get::<String>(3)?)?,
        zone_id: get_opt_u64(row, 4)?,
    })
}

async fn insert(db: &QuayDb, size: u64, active: bool) -> Result<Content, DatabaseError> {
    let now = Utc::now();
    let params: Vec<libsql::Value> = vec![
        to_sql_int(size)?.into(),
        i64::from(active).into(),
        fmt_datetime(&now).into(),
    ];
    let mut rows = db
        .query_with(
            "INSERT INTO contents (size, active, created_at) VALUES (?1, ?2, ?3) RETURNING id",
            || libsql::params_from_iter(params.clone()),
        )
        .await?;
    let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
    let id = get_u64(&row, 0)?;

    tracing::debug!(content_id = id, size, active, "content registered");
    Ok(Content {
        id,
        size,
        active,
        zone_id: None,
        created_at: now,
    })
}

async fn get(db: &QuayDb, id: ContentId) -> Result<Option<Content>, DatabaseError> {
    let sql = format!("SELECT {SELECT_COLS} FROM contents c WHERE c.id = ?1");
    let id = to_sql_int(id)?;
    let mut rows = db.query_with(&sql, || [id]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row_to_content(&row)?)),
        None => Ok(None),
    }
}

async fn max_id(db: &QuayDb) -> Result<Option<ContentId>, DatabaseError> {
    let mut rows = db
        .query_with("SELECT MAX(id) FROM contents WHERE size > 0", || ())
        .await?;
    let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
    get_opt_u64(&row, 0)
}

async fn backfill_page(
    db: &QuayDb,
    after: ContentId,
    up_to: ContentId,
    min_size: u64,
    max_size: u64,
    limit: u32,
) -> Result<Vec<Content>, DatabaseError> {
    let sql = format!(
        "SELECT {SELECT_COLS} FROM contents c
         WHERE c.id > ?1 AND c.id <= ?2 AND c.active = 1 AND c.size >= ?3 AND c.size <= ?4
         ORDER BY c.id ASC LIMIT ?5"
    );
    let params: Vec<libsql::Value> = vec![
        to_sql_int(after)?.into(),
        to_sql_int(up_to)?.into(),
        to_sql_int(min_size)?.into(),
        to_sql_int(max_size)?.into(),
        i64::from(limit).into(),
    ];
    let mut rows = db
        .query_with(&sql, || libsql::params_from_iter(params.clone()))
        .await?;

    let mut page = Vec::new();
    while let Some(row) = rows.next().await? {
        page.push(row_to_content(&row)?);
    }
    Ok(page)
}

#[async_trait]
impl ContentStore for QuayDb {
    async fn insert_content(&self, size: u64, active: bool) -> Result<Content, StoreError> {
        insert(self, size, active).await.map_err(StoreError::from)
    }

    async fn get_content(&self, id: ContentId) -> Result<Option<Content>, StoreError> {
        get(self, id).await.map_err(StoreError::from)
    }

    async fn max_content_id(&self) -> Result<Option<ContentId>, StoreError> {
        max_id(self).await.map_err(StoreError::from)
    }

    async fn find_backfill_page(
        &self,
        after: ContentId,
        up_to: ContentId,
        min_size: u64,
        max_size: u64,
        limit: u32,
    ) -> Result<Vec<Content>, StoreError> {
        backfill_page(self, after, up_to, min_size, max_size, limit)
            .await
            .map_err(StoreError::from)
    }
}

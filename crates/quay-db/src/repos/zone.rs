//! Zone repository: staging zones, membership and status transitions.
//!
//! Membership changes are two statements on one connection: the zone size is
//! bumped with a conditional update that re-checks the size cap and the
//! `open` status, then the member row is inserted. A failed insert reverts
//! the size bump.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use quay_core::entities::Zone;
use quay_core::enums::ZoneStatus;
use quay_core::ids::{ContentId, ZoneId};
use quay_core::store::{StoreError, ZoneStore};

use crate::QuayDb;
use crate::error::DatabaseError;
use crate::helpers::{fmt_datetime, get_opt_u64, get_u64, parse_datetime, parse_enum, to_sql_int};

const SELECT_COLS: &str = "id, size, status, aggregate_content_id, created_at, updated_at";

fn row_to_zone(row: &libsql::Row) -> Result<Zone, DatabaseError> {
    Ok(Zone {
        id: get_u64(row, 0)?,
        size: get_u64(row, 1)?,
        status: parse_enum(&row.get::<String>(2)?)?,
        members: Vec::new(),
        aggregate_content_id: get_opt_u64(row, 3)?,
        created_at: parse_datetime(&row.get::<String>(4)?)?,
        updated_at: parse_datetime(&row.get::<String>(5)?)?,
    })
}

async fn load_members(db: &QuayDb, zone: &mut Zone) -> Result<(), DatabaseError> {
    let id = to_sql_int(zone.id)?;
    let mut rows = db
        .query_with(
            "SELECT content_id FROM zone_members WHERE zone_id = ?1 ORDER BY content_id",
            || [id],
        )
        .await?;
    zone.members.clear();
    while let Some(row) = rows.next().await? {
        zone.members.push(get_u64(&row, 0)?);
    }
    Ok(())
}

async fn collect_zones(db: &QuayDb, mut rows: libsql::Rows) -> Result<Vec<Zone>, DatabaseError> {
    let mut zones = Vec::new();
    while let Some(row) = rows.next().await? {
        zones.push(row_to_zone(&row)?);
    }
    for zone in &mut zones {
        load_members(db, zone).await?;
    }
    Ok(zones)
}

async fn create(db: &QuayDb, now: DateTime<Utc>) -> Result<Zone, DatabaseError> {
    let ts = fmt_datetime(&now);
    let mut rows = db
        .query_with(
            "INSERT INTO zones (size, status, created_at, updated_at) VALUES (0, 'open', ?1, ?1)
             RETURNING id",
            || [ts.as_str()],
        )
        .await?;
    let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
    let id = get_u64(&row, 0)?;

    tracing::info!(zone_id = id, "zone opened");
    Ok(Zone {
        id,
        size: 0,
        status: ZoneStatus::Open,
        members: Vec::new(),
        aggregate_content_id: None,
        created_at: now,
        updated_at: now,
    })
}

async fn get(db: &QuayDb, id: ZoneId) -> Result<Option<Zone>, DatabaseError> {
    let sql = format!("SELECT {SELECT_COLS} FROM zones WHERE id = ?1");
    let id = to_sql_int(id)?;
    let rows = db.query_with(&sql, || [id]).await?;
    Ok(collect_zones(db, rows).await?.into_iter().next())
}

async fn find_open_with_room(
    db: &QuayDb,
    size: u64,
    max_size: u64,
) -> Result<Option<Zone>, DatabaseError> {
    let sql = format!(
        "SELECT {SELECT_COLS} FROM zones
         WHERE status = 'open' AND size + ?1 <= ?2
         ORDER BY id ASC LIMIT 1"
    );
    let params: Vec<libsql::Value> = vec![to_sql_int(size)?.into(), to_sql_int(max_size)?.into()];
    let rows = db
        .query_with(&sql, || libsql::params_from_iter(params.clone()))
        .await?;
    Ok(collect_zones(db, rows).await?.into_iter().next())
}

async fn add_member(
    db: &QuayDb,
    zone_id: ZoneId,
    content_id: ContentId,
    size: u64,
    max_size: u64,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let zone = to_sql_int(zone_id)?;
    let content = to_sql_int(content_id)?;
    let size = to_sql_int(size)?;
    let params: Vec<libsql::Value> = vec![
        zone.into(),
        size.into(),
        to_sql_int(max_size)?.into(),
        fmt_datetime(&now).into(),
    ];
    let grown = db
        .execute_with(
            "UPDATE zones SET size = size + ?2, updated_at = ?4
             WHERE id = ?1 AND status = 'open' AND size + ?2 <= ?3",
            || libsql::params_from_iter(params.clone()),
        )
        .await?;
    if grown == 0 {
        return Ok(false);
    }

    let inserted = db
        .execute_with(
            "INSERT INTO zone_members (zone_id, content_id) VALUES (?1, ?2)",
            || [zone, content],
        )
        .await;
    if let Err(e) = inserted {
        tracing::warn!(zone_id, content_id, error = %e, "member insert failed, reverting zone size");
        db.execute_with("UPDATE zones SET size = size - ?2 WHERE id = ?1", || {
            [zone, size]
        })
        .await?;
        return Err(e);
    }
    Ok(true)
}

async fn active_zone_for(db: &QuayDb, content_id: ContentId) -> Result<Option<ZoneId>, DatabaseError> {
    let id = to_sql_int(content_id)?;
    let mut rows = db
        .query_with(
            "SELECT zm.zone_id FROM zone_members zm JOIN zones z ON z.id = zm.zone_id
             WHERE zm.content_id = ?1 AND z.status != 'closed'
             ORDER BY zm.zone_id DESC LIMIT 1",
            || [id],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(get_u64(&row, 0)?)),
        None => Ok(None),
    }
}

async fn transition(
    db: &QuayDb,
    zone_id: ZoneId,
    from: ZoneStatus,
    to: ZoneStatus,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    if !from.can_transition_to(to) {
        return Err(DatabaseError::InvalidState(format!(
            "zone {zone_id}: cannot transition from {from} to {to}"
        )));
    }
    let params: Vec<libsql::Value> = vec![
        to_sql_int(zone_id)?.into(),
        from.as_str().into(),
        to.as_str().into(),
        fmt_datetime(&now).into(),
    ];
    let changed = db
        .execute_with(
            "UPDATE zones SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
            || libsql::params_from_iter(params.clone()),
        )
        .await?;
    if changed > 0 {
        tracing::debug!(zone_id, %from, %to, "zone transitioned");
    }
    Ok(changed > 0)
}

async fn close(
    db: &QuayDb,
    zone_id: ZoneId,
    from: ZoneStatus,
    aggregate_content_id: Option<ContentId>,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    if !from.can_transition_to(ZoneStatus::Closed) {
        return Err(DatabaseError::InvalidState(format!(
            "zone {zone_id}: cannot close from {from}"
        )));
    }
    let aggregate = match aggregate_content_id {
        Some(id) => libsql::Value::Integer(to_sql_int(id)?),
        None => libsql::Value::Null,
    };
    let params: Vec<libsql::Value> = vec![
        to_sql_int(zone_id)?.into(),
        from.as_str().into(),
        aggregate,
        fmt_datetime(&now).into(),
    ];
    let changed = db
        .execute_with(
            "UPDATE zones SET status = 'closed', aggregate_content_id = ?3, updated_at = ?4
             WHERE id = ?1 AND status = ?2",
            || libsql::params_from_iter(params.clone()),
        )
        .await?;
    if changed > 0 {
        tracing::info!(zone_id, ?aggregate_content_id, "zone closed");
    }
    Ok(changed > 0)
}

async fn list(
    db: &QuayDb,
    status: ZoneStatus,
    min_size: u64,
    limit: u32,
) -> Result<Vec<Zone>, DatabaseError> {
    let sql = format!(
        "SELECT {SELECT_COLS} FROM zones WHERE status = ?1 AND size >= ?2 ORDER BY id ASC LIMIT ?3"
    );
    let params: Vec<libsql::Value> = vec![
        status.as_str().into(),
        to_sql_int(min_size)?.into(),
        i64::from(limit).into(),
    ];
    let rows = db
        .query_with(&sql, || libsql::params_from_iter(params.clone()))
        .await?;
    collect_zones(db, rows).await
}

#[async_trait]
impl ZoneStore for QuayDb {
    async fn create_zone(&self, now: DateTime<Utc>) -> Result<Zone, StoreError> {
        create(self, now).await.map_err(StoreError::from)
    }

    async fn get_zone(&self, id: ZoneId) -> Result<Option<Zone>, StoreError> {
        get(self, id).await.map_err(StoreError::from)
    }

    async fn find_open_zone_with_room(
        &self,
        size: u64,
        max_size: u64,
    ) -> Result<Option<Zone>, StoreError> {
        find_open_with_room(self, size, max_size)
            .await
            .map_err(StoreError::from)
    }

    async fn add_zone_member(
        &self,
        zone_id: ZoneId,
        content_id: ContentId,
        size: u64,
        max_size: u64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        add_member(self, zone_id, content_id, size, max_size, now)
            .await
            .map_err(StoreError::from)
    }

    async fn active_zone_for_content(
        &self,
        content_id: ContentId,
    ) -> Result<Option<ZoneId>, StoreError> {
        active_zone_for(self, content_id)
            .await
            .map_err(StoreError::from)
    }

    async fn transition_zone(
        &self,
        zone_id: ZoneId,
        from: ZoneStatus,
        to: ZoneStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        transition(self, zone_id, from, to, now)
            .await
            .map_err(StoreError::from)
    }

    async fn close_zone(
        &self,
        zone_id: ZoneId,
        from: ZoneStatus,
        aggregate_content_id: Option<ContentId>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        close(self, zone_id, from, aggregate_content_id, now)
            .await
            .map_err(StoreError::from)
    }

    async fn list_zones(
        &self,
        status: ZoneStatus,
        min_size: u64,
        limit: u32,
    ) -> Result<Vec<Zone>, StoreError> {
        list(self, status, min_size, limit)
            .await
            .map_err(StoreError::from)
    }
}

//! Provider repository: registry rows plus the persisted ask, protocol and
//! version of each storage provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use quay_core::ask::Ask;
use quay_core::entities::ProviderRecord;
use quay_core::store::{ProviderStore, StoreError};

use crate::QuayDb;
use crate::error::DatabaseError;
use crate::helpers::{
    fmt_datetime, get_bool, get_opt_string, get_opt_u64, get_u64, parse_optional_datetime,
    parse_price, to_sql_int,
};

const SELECT_COLS: &str = "address, suspended, version, protocol, ask_price, ask_verified_price, \
     ask_min_piece_size, ask_max_piece_size, ask_updated_at";

fn row_to_provider(row: &libsql::Row) -> Result<ProviderRecord, DatabaseError> {
    let ask = match (get_opt_string(row, 4)?, get_opt_string(row, 5)?) {
        (Some(price), Some(verified_price)) => Some(Ask {
            price: parse_price(&price)?,
            verified_price: parse_price(&verified_price)?,
            min_piece_size: get_opt_u64(row, 6)?.unwrap_or(0),
            max_piece_size: get_opt_u64(row, 7)?.unwrap_or(0),
        }),
        _ => None,
    };
    Ok(ProviderRecord {
        address: row.get(0)?,
        suspended: get_bool(row, 1)?,
        version: get_opt_string(row, 2)?,
        protocol: get_opt_string(row, 3)?,
        ask,
        ask_updated_at: parse_optional_datetime(get_opt_string(row, 8)?.as_deref())?,
    })
}

fn missing(address: &str) -> DatabaseError {
    DatabaseError::NotFound {
        entity: "provider",
        id: address.to_string(),
    }
}

async fn update_existing(
    db: &QuayDb,
    address: &str,
    sql: &str,
    params: Vec<libsql::Value>,
) -> Result<(), DatabaseError> {
    let changed = db
        .execute_with(sql, || libsql::params_from_iter(params.clone()))
        .await?;
    if changed == 0 {
        return Err(missing(address));
    }
    Ok(())
}

async fn list(db: &QuayDb, include_suspended: bool) -> Result<Vec<ProviderRecord>, DatabaseError> {
    let filter = if include_suspended {
        ""
    } else {
        "WHERE suspended = 0"
    };
    let sql = format!("SELECT {SELECT_COLS} FROM providers {filter} ORDER BY address ASC");
    let mut rows = db.query_with(&sql, || ()).await?;
    let mut providers = Vec::new();
    while let Some(row) = rows.next().await? {
        providers.push(row_to_provider(&row)?);
    }
    Ok(providers)
}

async fn get(db: &QuayDb, address: &str) -> Result<Option<ProviderRecord>, DatabaseError> {
    let sql = format!("SELECT {SELECT_COLS} FROM providers WHERE address = ?1");
    let mut rows = db.query_with(&sql, || [address]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row_to_provider(&row)?)),
        None => Ok(None),
    }
}

async fn upsert(db: &QuayDb, address: &str) -> Result<bool, DatabaseError> {
    let changed = db
        .execute_with(
            "INSERT INTO providers (address) VALUES (?1) ON CONFLICT (address) DO NOTHING",
            || [address],
        )
        .await?;
    if changed > 0 {
        tracing::info!(address, "provider registered");
    }
    Ok(changed > 0)
}

async fn count(db: &QuayDb) -> Result<u64, DatabaseError> {
    let mut rows = db.query_with("SELECT COUNT(*) FROM providers", || ()).await?;
    let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
    get_u64(&row, 0)
}

async fn set_suspended(db: &QuayDb, address: &str, suspended: bool) -> Result<bool, DatabaseError> {
    let params: Vec<libsql::Value> = vec![address.into(), i64::from(suspended).into()];
    let changed = db
        .execute_with(
            "UPDATE providers SET suspended = ?2 WHERE address = ?1",
            || libsql::params_from_iter(params.clone()),
        )
        .await?;
    Ok(changed > 0)
}

async fn record_ask(
    db: &QuayDb,
    address: &str,
    ask: &Ask,
    fetched_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    update_existing(
        db,
        address,
        "UPDATE providers
         SET ask_price = ?2, ask_verified_price = ?3, ask_min_piece_size = ?4,
             ask_max_piece_size = ?5, ask_updated_at = ?6
         WHERE address = ?1",
        vec![
            address.into(),
            ask.price.to_string().into(),
            ask.verified_price.to_string().into(),
            to_sql_int(ask.min_piece_size)?.into(),
            to_sql_int(ask.max_piece_size)?.into(),
            fmt_datetime(&fetched_at).into(),
        ],
    )
    .await
}

#[async_trait]
impl ProviderStore for QuayDb {
    async fn list_providers(
        &self,
        include_suspended: bool,
    ) -> Result<Vec<ProviderRecord>, StoreError> {
        list(self, include_suspended).await.map_err(StoreError::from)
    }

    async fn get_provider(&self, address: &str) -> Result<Option<ProviderRecord>, StoreError> {
        get(self, address).await.map_err(StoreError::from)
    }

    async fn upsert_provider(&self, address: &str) -> Result<bool, StoreError> {
        upsert(self, address).await.map_err(StoreError::from)
    }

    async fn count_providers(&self) -> Result<u64, StoreError> {
        count(self).await.map_err(StoreError::from)
    }

    async fn set_provider_suspended(
        &self,
        address: &str,
        suspended: bool,
    ) -> Result<bool, StoreError> {
        set_suspended(self, address, suspended)
            .await
            .map_err(StoreError::from)
    }

    async fn record_provider_ask(
        &self,
        address: &str,
        ask: &Ask,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        record_ask(self, address, ask, fetched_at)
            .await
            .map_err(StoreError::from)
    }

    async fn record_provider_protocol(
        &self,
        address: &str,
        protocol: &str,
    ) -> Result<(), StoreError> {
        update_existing(
            self,
            address,
            "UPDATE providers SET protocol = ?2 WHERE address = ?1",
            vec![address.into(), protocol.into()],
        )
        .await
        .map_err(StoreError::from)
    }

    async fn record_provider_version(
        &self,
        address: &str,
        version: &str,
    ) -> Result<(), StoreError> {
        update_existing(
            self,
            address,
            "UPDATE providers SET version = ?2 WHERE address = ?1",
            vec![address.into(), version.into()],
        )
        .await
        .map_err(StoreError::from)
    }
}

//! # quay-db
//!
//! libSQL persistence for Quay.
//!
//! Holds contents, staging zones, the deal queue, the backfill tracker and
//! the provider registry. Implements every `quay_core::store` trait on
//! [`QuayDb`], so the scheduler in `quay-deals` can run against it directly.
//!
//! Uses the `libsql` crate (C `SQLite` fork, v0.9.29) in local mode.

pub mod error;
pub mod helpers;
mod migrations;
pub mod repos;
pub mod retry;

use error::DatabaseError;
use libsql::Builder;
use libsql::params::IntoParams;
use quay_config::DatabaseConfig;
use retry::{RetryConfig, with_retry};

/// Central database handle for all Quay state.
///
/// Wraps a libSQL database and a single shared connection. Every repository
/// method runs as one statement on that connection, so conditional updates
/// are atomic without explicit transactions.
pub struct QuayDb {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: libsql::Connection,
    retry: RetryConfig,
}

impl QuayDb {
    /// Open a local database at the given path (`:memory:` for tests).
    ///
    /// Runs migrations automatically on open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        Self::open_local_with_retry(path, RetryConfig::default()).await
    }

    /// Open the database named by the `[database]` config section.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_from_config(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        if config.is_in_memory() {
            tracing::warn!("using an in-memory database; queue state will not survive a restart");
        }
        Self::open_local(&config.path).await
    }

    /// Like [`Self::open_local`] with an explicit lock-retry policy.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local_with_retry(
        path: &str,
        retry: RetryConfig,
    ) -> Result<Self, DatabaseError> {
        if path != ":memory:" {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        DatabaseError::Other(anyhow::anyhow!("create {}: {e}", parent.display()))
                    })?;
                }
            }
        }

        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        let quay_db = Self { db, conn, retry };
        quay_db.run_migrations().await?;
        tracing::debug!(path, "database opened");
        Ok(quay_db)
    }

    /// Access the underlying libSQL connection for direct queries.
    #[must_use]
    pub const fn conn(&self) -> &libsql::Connection {
        &self.conn
    }

    /// Execute a statement, retrying on lock contention.
    ///
    /// `params` is called once per attempt. Returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the statement fails or the retry budget runs out.
    pub async fn execute_with<P, F>(&self, sql: &str, params: F) -> Result<u64, DatabaseError>
    where
        F: Fn() -> P,
        P: IntoParams,
    {
        with_retry(&self.retry, || self.conn.execute(sql, params())).await
    }

    /// Run a query, retrying on lock contention.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or the retry budget runs out.
    pub async fn query_with<P, F>(&self, sql: &str, params: F) -> Result<libsql::Rows, DatabaseError>
    where
        F: Fn() -> P,
        P: IntoParams,
    {
        with_retry(&self.retry, || self.conn.query(sql, params())).await
    }
}

#[cfg(test)]
mod test_support;

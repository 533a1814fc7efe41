//! Schema setup.
//!
//! The SQL lives in `migrations/` and is compiled into the binary. Every
//! statement is `CREATE ... IF NOT EXISTS`, so opening an existing database
//! re-applies it harmlessly.

use crate::QuayDb;
use crate::error::DatabaseError;

const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial",
    include_str!("../migrations/001_initial.sql"),
)];

impl QuayDb {
    pub(crate) async fn run_migrations(&self) -> Result<(), DatabaseError> {
        for (name, sql) in MIGRATIONS {
            self.conn
                .execute_batch(sql)
                .await
                .map_err(|e| DatabaseError::Migration(format!("{name}: {e}")))?;
            tracing::trace!(migration = name, "migration applied");
        }
        Ok(())
    }
}

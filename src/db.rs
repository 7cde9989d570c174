//! SQLite connection pool.
//!
//! The database file and its parent directory are created on first
//! connect. WAL mode lets the HTTP server and a concurrently running
//! `famtree serve rpc` side channel share the file. Foreign keys are
//! enforced so edges and documents cannot point at missing persons.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;

use family_tree_core::service::FamilyService;

use crate::config::Config;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    Ok(pool)
}

/// Opens the database, makes sure the schema exists, and wraps it in the
/// CRUD gateway.
pub async fn open_service(config: &Config) -> Result<Arc<FamilyService>> {
    let pool = connect(config).await?;
    migrate::apply(&pool).await?;
    Ok(Arc::new(FamilyService::new(Arc::new(SqliteStore::new(pool)))))
}

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::error::CoreError;

pub mod migrations;
pub mod models;

#[derive(Clone)]
pub struct Database {
    write_pool: SqlitePool,
    read_pool: SqlitePool,
    pub db_path: PathBuf,
}

#[derive(Clone)]
pub struct DatabaseState(pub Arc<Database>);

impl Database {
    /// Opens `data_dir/index.db`, creating it and running migrations if needed.
    /// The write pool is capped at one connection so SQLite's own locking serializes
    /// writers the way the design's "process-local mutex" does in spirit.
    pub async fn new(data_dir: &Path, max_read_connections: u32) -> Result<Self, CoreError> {
        tokio::fs::create_dir_all(data_dir).await?;

        let db_path = data_dir.join("index.db");
        let base_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .pragma("cache_size", "-64000")
            .pragma("temp_store", "MEMORY")
            .pragma("mmap_size", "536870912");

        let write_opts = base_options.clone();
        let read_opts = base_options;

        let (write_result, read_result) = tokio::join!(
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(write_opts),
            SqlitePoolOptions::new()
                .max_connections(max_read_connections)
                .min_connections(1)
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(read_opts),
        );

        let write_pool = write_result?;
        let read_pool = read_result?;

        migrations::run_migrations(&write_pool).await?;

        Ok(Self {
            write_pool,
            read_pool,
            db_path,
        })
    }

    pub fn write_pool(&self) -> &SqlitePool {
        &self.write_pool
    }

    pub fn read_pool(&self) -> &SqlitePool {
        &self.read_pool
    }

    /// Run PRAGMA optimize before closing. Call this on core shutdown.
    pub async fn optimize(&self) {
        let _ = sqlx::query("PRAGMA optimize").execute(&self.write_pool).await;
        tracing::info!(target: "finder_core::db", "PRAGMA optimize executed");
    }
}

/// Database module for SQLite persistence
///
/// Holds the connection pool backing the durable session memory. WAL mode is
/// enabled so recall reads never block behind a concurrent store.
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::memory::UserLocks;

pub mod memory;

pub use memory::SqliteMemoryStore;

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
    /// Shared by every memory handle so per-user writes serialize across them
    locks: Arc<UserLocks>,
}

impl Database {
    /// Open (creating if missing) the database at `db_path` and run migrations.
    ///
    /// SQLite replays any WAL left behind by an unclean shutdown when the
    /// file is reopened, so no explicit recovery step is needed.
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!("Initializing database at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let connection_string = format!("sqlite:{}", db_path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        debug!("Database connection established");

        let db = Self {
            pool,
            locks: Arc::new(UserLocks::new()),
        };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Migrations are idempotent and safe to run on every start
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::raw_sql(include_str!("../../migrations/001_memories.sql"))
            .execute(&self.pool)
            .await
            .context("Failed to execute migration 001_memories.sql")?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checkpoint the WAL into the main database file
    pub async fn flush_wal(&self) -> Result<()> {
        info!("Flushing WAL to disk");

        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to flush WAL")?;

        debug!("WAL flushed successfully");
        Ok(())
    }

    /// Flush the WAL and close every pooled connection
    pub async fn close(self) -> Result<()> {
        info!("Closing database connection");
        self.flush_wal().await?;
        self.pool.close().await;
        info!("Database connection closed");
        Ok(())
    }

    /// A memory store sharing this pool
    pub fn memories(&self) -> SqliteMemoryStore {
        SqliteMemoryStore::new(self.pool.clone(), Arc::clone(&self.locks))
    }
}

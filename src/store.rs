//! Persistent record of already relayed articles.
//!
//! Backed by a single SQLite file with one table:
//!
//! ```text
//! posted(id INTEGER PRIMARY KEY AUTOINCREMENT,
//!        url TEXT UNIQUE,
//!        title TEXT,
//!        posted_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)
//! ```
//!
//! The URL is the only identity key. Rows are inserted once, right after a
//! successful delivery, and never updated or deleted.

use chrono::Utc;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[cfg(test)]
use crate::models::PostedRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Deduplication table. Owned by the poll loop; single writer.
#[derive(Debug, Clone)]
pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    /// Open (creating if absent) the database at `path` and ensure the schema.
    ///
    /// Safe to call on every start. The parent directory must already exist.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        // One connection: the loop is the only writer, and SQLite serialises
        // writers anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("State database ready");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posted (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT UNIQUE,
                title TEXT,
                posted_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `true` iff no record exists for `url`. Read-only.
    pub async fn is_new(&self, url: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM posted WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_none())
    }

    /// Record `url` as delivered. A second call for the same URL is a no-op
    /// and keeps the first title.
    ///
    /// The insert runs in autocommit mode with `synchronous = FULL`, so it is
    /// on disk once this returns `Ok`.
    #[instrument(level = "debug", skip(self, title))]
    pub async fn mark_posted(&self, url: &str, title: &str) -> Result<()> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO posted (url, title, posted_at) VALUES (?, ?, ?)",
        )
        .bind(url)
        .bind(title)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!("Already recorded; keeping existing row");
        }
        Ok(())
    }

    /// Fetch the record for `url`, if any.
    #[cfg(test)]
    pub async fn get(&self, url: &str) -> Result<Option<PostedRecord>> {
        let record = sqlx::query_as::<_, PostedRecord>(
            "SELECT url, title, posted_at FROM posted WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Number of recorded articles.
    pub async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posted")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Flush and close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

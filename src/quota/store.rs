//! Server-side quota counter storage
//!
//! Counts are kept in a SQLite table keyed by `(device_id, date)`. A new
//! date simply starts a new row, so there is no reset or expiry job.

use crate::error::{NoorError, Result};
use anyhow::Context;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::PathBuf;
use std::time::Duration;

/// Date format of the `date` column
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Atomic per-device, per-day counter
#[cfg_attr(test, mockall::automock)]
pub trait QuotaStore: Send + Sync {
    /// Increments the counter for `(device_id, date)` and returns the new value
    ///
    /// Creates the record with a count of 1 if it does not exist yet. The
    /// read-modify-write happens in a single statement inside one
    /// transaction, so concurrent callers never observe the same count.
    fn increment(&self, device_id: &str, date: NaiveDate) -> Result<u32>;

    /// Returns the current counter without modifying it (0 when absent)
    fn count(&self, device_id: &str, date: NaiveDate) -> Result<u32>;
}

/// SQLite-backed [`QuotaStore`]
pub struct SqliteQuotaStore {
    db_path: PathBuf,
}

impl SqliteQuotaStore {
    /// Opens (creating if needed) the quota database at `db_path`
    ///
    /// # Examples
    ///
    /// ```
    /// use noor::quota::{QuotaStore, SqliteQuotaStore};
    /// use chrono::NaiveDate;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = SqliteQuotaStore::new_with_path(dir.path().join("quota.db")).unwrap();
    /// let day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    /// assert_eq!(store.increment("device-1", day).unwrap(), 1);
    /// assert_eq!(store.increment("device-1", day).unwrap(), 2);
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for quota database")
                .map_err(|e| NoorError::Storage(e.to_string()))?;
        }

        let store = Self { db_path };
        store.init()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .context("Failed to open quota database")
            .map_err(|e| NoorError::Storage(e.to_string()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(NoorError::Database)?;
        Ok(conn)
    }

    fn init(&self) -> Result<()> {
        let conn = self.open()?;

        // journal_mode returns a row, so it cannot go through execute()
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
            .map_err(NoorError::Database)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS daily_quota (
                device_id TEXT NOT NULL,
                date TEXT NOT NULL,
                count INTEGER NOT NULL,
                PRIMARY KEY (device_id, date)
            )",
            [],
        )
        .context("Failed to create quota table")
        .map_err(|e| NoorError::Storage(e.to_string()))?;

        Ok(())
    }
}

impl QuotaStore for SqliteQuotaStore {
    fn increment(&self, device_id: &str, date: NaiveDate) -> Result<u32> {
        let mut conn = self.open()?;
        let day = date.format(DATE_FORMAT).to_string();

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to start quota transaction")
            .map_err(|e| NoorError::Storage(e.to_string()))?;

        let count: u32 = tx
            .query_row(
                "INSERT INTO daily_quota (device_id, date, count) VALUES (?1, ?2, 1)
                ON CONFLICT(device_id, date) DO UPDATE SET count = count + 1
                RETURNING count",
                params![device_id, day],
                |row| row.get(0),
            )
            .context("Failed to increment quota")
            .map_err(|e| NoorError::Storage(e.to_string()))?;

        tx.commit()
            .context("Failed to commit quota transaction")
            .map_err(|e| NoorError::Storage(e.to_string()))?;

        Ok(count)
    }

    fn count(&self, device_id: &str, date: NaiveDate) -> Result<u32> {
        let conn = self.open()?;
        let day = date.format(DATE_FORMAT).to_string();

        let count: Option<u32> = conn
            .query_row(
                "SELECT count FROM daily_quota WHERE device_id = ?1 AND date = ?2",
                params![device_id, day],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read quota")
            .map_err(|e| NoorError::Storage(e.to_string()))?;

        Ok(count.unwrap_or(0))
    }
}

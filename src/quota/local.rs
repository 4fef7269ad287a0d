//! Client-side mirror of the daily quota
//!
//! The mirror is advisory. It lets the client refuse obviously over-quota
//! sends without a network round trip and drives "messages left" hints. The
//! proxy's counter remains authoritative; drift between the two is expected.

use crate::error::{NoorError, Result};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

const TREE_NAME: &str = "quota";
const DAILY_KEY: &[u8] = b"daily";

/// Derived view of the local counter for UI hints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountInfo {
    /// Messages sent today according to this device
    pub count: u32,
    /// Messages left before the daily limit
    pub remaining: u32,
    /// Whether the local counter has reached the limit
    pub is_limit_reached: bool,
    /// Whether the remaining count is low enough to warn about
    pub should_warn: bool,
}

impl CountInfo {
    fn from_count(count: u32, daily_limit: u32, warn_threshold: u32) -> Self {
        let remaining = daily_limit.saturating_sub(count);
        Self {
            count,
            remaining,
            is_limit_reached: count >= daily_limit,
            should_warn: remaining > 0 && remaining <= warn_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyRecord {
    date: NaiveDate,
    count: u32,
}

impl DailyRecord {
    fn count_on(&self, date: NaiveDate) -> u32 {
        if self.date == date {
            self.count
        } else {
            0
        }
    }
}

/// Locally persisted `(date, count)` pair in a sled tree
///
/// Cloning is cheap; clones share the same underlying database.
#[derive(Clone)]
pub struct LocalQuota {
    tree: sled::Tree,
    daily_limit: u32,
    warn_threshold: u32,
}

impl LocalQuota {
    /// Open or create the local quota mirror under `dir`
    ///
    /// # Errors
    ///
    /// Returns `NoorError::Storage` if the database cannot be opened
    ///
    /// # Examples
    ///
    /// ```
    /// use noor::quota::LocalQuota;
    ///
    /// # fn main() -> noor::error::Result<()> {
    /// let dir = tempfile::tempdir()?;
    /// let quota = LocalQuota::open(dir.path(), 20, 3)?;
    /// assert_eq!(quota.count_info()?.remaining, 20);
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(dir: impl AsRef<Path>, daily_limit: u32, warn_threshold: u32) -> Result<Self> {
        let db = sled::open(dir)
            .map_err(|e| NoorError::Storage(format!("Failed to open local quota: {}", e)))?;
        Self::from_db(&db, daily_limit, warn_threshold)
    }

    /// Build the mirror over an already-open sled database
    pub fn from_db(db: &sled::Db, daily_limit: u32, warn_threshold: u32) -> Result<Self> {
        let tree = db
            .open_tree(TREE_NAME)
            .map_err(|e| NoorError::Storage(format!("Failed to open quota tree: {}", e)))?;
        Ok(Self {
            tree,
            daily_limit,
            warn_threshold,
        })
    }

    /// The configured local daily limit
    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Count information for today (UTC)
    pub fn count_info(&self) -> Result<CountInfo> {
        self.count_info_on(Utc::now().date_naive())
    }

    /// Count information for a specific date
    ///
    /// A stored record from another date counts as zero.
    pub fn count_info_on(&self, date: NaiveDate) -> Result<CountInfo> {
        let count = self.read()?.map(|r| r.count_on(date)).unwrap_or(0);
        Ok(CountInfo::from_count(
            count,
            self.daily_limit,
            self.warn_threshold,
        ))
    }

    /// Increment today's (UTC) counter and return the new count
    pub fn increment(&self) -> Result<u32> {
        self.increment_on(Utc::now().date_naive())
    }

    /// Increment the counter for `date`, resetting it when the stored date differs
    ///
    /// # Errors
    ///
    /// Returns `NoorError::Storage` if the update or flush fails
    pub fn increment_on(&self, date: NaiveDate) -> Result<u32> {
        let updated = self
            .tree
            .update_and_fetch(DAILY_KEY, |old| {
                let previous = old
                    .and_then(|bytes| serde_json::from_slice::<DailyRecord>(bytes).ok())
                    .map(|r| r.count_on(date))
                    .unwrap_or(0);
                let next = DailyRecord {
                    date,
                    count: previous.saturating_add(1),
                };
                serde_json::to_vec(&next).ok()
            })
            .map_err(|e| NoorError::Storage(format!("Update failed: {}", e)))?;

        self.tree
            .flush()
            .map_err(|e| NoorError::Storage(format!("Flush failed: {}", e)))?;

        let record: DailyRecord = match updated {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| NoorError::Storage(format!("Deserialization failed: {}", e)))?,
            None => return Err(NoorError::Storage("Quota record missing after update".into()).into()),
        };

        tracing::debug!(count = record.count, date = %record.date, "Local quota incremented");
        Ok(record.count)
    }

    fn read(&self) -> Result<Option<DailyRecord>> {
        match self
            .tree
            .get(DAILY_KEY)
            .map_err(|e| NoorError::Storage(format!("Get failed: {}", e)))?
        {
            Some(bytes) => {
                let record = serde_json::from_slice(&bytes).map_err(|e| {
                    NoorError::Storage(format!("Deserialization failed: {}", e))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, d).unwrap()
    }

    #[test]
    fn test_empty_mirror_reports_full_quota() {
        let dir = tempdir().unwrap();
        let quota = LocalQuota::open(dir.path(), 20, 3).unwrap();
        assert_eq!(quota.daily_limit(), 20);
        let info = quota.count_info_on(day(1)).unwrap();
        assert_eq!(
            info,
            CountInfo {
                count: 0,
                remaining: 20,
                is_limit_reached: false,
                should_warn: false,
            }
        );
    }

    #[test]
    fn test_increment_accumulates_within_day() {
        let dir = tempdir().unwrap();
        let quota = LocalQuota::open(dir.path(), 20, 3).unwrap();
        assert_eq!(quota.increment_on(day(1)).unwrap(), 1);
        assert_eq!(quota.increment_on(day(1)).unwrap(), 2);
        assert_eq!(quota.count_info_on(day(1)).unwrap().remaining, 18);
    }

    #[test]
    fn test_new_day_resets_count() {
        let dir = tempdir().unwrap();
        let quota = LocalQuota::open(dir.path(), 20, 3).unwrap();
        for _ in 0..20 {
            quota.increment_on(day(1)).unwrap();
        }
        assert!(quota.count_info_on(day(1)).unwrap().is_limit_reached);
        assert_eq!(quota.count_info_on(day(2)).unwrap().count, 0);
        assert_eq!(quota.increment_on(day(2)).unwrap(), 1);
    }

    #[test]
    fn test_should_warn_window() {
        let dir = tempdir().unwrap();
        let quota = LocalQuota::open(dir.path(), 5, 2).unwrap();

        quota.increment_on(day(1)).unwrap();
        quota.increment_on(day(1)).unwrap();
        assert!(!quota.count_info_on(day(1)).unwrap().should_warn);

        quota.increment_on(day(1)).unwrap();
        assert!(quota.count_info_on(day(1)).unwrap().should_warn);

        quota.increment_on(day(1)).unwrap();
        quota.increment_on(day(1)).unwrap();
        let info = quota.count_info_on(day(1)).unwrap();
        assert_eq!(info.remaining, 0);
        assert!(info.is_limit_reached);
        assert!(!info.should_warn);
    }

    #[test]
    fn test_count_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let quota = LocalQuota::open(dir.path(), 20, 3).unwrap();
            quota.increment_on(day(3)).unwrap();
        }
        let quota = LocalQuota::open(dir.path(), 20, 3).unwrap();
        assert_eq!(quota.count_info_on(day(3)).unwrap().count, 1);
    }

    #[test]
    fn test_count_beyond_limit_saturates_remaining() {
        let info = CountInfo::from_count(25, 20, 3);
        assert_eq!(info.remaining, 0);
        assert!(info.is_limit_reached);
    }
}

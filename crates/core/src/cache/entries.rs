//! Render cache entry operations.
//!
//! Entries are written whole by a single UPSERT and expire lazily: an expired
//! row is invisible to `get` and removed by `purge_expired`.

use std::time::Duration;

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::OptionalExtension;

/// Which purges to run. They apply in field order: expired, LRU, all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgePlan {
    pub expired: bool,
    pub max_entries: Option<usize>,
    pub all: bool,
}

impl PurgePlan {
    pub fn is_empty(&self) -> bool {
        !self.expired && self.max_entries.is_none() && !self.all
    }
}

/// Result of [`CacheDb::purge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub deleted: usize,
    pub remaining: usize,
}

/// A cached payload with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub payload: Vec<u8>,
    pub content_type: String,
}

impl CacheEntry {
    pub fn new(payload: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self { payload: payload.into(), content_type: content_type.into() }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl CacheDb {
    /// Fetch a live entry.
    ///
    /// Returns None if the key was never stored or its TTL has passed.
    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let key = key.to_string();
        let now = now_ms();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                conn.query_row(
                    "SELECT payload, content_type FROM render_cache
                     WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                    params![key, now],
                    |row| Ok(CacheEntry { payload: row.get(0)?, content_type: row.get(1)? }),
                )
                .optional()
                .map_err(Error::from)
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace an entry.
    ///
    /// `ttl` of None keeps the entry until purged. A zero TTL stores an
    /// entry that is already expired.
    pub async fn put(&self, key: &str, entry: &CacheEntry, ttl: Option<Duration>) -> Result<(), Error> {
        let key = key.to_string();
        let entry = entry.clone();
        let stored_at = now_ms();
        let expires_at = ttl.map(|ttl| stored_at.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)));
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO render_cache (key, payload, content_type, stored_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(key) DO UPDATE SET
                        payload = excluded.payload,
                        content_type = excluded.content_type,
                        stored_at = excluded.stored_at,
                        expires_at = excluded.expires_at",
                    params![key, entry.payload, entry.content_type, stored_at, expires_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove one entry. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let rows = conn.execute("DELETE FROM render_cache WHERE key = ?1", params![key])?;
                Ok(rows > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every expired entry.
    ///
    /// Returns the number of entries deleted.
    pub async fn purge_expired(&self) -> Result<usize, Error> {
        let now = now_ms();
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let rows = conn.execute(
                    "DELETE FROM render_cache WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    params![now],
                )?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }

    /// Keep only the `max_entries` most recently stored entries.
    ///
    /// Returns the number of entries deleted.
    pub async fn purge_lru(&self, max_entries: usize) -> Result<usize, Error> {
        let keep = i64::try_from(max_entries).unwrap_or(i64::MAX);
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let rows = conn.execute(
                    "DELETE FROM render_cache WHERE key NOT IN (
                        SELECT key FROM render_cache ORDER BY stored_at DESC, key LIMIT ?1
                    )",
                    params![keep],
                )?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete everything.
    pub async fn purge_all(&self) -> Result<usize, Error> {
        self.conn
            .call(|conn| -> Result<usize, Error> { Ok(conn.execute("DELETE FROM render_cache", [])?) })
            .await
            .map_err(Error::from)
    }

    /// Run the purges `plan` asks for.
    ///
    /// A plan that asks for nothing is rejected.
    pub async fn purge(&self, plan: PurgePlan) -> Result<PurgeReport, Error> {
        if plan.is_empty() {
            return Err(Error::InvalidInput(
                "At least one of expired, max_entries, or all must be specified".to_string(),
            ));
        }

        let mut deleted = 0;
        if plan.expired {
            deleted += self.purge_expired().await?;
        }
        if let Some(max_entries) = plan.max_entries {
            deleted += self.purge_lru(max_entries).await?;
        }
        if plan.all {
            deleted += self.purge_all().await?;
        }

        tracing::info!(deleted, "cache purged");
        Ok(PurgeReport { deleted, remaining: self.len().await? })
    }

    /// Number of stored rows, expired ones included.
    pub async fn len(&self) -> Result<usize, Error> {
        self.conn
            .call(|conn| -> Result<usize, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM render_cache", [], |row| row.get(0))?;
                Ok(usize::try_from(count).unwrap_or_default())
            })
            .await
            .map_err(Error::from)
    }

    pub async fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len().await? == 0)
    }
}

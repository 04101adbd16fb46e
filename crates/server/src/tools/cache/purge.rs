//! cache_purge tool implementation.
//!
//! Purges render cache entries that have expired, beyond a count, or all of them.

use memento_core::{CacheDb, Error, PurgePlan};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Delete entries whose TTL has passed.
    #[serde(default)]
    pub expired: bool,

    /// Keep only the newest N entries (LRU purge).
    #[serde(default)]
    pub max_entries: Option<usize>,

    /// Delete every entry.
    #[serde(default)]
    pub all: bool,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted.
    pub deleted: usize,
    /// Entries left.
    pub remaining: usize,
}

impl CachePurgeParams {
    fn plan(&self) -> PurgePlan {
        PurgePlan { expired: self.expired, max_entries: self.max_entries, all: self.all }
    }
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(cache: &CacheDb, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    let report = cache.purge(params.plan()).await?;
    let output = CachePurgeOutput { deleted: report.deleted, remaining: report.remaining };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::output;
    use memento_core::CacheEntry;
    use std::time::Duration;

    async fn filled_cache() -> CacheDb {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let entry = CacheEntry::new(b"png".to_vec(), "image/png");
        cache.put("stale", &entry, Some(Duration::ZERO)).await.unwrap();
        cache.put("page1", &entry, None).await.unwrap();
        cache.put("page2", &entry, Some(Duration::from_secs(3600))).await.unwrap();
        cache
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = filled_cache().await;
        let params = CachePurgeParams { expired: true, ..Default::default() };

        let out: CachePurgeOutput = output(&purge_impl(&cache, params).await.unwrap());
        assert_eq!(out.deleted, 1);
        assert_eq!(out.remaining, 2);
    }

    #[tokio::test]
    async fn test_purge_lru() {
        let cache = filled_cache().await;
        let params = CachePurgeParams { max_entries: Some(1), ..Default::default() };

        let out: CachePurgeOutput = output(&purge_impl(&cache, params).await.unwrap());
        assert_eq!(out.deleted, 2);
        assert_eq!(out.remaining, 1);
    }

    #[tokio::test]
    async fn test_purge_all() {
        let cache = filled_cache().await;
        let params = CachePurgeParams { all: true, ..Default::default() };

        let out: CachePurgeOutput = output(&purge_impl(&cache, params).await.unwrap());
        assert_eq!(out.deleted, 3);
        assert_eq!(out.remaining, 0);
    }

    #[tokio::test]
    async fn test_purge_no_params() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let result = purge_impl(&cache, CachePurgeParams::default()).await;
        assert!(result.is_err());
    }
}

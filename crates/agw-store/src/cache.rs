// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bounded recent-window cache used by the chat memory service.
//!
//! The production implementation keeps a capped list per key in the cache
//! store (`push_left` + `trim` + `expire`); the in-memory one mirrors the
//! semantics for tests.

use crate::StoreError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Mutex;

/// A capped most-recent-first list per key, with a TTL refreshed on write.
#[async_trait]
pub trait RecentCache: Send + Sync {
    /// Push `value` to the head of `key`'s list, trim the list to
    /// `max_len`, and refresh the TTL.
    async fn push_recent(
        &self,
        key: &str,
        value: String,
        max_len: usize,
        ttl_secs: u64,
    ) -> Result<(), StoreError>;

    /// Read up to `limit` entries, newest first.
    async fn read_recent(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError>;
}

// ---------------------------------------------------------------------------
// Redis implementation
// ---------------------------------------------------------------------------

/// [`RecentCache`] over the shared cache store connection.
#[derive(Clone)]
pub struct RedisRecentCache {
    conn: ConnectionManager,
}

impl RedisRecentCache {
    /// Wrap an established connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RecentCache for RedisRecentCache {
    async fn push_recent(
        &self,
        key: &str,
        value: String,
        max_len: usize,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let () = conn
            .lpush(key, value)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let () = conn
            .ltrim(key, 0, max_len.saturating_sub(1) as isize)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let () = conn
            .expire(key, ttl_secs as i64)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn read_recent(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.lrange(key, 0, limit.saturating_sub(1) as isize)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// In-memory [`RecentCache`]. TTLs are accepted and ignored.
#[derive(Debug, Default)]
pub struct MemoryRecentCache {
    lists: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryRecentCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecentCache for MemoryRecentCache {
    async fn push_recent(
        &self,
        key: &str,
        value: String,
        max_len: usize,
        _ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let mut lists = self.lists.lock().unwrap();
        let list = lists.entry(key.to_string()).or_default();
        list.insert(0, value);
        list.truncate(max_len);
        Ok(())
    }

    async fn read_recent(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let lists = self.lists.lock().unwrap();
        Ok(lists
            .get(key)
            .map(|l| l.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_keeps_newest_first() {
        let cache = MemoryRecentCache::new();
        for i in 0..3 {
            cache
                .push_recent("k", format!("v{i}"), 10, 60)
                .await
                .unwrap();
        }
        let got = cache.read_recent("k", 10).await.unwrap();
        assert_eq!(got, vec!["v2", "v1", "v0"]);
    }

    #[tokio::test]
    async fn trim_caps_length() {
        let cache = MemoryRecentCache::new();
        for i in 0..5 {
            cache.push_recent("k", format!("v{i}"), 2, 60).await.unwrap();
        }
        let got = cache.read_recent("k", 10).await.unwrap();
        assert_eq!(got, vec!["v4", "v3"]);
    }

    #[tokio::test]
    async fn missing_key_reads_empty() {
        let cache = MemoryRecentCache::new();
        assert!(cache.read_recent("nope", 5).await.unwrap().is_empty());
    }
}

//! Cache store contract and the in-process memory backend.
//!
//! The cache layer talks to its backing store exclusively through
//! [`CacheStore`], an async key/value interface with TTL expiration and
//! cursor-paginated prefix scans. [`MemoryStore`] is the in-tree
//! implementation; a Redis-class service would implement the same trait.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors surfaced by store operations.
///
/// A missing key is *not* an error — reads return `Option` / `bool` so the
/// benign not-found outcome stays type-level.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store is unreachable. Lookup paths fail open on this:
    /// the request executes uncached.
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    /// An I/O failure on a store operation.
    #[error("cache store I/O error: {0}")]
    Io(String),
}

/// Async key/value store with expiration semantics.
///
/// Implementations are shared behind `Arc<dyn CacheStore>` across the cache
/// layer, the write-back queue, and the admin operations, and must be safe
/// for concurrent use. The store is externally synchronized — this crate
/// assumes nothing about it beyond what the trait expresses.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Stores `value` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    /// Fetches the value under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Returns whether a live entry exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Resets the TTL of an existing entry. Returns `false` if the key is
    /// absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Deletes the entry under `key`. Returns `false` if the key was absent.
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    /// Returns up to `limit` keys starting with `prefix`, resuming from
    /// `cursor`. The returned cursor is `0` when the scan is exhausted;
    /// callers loop until then, starting from `cursor = 0`.
    async fn scan_prefix(
        &self,
        prefix: &str,
        cursor: u64,
        limit: usize,
    ) -> Result<(Vec<String>, u64), StoreError>;
}

struct Entry {
    value: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process [`CacheStore`] backed by a mutexed map.
///
/// Expired entries are evicted lazily on access. Prefix scans page through
/// the matching keys in lexicographic order so a cursor remains meaningful
/// across calls.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().insert(key.to_owned(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(false)
            }
            Some(entry) => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock();
        match entries.remove(key) {
            Some(entry) if entry.is_expired(Instant::now()) => Ok(false),
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
        cursor: u64,
        limit: usize,
    ) -> Result<(Vec<String>, u64), StoreError> {
        let entries = self.entries.lock();
        let now = Instant::now();
        let mut matching: Vec<&String> = entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && !e.is_expired(now))
            .map(|(k, _)| k)
            .collect();
        matching.sort();

        let start = (cursor as usize).min(matching.len());
        let end = (start + limit).min(matching.len());
        let page = matching[start..end].iter().map(|k| (*k).clone()).collect();
        let next = if end < matching.len() { end as u64 } else { 0 };
        Ok((page, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[tokio::test]
    async fn set_get_round_trip() {
        let store = MemoryStore::new();
        store
            .set("v1:/ping", bytes("pong"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("v1:/ping").await.unwrap(), Some(bytes("pong")));
        assert!(store.exists("v1:/ping").await.unwrap());
    }

    #[tokio::test]
    async fn missing_key_is_none_not_error() {
        let store = MemoryStore::new();
        assert_eq!(store.get("v1:/absent").await.unwrap(), None);
        assert!(!store.exists("v1:/absent").await.unwrap());
    }

    #[tokio::test]
    async fn expired_entry_is_gone() {
        let store = MemoryStore::new();
        store
            .set("v1:/ping", bytes("pong"), Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get("v1:/ping").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expire_resets_ttl() {
        let store = MemoryStore::new();
        store
            .set("v1:/ping", bytes("pong"), Duration::from_millis(200))
            .await
            .unwrap();
        assert!(store
            .expire("v1:/ping", Duration::from_secs(60))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(400)).await;
        // Still alive under the extended TTL.
        assert_eq!(store.get("v1:/ping").await.unwrap(), Some(bytes("pong")));
    }

    #[tokio::test]
    async fn expire_on_absent_key_is_false() {
        let store = MemoryStore::new();
        assert!(!store
            .expire("v1:/absent", Duration::from_secs(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn del_reports_prior_existence() {
        let store = MemoryStore::new();
        store
            .set("v1:/ping", bytes("pong"), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.del("v1:/ping").await.unwrap());
        assert!(!store.del("v1:/ping").await.unwrap());
    }

    #[tokio::test]
    async fn scan_prefix_pages_through_keys() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .set(
                    &format!("v1:/user/{i}"),
                    bytes("x"),
                    Duration::from_secs(60),
                )
                .await
                .unwrap();
        }
        store
            .set("v1:/other", bytes("x"), Duration::from_secs(60))
            .await
            .unwrap();

        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let (page, next) = store.scan_prefix("v1:/user", cursor, 2).await.unwrap();
            assert!(page.len() <= 2);
            seen.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 5);
        assert!(seen.iter().all(|k| k.starts_with("v1:/user")));
    }

    #[tokio::test]
    async fn scan_prefix_no_match_is_empty() {
        let store = MemoryStore::new();
        store
            .set("v1:/ping", bytes("x"), Duration::from_secs(60))
            .await
            .unwrap();
        let (page, next) = store.scan_prefix("v1:/user", 0, 100).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(next, 0);
    }
}

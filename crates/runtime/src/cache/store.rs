use super::CacheError;
use async_trait::async_trait;
use bytes::Bytes;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

/// Minimal key/value contract a cache backend has to satisfy.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Stores `value` for `ttl` from now. Overwrites any previous entry.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Number of live entries, if the backend can tell.
    async fn entry_count(&self) -> Option<u64> {
        None
    }
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Bytes,
    ttl: Duration,
}

/// Expiry fixed at insertion; reads never extend it.
struct InsertionTtl;

impl Expiry<String, StoredEntry> for InsertionTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &StoredEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &StoredEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process store on moka, bounded by entry count.
pub struct MemoryCacheStore {
    cache: Cache<String, StoredEntry>,
}

impl MemoryCacheStore {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(InsertionTtl)
            .build();
        Self { cache }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        Ok(self.cache.get(key).await.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.cache
            .insert(key.to_string(), StoredEntry { value, ttl })
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn entry_count(&self) -> Option<u64> {
        self.cache.run_pending_tasks().await;
        Some(self.cache.entry_count())
    }
}

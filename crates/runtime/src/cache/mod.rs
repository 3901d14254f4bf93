//! Result caching keyed by query fingerprint.
//!
//! The cache is advisory: callers log and absorb every [`CacheError`]. Entries
//! live for a fixed window from insertion, in process or in a shared Redis.

mod fingerprint;
mod redis;
mod store;

pub use self::redis::RedisCacheStore;
pub use fingerprint::Fingerprint;
pub use store::{CacheStore, MemoryCacheStore};

use bytes::Bytes;
use quarry_common::models::ResultSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to encode result set: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode cached entry: {0}")]
    Decode(#[source] serde_json::Error),
}

impl CacheError {
    pub fn to_quarry_error(self) -> quarry_error::QuarryError {
        use quarry_error::{ErrorCode, QuarryError};

        match self {
            CacheError::Unavailable(msg) => QuarryError::new(
                ErrorCode::CacheUnavailable,
                format!("Cache store unavailable: {}", msg),
            )
            .with_hint("Queries run uncached until the cache store recovers"),
            CacheError::Encode(e) => QuarryError::new(
                ErrorCode::CacheEncodeFailed,
                format!("Failed to encode result set: {}", e),
            ),
            CacheError::Decode(e) => QuarryError::new(
                ErrorCode::CacheDecodeFailed,
                format!("Failed to decode cached entry: {}", e),
            )
            .with_hint("The entry was invalidated and will be recomputed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: Option<u64>,
    pub ttl: Duration,
}

pub struct QueryCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// In-process cache holding at most `max_entries` results.
    pub fn in_memory(max_entries: u64, ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryCacheStore::new(max_entries)), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached result, if any. Undecodable entries are invalidated
    /// and reported as [`CacheError::Decode`].
    pub async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ResultSet>, CacheError> {
        let Some(bytes) = self.store.get(fingerprint.as_str()).await? else {
            return Ok(None);
        };

        match serde_json::from_slice::<ResultSet>(&bytes) {
            Ok(result) => {
                debug!(
                    target: "cache",
                    key = %fingerprint,
                    rows = result.num_rows(),
                    "Cache hit"
                );
                Ok(Some(result))
            }
            Err(e) => {
                warn!(
                    target: "cache",
                    key = %fingerprint,
                    error = %e,
                    "Failed to decode cache entry, invalidating"
                );
                if let Err(delete_err) = self.store.delete(fingerprint.as_str()).await {
                    warn!(target: "cache", key = %fingerprint, error = %delete_err, "Failed to invalidate entry");
                }
                Err(CacheError::Decode(e))
            }
        }
    }

    /// Stores `result` with the configured TTL.
    pub async fn put(&self, fingerprint: &Fingerprint, result: &ResultSet) -> Result<(), CacheError> {
        self.put_with_ttl(fingerprint, result, self.ttl).await
    }

    pub async fn put_with_ttl(
        &self,
        fingerprint: &Fingerprint,
        result: &ResultSet,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let encoded = serde_json::to_vec(result).map_err(CacheError::Encode)?;
        let size_bytes = encoded.len();
        self.store
            .set(fingerprint.as_str(), Bytes::from(encoded), ttl)
            .await?;

        debug!(
            target: "cache",
            key = %fingerprint,
            rows = result.num_rows(),
            size_bytes,
            ttl_secs = ttl.as_secs(),
            "Cached query result"
        );
        Ok(())
    }

    pub async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<(), CacheError> {
        self.store.delete(fingerprint.as_str()).await
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.store.entry_count().await,
            ttl: self.ttl,
        }
    }
}

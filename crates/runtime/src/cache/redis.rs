use super::{CacheError, CacheStore};
use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Connection, Manager, Pool, Runtime};
use quarry_common::config::RedisSettings;
use secrecy::ExposeSecret;
use std::fmt::Display;
use std::time::Duration;
use tracing::debug;

fn unavailable(e: impl Display) -> CacheError {
    CacheError::Unavailable(e.to_string())
}

/// Store shared by every replica, on a pooled Redis connection.
///
/// Connections are opened lazily. An unreachable server surfaces as
/// [`CacheError::Unavailable`] on each call, bounded by `timeout_ms`.
pub struct RedisCacheStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisCacheStore {
    pub fn connect(settings: &RedisSettings) -> Result<Self, CacheError> {
        let url = settings
            .url
            .as_ref()
            .ok_or_else(|| CacheError::Unavailable("no redis url configured".into()))?;
        let manager = Manager::new(url.expose_secret()).map_err(unavailable)?;

        let timeout = Some(Duration::from_millis(settings.timeout_ms));
        let pool = Pool::builder(manager)
            .max_size(settings.pool_size)
            .runtime(Runtime::Tokio1)
            .wait_timeout(timeout)
            .create_timeout(timeout)
            .recycle_timeout(timeout)
            .build()
            .map_err(unavailable)?;

        Ok(Self {
            pool,
            key_prefix: settings.key_prefix.clone(),
        })
    }

    fn key(&self, fingerprint: &str) -> String {
        format!("{}{}", self.key_prefix, fingerprint)
    }

    async fn conn(&self) -> Result<Connection, CacheError> {
        self.pool.get().await.map_err(unavailable)
    }

    /// Round-trips a PING.
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let _: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = conn.get(self.key(key)).await.map_err(unavailable)?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        // PX rejects zero.
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.conn().await?;
        conn.pset_ex::<_, _, ()>(self.key(key), value.to_vec(), millis)
            .await
            .map_err(unavailable)?;
        debug!(target: "cache", key, ttl_ms = millis, "Stored entry in redis");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(self.key(key)).await.map_err(unavailable)
    }
}

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::middleware::rate_limiter::{CounterStore, CounterStoreError, WindowHit};

/// Window counters kept in Redis with INCR + EXPIRE
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
}

impl RedisCounterStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Liveness probe for the extended health check
    pub async fn ping(&self) -> bool {
        let mut connection = self.connection.clone();
        shared::database::ping_redis(&mut connection).await.is_ok()
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, CounterStoreError> {
        let mut connection = self.connection.clone();
        let window_secs = window.as_secs().max(1) as i64;

        let count: i64 = redis::cmd("INCR")
            .arg(key)
            .query_async(&mut connection)
            .await?;
        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(window_secs)
                .query_async::<_, ()>(&mut connection)
                .await?;
        }

        let mut ttl: i64 = redis::cmd("TTL")
            .arg(key)
            .query_async(&mut connection)
            .await?;
        // Key survived without an expiry (EXPIRE lost after INCR)
        if ttl < 0 {
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(window_secs)
                .query_async::<_, ()>(&mut connection)
                .await?;
            ttl = window_secs;
        }

        Ok(WindowHit {
            count: count.max(0) as u64,
            ttl_secs: ttl.max(1) as u64,
        })
    }
}

//! Connection pool management and the Redis command layer.
//!
//! Every command the engine issues flows through [`RedisGateway`]; nothing
//! else touches the connection. Command and connection failures are folded
//! into [`EngineError::RedisUnavailable`], which is fatal to the current
//! operation only; callers retry on their next tick.

use std::time::Duration;

use bb8_redis::bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use tokio::time::sleep;

use crate::manager::error::EngineError;

/// Configuration for the Redis connection pool.
#[derive(Debug, Clone, Copy)]
pub struct RedisPoolConfig {
    pub max_size: u32,
    pub min_idle: u32,
    pub conn_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for RedisPoolConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            min_idle: 5,
            conn_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// Build a pool and verify it with a PING (with retry/backoff).
pub async fn create_redis_pool(
    redis_url: &str,
) -> Result<Pool<RedisConnectionManager>, EngineError> {
    create_redis_pool_with_config(redis_url, RedisPoolConfig::default()).await
}

/// Build a pool with custom configuration and verify it with a PING
/// (with retry/backoff).
pub async fn create_redis_pool_with_config(
    redis_url: &str,
    config: RedisPoolConfig,
) -> Result<Pool<RedisConnectionManager>, EngineError> {
    tracing::info!(
        "Redis pool: max_size={}, min_idle={}, timeouts: conn={}s idle={}s life={}s",
        config.max_size,
        config.min_idle,
        config.conn_timeout.as_secs(),
        config.idle_timeout.as_secs(),
        config.max_lifetime.as_secs()
    );

    let manager = RedisConnectionManager::new(redis_url).map_err(|e| {
        EngineError::RedisUnavailable(format!("invalid redis url: {} - {}", redacted(redis_url), e))
    })?;

    if config.max_size == 0 {
        return Err(EngineError::RedisUnavailable("max_size must be > 0".into()));
    }
    let min_idle = config.min_idle.max(1).min(config.max_size);
    let pool = Pool::builder()
        .max_size(config.max_size)
        .min_idle(Some(min_idle))
        .connection_timeout(config.conn_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .max_lifetime(Some(config.max_lifetime))
        .build(manager)
        .await
        .map_err(|e| EngineError::RedisUnavailable(format!("failed to build Redis pool: {}", e)))?;

    // Warm/verify the pool once with retry + exponential backoff
    retry_async(3, Duration::from_millis(400), || async {
        let mut conn = pool
            .get()
            .await
            .map_err(|e| EngineError::RedisUnavailable(format!("get() from pool: {}", e)))?;
        redis_ping(&mut conn).await?;
        Ok::<_, EngineError>(())
    })
    .await
    .map_err(|e| {
        EngineError::RedisUnavailable(format!(
            "unable to verify Redis connectivity after retries: {}",
            e
        ))
    })?;

    Ok(pool)
}

/// Simple PING utility
async fn redis_ping(
    conn: &mut PooledConnection<'_, RedisConnectionManager>,
) -> Result<(), EngineError> {
    let _: String = redis::cmd("PING")
        .query_async(&mut **conn)
        .await
        .map_err(|e| EngineError::RedisUnavailable(format!("Redis PING failed: {}", e)))?;
    Ok(())
}

/// Generic async retry with exponential backoff.
async fn retry_async<F, Fut, T>(
    max_retries: u32,
    base_delay: Duration,
    mut f: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                let delay = base_delay.mul_f32(2f32.powi((attempt - 1) as i32));
                tracing::warn!(
                    "retry {}/{} after error: {e:#}. sleeping {:?}",
                    attempt,
                    max_retries,
                    delay
                );
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Redact credentials in logs
fn redacted(url: &str) -> String {
    // very light redaction for URIs like: redis://:password@host:6379/db
    if let Some(idx) = url.find('@') {
        let head = &url[..idx];
        if let Some(scheme_end) = head.find("://") {
            let scheme_end = scheme_end + 3;
            return format!("{}***:***{}", &url[..scheme_end], &url[idx..]);
        }
    }
    url.to_string()
}

/// Thin command layer over the pooled connection, exposing the verb set the
/// engine needs. All values cross this boundary as strings; decoding belongs
/// to the callers.
pub struct RedisGateway {
    pool: Pool<RedisConnectionManager>,
}

impl RedisGateway {
    /// Wrap an existing pool.
    pub fn new(pool: Pool<RedisConnectionManager>) -> Self {
        Self { pool }
    }

    /// Build and verify a pool for the given URL, then wrap it.
    pub async fn connect(redis_url: &str) -> Result<Self, EngineError> {
        Ok(Self::new(create_redis_pool(redis_url).await?))
    }

    async fn conn(
        &self,
    ) -> Result<PooledConnection<'_, RedisConnectionManager>, EngineError> {
        self.pool
            .get()
            .await
            .map_err(|e| EngineError::RedisUnavailable(format!("get() from pool: {}", e)))
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, EngineError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let mut conn = self.conn().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    pub async fn incr(&self, key: &str) -> Result<i64, EngineError> {
        let mut conn = self.conn().await?;
        let value: i64 = conn.incr(key, 1).await?;
        Ok(value)
    }

    pub async fn decr(&self, key: &str) -> Result<i64, EngineError> {
        let mut conn = self.conn().await?;
        let value: i64 = conn.decr(key, 1).await?;
        Ok(value)
    }

    pub async fn expire(&self, key: &str, seconds: i64) -> Result<(), EngineError> {
        let mut conn = self.conn().await?;
        let _: () = conn.expire(key, seconds).await?;
        Ok(())
    }

    pub async fn del(&self, key: &str) -> Result<(), EngineError> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    /// KEYS scan. Only used against key families whose TTL bounds their
    /// cardinality.
    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>, EngineError> {
        let mut conn = self.conn().await?;
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }

    pub async fn lpush(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let mut conn = self.conn().await?;
        let _: () = conn.lpush(key, value).await?;
        Ok(())
    }

    pub async fn rpush(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let mut conn = self.conn().await?;
        let _: () = conn.rpush(key, value).await?;
        Ok(())
    }

    pub async fn lpop(&self, key: &str) -> Result<Option<String>, EngineError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.lpop(key, None).await?;
        Ok(value)
    }

    pub async fn rpoplpush(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<Option<String>, EngineError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.rpoplpush(source, destination).await?;
        Ok(value)
    }

    pub async fn lrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, EngineError> {
        let mut conn = self.conn().await?;
        let values: Vec<String> = conn.lrange(key, start, stop).await?;
        Ok(values)
    }

    pub async fn llen(&self, key: &str) -> Result<u64, EngineError> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.llen(key).await?;
        Ok(len)
    }

    /// Remove up to `count` occurrences of `value`; returns how many were
    /// removed.
    pub async fn lrem(&self, key: &str, count: isize, value: &str) -> Result<u64, EngineError> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.lrem(key, count, value).await?;
        Ok(removed)
    }

    pub async fn sadd(&self, key: &str, member: &str) -> Result<bool, EngineError> {
        let mut conn = self.conn().await?;
        let added: u64 = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    pub async fn srem(&self, key: &str, member: &str) -> Result<bool, EngineError> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.srem(key, member).await?;
        Ok(removed > 0)
    }

    pub async fn scard(&self, key: &str) -> Result<u64, EngineError> {
        let mut conn = self.conn().await?;
        let count: u64 = conn.scard(key).await?;
        Ok(count)
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>, EngineError> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    pub async fn smove(
        &self,
        source: &str,
        destination: &str,
        member: &str,
    ) -> Result<bool, EngineError> {
        let mut conn = self.conn().await?;
        let moved: bool = conn.smove(source, destination, member).await?;
        Ok(moved)
    }
}

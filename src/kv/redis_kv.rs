use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use super::{KvStore, INCR_FAIL_OPEN, KV_OP_TIMEOUT};

/// Redis-backed [`KvStore`]. Every operation is wrapped in the §5 200ms
/// per-op timeout; a timeout or a Redis error is caught here and never
/// propagated — the caller only ever sees the documented sentinel.
#[derive(Clone)]
pub struct RedisKv {
    conn: ConnectionManager,
    healthy: Arc<AtomicBool>,
    consecutive_failures: Arc<AtomicU64>,
}

impl RedisKv {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379`) and build the
    /// connection-managed adapter. `redis`'s `ConnectionManager` already
    /// reconnects transparently, so no additional pooling is layered here
    /// (§5: "No per-request locking").
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_tokio_connection_manager().await?;
        Ok(Self {
            conn,
            healthy: Arc::new(AtomicBool::new(true)),
            consecutive_failures: Arc::new(AtomicU64::new(0)),
        })
    }

    fn record_success(&self) {
        self.healthy.store(true, Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    fn record_failure(&self, op: &str, err: impl std::fmt::Display) {
        self.healthy.store(false, Ordering::SeqCst);
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
        warn!(operation = op, error = %err, "kv store operation failed, failing open");
    }

    async fn with_timeout<T, F>(&self, op: &str, fut: F) -> Option<T>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(KV_OP_TIMEOUT, fut).await {
            Ok(Ok(value)) => {
                self.record_success();
                Some(value)
            }
            Ok(Err(e)) => {
                self.record_failure(op, e);
                None
            }
            Err(_) => {
                self.record_failure(op, "timed out");
                None
            }
        }
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = self.conn.clone();
        self.with_timeout("get", conn.get::<_, Option<Vec<u8>>>(key))
            .await
            .flatten()
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) {
        let mut conn = self.conn.clone();
        let _: Option<()> = self
            .with_timeout(
                "set",
                conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)),
            )
            .await;
    }

    async fn delete(&self, key: &str) {
        let mut conn = self.conn.clone();
        let _: Option<()> = self.with_timeout("delete", conn.del::<_, ()>(key)).await;
    }

    async fn incr(&self, key: &str) -> i64 {
        let mut conn = self.conn.clone();
        self.with_timeout("incr", conn.incr::<_, _, i64>(key, 1))
            .await
            .unwrap_or(INCR_FAIL_OPEN)
    }

    async fn expire(&self, key: &str, ttl: Duration) {
        let mut conn = self.conn.clone();
        let _: Option<()> = self
            .with_timeout("expire", conn.expire::<_, ()>(key, ttl.as_secs().max(1) as i64))
            .await;
    }

    async fn get_int(&self, key: &str) -> i64 {
        let mut conn = self.conn.clone();
        self.with_timeout("get_int", conn.get::<_, Option<i64>>(key))
            .await
            .flatten()
            .unwrap_or(0)
    }

    fn healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }
}

//! Cache Manager (C3, §4.3).
//!
//! Four typed façades over the KV adapter, one per cache family, each with
//! its own key scheme and TTL contract. `get_or_set` is explicitly not
//! atomic across processes (§4.3): a cache-stampede may run the producer
//! concurrently more than once, which is acceptable because producers are
//! idempotent and the cost of redundant work, not correctness, is what's at
//! stake.

mod families;

pub use families::{CacheFamilyKind, ModelResponseCache, RetrievalContextCache, UserContextCache};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::kv::KvStore;
use crate::monitoring::Monitoring;

/// A single cache family: a key prefix, a default TTL, and the shared KV
/// adapter underneath. Key prefixes across families must never collide
/// (§4.3 invariant) — each family owns a distinct, hardcoded prefix and
/// nothing else is allowed to construct one of its keys.
pub struct CacheFamily {
    kind: CacheFamilyKind,
    prefix: &'static str,
    default_ttl: Duration,
    kv: Arc<dyn KvStore>,
    monitoring: Arc<Monitoring>,
}

impl CacheFamily {
    fn new(
        kind: CacheFamilyKind,
        prefix: &'static str,
        default_ttl: Duration,
        kv: Arc<dyn KvStore>,
        monitoring: Arc<Monitoring>,
    ) -> Self {
        Self { kind, prefix, default_ttl, kv, monitoring }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    /// Fetch the raw bytes cached under `suffix`, recording a hit or miss.
    pub async fn get(&self, suffix: &str) -> Option<Vec<u8>> {
        let value = self.kv.get(&self.key(suffix)).await;
        if value.is_some() {
            self.monitoring.record_cache_hit(self.kind);
            debug!(family = %self.kind, suffix, "cache hit");
        } else {
            self.monitoring.record_cache_miss(self.kind);
            debug!(family = %self.kind, suffix, "cache miss");
        }
        value
    }

    /// Store `value` under `suffix` with `ttl`, or this family's default if
    /// `ttl` is `None`.
    pub async fn set(&self, suffix: &str, value: &[u8], ttl: Option<Duration>) {
        self.kv.set(&self.key(suffix), value, ttl.unwrap_or(self.default_ttl)).await;
        self.monitoring.record_cache_set(self.kind);
    }

    /// Delete the entry at `suffix`.
    pub async fn delete(&self, suffix: &str) {
        self.kv.delete(&self.key(suffix)).await;
        self.monitoring.record_cache_delete(self.kind);
    }

    /// Cache-aside: return the cached value, or run `producer` on a miss,
    /// cache its result, and return it.
    ///
    /// Not atomic across processes — see module docs. A `producer` that
    /// fails to deserialize on a later read (§7 `CacheCorruption`) is the
    /// caller's responsibility to detect; this method only moves bytes.
    pub async fn get_or_set<F, Fut>(
        &self,
        suffix: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> Vec<u8>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Vec<u8>>,
    {
        if let Some(cached) = self.get(suffix).await {
            return cached;
        }
        let produced = producer().await;
        self.set(suffix, &produced, ttl).await;
        produced
    }

    /// Treat the entry at `suffix` as corrupted: delete it and log a
    /// warning (§7 `CacheCorruption`).
    pub async fn evict_corrupted(&self, suffix: &str) {
        warn!(family = %self.kind, suffix, "cache entry corrupted, evicting");
        self.delete(suffix).await;
    }
}

/// Wires the four cache families named in §3/§4.3 over one shared KV
/// adapter.
pub struct CacheManager {
    /// `user_context:<subject>`, TTL 3600s, invalidated by C7.
    pub user_context: UserContextCache,
    /// `rag:context:<endpoint>:<fingerprint>`, TTL 3600s default, never
    /// invalidated by events.
    pub retrieval_context: RetrievalContextCache,
    /// `ai:response:<digest>`, TTL 86400s, used only for non-personalized
    /// responses.
    pub model_response: ModelResponseCache,
    /// `match:<normalized-query>`, TTL 7 days — the secondary family named
    /// in §3 for exercise/entity resolution.
    pub entity_match: CacheFamily,
}

impl CacheManager {
    /// Build the cache manager over a shared KV adapter, using the
    /// configured per-family default TTLs.
    pub fn new(
        kv: Arc<dyn KvStore>,
        monitoring: Arc<Monitoring>,
        user_context_ttl_secs: u64,
        retrieval_ttl_secs: u64,
        model_response_ttl_secs: u64,
    ) -> Self {
        Self {
            user_context: UserContextCache::new(
                CacheFamily::new(
                    CacheFamilyKind::UserContext,
                    "user_context",
                    Duration::from_secs(user_context_ttl_secs),
                    kv.clone(),
                    monitoring.clone(),
                ),
            ),
            retrieval_context: RetrievalContextCache::new(
                CacheFamily::new(
                    CacheFamilyKind::RetrievalContext,
                    "rag:context",
                    Duration::from_secs(retrieval_ttl_secs),
                    kv.clone(),
                    monitoring.clone(),
                ),
                kv.clone(),
            ),
            model_response: ModelResponseCache::new(
                CacheFamily::new(
                    CacheFamilyKind::ModelResponse,
                    "ai:response",
                    Duration::from_secs(model_response_ttl_secs),
                    kv.clone(),
                    monitoring.clone(),
                ),
            ),
            entity_match: CacheFamily::new(
                CacheFamilyKind::EntityMatch,
                "match",
                Duration::from_secs(7 * 86_400),
                kv,
                monitoring,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKv;

    fn manager() -> CacheManager {
        CacheManager::new(Arc::new(InMemoryKv::new()), Arc::new(Monitoring::new()), 3600, 3600, 86_400)
    }

    #[tokio::test]
    async fn round_trip_set_then_get() {
        let cm = manager();
        cm.user_context.cache.set("u1", b"profile-bytes", None).await;
        let got = cm.user_context.cache.get("u1").await;
        assert_eq!(got.as_deref(), Some(&b"profile-bytes"[..]));
    }

    #[tokio::test]
    async fn families_do_not_collide() {
        let cm = manager();
        cm.user_context.cache.set("shared-id", b"profile", None).await;
        cm.retrieval_context.cache.set("shared-id", b"context", None).await;
        assert_eq!(
            cm.user_context.cache.get("shared-id").await.as_deref(),
            Some(&b"profile"[..])
        );
        assert_eq!(
            cm.retrieval_context.cache.get("shared-id").await.as_deref(),
            Some(&b"context"[..])
        );
    }

    #[tokio::test]
    async fn get_or_set_only_calls_producer_on_miss() {
        let cm = manager();
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let calls2 = calls.clone();
        let produced = cm
            .user_context
            .cache
            .get_or_set("u2", None, || async move {
                calls2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                b"built".to_vec()
            })
            .await;
        assert_eq!(produced, b"built");
        let calls3 = calls.clone();
        let second = cm
            .user_context
            .cache
            .get_or_set("u2", None, || async move {
                calls3.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                b"rebuilt".to_vec()
            })
            .await;
        assert_eq!(second, b"built");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}

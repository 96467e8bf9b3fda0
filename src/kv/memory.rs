use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{KvStore, INCR_FAIL_OPEN};

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process [`KvStore`] double used by the test suite. Stores TTLs as
/// wall-clock deadlines rather than relying on a real eviction daemon, and
/// exposes [`Self::force_unhealthy`] so scenario D (KV outage, §8) can be
/// exercised deterministically without a Redis instance.
#[derive(Clone, Default)]
pub struct InMemoryKv {
    data: Arc<DashMap<String, Entry>>,
    forced_unhealthy: Arc<AtomicBool>,
    healthy: Arc<AtomicBool>,
    consecutive_failures: Arc<AtomicU64>,
}

impl InMemoryKv {
    /// Construct an empty, healthy store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            forced_unhealthy: Arc::new(AtomicBool::new(false)),
            healthy: Arc::new(AtomicBool::new(true)),
            consecutive_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Force every subsequent operation to behave as if the backing store
    /// were unreachable, until [`Self::restore`] is called.
    pub fn force_unhealthy(&self) {
        self.forced_unhealthy.store(true, Ordering::SeqCst);
    }

    /// Number of keys currently stored, regardless of TTL expiry. Exposed
    /// for tests asserting that no KV operation occurred at all (§8
    /// invariant 6: "an admission for an exempt path issues zero KV
    /// operations").
    pub fn key_count(&self) -> usize {
        self.data.len()
    }

    /// Undo [`Self::force_unhealthy`].
    pub fn restore(&self) {
        self.forced_unhealthy.store(false, Ordering::SeqCst);
    }

    fn outage(&self) -> bool {
        self.forced_unhealthy.load(Ordering::SeqCst)
    }

    fn record(&self, ok: bool) {
        if ok {
            self.healthy.store(true, Ordering::SeqCst);
            self.consecutive_failures.store(0, Ordering::SeqCst);
        } else {
            self.healthy.store(false, Ordering::SeqCst);
            self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl KvStore for InMemoryKv {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if self.outage() {
            self.record(false);
            return None;
        }
        self.record(true);
        let entry = self.data.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.data.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) {
        if self.outage() {
            self.record(false);
            return;
        }
        self.record(true);
        self.data.insert(
            key.to_string(),
            Entry { value: value.to_vec(), expires_at: Instant::now() + ttl },
        );
    }

    async fn delete(&self, key: &str) {
        if self.outage() {
            self.record(false);
            return;
        }
        self.record(true);
        self.data.remove(key);
    }

    async fn incr(&self, key: &str) -> i64 {
        if self.outage() {
            self.record(false);
            return INCR_FAIL_OPEN;
        }
        self.record(true);
        let mut entry = self.data.entry(key.to_string()).or_insert_with(|| Entry {
            value: b"0".to_vec(),
            expires_at: Instant::now() + Duration::from_secs(3600),
        });
        let current: i64 = std::str::from_utf8(&entry.value)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let next = current + 1;
        entry.value = next.to_string().into_bytes();
        next
    }

    async fn expire(&self, key: &str, ttl: Duration) {
        if self.outage() {
            self.record(false);
            return;
        }
        self.record(true);
        if let Some(mut entry) = self.data.get_mut(key) {
            entry.expires_at = Instant::now() + ttl;
        }
    }

    async fn get_int(&self, key: &str) -> i64 {
        if self.outage() {
            self.record(false);
            return 0;
        }
        self.record(true);
        self.data
            .get(key)
            .filter(|e| !e.is_expired())
            .and_then(|e| std::str::from_utf8(&e.value).ok().and_then(|s| s.parse().ok()))
            .unwrap_or(0)
    }

    fn healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }
}

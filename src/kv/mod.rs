//! KV Store Adapter (C1, §4.1).
//!
//! A thin interface over a remote key-value store, fail-open by
//! construction: every operation that cannot complete returns a sentinel
//! rather than an error, and flips a shared `healthy` flag so C8 can alert
//! on sustained outages while the request path keeps running.

mod memory;
mod redis_kv;

pub use memory::InMemoryKv;
pub use redis_kv::RedisKv;

use std::time::Duration;

use async_trait::async_trait;

/// Sentinel returned by [`KvStore::incr`] when the store could not be
/// reached. Any caller seeing this value must treat the check as fail-open
/// rather than as a real count (§4.1, §7 `KVUnavailable`).
pub const INCR_FAIL_OPEN: i64 = -1;

/// Per-operation timeout (§5: "KV adapter per-op timeout 200 ms").
pub const KV_OP_TIMEOUT: Duration = Duration::from_millis(200);

/// The capability set every backing store must expose (§4.1).
///
/// All methods are infallible from the caller's point of view: failures are
/// caught internally and converted to the documented sentinel. There is
/// deliberately no `Result` in this trait's signatures — a `Result` would
/// invite callers to propagate the error upward, which is exactly what §4.1
/// and §7 forbid.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch the raw value at `key`, or `None` if absent or the store is
    /// unreachable.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `value` at `key` with the given TTL. Always "succeeds" from the
    /// caller's perspective; a failed write is logged and swallowed.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration);

    /// Delete `key`. Always "succeeds" from the caller's perspective.
    async fn delete(&self, key: &str);

    /// Atomically increment the integer counter at `key` and return the new
    /// value, or [`INCR_FAIL_OPEN`] if the store could not be reached.
    async fn incr(&self, key: &str) -> i64;

    /// Set (or refresh) the TTL on `key`.
    async fn expire(&self, key: &str, ttl: Duration);

    /// Fetch the integer value at `key`, or `0` if absent or unreachable.
    /// Unlike `incr`, a miss and a failure are indistinguishable here by
    /// design — callers that need to tell them apart use `incr`'s sentinel.
    async fn get_int(&self, key: &str) -> i64;

    /// Whether the most recent operation succeeded. Flips back to `true`
    /// after any subsequent success (§4.1).
    fn healthy(&self) -> bool;

    /// Number of consecutive failed operations, for C8's alert predicate
    /// ("KV consecutive failures > 10", §4.8).
    fn consecutive_failures(&self) -> u64;
}

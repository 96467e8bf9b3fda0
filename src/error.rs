//! Crate-wide error types.
//!
//! Every recoverable failure kind the core recognizes is represented here.
//! The propagation policy is structural: a [`CoreError`] almost never reaches
//! the HTTP boundary as-is — callers convert it into degraded behavior
//! (fail-open admission, cache miss, empty retrieval context) per the effect
//! documented on each variant. The sole exception is [`CoreError::RateLimited`],
//! which the admission middleware turns into the one user-visible failure
//! mode this crate produces: an HTTP 429.

use thiserror::Error;

/// Errors recognized by the admission/retrieval core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The KV store could not be reached. Effect: rate limiter fails open,
    /// cache reads report a miss and writes are swallowed.
    #[error("KV store unavailable: {0}")]
    KvUnavailable(String),

    /// The admission middleware could not extract a subject/tier from the
    /// inbound token. Effect: degrade to an IP-keyed subject at tier `free`.
    #[error("token invalid: {0}")]
    TokenInvalid(String),

    /// One or more retrieval partitions failed during fan-out, but at least
    /// one succeeded. Effect: return the successful subset, `degraded=true`.
    #[error("partial retrieval failure: {0} of {1} partitions failed")]
    SearchPartialFailure(usize, usize),

    /// Every partition failed or the fan-out deadline elapsed with zero
    /// successes. Effect: return an empty context, do not cache, log warn.
    #[error("total retrieval failure across all selected partitions")]
    SearchTotalFailure,

    /// Normal admission denial. Effect: 429 with the §6 body and headers.
    #[error("rate limit exceeded, retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds the caller should wait before retrying.
        retry_after_seconds: u64,
    },

    /// A cached value failed to deserialize. Effect: treat as a miss, delete
    /// the offending key, rebuild.
    #[error("cache entry corrupted for key {0}")]
    CacheCorruption(String),

    /// A cache delete returned an error. Effect: log warn, return success to
    /// the caller anyway — staleness is bounded by TTL.
    #[error("invalidation failed for key {0}: {1}")]
    InvalidationFailure(String, String),
}

/// Result alias used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;

//! External collaborator interfaces (§6).
//!
//! The LLM provider, the search index, the SQL store, and token issuance are
//! explicitly out of scope for this crate (§1) — their real implementations
//! live elsewhere. What belongs here is the *seam*: trait definitions thin
//! enough that a handler crate built on top of `tiergate` can plug in real
//! clients, plus the one concrete implementation this crate's own tests need
//! ([`JwtTokenVerifier`], [`SystemClock`]) so §8's scenarios are runnable
//! without a second crate.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::ratelimit::Tier;

/// A verified token's payload, as the admission middleware needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPrincipal {
    /// Opaque stable subject identifier.
    pub subject: String,
    /// Tier claim, pre-coercion (coercion to `free` on unknown happens in
    /// [`Tier::from_claim`]).
    pub tier: Tier,
}

/// Verifies an inbound bearer token and extracts subject + tier.
///
/// `verify` returning `Err` is not itself a fatal error for the request —
/// §4.6/§7 (`TokenInvalid`) say the middleware degrades to an IP-keyed
/// subject at tier `free` and continues.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `token` and return the extracted principal.
    async fn verify(&self, token: &[u8]) -> Result<VerifiedPrincipal, TokenVerifyError>;
}

/// Reason a token failed verification.
#[derive(Debug, thiserror::Error)]
pub enum TokenVerifyError {
    #[error("token malformed or signature invalid: {0}")]
    Invalid(String),
    #[error("token expired")]
    Expired,
}

/// Claims carried by the verified JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    tier: String,
    exp: u64,
}

/// HMAC-signed JWT token verifier. This is the one concrete
/// [`TokenVerifier`] this crate ships, grounded in the gateway's existing
/// JWT usage elsewhere in the stack; a deployment may swap in any other
/// implementation without touching the admission middleware.
pub struct JwtTokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtTokenVerifier {
    /// Build a verifier from an HMAC secret.
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtTokenVerifier {
    async fn verify(&self, token: &[u8]) -> Result<VerifiedPrincipal, TokenVerifyError> {
        let token_str =
            std::str::from_utf8(token).map_err(|e| TokenVerifyError::Invalid(e.to_string()))?;
        let data = decode::<Claims>(token_str, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenVerifyError::Expired,
                _ => TokenVerifyError::Invalid(e.to_string()),
            },
        )?;
        Ok(VerifiedPrincipal {
            subject: data.claims.sub,
            tier: Tier::from_claim(&data.claims.tier),
        })
    }
}

/// A single chunk returned by the search collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Stable chunk identifier, used for dedup during merge (§4.5 step 5).
    pub id: String,
    /// Chunk text.
    pub text: String,
    /// Provider-assigned relevance score. Not comparable across partitions
    /// (§4.5 step 5) — only used to rank within one partition's results.
    pub score: f64,
}

/// The retrieval index collaborator.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Query a single partition for up to `k` chunks within `deadline`.
    async fn query(
        &self,
        partition: &str,
        query: &str,
        k: usize,
        deadline: std::time::Duration,
    ) -> Result<Vec<Chunk>, SearchError>;
}

/// Reason a partition query failed.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("partition query timed out")]
    Timeout,
    #[error("partition query failed: {0}")]
    Failed(String),
}

/// The LLM provider collaborator. Invoked by handlers, not by this crate's
/// core (§1, §6) — present only as a named seam.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a prompt. Streaming responses are represented as an opaque
    /// byte stream the gateway passes through unchanged (Non-goals, §1).
    async fn complete(&self, prompt: &str) -> Result<Vec<u8>, anyhow::Error>;
}

/// The relational store collaborator, consulted by handlers on a user
/// profile cache miss (§6).
#[async_trait]
pub trait SqlStore: Send + Sync {
    /// Fetch the raw profile bytes for `subject`.
    async fn get_profile(&self, subject: &str) -> Result<Vec<u8>, anyhow::Error>;
}

/// Abstracted wall clock, for test determinism (§6).
pub trait Clock: Send + Sync {
    /// Current time in whole seconds since the epoch.
    fn now(&self) -> u64;
}

/// Real wall-clock implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs()
    }
}

/// A clock fixed at a caller-chosen time, used throughout the test suite to
/// reproduce §8's literal-time scenarios.
#[derive(Debug, Clone)]
pub struct FixedClock(pub std::sync::Arc<std::sync::atomic::AtomicU64>);

impl FixedClock {
    /// Create a clock fixed at `t`.
    pub fn at(t: u64) -> Self {
        Self(std::sync::Arc::new(std::sync::atomic::AtomicU64::new(t)))
    }

    /// Advance the fixed clock by `secs`.
    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

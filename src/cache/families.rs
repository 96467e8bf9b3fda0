use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::kv::KvStore;

use super::CacheFamily;

/// Discriminates the four cache families for metrics labeling (§4.8 "Per
/// cache family: hit, miss, set, delete").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheFamilyKind {
    UserContext,
    RetrievalContext,
    ModelResponse,
    EntityMatch,
}

impl CacheFamilyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheFamilyKind::UserContext => "user_context",
            CacheFamilyKind::RetrievalContext => "retrieval_context",
            CacheFamilyKind::ModelResponse => "model_response",
            CacheFamilyKind::EntityMatch => "entity_match",
        }
    }
}

impl fmt::Display for CacheFamilyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `user_context:<subject>` family (§4.3). The core never parses the
/// cached bytes — they are an opaque blob produced by a handler/collaborator
/// (§3).
pub struct UserContextCache {
    pub cache: CacheFamily,
}

impl UserContextCache {
    pub(super) fn new(cache: CacheFamily) -> Self {
        Self { cache }
    }

    /// Fetch the cached profile for `subject`.
    pub async fn get(&self, subject: &str) -> Option<Vec<u8>> {
        self.cache.get(subject).await
    }

    /// Cache a freshly-built profile for `subject`.
    pub async fn set(&self, subject: &str, profile: &[u8]) {
        self.cache.set(subject, profile, None).await;
    }

    /// Delete the cached profile for `subject` (invoked by C7, §4.7).
    pub async fn invalidate(&self, subject: &str) {
        self.cache.delete(subject).await;
    }
}

/// Meta key holding the current retrieval-context cache generation. Not a
/// member of the `rag:context:` family prefix itself, so it cannot collide
/// with a fingerprinted entry (§4.3 invariant).
const RAG_VERSION_KEY: &str = "rag:version";

/// `rag:context:<endpoint>:<fingerprint>` family (§4.3). Never invalidated
/// by deleting individual keys — freshness normally relies entirely on TTL
/// because knowledge-base changes are rare and offline (§3). The one
/// exception is `knowledge_base_updated` (§4.7), which bumps a shared
/// generation counter read on every lookup/write instead of scanning and
/// deleting `rag:context:*` (§4.7/§9's noted alternative).
pub struct RetrievalContextCache {
    pub cache: CacheFamily,
    kv: Arc<dyn KvStore>,
}

impl RetrievalContextCache {
    pub(super) fn new(cache: CacheFamily, kv: Arc<dyn KvStore>) -> Self {
        Self { cache, kv }
    }

    async fn generation(&self) -> i64 {
        self.kv.get_int(RAG_VERSION_KEY).await
    }

    fn suffix(endpoint: &str, fingerprint: &str, generation: i64) -> String {
        format!("v{generation}:{endpoint}:{fingerprint}")
    }

    /// Fetch a previously cached retrieval context blob, scoped to the
    /// current generation.
    pub async fn get(&self, endpoint: &str, fingerprint: &str) -> Option<Vec<u8>> {
        let generation = self.generation().await;
        self.cache.get(&Self::suffix(endpoint, fingerprint, generation)).await
    }

    /// Cache a retrieval context blob, overriding the family default TTL
    /// when `ttl` is given (§4.3 "caller-overridable").
    pub async fn set(&self, endpoint: &str, fingerprint: &str, blob: &[u8], ttl: Option<Duration>) {
        let generation = self.generation().await;
        self.cache.set(&Self::suffix(endpoint, fingerprint, generation), blob, ttl).await;
    }

    /// Advance the generation counter, logically invalidating every
    /// previously cached retrieval context (§4.7 `knowledge_base_updated`).
    pub async fn bump_version(&self) {
        self.kv.incr(RAG_VERSION_KEY).await;
    }
}

/// `ai:response:<digest>` family (§4.3). Used only when the calling handler
/// classifies the query as non-personalized.
pub struct ModelResponseCache {
    pub cache: CacheFamily,
}

impl ModelResponseCache {
    pub(super) fn new(cache: CacheFamily) -> Self {
        Self { cache }
    }

    /// Fetch a cached model response for `digest`.
    pub async fn get(&self, digest: &str) -> Option<Vec<u8>> {
        self.cache.get(digest).await
    }

    /// Cache a model response for `digest`.
    pub async fn set(&self, digest: &str, response: &[u8]) {
        self.cache.set(digest, response, None).await;
    }
}

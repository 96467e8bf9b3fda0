//! Core Glue (C9, §2 "Core Glue").
//!
//! The explicit composition root the §9 re-architecture notes call for, in
//! place of the dynamic-language source's module-level singleton factories:
//! one place constructs C1–C8 and hands back a single `Arc<Gateway>` that
//! the HTTP layer and its middleware share. No hidden globals — every
//! collaborator and component reference in this crate is reached by
//! following a field off [`Gateway`].

use std::sync::Arc;

use crate::cache::CacheManager;
use crate::collaborators::{Clock, LlmClient, SearchIndex, SqlStore, TokenVerifier};
use crate::config::GatewayConfig;
use crate::invalidation::InvalidationCoordinator;
use crate::kv::KvStore;
use crate::monitoring::Monitoring;
use crate::namespace::{RequestShape, UserShape};
use crate::ratelimit::{EndpointClass, RateLimiter, Tier};
use crate::retrieval::{ContextBlob, RetrievalOrchestrator};

/// The façade every protected handler depends on (§2 flow: "C6 admits →
/// handler asks C3 ... → handler asks C5 ... → handler invokes the LLM
/// collaborator → on mutation, handler notifies C7").
///
/// `llm` and `sql` are held only as named seams for a handler crate built on
/// top of this one (§1 "Out of scope") — this crate's own code never calls
/// them.
pub struct Gateway {
    pub config: Arc<GatewayConfig>,
    pub kv: Arc<dyn KvStore>,
    pub rate_limiter: RateLimiter,
    pub cache: Arc<CacheManager>,
    pub retrieval: RetrievalOrchestrator,
    pub invalidation: InvalidationCoordinator,
    pub monitoring: Arc<Monitoring>,
    pub token_verifier: Arc<dyn TokenVerifier>,
    pub clock: Arc<dyn Clock>,
    pub llm: Option<Arc<dyn LlmClient>>,
    pub sql: Option<Arc<dyn SqlStore>>,
}

impl Gateway {
    /// Wire C1–C8 over the given collaborators and configuration. This is
    /// the crate's one composition root — call it once at process startup.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<GatewayConfig>,
        kv: Arc<dyn KvStore>,
        search: Arc<dyn SearchIndex>,
        token_verifier: Arc<dyn TokenVerifier>,
        clock: Arc<dyn Clock>,
        llm: Option<Arc<dyn LlmClient>>,
        sql: Option<Arc<dyn SqlStore>>,
    ) -> Arc<Self> {
        let monitoring = Arc::new(Monitoring::new());

        let rate_limiter = RateLimiter::new(
            kv.clone(),
            clock.clone(),
            config.quotas.clone(),
            monitoring.clone(),
        );

        let cache = Arc::new(CacheManager::new(
            kv.clone(),
            monitoring.clone(),
            config.user_context_ttl_secs,
            config.retrieval_ttl_secs,
            config.model_response_ttl_secs,
        ));

        let retrieval = RetrievalOrchestrator::new(search, cache.clone(), monitoring.clone());
        let invalidation = InvalidationCoordinator::new(cache.clone());

        Arc::new(Self {
            config,
            kv,
            rate_limiter,
            cache,
            retrieval,
            invalidation,
            monitoring,
            token_verifier,
            clock,
            llm,
            sql,
        })
    }

    /// Convenience wrapper matching the §2 flow for a personalized request:
    /// cache-aside lookup of the user profile, falling back to `build` (a
    /// handler-supplied closure that calls the SQL collaborator) on a miss.
    ///
    /// Kept thin on purpose: per §9's "invert the dependency" note, the cache
    /// manager knows nothing about profile builders, and neither does this
    /// glue layer — `build` is handed in by the caller.
    pub async fn user_profile<F, Fut>(&self, subject: &str, build: F) -> Vec<u8>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Vec<u8>>,
    {
        self.cache.user_context.cache.get_or_set(subject, None, build).await
    }

    /// Convenience wrapper over the retrieval orchestrator matching the §2
    /// flow's "handler asks C5 for a retrieval context" step.
    pub async fn retrieval_context(
        &self,
        endpoint: &str,
        request: &RequestShape,
        user: &UserShape,
        max_chunks: usize,
    ) -> ContextBlob {
        self.retrieval
            .get_context(endpoint, request, user, max_chunks, true, None)
            .await
    }

    /// Admin-only read-only quota status for `(subject, endpoint-class,
    /// tier)`, bypassing the counter-consuming `check` path (§4.2 "Auxiliary
    /// operations").
    pub async fn quota_status(
        &self,
        subject: &str,
        class: EndpointClass,
        tier: Tier,
    ) -> crate::ratelimit::RateLimitStatus {
        self.rate_limiter.status(subject, class, tier).await
    }
}

//! Invalidation Coordinator (C7, §4.7).
//!
//! A small set of named state-change events, each mapping to a deterministic
//! cache deletion. Fire-and-forget from the triggering handler's point of
//! view — every deletion this coordinator issues goes through [`CacheFamily`]
//! deletes, which are themselves fail-open (§4.1), so a failed delete never
//! blocks or fails the handler that called us (§4.7, §7 `InvalidationFailure`).
//!
//! Handlers call these methods *after* the mutation has landed in the SQL
//! collaborator, never before (§4.7 "calling it before is a bug").

use std::sync::Arc;

use crate::cache::CacheManager;

/// Invokes the §4.7 event table against a shared [`CacheManager`].
pub struct InvalidationCoordinator {
    cache: Arc<CacheManager>,
}

impl InvalidationCoordinator {
    /// Build the coordinator over the cache manager it invalidates.
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }

    async fn invalidate_user_context(&self, subject: &str) {
        self.cache.user_context.invalidate(subject).await;
    }

    /// A workout was logged for `subject`. Deletes `user_context:<subject>`.
    pub async fn workout_logged(&self, subject: &str) {
        self.invalidate_user_context(subject).await;
    }

    /// An injury was logged for `subject`. Deletes `user_context:<subject>`.
    pub async fn injury_logged(&self, subject: &str) {
        self.invalidate_user_context(subject).await;
    }

    /// A training program was generated for `subject`. Deletes
    /// `user_context:<subject>`.
    pub async fn program_generated(&self, subject: &str) {
        self.invalidate_user_context(subject).await;
    }

    /// `subject`'s profile was mutated directly. Deletes
    /// `user_context:<subject>`.
    pub async fn profile_updated(&self, subject: &str) {
        self.invalidate_user_context(subject).await;
    }

    /// The knowledge base changed underneath every cached retrieval context.
    ///
    /// Implemented as the prefix-version bump §4.7/§9 leaves as an
    /// acceptable alternative to a `rag:context:*` scan: every retrieval
    /// context key is namespaced by a version read from the KV store at
    /// lookup time (see [`crate::cache::RetrievalContextCache`]), so bumping
    /// that version logically deletes every previously cached blob without
    /// enumerating keys.
    pub async fn knowledge_base_updated(&self) {
        self.cache.retrieval_context.bump_version().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKv;
    use crate::monitoring::Monitoring;

    fn coordinator() -> (InvalidationCoordinator, Arc<CacheManager>) {
        let cache = Arc::new(CacheManager::new(
            Arc::new(InMemoryKv::new()),
            Arc::new(Monitoring::new()),
            3600,
            3600,
            86_400,
        ));
        (InvalidationCoordinator::new(cache.clone()), cache)
    }

    #[tokio::test]
    async fn scenario_c_workout_logged_invalidates_user_context() {
        let (coordinator, cache) = coordinator();
        cache.user_context.set("u3", b"blob-p").await;
        coordinator.workout_logged("u3").await;
        assert!(cache.user_context.get("u3").await.is_none());

        cache.user_context.set("u3", b"blob-p-prime").await;
        assert_eq!(cache.user_context.get("u3").await.as_deref(), Some(&b"blob-p-prime"[..]));
    }

    #[tokio::test]
    async fn workout_logged_is_idempotent() {
        let (coordinator, cache) = coordinator();
        cache.user_context.set("u5", b"p").await;
        coordinator.workout_logged("u5").await;
        coordinator.workout_logged("u5").await;
        assert!(cache.user_context.get("u5").await.is_none());
    }

    #[tokio::test]
    async fn all_four_user_context_events_invalidate() {
        let (coordinator, cache) = coordinator();
        for (subject, event) in [
            ("a", 0),
            ("b", 1),
            ("c", 2),
            ("d", 3),
        ] {
            cache.user_context.set(subject, b"p").await;
            match event {
                0 => coordinator.workout_logged(subject).await,
                1 => coordinator.injury_logged(subject).await,
                2 => coordinator.program_generated(subject).await,
                _ => coordinator.profile_updated(subject).await,
            }
            assert!(cache.user_context.get(subject).await.is_none());
        }
    }

    #[tokio::test]
    async fn knowledge_base_updated_invalidates_cached_retrieval_contexts() {
        let (coordinator, cache) = coordinator();
        cache.retrieval_context.set("/api/coach/ask", "fp1", b"blob", None).await;
        assert!(cache.retrieval_context.get("/api/coach/ask", "fp1").await.is_some());

        coordinator.knowledge_base_updated().await;

        assert!(cache.retrieval_context.get("/api/coach/ask", "fp1").await.is_none());
    }
}

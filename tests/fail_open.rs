// Integration test for §7 KVUnavailable fail-open behavior (§8 invariant 7,
// scenario D).

#[cfg(test)]
mod fail_open_tests {
    use std::sync::Arc;

    use tiergate::cache::CacheManager;
    use tiergate::collaborators::FixedClock;
    use tiergate::config::QuotaConfig;
    use tiergate::kv::{InMemoryKv, KvStore};
    use tiergate::monitoring::Monitoring;
    use tiergate::ratelimit::{EndpointClass, RateLimiter, Tier};

    #[tokio::test]
    async fn scenario_d_fail_open_under_kv_outage() {
        let kv = Arc::new(InMemoryKv::new());
        let monitoring = Arc::new(Monitoring::new());
        let limiter = RateLimiter::new(
            kv.clone(),
            Arc::new(FixedClock::at(0)),
            QuotaConfig::defaults(),
            monitoring.clone(),
        );

        kv.force_unhealthy();

        for _ in 0..1_000 {
            let decision = limiter.check("u4", EndpointClass::Expensive, Tier::Free).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, -1);
        }

        let summary = monitoring.summary(kv.healthy(), kv.consecutive_failures());
        let free_expensive = summary
            .admission
            .iter()
            .find(|e| e.tier == "free" && e.class == "expensive")
            .expect("fail-open admissions must still be recorded");
        assert_eq!(free_expensive.fail_open, 1_000);
        assert_eq!(free_expensive.admitted, 0);
    }

    #[tokio::test]
    async fn cache_reads_miss_during_outage_regardless_of_prior_state() {
        let kv = Arc::new(InMemoryKv::new());
        let monitoring = Arc::new(Monitoring::new());
        let cache = CacheManager::new(kv.clone(), monitoring, 3600, 3600, 86_400);

        cache.user_context.set("u4", b"pre-outage profile").await;
        assert!(cache.user_context.get("u4").await.is_some());

        kv.force_unhealthy();
        assert!(cache.user_context.get("u4").await.is_none());

        kv.restore();
        assert_eq!(
            cache.user_context.get("u4").await.as_deref(),
            Some(&b"pre-outage profile"[..])
        );
    }
}

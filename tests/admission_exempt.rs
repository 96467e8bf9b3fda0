// Integration tests for the admission middleware's exempt-path
// short-circuiting (§4.6 step 1, §8 invariant 6, scenario F).

#[cfg(test)]
mod admission_exempt_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use tower::ServiceExt;

    use tiergate::collaborators::{Chunk, SearchError, SearchIndex, SystemClock};
    use tiergate::config::GatewayConfig;
    use tiergate::gateway::Gateway;
    use tiergate::kv::{InMemoryKv, KvStore};

    struct EmptySearch;

    #[async_trait]
    impl SearchIndex for EmptySearch {
        async fn query(
            &self,
            _partition: &str,
            _query: &str,
            _k: usize,
            _deadline: Duration,
        ) -> Result<Vec<Chunk>, SearchError> {
            Ok(Vec::new())
        }
    }

    struct AlwaysRejectVerifier;

    #[async_trait]
    impl tiergate::collaborators::TokenVerifier for AlwaysRejectVerifier {
        async fn verify(
            &self,
            _token: &[u8],
        ) -> Result<tiergate::collaborators::VerifiedPrincipal, tiergate::collaborators::TokenVerifyError>
        {
            Err(tiergate::collaborators::TokenVerifyError::Invalid("no tokens in this test".into()))
        }
    }

    fn test_gateway() -> (Arc<Gateway>, Arc<InMemoryKv>) {
        let kv = Arc::new(InMemoryKv::new());
        let config = Arc::new(GatewayConfig {
            kv_url: "unused".into(),
            token_secret: "unused".into(),
            admission_enabled: true,
            quotas: tiergate::config::QuotaConfig::defaults(),
            retrieval_ttl_secs: 3600,
            model_response_ttl_secs: 86_400,
            user_context_ttl_secs: 3600,
        });
        let gateway = Gateway::new(
            config,
            kv.clone() as Arc<dyn tiergate::kv::KvStore>,
            Arc::new(EmptySearch),
            Arc::new(AlwaysRejectVerifier),
            Arc::new(SystemClock),
            None,
            None,
        );
        (gateway, kv)
    }

    #[tokio::test]
    async fn scenario_f_exempt_health_endpoint_issues_zero_kv_ops_and_returns_200() {
        let (gateway, kv) = test_gateway();
        let app = tiergate::http::build_router(gateway, Router::new());

        for _ in 0..25 {
            let response = app
                .clone()
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert_eq!(kv.consecutive_failures(), 0);
        assert_eq!(kv.key_count(), 0);
    }

    #[tokio::test]
    async fn scenario_f_exempt_summary_and_alerts_bypass_admission() {
        let (gateway, _kv) = test_gateway();
        let app = tiergate::http::build_router(gateway, Router::new());

        for path in ["/summary", "/alerts"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}

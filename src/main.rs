//! tiergate — process entry point.
//!
//! Loads configuration from the environment, connects the Redis-backed KV
//! adapter, wires the C1–C8 components into a `Gateway` via the composition
//! root in `gateway.rs`, mounts the monitoring surface, and serves.
//!
//! This binary does not implement any of the protected endpoints described
//! in §6 of the specification — those belong to a handler crate built on top
//! of `tiergate` (§1 "Out of scope"). It serves the monitoring surface alone
//! so the crate is independently runnable and its `/health`, `/summary`, and
//! `/alerts` endpoints can be exercised directly.

use std::sync::Arc;

use axum::Router;
use tiergate::collaborators::{JwtTokenVerifier, SystemClock};
use tiergate::config::GatewayConfig;
use tiergate::gateway::Gateway;
use tiergate::kv::RedisKv;

mod search_stub {
    //! A `SearchIndex` implementation that always reports zero results.
    //!
    //! This binary has no real search collaborator wired in (§1 "Out of
    //! scope" — the vector/keyword index client is external); a handler
    //! crate supplies its own `Arc<dyn SearchIndex>` when it builds its own
    //! `Gateway`. This stub exists only so `tiergate`'s own `main` can start
    //! end-to-end for local smoke testing.
    use async_trait::async_trait;
    use std::time::Duration;
    use tiergate::collaborators::{Chunk, SearchError, SearchIndex};

    pub struct NullSearchIndex;

    #[async_trait]
    impl SearchIndex for NullSearchIndex {
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
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(
        name = tiergate::NAME,
        version = tiergate::VERSION,
        "starting tiergate"
    );

    let config = Arc::new(GatewayConfig::from_env());

    let kv = Arc::new(RedisKv::connect(&config.kv_url).await?);
    let search = Arc::new(search_stub::NullSearchIndex);
    let token_verifier = Arc::new(JwtTokenVerifier::new(&config.token_secret));
    let clock = Arc::new(SystemClock);

    let gateway = Gateway::new(config, kv, search, token_verifier, clock, None, None);

    let app = tiergate::http::build_router(gateway, Router::new());

    let addr = std::env::var("TIERGATE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "tiergate listening");

    axum::serve(listener, app).await?;

    Ok(())
}

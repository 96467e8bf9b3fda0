//! # tiergate
//!
//! The request-admission and context-assembly core of a tier-aware AI
//! serving gateway: per-user/per-endpoint rate limiting over two sliding
//! windows, retrieval-context assembly across a partitioned knowledge base,
//! multi-layer caching with explicit invalidation, and a monitoring surface
//! exposing liveness, quota utilization, and alert conditions.
//!
//! ## Architecture
//!
//! - `kv`: thin, fail-open adapter over the backing key-value store (C1)
//! - `ratelimit`: two-window sliding-counter admission decisions (C2)
//! - `cache`: typed per-family cache façades over the KV adapter (C3)
//! - `namespace`: pure knowledge-base partition selection (C4)
//! - `retrieval`: parallel retrieval fan-out, merge, and formatting (C5)
//! - `middleware`: the axum admission middleware (C6)
//! - `invalidation`: named cache-invalidation events (C7)
//! - `monitoring`: in-process counters, alert predicates, health (C8)
//! - `gateway`: the composition root wiring C1–C8 together (C9)
//! - `collaborators`: trait seams for the token verifier, search index, LLM
//!   client, SQL store, and clock this crate consumes but does not implement
//! - `config`: environment-driven startup configuration
//! - `error`: the crate-wide error enum and its propagation policy
//! - `http`: the monitoring surface's HTTP exposition and router wiring

pub mod cache;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod invalidation;
pub mod kv;
pub mod middleware;
pub mod monitoring;
pub mod namespace;
pub mod ratelimit;
pub mod retrieval;

pub use config::GatewayConfig;
pub use error::{CoreError, CoreResult};
pub use gateway::Gateway;
pub use ratelimit::{Decision, EndpointClass, Tier};

/// Crate version, re-exported for `/summary`-style build-info reporting.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name, re-exported for the same reason.
pub const NAME: &str = env!("CARGO_PKG_NAME");

//! Monitoring Surface HTTP exposition (C8, §4.8) plus the admission layer
//! wiring, grounded in the teacher's `api::routes::create_v1_router`
//! composition (nest handler routers, then layer cross-cutting middleware,
//! then attach state).

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::gateway::Gateway;
use crate::kv::KvStore;
use crate::middleware::{admission_middleware, request_id_middleware};

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    kv_healthy: bool,
    kv_consecutive_failures: u64,
}

/// `GET /health` (§4.8): 200 whenever the process itself is ready, even if
/// the KV adapter is unhealthy and the gateway is running fail-open — only
/// process-level unreadiness returns 503, which this crate never produces
/// since it carries no startup phase that can leave it half-initialized.
async fn health_handler(State(gateway): State<Arc<Gateway>>) -> Response {
    let body = HealthBody {
        status: "ok",
        kv_healthy: gateway.kv.healthy(),
        kv_consecutive_failures: gateway.kv.consecutive_failures(),
    };
    let status = if gateway.monitoring.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

/// `GET /summary` (§4.8): counter snapshot as JSON. KV health is read live
/// off `gateway.kv` rather than tracked separately inside `Monitoring`, so it
/// can never drift from the adapter's own view of itself.
async fn summary_handler(State(gateway): State<Arc<Gateway>>) -> Response {
    let summary = gateway
        .monitoring
        .summary(gateway.kv.healthy(), gateway.kv.consecutive_failures());
    Json(summary).into_response()
}

/// `GET /alerts` (§4.8): currently-firing alert predicates.
async fn alerts_handler(State(gateway): State<Arc<Gateway>>) -> Response {
    let alerts = gateway.monitoring.alerts(gateway.kv.consecutive_failures());
    Json(alerts).into_response()
}

/// The three exempt monitoring routes (§6 "Exempt paths"), unmounted from
/// any handler router a consuming crate builds.
pub fn monitoring_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/summary", get(summary_handler))
        .route("/alerts", get(alerts_handler))
        .with_state(gateway)
}

/// Wrap `router` with the admission middleware (§4.6), applied over the
/// whole surface — including the exempt routes, which the middleware itself
/// short-circuits (§4.6 step 1, §8 invariant 6) rather than being excluded
/// at the router level. This mirrors the teacher's pattern of layering
/// cross-cutting middleware after nesting handler routes
/// (`api::routes::create_v1_router`).
pub fn with_admission(router: Router, gateway: Arc<Gateway>) -> Router {
    router.layer(from_fn_with_state(gateway, admission_middleware))
}

/// Build the complete gateway router: the monitoring surface merged with
/// `handlers` (routes a consuming crate supplies for its own protected
/// endpoints — out of scope for this crate per §1), with admission layered
/// over the combined surface, then the teacher's standard CORS + request
/// tracing layers, with request-ID tagging outermost so even a 429 carries a
/// correlation ID (`api::middleware`'s layer ordering).
pub fn build_router(gateway: Arc<Gateway>, handlers: Router) -> Router {
    let router = handlers.merge(monitoring_router(gateway.clone()));
    let router = with_admission(router, gateway);
    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(axum::middleware::from_fn(request_id_middleware))
}

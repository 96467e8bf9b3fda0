//! Admission Middleware (C6, §4.6).
//!
//! Grounded in the teacher's `api::middleware::auth_middleware` shape
//! (extract → verify → attach extension → call `next`), generalized to rate
//! limiting: extract subject/tier from the bearer token, classify the
//! endpoint, call the rate limiter, and either short-circuit with a 429 or
//! attach quota headers and invoke the rest of the stack.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::collaborators::TokenVerifier;
use crate::gateway::Gateway;
use crate::ratelimit::{Decision, EndpointClass, Tier};

/// Request ID header, carried through to every response so a caller can
/// correlate a 429 (or any other response) with the structured log lines
/// this crate emits for it.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Stamp every request with a correlation ID, generating one when the
/// caller didn't supply its own (grounded on the teacher's
/// `request_id_middleware`). Mounted outermost, ahead of admission, so the
/// ID is present even on a 429.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }
    response
}

/// Static endpoint classification (§3, §6). The list is closed at startup —
/// adding an endpoint means editing this function, not configuring it at
/// runtime.
pub fn classify_endpoint(path: &str) -> EndpointClass {
    const EXEMPT: &[&str] = &["/health", "/summary", "/alerts", "/docs", "/openapi.json"];
    const EXPENSIVE: &[&str] = &[
        "/api/program/generate",
        "/api/coach/ask",
        "/api/injury/analyze",
        "/api/running/analyze",
        "/api/workout/insights",
        "/api/chat/swap-exercise-enhanced",
    ];

    if EXEMPT.iter().any(|p| path.starts_with(p)) {
        return EndpointClass::Exempt;
    }
    if EXPENSIVE.iter().any(|p| path.starts_with(p)) {
        return EndpointClass::Expensive;
    }
    EndpointClass::General
}

/// 429 response body, exactly the §6 shape.
#[derive(Debug, Serialize)]
struct RateLimitErrorBody {
    error: &'static str,
    message: String,
    retry_after: u64,
    tier: String,
    endpoint: String,
    remaining: i64,
}

fn header_value(v: impl ToString) -> HeaderValue {
    HeaderValue::from_str(&v.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

fn denied_response(decision: Decision, tier: Tier, endpoint: &str) -> Response {
    let body = RateLimitErrorBody {
        error: "Rate limit exceeded",
        message: format!(
            "Too many requests. Please retry after {} seconds.",
            decision.retry_after_seconds
        ),
        retry_after: decision.retry_after_seconds,
        tier: tier.as_str().to_string(),
        endpoint: endpoint.to_string(),
        remaining: 0,
    };
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert("Retry-After", header_value(decision.retry_after_seconds));
    headers.insert("X-RateLimit-Limit", header_value(0));
    headers.insert("X-RateLimit-Remaining", header_value(0));
    headers.insert("X-RateLimit-Tier", header_value(tier.as_str()));
    response
}

/// Extract a bearer token from the `Authorization` header, the way the
/// teacher's `extract_bearer_token` does.
fn extract_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

/// Degrade to an IP-derived subject when the token cannot be verified (§4.6
/// step 2, §7 `TokenInvalid`). `X-Forwarded-For` is trusted here only as a
/// best-effort identifier for rate-limit bucketing, never for authorization.
fn ip_derived_subject(request: &Request) -> String {
    request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .map(|s| format!("ip:{s}"))
        .unwrap_or_else(|| "ip:unknown".to_string())
}

/// The admission middleware function, mounted over the whole router so that
/// exempt-path short-circuiting (§4.6 step 1, §8 invariant 6) is enforced in
/// one place rather than per-route.
pub async fn admission_middleware(
    State(gateway): State<Arc<Gateway>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let class = classify_endpoint(&path);

    if class == EndpointClass::Exempt || !gateway.config.admission_enabled {
        return next.run(request).await;
    }

    let token = extract_bearer_token(&request).map(|t| t.as_bytes().to_vec());
    let (subject, tier) = match token {
        Some(bytes) => match gateway.token_verifier.verify(&bytes).await {
            Ok(principal) => (principal.subject, principal.tier),
            Err(e) => {
                debug!(error = %e, "token verification failed, degrading to IP-keyed subject");
                (ip_derived_subject(&request), Tier::Free)
            }
        },
        None => (ip_derived_subject(&request), Tier::Free),
    };

    // §4.6 step 5: the admission sample is recorded by `RateLimiter::check`
    // itself (§4.2), which updates C8's admitted/denied/fail-open counters
    // for this (tier, class) regardless of outcome.
    let decision = gateway.rate_limiter.check(&subject, class, tier).await;

    if !decision.allowed {
        return denied_response(decision, tier, &path);
    }

    let limits = gateway.config.quotas.limits_for(tier, class);
    let limit = limits.hourly_limit.min(limits.per_minute_limit);

    let mut request = request;
    request.extensions_mut().insert(tier);
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", header_value(limit));
    headers.insert("X-RateLimit-Remaining", header_value(decision.remaining));
    headers.insert("X-RateLimit-Tier", header_value(tier.as_str()));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_expensive_endpoints() {
        assert_eq!(classify_endpoint("/api/coach/ask"), EndpointClass::Expensive);
        assert_eq!(
            classify_endpoint("/api/program/generate/v2"),
            EndpointClass::Expensive
        );
        assert_eq!(
            classify_endpoint("/api/chat/swap-exercise-enhanced"),
            EndpointClass::Expensive
        );
    }

    #[test]
    fn classifies_exempt_endpoints() {
        assert_eq!(classify_endpoint("/health"), EndpointClass::Exempt);
        assert_eq!(classify_endpoint("/summary"), EndpointClass::Exempt);
        assert_eq!(classify_endpoint("/alerts"), EndpointClass::Exempt);
        assert_eq!(classify_endpoint("/docs"), EndpointClass::Exempt);
        assert_eq!(classify_endpoint("/openapi.json"), EndpointClass::Exempt);
    }

    #[test]
    fn everything_else_is_general() {
        assert_eq!(classify_endpoint("/api/users/me"), EndpointClass::General);
        assert_eq!(classify_endpoint("/"), EndpointClass::General);
    }
}

//! Rate Limiter (C2, §4.2).
//!
//! Two overlapping sliding windows — one hour, one minute — approximated by
//! fixed buckets whose key includes `floor(now / window_size)`, so expiry
//! alone implements the sliding effect (§3 "Counter", §4.2). The KV
//! adapter's atomic `incr` is the only serialization point (§5); a single
//! over-limit admission under concurrent requests is accepted (§4.2 "Edge
//! cases").

mod types;

pub use types::{
    Decision, EndpointClass, RateLimitStatus, Tier, WindowLimits, WindowStatus,
};

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::collaborators::Clock;
use crate::config::QuotaConfig;
use crate::kv::{KvStore, INCR_FAIL_OPEN};
use crate::monitoring::Monitoring;

const HOUR_SECS: u64 = 3600;
const MINUTE_SECS: u64 = 60;

#[derive(Debug, Clone, Copy)]
enum WindowKind {
    Hour,
    Minute,
}

impl WindowKind {
    fn as_str(&self) -> &'static str {
        match self {
            WindowKind::Hour => "hour",
            WindowKind::Minute => "minute",
        }
    }

    fn size_secs(&self) -> u64 {
        match self {
            WindowKind::Hour => HOUR_SECS,
            WindowKind::Minute => MINUTE_SECS,
        }
    }
}

fn counter_key(subject: &str, class: EndpointClass, window: WindowKind, now: u64) -> String {
    let bucket = now / window.size_secs();
    format!("rl:{subject}:{class}:{}:{bucket}", window.as_str())
}

/// Two-window sliding counter rate limiter.
pub struct RateLimiter {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    quotas: QuotaConfig,
    monitoring: Arc<Monitoring>,
}

impl RateLimiter {
    /// Build a rate limiter over `kv`, using `clock` for bucket math and
    /// `quotas` for per-(tier, class) limits.
    pub fn new(
        kv: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        quotas: QuotaConfig,
        monitoring: Arc<Monitoring>,
    ) -> Self {
        Self { kv, clock, quotas, monitoring }
    }

    /// Implements the §4.2 algorithm exactly. Callers must not invoke this
    /// for `EndpointClass::Exempt` — exempt endpoints never reach C2 (§3,
    /// §4.6 step 1, §8 invariant 6).
    pub async fn check(&self, subject: &str, class: EndpointClass, tier: Tier) -> Decision {
        debug_assert_ne!(class, EndpointClass::Exempt, "exempt endpoints must not call check()");

        let limits = self.quotas.limits_for(tier, class);
        let now = self.clock.now();

        let hour_key = counter_key(subject, class, WindowKind::Hour, now);
        let minute_key = counter_key(subject, class, WindowKind::Minute, now);

        let hour_count = self.kv.incr(&hour_key).await;
        let minute_count = self.kv.incr(&minute_key).await;

        if hour_count == INCR_FAIL_OPEN || minute_count == INCR_FAIL_OPEN {
            warn!(subject, %class, %tier, "rate limiter kv incr failed, failing open");
            self.monitoring.record_fail_open(tier, class);
            return Decision::fail_open();
        }

        if hour_count == 1 {
            self.kv.expire(&hour_key, Duration::from_secs(HOUR_SECS)).await;
        }
        if minute_count == 1 {
            self.kv.expire(&minute_key, Duration::from_secs(MINUTE_SECS)).await;
        }

        let hour_exceeded = hour_count as u64 > limits.hourly_limit;
        let minute_exceeded = minute_count as u64 > limits.per_minute_limit;

        if hour_exceeded || minute_exceeded {
            let hour_retry = HOUR_SECS - (now % HOUR_SECS);
            let minute_retry = MINUTE_SECS - (now % MINUTE_SECS);
            let retry_after_seconds = match (hour_exceeded, minute_exceeded) {
                (true, true) => hour_retry.max(minute_retry),
                (true, false) => hour_retry,
                (false, true) => minute_retry,
                (false, false) => unreachable!(),
            };
            self.monitoring.record_denied(tier, class);
            return Decision { allowed: false, remaining: 0, retry_after_seconds };
        }

        let hour_remaining = limits.hourly_limit as i64 - hour_count;
        let minute_remaining = limits.per_minute_limit as i64 - minute_count;
        self.monitoring.record_admitted(tier, class);
        Decision {
            allowed: true,
            remaining: hour_remaining.min(minute_remaining),
            retry_after_seconds: 0,
        }
    }

    /// Read-only status for both windows, without consuming a request
    /// (§4.2 "Auxiliary operations").
    pub async fn status(&self, subject: &str, class: EndpointClass, tier: Tier) -> RateLimitStatus {
        let limits = self.quotas.limits_for(tier, class);
        let now = self.clock.now();

        let hour_key = counter_key(subject, class, WindowKind::Hour, now);
        let minute_key = counter_key(subject, class, WindowKind::Minute, now);

        let hour_used = self.kv.get_int(&hour_key).await as u64;
        let minute_used = self.kv.get_int(&minute_key).await as u64;

        RateLimitStatus {
            hourly: WindowStatus {
                used: hour_used,
                remaining: limits.hourly_limit as i64 - hour_used as i64,
                reset_in_seconds: HOUR_SECS - (now % HOUR_SECS),
            },
            per_minute: WindowStatus {
                used: minute_used,
                remaining: limits.per_minute_limit as i64 - minute_used as i64,
                reset_in_seconds: MINUTE_SECS - (now % MINUTE_SECS),
            },
        }
    }

    /// Delete both counters for the current window (§4.2 "Auxiliary
    /// operations", admin-only in practice — the core does not itself
    /// enforce the admin check, a handler does).
    pub async fn reset(&self, subject: &str, class: EndpointClass) {
        let now = self.clock.now();
        let hour_key = counter_key(subject, class, WindowKind::Hour, now);
        let minute_key = counter_key(subject, class, WindowKind::Minute, now);
        self.kv.delete(&hour_key).await;
        self.kv.delete(&minute_key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::FixedClock;
    use crate::kv::InMemoryKv;

    fn limiter(clock: FixedClock) -> RateLimiter {
        RateLimiter::new(
            Arc::new(InMemoryKv::new()),
            Arc::new(clock),
            QuotaConfig::defaults(),
            Arc::new(Monitoring::new()),
        )
    }

    #[tokio::test]
    async fn scenario_a_free_tier_expensive_limit() {
        let clock = FixedClock::at(0);
        let rl = limiter(clock.clone());

        for expected_remaining in (0..10).rev() {
            let d = rl.check("u1", EndpointClass::Expensive, Tier::Free).await;
            assert!(d.allowed);
            assert_eq!(d.remaining, expected_remaining);
        }

        let denied = rl.check("u1", EndpointClass::Expensive, Tier::Free).await;
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_seconds, 60);

        clock.advance(60);
        let allowed_again = rl.check("u1", EndpointClass::Expensive, Tier::Free).await;
        assert!(allowed_again.allowed);
        assert_eq!(allowed_again.remaining, 9);
    }

    #[tokio::test]
    async fn unknown_tier_string_coerces_to_free() {
        assert_eq!(Tier::from_claim("bogus"), Tier::Free);
        assert_eq!(Tier::from_claim(""), Tier::Free);
        assert_eq!(Tier::from_claim("PREMIUM"), Tier::Premium);
    }

    #[tokio::test]
    async fn admin_tier_always_passes_but_still_counts() {
        let clock = FixedClock::at(0);
        let rl = limiter(clock);
        for _ in 0..50 {
            let d = rl.check("admin1", EndpointClass::Expensive, Tier::Admin).await;
            assert!(d.allowed);
        }
        let status = rl.status("admin1", EndpointClass::Expensive, Tier::Admin).await;
        assert_eq!(status.per_minute.used, 50);
    }

    #[tokio::test]
    async fn boundary_limit_one_two_concurrent_requests_exactly_one_admitted() {
        let clock = FixedClock::at(0);
        let quotas = QuotaConfig::defaults().with_override(
            Tier::Free,
            EndpointClass::General,
            WindowLimits { hourly_limit: 1, per_minute_limit: 1 },
        );
        let rl = Arc::new(RateLimiter::new(
            Arc::new(InMemoryKv::new()),
            Arc::new(clock),
            quotas,
            Arc::new(Monitoring::new()),
        ));

        let (a, b) = tokio::join!(
            rl.check("u10", EndpointClass::General, Tier::Free),
            rl.check("u10", EndpointClass::General, Tier::Free)
        );

        let admitted_count = [a, b].iter().filter(|d| d.allowed).count();
        assert_eq!(admitted_count, 1, "exactly one of two concurrent requests at limit=1 must be admitted");
    }

    #[tokio::test]
    async fn reset_clears_current_window() {
        let clock = FixedClock::at(0);
        let rl = limiter(clock);
        rl.check("u9", EndpointClass::General, Tier::Free).await;
        rl.reset("u9", EndpointClass::General).await;
        let status = rl.status("u9", EndpointClass::General, Tier::Free).await;
        assert_eq!(status.hourly.used, 0);
    }
}

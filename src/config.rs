//! Process configuration, loaded once at startup into an immutable
//! `Arc<GatewayConfig>` and shared read-only across every request task.
//!
//! Mirrors §6 "Configuration inputs": the KV store endpoint and credentials,
//! the token-verification secret, the admission-enabled feature flag, and
//! per-tier quota overrides.

use std::collections::HashMap;
use std::env;

use serde::{Deserialize, Serialize};

use crate::ratelimit::{EndpointClass, Tier, WindowLimits};

/// Top-level process configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Redis connection string for the KV adapter.
    pub kv_url: String,
    /// Secret used to verify inbound tokens (HMAC).
    pub token_secret: String,
    /// Feature flag: whether admission control runs at all. Defaults true;
    /// disabling it is an operational escape hatch, not a code path the
    /// spec otherwise exercises.
    pub admission_enabled: bool,
    /// Quota table, defaults overridden by environment.
    pub quotas: QuotaConfig,
    /// Default retrieval-context TTL in seconds (§4.3).
    pub retrieval_ttl_secs: u64,
    /// Default model-response TTL in seconds (§4.3).
    pub model_response_ttl_secs: u64,
    /// Default user-context TTL in seconds (§4.3).
    pub user_context_ttl_secs: u64,
}

impl GatewayConfig {
    /// Load configuration from the process environment, optionally reading
    /// a local `.env` file first (ambient convenience for local development;
    /// absent in production it is simply a no-op).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let kv_url = env::var("TIERGATE_KV_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let token_secret = env::var("TIERGATE_TOKEN_SECRET")
            .unwrap_or_else(|_| "dev-secret-change-me".to_string());
        let admission_enabled = env::var("TIERGATE_ADMISSION_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Self {
            kv_url,
            token_secret,
            admission_enabled,
            quotas: QuotaConfig::from_env_overrides(),
            retrieval_ttl_secs: 3600,
            model_response_ttl_secs: 86_400,
            user_context_ttl_secs: 3600,
        }
    }
}

/// Immutable `(tier, endpoint class) -> WindowLimits` table.
///
/// Loaded at startup; never mutated afterward (§3 "Quota configuration:
/// loaded at startup; immutable per process lifetime").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    limits: HashMap<(Tier, EndpointClass), WindowLimits>,
}

impl QuotaConfig {
    /// The §6 tier defaults.
    pub fn defaults() -> Self {
        let mut limits = HashMap::new();
        limits.insert(
            (Tier::Free, EndpointClass::General),
            WindowLimits { hourly_limit: 60, per_minute_limit: 60 },
        );
        limits.insert(
            (Tier::Free, EndpointClass::Expensive),
            WindowLimits { hourly_limit: 600, per_minute_limit: 10 },
        );
        limits.insert(
            (Tier::Premium, EndpointClass::General),
            WindowLimits { hourly_limit: 300, per_minute_limit: 300 },
        );
        limits.insert(
            (Tier::Premium, EndpointClass::Expensive),
            WindowLimits { hourly_limit: 3000, per_minute_limit: 50 },
        );
        // Admin limits are effectively unbounded; counters are still
        // written so utilization metrics remain comparable (§3, §4.2).
        limits.insert(
            (Tier::Admin, EndpointClass::General),
            WindowLimits { hourly_limit: 10_000, per_minute_limit: 10_000 },
        );
        limits.insert(
            (Tier::Admin, EndpointClass::Expensive),
            WindowLimits { hourly_limit: 10_000, per_minute_limit: 10_000 },
        );
        Self { limits }
    }

    /// Apply environment overrides of the form
    /// `TIERGATE_LIMIT_<TIER>_<CLASS>_HOURLY` / `..._PER_MINUTE` on top of
    /// [`Self::defaults`].
    pub fn from_env_overrides() -> Self {
        let mut config = Self::defaults();
        for tier in [Tier::Free, Tier::Premium, Tier::Admin] {
            for class in [EndpointClass::General, EndpointClass::Expensive] {
                let prefix = format!(
                    "TIERGATE_LIMIT_{}_{}",
                    tier.as_str().to_uppercase(),
                    class.as_str().to_uppercase()
                );
                if let Some(existing) = config.limits.get(&(tier, class)).cloned() {
                    let hourly = env::var(format!("{prefix}_HOURLY"))
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(existing.hourly_limit);
                    let per_minute = env::var(format!("{prefix}_PER_MINUTE"))
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(existing.per_minute_limit);
                    config.limits.insert(
                        (tier, class),
                        WindowLimits { hourly_limit: hourly, per_minute_limit: per_minute },
                    );
                }
            }
        }
        config
    }

    /// Look up the limits for a (tier, class) pair. `Exempt` never reaches
    /// this table — C6 short-circuits before calling C2 for exempt
    /// endpoints.
    pub fn limits_for(&self, tier: Tier, class: EndpointClass) -> WindowLimits {
        self.limits
            .get(&(tier, class))
            .copied()
            .unwrap_or(WindowLimits { hourly_limit: 60, per_minute_limit: 10 })
    }

    /// Override a single (tier, class) entry's limits. Used by tests that
    /// need a specific boundary (e.g. a limit of exactly 1) without
    /// threading environment variables through the process (§8 boundary
    /// "limit = 1, two concurrent requests").
    #[cfg(test)]
    pub(crate) fn with_override(mut self, tier: Tier, class: EndpointClass, limits: WindowLimits) -> Self {
        self.limits.insert((tier, class), limits);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_tiers() {
        let q = QuotaConfig::defaults();
        let free_expensive = q.limits_for(Tier::Free, EndpointClass::Expensive);
        assert_eq!(free_expensive.per_minute_limit, 10);
        let premium_general = q.limits_for(Tier::Premium, EndpointClass::General);
        assert_eq!(premium_general.hourly_limit, 300);
        let admin_general = q.limits_for(Tier::Admin, EndpointClass::General);
        assert!(admin_general.hourly_limit >= 10_000);
    }
}

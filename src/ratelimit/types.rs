use std::fmt;

use serde::{Deserialize, Serialize};

/// Quota class (§3). Unknown tier strings coerce to [`Tier::Free`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
    Admin,
}

impl Tier {
    /// Coerce an arbitrary claim value, treating anything unrecognized
    /// (including the empty string) as `free` (§3, §4.2, §8 boundary
    /// behavior).
    pub fn from_claim(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "premium" => Tier::Premium,
            "admin" => Tier::Admin,
            _ => Tier::Free,
        }
    }

    /// Lowercase string form, used in KV keys and response headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Admin => "admin",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cost class used for quota lookup (§3). `Exempt` endpoints never reach C2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointClass {
    General,
    Expensive,
    Exempt,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::General => "general",
            EndpointClass::Expensive => "expensive",
            EndpointClass::Exempt => "exempt",
        }
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-(tier, class) limits for the two overlapping windows (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimits {
    /// Requests allowed per rolling hour bucket.
    pub hourly_limit: u64,
    /// Requests allowed per rolling minute bucket.
    pub per_minute_limit: u64,
}

/// Outcome of a [`super::RateLimiter::check`] call (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests remaining in the tighter of the two windows.
    /// `-1` signals fail-open (KV unavailable) rather than a real count.
    pub remaining: i64,
    /// Seconds the caller should wait before retrying, `0` when allowed.
    pub retry_after_seconds: u64,
}

impl Decision {
    /// The §4.2/§7 fail-open decision: always allow, `remaining = -1`.
    pub fn fail_open() -> Self {
        Self { allowed: true, remaining: -1, retry_after_seconds: 0 }
    }
}

/// Read-only snapshot for [`super::RateLimiter::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStatus {
    pub used: u64,
    pub remaining: i64,
    pub reset_in_seconds: u64,
}

/// Combined status for both windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub hourly: WindowStatus,
    pub per_minute: WindowStatus,
}

//! Monitoring Surface (C8, §4.8).
//!
//! In-process counters, aggregated with `dashmap::DashMap` + `AtomicU64`
//! rather than the teacher's full `enterprise::analytics::metrics` registry
//! — that registry's `Counter`/`Gauge` vocabulary is the right shape, but
//! its process/render/GPU surface has no counterpart here (see DESIGN.md).
//! Latency percentiles use a bounded reservoir sample rather than a true
//! histogram, cheap enough to update on every request without a lock held
//! across the request path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cache::CacheFamilyKind;
use crate::ratelimit::{EndpointClass, Tier};

const RESERVOIR_CAP: usize = 512;
const DENIAL_RATE_ALERT_THRESHOLD: f64 = 0.20;
const KV_FAILURE_ALERT_THRESHOLD: u64 = 10;
const RETRIEVAL_P95_ALERT_SECS: f64 = 2.0;

#[derive(Default)]
struct AdmissionCounters {
    admitted: AtomicU64,
    denied: AtomicU64,
    fail_open: AtomicU64,
}

#[derive(Default)]
struct CacheCounters {
    hit: AtomicU64,
    miss: AtomicU64,
    set: AtomicU64,
    delete: AtomicU64,
}

struct PartitionCounters {
    queries: AtomicU64,
    errors: AtomicU64,
    latencies_secs: Mutex<VecDeque<f64>>,
}

impl Default for PartitionCounters {
    fn default() -> Self {
        Self {
            queries: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latencies_secs: Mutex::new(VecDeque::with_capacity(RESERVOIR_CAP)),
        }
    }
}

impl PartitionCounters {
    fn record(&self, latency: Duration) {
        let mut samples = self.latencies_secs.lock();
        if samples.len() == RESERVOIR_CAP {
            samples.pop_front();
        }
        samples.push_back(latency.as_secs_f64());
    }

    fn percentile(&self, p: f64) -> f64 {
        let samples = self.latencies_secs.lock();
        if samples.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

/// Counter snapshot returned by `GET /summary` (§4.8). `kv_healthy` and
/// `kv_consecutive_failures` are sourced from the live `KvStore` handle by
/// the caller, not tracked independently here — see [`Monitoring::summary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub admission: Vec<AdmissionSnapshot>,
    pub cache: Vec<CacheSnapshot>,
    pub partitions: Vec<PartitionSnapshot>,
    pub kv_healthy: bool,
    pub kv_consecutive_failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionSnapshot {
    pub tier: String,
    pub class: String,
    pub admitted: u64,
    pub denied: u64,
    pub fail_open: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub family: String,
    pub hit: u64,
    pub miss: u64,
    pub set: u64,
    pub delete: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionSnapshot {
    pub partition: String,
    pub queries: u64,
    pub errors: u64,
    pub p50_secs: f64,
    pub p95_secs: f64,
}

/// A single firing alert, as returned by `GET /alerts` (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub name: String,
    pub detail: String,
}

/// Aggregates the counters named in §4.8 and evaluates the alert
/// predicates over them. Cheap to update: every `record_*` call is a
/// lock-free map lookup plus an atomic increment, except latency recording
/// which takes a short-held per-partition mutex.
pub struct Monitoring {
    admission: DashMap<(Tier, EndpointClass), AdmissionCounters>,
    cache: DashMap<CacheFamilyKind, CacheCounters>,
    partitions: DashMap<String, PartitionCounters>,
}

impl Default for Monitoring {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitoring {
    pub fn new() -> Self {
        Self {
            admission: DashMap::new(),
            cache: DashMap::new(),
            partitions: DashMap::new(),
        }
    }

    pub fn record_admitted(&self, tier: Tier, class: EndpointClass) {
        self.admission
            .entry((tier, class))
            .or_default()
            .admitted
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denied(&self, tier: Tier, class: EndpointClass) {
        self.admission
            .entry((tier, class))
            .or_default()
            .denied
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fail_open(&self, tier: Tier, class: EndpointClass) {
        self.admission
            .entry((tier, class))
            .or_default()
            .fail_open
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self, family: CacheFamilyKind) {
        self.cache.entry(family).or_default().hit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self, family: CacheFamilyKind) {
        self.cache.entry(family).or_default().miss.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_set(&self, family: CacheFamilyKind) {
        self.cache.entry(family).or_default().set.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_delete(&self, family: CacheFamilyKind) {
        self.cache.entry(family).or_default().delete.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of a single partition query for the retrieval
    /// orchestrator's reservoir-sampled p50/p95 (§4.8).
    pub fn record_partition_query(&self, partition: &str, success: bool, latency: Duration) {
        let entry = self.partitions.entry(partition.to_string()).or_default();
        entry.queries.fetch_add(1, Ordering::Relaxed);
        if !success {
            entry.errors.fetch_add(1, Ordering::Relaxed);
        }
        entry.record(latency);
    }

    /// Build the `GET /summary` snapshot. `kv_healthy`/`kv_consecutive_failures`
    /// come from the caller's live `KvStore` handle (`Gateway::kv`) — this
    /// type has no KV reference of its own, so it cannot track that state
    /// independently without risking it drifting out of sync with the real
    /// adapter.
    pub fn summary(&self, kv_healthy: bool, kv_consecutive_failures: u64) -> Summary {
        let admission = self
            .admission
            .iter()
            .map(|entry| {
                let (tier, class) = *entry.key();
                AdmissionSnapshot {
                    tier: tier.as_str().to_string(),
                    class: class.as_str().to_string(),
                    admitted: entry.admitted.load(Ordering::Relaxed),
                    denied: entry.denied.load(Ordering::Relaxed),
                    fail_open: entry.fail_open.load(Ordering::Relaxed),
                }
            })
            .collect();

        let cache = self
            .cache
            .iter()
            .map(|entry| CacheSnapshot {
                family: entry.key().as_str().to_string(),
                hit: entry.hit.load(Ordering::Relaxed),
                miss: entry.miss.load(Ordering::Relaxed),
                set: entry.set.load(Ordering::Relaxed),
                delete: entry.delete.load(Ordering::Relaxed),
            })
            .collect();

        let partitions = self
            .partitions
            .iter()
            .map(|entry| PartitionSnapshot {
                partition: entry.key().clone(),
                queries: entry.queries.load(Ordering::Relaxed),
                errors: entry.errors.load(Ordering::Relaxed),
                p50_secs: entry.percentile(0.50),
                p95_secs: entry.percentile(0.95),
            })
            .collect();

        Summary { admission, cache, partitions, kv_healthy, kv_consecutive_failures }
    }

    /// Evaluate the §4.8 alert predicates over the current snapshot.
    /// `kv_consecutive_failures` comes from the caller's live `KvStore`
    /// handle, for the same reason `summary` takes it as a parameter.
    pub fn alerts(&self, kv_consecutive_failures: u64) -> Vec<Alert> {
        let mut firing = Vec::new();

        let (mut admitted, mut denied) = (0u64, 0u64);
        for entry in self.admission.iter() {
            admitted += entry.admitted.load(Ordering::Relaxed);
            denied += entry.denied.load(Ordering::Relaxed);
        }
        let total = admitted + denied;
        if total > 0 {
            let denial_rate = denied as f64 / total as f64;
            if denial_rate > DENIAL_RATE_ALERT_THRESHOLD {
                firing.push(Alert {
                    name: "high_denial_rate".to_string(),
                    detail: format!("denial rate {:.1}% exceeds 20%", denial_rate * 100.0),
                });
            }
        }

        if kv_consecutive_failures > KV_FAILURE_ALERT_THRESHOLD {
            firing.push(Alert {
                name: "kv_consecutive_failures".to_string(),
                detail: format!(
                    "{kv_consecutive_failures} consecutive KV failures exceeds 10"
                ),
            });
        }

        for entry in self.partitions.iter() {
            let p95 = entry.percentile(0.95);
            if p95 > RETRIEVAL_P95_ALERT_SECS {
                firing.push(Alert {
                    name: "retrieval_p95_high".to_string(),
                    detail: format!("partition {} p95 {:.2}s exceeds 2s", entry.key(), p95),
                });
            }
        }

        firing
    }

    /// `GET /health`: false only when the process itself is unhealthy; a
    /// degraded-but-fail-open KV still reports healthy (§4.8).
    pub fn is_ready(&self) -> bool {
        true
    }
}

/// Shared handle, constructed once at startup (§5 "Shared resources").
pub type SharedMonitoring = Arc<Monitoring>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_counters_aggregate_by_tier_and_class() {
        let m = Monitoring::new();
        m.record_admitted(Tier::Free, EndpointClass::General);
        m.record_admitted(Tier::Free, EndpointClass::General);
        m.record_denied(Tier::Free, EndpointClass::General);
        let summary = m.summary(true, 0);
        let entry = summary
            .admission
            .iter()
            .find(|e| e.tier == "free" && e.class == "general")
            .unwrap();
        assert_eq!(entry.admitted, 2);
        assert_eq!(entry.denied, 1);
    }

    #[test]
    fn high_denial_rate_fires_alert() {
        let m = Monitoring::new();
        for _ in 0..2 {
            m.record_admitted(Tier::Free, EndpointClass::General);
        }
        for _ in 0..8 {
            m.record_denied(Tier::Free, EndpointClass::General);
        }
        let alerts = m.alerts(0);
        assert!(alerts.iter().any(|a| a.name == "high_denial_rate"));
    }

    #[test]
    fn kv_failure_streak_fires_alert_and_clears_on_success() {
        let m = Monitoring::new();
        assert!(m.alerts(11).iter().any(|a| a.name == "kv_consecutive_failures"));
        assert!(!m.alerts(0).iter().any(|a| a.name == "kv_consecutive_failures"));
    }

    #[test]
    fn partition_p95_alert_fires_on_slow_queries() {
        let m = Monitoring::new();
        for _ in 0..20 {
            m.record_partition_query("squat-technique", true, Duration::from_millis(100));
        }
        m.record_partition_query("squat-technique", true, Duration::from_secs(3));
        let alerts = m.alerts(0);
        assert!(alerts.iter().any(|a| a.name == "retrieval_p95_high"));
    }

    #[test]
    fn reservoir_caps_samples_without_panicking() {
        let m = Monitoring::new();
        for i in 0..(RESERVOIR_CAP * 2) {
            m.record_partition_query("p", true, Duration::from_millis(i as u64 % 50));
        }
        let summary = m.summary(true, 0);
        let snapshot = summary.partitions.iter().find(|p| p.partition == "p").unwrap();
        assert_eq!(snapshot.queries, (RESERVOIR_CAP * 2) as u64);
    }
}

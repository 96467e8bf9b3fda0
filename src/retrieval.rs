//! Retrieval Orchestrator (C5, §4.5).
//!
//! Fingerprints a request, selects partitions via C4, fans them out to the
//! search collaborator under a shared deadline, merges and formats the
//! result, and caches the formatted blob by fingerprint.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::CacheManager;
use crate::collaborators::{Chunk, SearchIndex};
use crate::monitoring::Monitoring;
use crate::namespace::{self, RequestShape, UserShape};

/// Fan-out deadline for the whole retrieval call (§5: "retrieval fan-out has
/// its own 2 s sub-deadline").
pub const FAN_OUT_DEADLINE: Duration = Duration::from_secs(2);

/// Per-partition query timeout, nested inside [`FAN_OUT_DEADLINE`] (§5).
pub const PARTITION_TIMEOUT: Duration = Duration::from_millis(1500);

const DELIMITER: &str = "\n---\n";

/// The merged, formatted retrieval result returned to a handler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextBlob {
    /// Header + chunks, delimiter-joined — the value a handler forwards
    /// into a prompt.
    pub text: String,
    /// Partitions actually consulted (post-selection, not post-failure).
    pub partitions_consulted: Vec<String>,
    /// Number of chunks included after merge/top-k.
    pub chunk_count: usize,
    /// Set when the fan-out was computed from a strict subset of the
    /// selected partitions due to partial failure (§4.5 step 4, §7
    /// `SearchPartialFailure`/`SearchTotalFailure`).
    pub degraded: bool,
}

/// The unformatted merge result, for callers that synthesize their own
/// prompts (§4.5 "Structured variant").
#[derive(Debug, Clone, PartialEq)]
pub struct MergedChunks {
    pub chunks: Vec<Chunk>,
    pub partitions_consulted: Vec<String>,
    pub degraded: bool,
}

/// Salient, allow-listed user-shape fields folded into the fingerprint
/// (§4.5 step 1). Intentionally not the full profile, to maximize cache hit
/// rate across requests that differ only in unrelated profile fields.
fn salient_user_fields(user: &UserShape) -> BTreeMap<&'static str, String> {
    let mut fields = BTreeMap::new();
    fields.insert("experience", format!("{:?}", user.experience).to_lowercase());
    fields.insert("injury_flags", user.has_active_injury.to_string());
    fields.insert(
        "active_program_type",
        user.active_program_type.clone().unwrap_or_default().to_lowercase(),
    );
    fields.insert("primary_goal", user.primary_goal.clone().unwrap_or_default().to_lowercase());
    fields
}

/// Build the deterministic cache-key fingerprint for `(endpoint, request,
/// user)` (§4.5 step 1). Key-sorted by construction (a `BTreeMap`), with
/// the normalized string fields lowercased before hashing.
pub fn fingerprint(endpoint: &str, request: &RequestShape, user: &UserShape) -> String {
    let mut canonical = BTreeMap::new();
    canonical.insert("endpoint", endpoint.to_lowercase());
    canonical.insert("query", request.query.to_lowercase());
    canonical.insert("is_programming_question", request.is_programming_question.to_string());
    canonical.insert(
        "mentions_heat_or_elevation_signal",
        request.mentions_heat_or_elevation_signal.to_string(),
    );
    canonical.insert("is_nutrition_adjacent", request.is_nutrition_adjacent.to_string());
    for (k, v) in salient_user_fields(user) {
        canonical.insert(k, v);
    }

    let mut hasher = blake3::Hasher::new();
    for (key, value) in &canonical {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

/// Given per-partition timeout, deadline is implicit in the sum of
/// `join_all` over already-timed-out futures plus an outer timeout; see
/// [`RetrievalOrchestrator::fan_out`].
pub struct RetrievalOrchestrator {
    search: Arc<dyn SearchIndex>,
    cache: Arc<CacheManager>,
    monitoring: Arc<Monitoring>,
}

impl RetrievalOrchestrator {
    /// Build the orchestrator over the search collaborator and the shared
    /// cache manager (only its `retrieval_context` family is touched here).
    pub fn new(
        search: Arc<dyn SearchIndex>,
        cache: Arc<CacheManager>,
        monitoring: Arc<Monitoring>,
    ) -> Self {
        Self { search, cache, monitoring }
    }

    async fn fan_out(
        &self,
        partitions: &[String],
        query: &str,
        per_partition_k: usize,
    ) -> (Vec<(String, Vec<Chunk>)>, usize) {
        let queries = partitions.iter().map(|partition| {
            let partition = partition.clone();
            let query = query.to_string();
            let search = self.search.clone();
            async move {
                let started = std::time::Instant::now();
                let result = tokio::time::timeout(
                    PARTITION_TIMEOUT,
                    search.query(&partition, &query, per_partition_k, PARTITION_TIMEOUT),
                )
                .await;
                (partition, result, started.elapsed())
            }
        });

        let gathered = match tokio::time::timeout(FAN_OUT_DEADLINE, futures::future::join_all(queries)).await {
            Ok(results) => results,
            Err(_) => {
                warn!("retrieval fan-out deadline elapsed before all partitions responded");
                Vec::new()
            }
        };

        let mut successes = Vec::new();
        let mut failures = 0usize;
        for (partition, outcome, elapsed) in gathered {
            match outcome {
                Ok(Ok(chunks)) => {
                    self.monitoring.record_partition_query(&partition, true, elapsed);
                    successes.push((partition, chunks));
                }
                Ok(Err(e)) => {
                    self.monitoring.record_partition_query(&partition, false, elapsed);
                    warn!(partition, error = %e, "partition query failed");
                    failures += 1;
                }
                Err(_) => {
                    self.monitoring.record_partition_query(&partition, false, elapsed);
                    warn!(partition, "partition query timed out");
                    failures += 1;
                }
            }
        }
        (successes, failures)
    }

    /// Merge per-partition results into the top `max_chunks`, deduplicated
    /// by chunk id (§4.5 step 5). Partition scores are not comparable
    /// across partitions, so the merge interleaves round-robin by rank
    /// position rather than sorting globally by score.
    fn merge(per_partition: Vec<(String, Vec<Chunk>)>, max_chunks: usize) -> Vec<Chunk> {
        let mut ranked: Vec<Vec<Chunk>> = per_partition
            .into_iter()
            .map(|(_, mut chunks)| {
                chunks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
                chunks
            })
            .collect();

        let mut seen = std::collections::HashSet::new();
        let mut merged = Vec::new();
        let mut round = 0;
        while merged.len() < max_chunks && ranked.iter().any(|p| round < p.len()) {
            for partition in ranked.iter_mut() {
                if merged.len() >= max_chunks {
                    break;
                }
                if let Some(chunk) = partition.get(round) {
                    if seen.insert(chunk.id.clone()) {
                        merged.push(chunk.clone());
                    }
                }
            }
            round += 1;
        }
        merged
    }

    fn format(partitions_consulted: &[String], chunks: &[Chunk]) -> String {
        let header = format!(
            "partitions: {} | chunks: {}",
            partitions_consulted.join(","),
            chunks.len()
        );
        let mut parts = vec![header];
        parts.extend(chunks.iter().map(|c| c.text.clone()));
        parts.join(DELIMITER)
    }

    /// Structured variant returning the merged chunk list without
    /// formatting (§4.5 "Structured variant").
    pub async fn get_chunks(
        &self,
        endpoint: &str,
        request: &RequestShape,
        user: &UserShape,
        max_chunks: usize,
    ) -> MergedChunks {
        let partitions = namespace::select(endpoint, request, user);
        if max_chunks == 0 || partitions.is_empty() {
            return MergedChunks { chunks: Vec::new(), partitions_consulted: partitions, degraded: false };
        }

        let (per_partition, failures) = self.fan_out(&partitions, &request.query, max_chunks).await;
        let degraded = failures > 0 && !per_partition.is_empty();
        let chunks = Self::merge(per_partition, max_chunks);
        MergedChunks { chunks, partitions_consulted: partitions, degraded }
    }

    /// Full retrieval: fingerprint, cache lookup, partition selection,
    /// fan-out, merge, format, cache write (§4.5 steps 1–7).
    pub async fn get_context(
        &self,
        endpoint: &str,
        request: &RequestShape,
        user: &UserShape,
        max_chunks: usize,
        use_cache: bool,
        ttl: Option<Duration>,
    ) -> ContextBlob {
        let fp = fingerprint(endpoint, request, user);

        if use_cache {
            if let Some(cached) = self.cache.retrieval_context.get(endpoint, &fp).await {
                match serde_json::from_slice::<ContextBlob>(&cached) {
                    Ok(blob) => return blob,
                    Err(_) => {
                        // §7 CacheCorruption: treat as miss, evict, rebuild.
                        warn!(endpoint, fingerprint = %fp, "retrieval cache entry corrupted");
                    }
                }
            }
        }

        let partitions = namespace::select(endpoint, request, user);
        if max_chunks == 0 || partitions.is_empty() {
            return ContextBlob {
                text: Self::format(&partitions, &[]),
                partitions_consulted: partitions,
                chunk_count: 0,
                degraded: false,
            };
        }

        let (per_partition, failures) = self.fan_out(&partitions, &request.query, max_chunks).await;

        if per_partition.is_empty() {
            // §7 SearchTotalFailure: empty context, not cached, warn already
            // logged per-partition in fan_out.
            return ContextBlob {
                text: Self::format(&partitions, &[]),
                partitions_consulted: Vec::new(),
                chunk_count: 0,
                degraded: true,
            };
        }

        let degraded = failures > 0;
        let consulted: Vec<String> = per_partition.iter().map(|(p, _)| p.clone()).collect();
        let chunks = Self::merge(per_partition, max_chunks);
        let blob = ContextBlob {
            text: Self::format(&consulted, &chunks),
            partitions_consulted: consulted,
            chunk_count: chunks.len(),
            degraded,
        };

        if use_cache && !degraded {
            if let Ok(bytes) = serde_json::to_vec(&blob) {
                self.cache.retrieval_context.set(endpoint, &fp, &bytes, ttl).await;
            }
        }

        blob
    }
}

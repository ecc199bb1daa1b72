use std::sync::OnceLock;
use std::time::Instant;

use serde::Serialize;

/// Counters collected while one query is applied.
///
/// The engine resets the snapshot at the start of every top-level apply and
/// fills it as matching proceeds. Setting `CCTQL_PROFILE` additionally logs
/// each snapshot at `info` level instead of `debug`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Nodes visited by the start-node traversal.
    pub nodes_visited: u64,
    /// Predicate evaluations (one per node and pattern position tested).
    pub predicate_evaluations: u64,
    /// Membership checks answered from the per-node cache.
    pub cache_hits: u64,
    /// Membership checks that had to evaluate predicates.
    pub cache_misses: u64,
    /// Start positions tried against the full pattern.
    pub match_attempts: u64,
    /// Complete paths accepted.
    pub paths_accepted: u64,
    /// Distinct nodes in the result.
    pub matched_nodes: u64,
    /// Subqueries applied, including the top-level query.
    pub queries_applied: u64,
    /// Wall-clock time of the apply call.
    pub elapsed_ns: u64,
}

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();

/// Whether `CCTQL_PROFILE` is set.
pub fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os("CCTQL_PROFILE").is_some())
}

pub(crate) fn elapsed_ns(start: Instant) -> u64 {
    start.elapsed().as_nanos().min(u64::MAX as u128) as u64
}

pub(crate) fn record(stats: &EngineStats) {
    if profiling_enabled() {
        tracing::info!(
            nodes_visited = stats.nodes_visited,
            predicate_evaluations = stats.predicate_evaluations,
            cache_hits = stats.cache_hits,
            cache_misses = stats.cache_misses,
            paths_accepted = stats.paths_accepted,
            matched_nodes = stats.matched_nodes,
            elapsed_ns = stats.elapsed_ns,
            "query profile"
        );
    } else {
        tracing::debug!(
            nodes_visited = stats.nodes_visited,
            predicate_evaluations = stats.predicate_evaluations,
            matched_nodes = stats.matched_nodes,
            elapsed_ns = stats.elapsed_ns,
            "query applied"
        );
    }
}

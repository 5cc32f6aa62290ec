//! Fixed-iteration rank propagation over a similarity graph.
//!
//! PageRank-style power iteration where mass flows along similarity-weighted
//! edges. Every round updates all nodes from the previous round's values
//! (Jacobi style), and the final values are min-max scaled into `[0, 1]`.
//!
//! A node with no outgoing edges uses a divisor of `1.0` and simply leaks its
//! mass; it is not redistributed across the graph.

use std::collections::HashMap;

use tracing::debug;

use crate::memory::core::config::GraphConfig;
use crate::memory::core::vector_math::normalize_minmax;
use crate::memory::graph::similarity_graph::SimilarityGraph;

/// Normalized importance per chunk id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RankVector {
    ids: Vec<String>,
    values: Vec<f64>,
}

impl RankVector {
    /// Importance of `chunk_id`, if it was a node.
    #[must_use]
    pub fn get(&self, chunk_id: &str) -> Option<f64> {
        self.ids
            .iter()
            .position(|id| id == chunk_id)
            .and_then(|i| self.values.get(i).copied())
    }

    /// Iterate `(chunk_id, importance)` in node order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.ids
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Number of ranked nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no node was ranked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Owned lookup table keyed by chunk id.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, f64> {
        self.iter().map(|(id, v)| (id.to_string(), v)).collect()
    }
}

/// Run `config.iterations` rounds of propagation and normalize the result.
///
/// Deterministic for a given graph and configuration.
#[must_use]
#[allow(clippy::cast_precision_loss)] // node counts are far below 2^52
pub fn propagate(graph: &SimilarityGraph, config: &GraphConfig) -> RankVector {
    let n = graph.node_count();
    if n == 0 {
        return RankVector::default();
    }

    let size = n as f64;
    let damping = config.damping;
    let base = (1.0 - damping) / size;
    let out_weight: Vec<f64> = (0..n).map(|u| graph.out_weight(u)).collect();
    let incoming = graph.incoming();

    let mut rank = vec![1.0 / size; n];
    let mut next = vec![0.0_f64; n];
    for _ in 0..config.iterations {
        for (v, slot) in next.iter_mut().enumerate() {
            let mut sum = 0.0_f64;
            for &(u, w) in &incoming[v] {
                let denom = if out_weight[u] == 0.0 { 1.0 } else { out_weight[u] };
                sum += rank[u] * (w / denom);
            }
            *slot = damping.mul_add(sum, base);
        }
        std::mem::swap(&mut rank, &mut next);
    }

    debug!(
        nodes = n,
        iterations = config.iterations,
        damping,
        "Rank propagation finished"
    );

    RankVector {
        ids: graph.ids().to_vec(),
        values: normalize_minmax(&rank),
    }
}

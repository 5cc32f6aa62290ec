//! Hybrid scoring: query similarity blended with stored importance.

use crate::memory::core::chunk::{Candidate, ScoredCandidate};
use crate::memory::core::vector_math::normalize_minmax;

/// Blend similarity and pool-normalized importance, then keep the top `k`.
///
/// `score = alpha * similarity + (1 - alpha) * importance_normalized`, where
/// importance is min-max scaled across `candidates`. Ties keep pool order.
#[must_use]
pub fn rank_candidates(candidates: Vec<Candidate>, alpha: f64, k: usize) -> Vec<ScoredCandidate> {
    let importance: Vec<f64> = candidates.iter().map(|c| c.importance).collect();
    let normalized = normalize_minmax(&importance);

    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .zip(normalized)
        .map(|(candidate, importance_norm)| ScoredCandidate {
            score: alpha.mul_add(candidate.similarity, (1.0 - alpha) * importance_norm),
            chunk_id: candidate.chunk_id,
            text: candidate.text,
            importance: candidate.importance,
            similarity: candidate.similarity,
        })
        .collect();

    // `sort_by` is stable, so equal scores keep first-seen order.
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, importance: f64, similarity: f64) -> Candidate {
        Candidate {
            chunk_id: id.to_string(),
            text: format!("text of {id}"),
            importance,
            similarity,
        }
    }

    fn ids(scored: &[ScoredCandidate]) -> Vec<&str> {
        scored.iter().map(|s| s.chunk_id.as_str()).collect()
    }

    fn pool() -> Vec<Candidate> {
        vec![
            candidate("a", 0.9, 0.1),
            candidate("b", 0.1, 0.9),
            candidate("c", 0.5, 0.5),
        ]
    }

    #[test]
    fn test_alpha_one_is_similarity_order() {
        let ranked = rank_candidates(pool(), 1.0, 3);
        assert_eq!(ids(&ranked), vec!["b", "c", "a"]);
        assert!((ranked[0].score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_alpha_zero_is_importance_order() {
        let ranked = rank_candidates(pool(), 0.0, 3);
        assert_eq!(ids(&ranked), vec!["a", "c", "b"]);
        assert!((ranked[0].score - 1.0).abs() < 1e-12);
        assert!(ranked[2].score.abs() < 1e-12);
    }

    #[test]
    fn test_raising_alpha_moves_toward_similarity_order() {
        let pool = vec![candidate("imp", 1.0, 0.2), candidate("sim", 0.0, 0.6)];
        assert_eq!(ids(&rank_candidates(pool.clone(), 0.3, 2)), vec!["imp", "sim"]);
        assert_eq!(ids(&rank_candidates(pool.clone(), 0.9, 2)), vec!["sim", "imp"]);

        let mut previous_sim_score = f64::MIN;
        for step in 0..=10 {
            let alpha = f64::from(step) / 10.0;
            let ranked = rank_candidates(pool.clone(), alpha, 2);
            let sim = ranked.iter().find(|s| s.chunk_id == "sim").unwrap();
            let imp = ranked.iter().find(|s| s.chunk_id == "imp").unwrap();
            let margin = sim.score - imp.score;
            assert!(margin >= previous_sim_score - 1e-12);
            previous_sim_score = margin;
        }
    }

    #[test]
    fn test_ties_keep_pool_order() {
        let pool = vec![
            candidate("first", 0.5, 0.4),
            candidate("second", 0.5, 0.4),
            candidate("third", 0.5, 0.4),
        ];
        let ranked = rank_candidates(pool, 0.5, 3);
        assert_eq!(ids(&ranked), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_empty_pool() {
        assert!(rank_candidates(Vec::new(), 0.5, 3).is_empty());
    }

    #[test]
    fn test_k_larger_than_pool_returns_all() {
        assert_eq!(rank_candidates(pool(), 0.5, 10).len(), 3);
    }

    #[test]
    fn test_k_truncates() {
        let ranked = rank_candidates(pool(), 1.0, 1);
        assert_eq!(ids(&ranked), vec!["b"]);
    }

    #[test]
    fn test_keeps_stored_importance() {
        let ranked = rank_candidates(pool(), 0.5, 3);
        let a = ranked.iter().find(|s| s.chunk_id == "a").unwrap();
        assert!((a.importance - 0.9).abs() < 1e-12);
    }
}

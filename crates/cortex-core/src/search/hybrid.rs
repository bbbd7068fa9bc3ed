//! Hybrid Retrieval Fusion
//!
//! Combines vector and BM25 ranked lists with Reciprocal Rank Fusion:
//! `score(d) = Σ 1/(k + rank_in_list)`. RRF normalizes across scoring
//! scales and rewards documents surfaced by both retrievers.

use std::collections::HashMap;

use crate::documents::Metadata;

/// RRF dampening constant
pub const RRF_K: f64 = 60.0;

/// A search candidate flowing through the pipeline. `score` is the current
/// working score, re-assigned by each ranking phase; the per-phase fields
/// record how it got there.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub text: String,
    pub meta: Metadata,
    /// Current working score
    pub score: f64,
    pub rrf_score: f64,
    pub vector_distance: Option<f64>,
    pub bm25_score: Option<f64>,
    pub rerank_score: Option<f64>,
    pub type_boost: Option<f64>,
    pub recency_boost: Option<f64>,
    pub initiative_boost: Option<f64>,
}

impl Candidate {
    pub fn new(id: String, text: String, meta: Metadata) -> Self {
        Self {
            id,
            text,
            meta,
            score: 0.0,
            rrf_score: 0.0,
            vector_distance: None,
            bm25_score: None,
            rerank_score: None,
            type_boost: None,
            recency_boost: None,
            initiative_boost: None,
        }
    }
}

/// Fuse two ranked candidate lists with RRF, deduplicating by id.
///
/// The first-seen payload wins for duplicated ids; the fused list is
/// sorted by RRF score descending with `score` set to the RRF score.
pub fn reciprocal_rank_fusion(
    vector_results: Vec<Candidate>,
    bm25_results: Vec<Candidate>,
    k: f64,
) -> Vec<Candidate> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut first_seen: HashMap<String, Candidate> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for list in [vector_results, bm25_results] {
        for (rank, candidate) in list.into_iter().enumerate() {
            let contribution = 1.0 / (k + (rank + 1) as f64);
            *scores.entry(candidate.id.clone()).or_default() += contribution;
            if !first_seen.contains_key(&candidate.id) {
                order.push(candidate.id.clone());
                first_seen.insert(candidate.id.clone(), candidate);
            }
        }
    }

    let mut fused: Vec<Candidate> = order
        .into_iter()
        .filter_map(|id| {
            let mut candidate = first_seen.remove(&id)?;
            let rrf = scores.get(&id).copied().unwrap_or(0.0);
            candidate.rrf_score = rrf;
            candidate.score = rrf;
            Some(candidate)
        })
        .collect();

    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str) -> Candidate {
        Candidate::new(id.to_string(), format!("text for {id}"), Metadata::new())
    }

    #[test]
    fn test_doc_in_both_lists_wins() {
        let vector = vec![candidate("a"), candidate("b"), candidate("c")];
        let bm25 = vec![candidate("b"), candidate("d")];

        let fused = reciprocal_rank_fusion(vector, bm25, RRF_K);
        assert_eq!(fused[0].id, "b");
        assert_eq!(fused.len(), 4);
    }

    #[test]
    fn test_rrf_monotonicity() {
        // A doc earlier in BOTH lists never scores lower than one later
        // in both lists.
        let vector = vec![candidate("early"), candidate("late")];
        let bm25 = vec![candidate("early"), candidate("late")];

        let fused = reciprocal_rank_fusion(vector, bm25, RRF_K);
        let early = fused.iter().find(|c| c.id == "early").unwrap();
        let late = fused.iter().find(|c| c.id == "late").unwrap();
        assert!(early.rrf_score >= late.rrf_score);
    }

    #[test]
    fn test_dedup_keeps_first_seen() {
        let mut from_vector = candidate("x");
        from_vector.vector_distance = Some(0.1);
        let mut from_bm25 = candidate("x");
        from_bm25.bm25_score = Some(9.0);

        let fused = reciprocal_rank_fusion(vec![from_vector], vec![from_bm25], RRF_K);
        assert_eq!(fused.len(), 1);
        // Vector list processed first, so its payload wins
        assert_eq!(fused[0].vector_distance, Some(0.1));
    }

    #[test]
    fn test_single_list() {
        let fused = reciprocal_rank_fusion(vec![], vec![candidate("only")], RRF_K);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].rrf_score - 1.0 / (RRF_K + 1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_empty_lists() {
        assert!(reciprocal_rank_fusion(vec![], vec![], RRF_K).is_empty());
    }
}

//! Cross-Encoder Reranking
//!
//! Second retrieval stage: hybrid search supplies high-recall candidates,
//! the cross-encoder (Jina Reranker v1 Turbo via fastembed) scores
//! query/document pairs for high precision. Falls back to term-overlap
//! scoring when the model is unavailable so search keeps working offline.

#[cfg(feature = "embeddings")]
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};

// ============================================================================
// TYPES
// ============================================================================

/// A reranked item with its relevance score
#[derive(Debug, Clone)]
pub struct RerankedResult<T> {
    /// The original item, metadata preserved
    pub item: T,
    /// Cross-encoder relevance score (higher is more relevant)
    pub score: f32,
    /// Rank in the input list before reranking
    pub original_rank: usize,
}

/// Reranker configuration
#[derive(Debug, Clone)]
pub struct RerankerConfig {
    /// Results kept after reranking when the caller passes no limit
    pub result_count: usize,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self { result_count: 10 }
    }
}

// ============================================================================
// RERANKER
// ============================================================================

/// Cross-encoder reranker with an offline fallback.
///
/// Construction never loads the model - call
/// [`Reranker::init_cross_encoder`] during daemon startup (downloads
/// ~150 MB on first run). Without it, term-overlap scoring is used.
pub struct Reranker {
    config: RerankerConfig,
    #[cfg(feature = "embeddings")]
    cross_encoder: Option<TextRerank>,
}

impl Default for Reranker {
    fn default() -> Self {
        Self::new(RerankerConfig::default())
    }
}

impl Reranker {
    pub fn new(config: RerankerConfig) -> Self {
        Self {
            config,
            #[cfg(feature = "embeddings")]
            cross_encoder: None,
        }
    }

    /// Load the cross-encoder model. Not for tests or hot paths.
    #[cfg(feature = "embeddings")]
    pub fn init_cross_encoder(&mut self) {
        if self.cross_encoder.is_some() {
            return;
        }

        let options =
            RerankInitOptions::new(RerankerModel::JINARerankerV1TurboEn).with_show_download_progress(true);

        match TextRerank::try_new(options) {
            Ok(model) => {
                tracing::info!("Cross-encoder reranker loaded (Jina Reranker v1 Turbo)");
                self.cross_encoder = Some(model);
            }
            Err(e) => {
                tracing::warn!("Cross-encoder unavailable, using term-overlap fallback: {e}");
            }
        }
    }

    /// True when the neural model is loaded
    pub fn has_cross_encoder(&self) -> bool {
        #[cfg(feature = "embeddings")]
        {
            self.cross_encoder.is_some()
        }
        #[cfg(not(feature = "embeddings"))]
        {
            false
        }
    }

    /// Score `(item, text)` candidates against the query, descending.
    ///
    /// Empty input returns empty; item payloads pass through untouched.
    pub fn rerank<T: Clone>(
        &mut self,
        query: &str,
        candidates: Vec<(T, String)>,
        top_k: Option<usize>,
    ) -> Vec<RerankedResult<T>> {
        if query.is_empty() || candidates.is_empty() {
            return vec![];
        }

        let limit = top_k.unwrap_or(self.config.result_count);

        #[cfg(feature = "embeddings")]
        if let Some(ref mut model) = self.cross_encoder {
            let documents: Vec<&str> = candidates.iter().map(|(_, text)| text.as_str()).collect();

            if let Ok(scored) = model.rerank(query, &documents, false, None) {
                let mut results: Vec<RerankedResult<T>> = scored
                    .into_iter()
                    .filter_map(|rr| {
                        candidates.get(rr.index).map(|(item, _)| RerankedResult {
                            item: item.clone(),
                            score: rr.score,
                            original_rank: rr.index,
                        })
                    })
                    .collect();

                results.sort_by(|a, b| {
                    b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
                });
                results.truncate(limit);
                return results;
            }
            // Model failed on this call - fall through to the term-overlap path
        }

        let mut results: Vec<RerankedResult<T>> = candidates
            .into_iter()
            .enumerate()
            .map(|(rank, (item, text))| RerankedResult {
                score: Self::term_overlap_score(query, &text),
                item,
                original_rank: rank,
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        results
    }

    /// BM25-shaped term overlap, used when the cross-encoder is absent
    fn term_overlap_score(query: &str, document: &str) -> f32 {
        let query_lower = query.to_lowercase();
        let query_terms: Vec<&str> = query_lower.split_whitespace().collect();
        let doc_lower = document.to_lowercase();
        let doc_len = document.len() as f32;

        if doc_len == 0.0 || query_terms.is_empty() {
            return 0.0;
        }

        let k1 = 1.2_f32;
        let b = 0.75_f32;
        let avg_doc_len = 500.0_f32;

        let mut score = 0.0;
        for term in &query_terms {
            let tf = doc_lower.matches(term).count() as f32;
            if tf > 0.0 {
                let numerator = tf * (k1 + 1.0);
                let denominator = tf + k1 * (1.0 - b + b * (doc_len / avg_doc_len));
                score += numerator / denominator;
            }
        }

        score / query_terms.len() as f32
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rerank_orders_by_relevance() {
        let mut reranker = Reranker::default();
        let candidates = vec![
            ("a", "completely unrelated text".to_string()),
            ("b", "token refresh and token rotation".to_string()),
        ];

        let results = reranker.rerank("token", candidates, Some(2));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].item, "b");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_rerank_empty_input() {
        let mut reranker = Reranker::default();
        let results = reranker.rerank::<i32>("query", vec![], Some(5));
        assert!(results.is_empty());
    }

    #[test]
    fn test_rerank_respects_limit() {
        let mut reranker = Reranker::default();
        let candidates = (0..10)
            .map(|i| (i, format!("document number {i}")))
            .collect();
        let results = reranker.rerank("document", candidates, Some(3));
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_rerank_preserves_items() {
        let mut reranker = Reranker::default();
        let candidates = vec![(("id-1", 42), "some text".to_string())];
        let results = reranker.rerank("text", candidates, None);
        assert_eq!(results[0].item, ("id-1", 42));
    }

    #[test]
    fn test_default_has_no_cross_encoder() {
        let reranker = Reranker::default();
        assert!(!reranker.has_cross_encoder());
    }
}

//! BM25 Keyword Index
//!
//! In-memory Okapi BM25 index rebuilt from the store after writes, with a
//! code-aware tokenizer that splits camelCase and snake_case identifiers
//! so "getUserToken" matches a query for "user token".

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::documents::Metadata;

/// BM25 k1 parameter (term-frequency saturation)
const K1: f64 = 1.5;

/// BM25 b parameter (length normalization)
const B: f64 = 0.75;

static WORD_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[\s.,;:()\[\]{}"'`#@!?<>=+\-*/\\|&^~%$]+"#).expect("static pattern must compile")
});

static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static pattern must compile"));

/// Tokenize text respecting code naming conventions:
/// whitespace/punctuation split, camelCase split, snake_case split,
/// lowercased, empties dropped.
pub fn tokenize_code(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in WORD_SPLIT.split(text) {
        if word.is_empty() {
            continue;
        }
        let camel_split = CAMEL_BOUNDARY.replace_all(word, "${1}_${2}");
        for token in camel_split.to_lowercase().split('_') {
            if !token.is_empty() {
                tokens.push(token.to_string());
            }
        }
    }
    tokens
}

/// A keyword search hit
#[derive(Debug, Clone)]
pub struct Bm25Hit {
    pub id: String,
    pub text: String,
    pub meta: Metadata,
    pub score: f64,
}

struct IndexedDoc {
    id: String,
    text: String,
    meta: Metadata,
    term_freqs: HashMap<String, usize>,
    token_count: usize,
}

/// Okapi BM25 index over store documents
#[derive(Default)]
pub struct Bm25Index {
    docs: Vec<IndexedDoc>,
    idf: HashMap<String, f64>,
    avgdl: f64,
}

impl Bm25Index {
    /// Build the index from `(id, text, metadata)` triples.
    pub fn build(documents: Vec<(String, String, Metadata)>) -> Self {
        let mut docs = Vec::with_capacity(documents.len());
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();
        let mut total_tokens = 0usize;

        for (id, text, meta) in documents {
            let tokens = tokenize_code(&text);
            total_tokens += tokens.len();

            let mut term_freqs: HashMap<String, usize> = HashMap::new();
            for token in tokens.iter() {
                *term_freqs.entry(token.clone()).or_default() += 1;
            }
            for term in term_freqs.keys() {
                *doc_freqs.entry(term.clone()).or_default() += 1;
            }

            docs.push(IndexedDoc {
                id,
                text,
                meta,
                token_count: tokens.len(),
                term_freqs,
            });
        }

        let n = docs.len() as f64;
        let avgdl = if docs.is_empty() {
            0.0
        } else {
            total_tokens as f64 / n
        };

        // Okapi idf with +1 inside the log keeps scores non-negative
        let idf = doc_freqs
            .into_iter()
            .map(|(term, df)| {
                let df = df as f64;
                (term, ((n - df + 0.5) / (df + 0.5) + 1.0).ln())
            })
            .collect();

        Self { docs, idf, avgdl }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Score all documents against the query, descending. Empty index
    /// returns empty.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<Bm25Hit> {
        if self.docs.is_empty() {
            return vec![];
        }

        let query_tokens = tokenize_code(query);
        if query_tokens.is_empty() {
            return vec![];
        }

        let mut hits: Vec<Bm25Hit> = self
            .docs
            .iter()
            .map(|doc| {
                let mut score = 0.0;
                for token in &query_tokens {
                    let Some(idf) = self.idf.get(token) else { continue };
                    let tf = *doc.term_freqs.get(token).unwrap_or(&0) as f64;
                    if tf == 0.0 {
                        continue;
                    }
                    let dl = doc.token_count as f64;
                    let denom = tf + K1 * (1.0 - B + B * dl / self.avgdl.max(1.0));
                    score += idf * tf * (K1 + 1.0) / denom;
                }
                Bm25Hit {
                    id: doc.id.clone(),
                    text: doc.text.clone(),
                    meta: doc.meta.clone(),
                    score,
                }
            })
            .filter(|hit| hit.score > 0.0)
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        hits
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, text: &str) -> (String, String, Metadata) {
        (id.to_string(), text.to_string(), Metadata::new())
    }

    #[test]
    fn test_tokenize_camel_case() {
        assert_eq!(tokenize_code("calculateTotal"), vec!["calculate", "total"]);
    }

    #[test]
    fn test_tokenize_snake_case() {
        assert_eq!(tokenize_code("calculate_total"), vec!["calculate", "total"]);
    }

    #[test]
    fn test_tokenize_punctuation_and_case() {
        assert_eq!(
            tokenize_code("fn getUserToken(id: u32);"),
            vec!["fn", "get", "user", "token", "id", "u32"]
        );
    }

    #[test]
    fn test_empty_index_returns_empty() {
        let index = Bm25Index::default();
        assert!(index.search("anything", 10).is_empty());
    }

    #[test]
    fn test_relevant_doc_ranks_first() {
        let index = Bm25Index::build(vec![
            doc("1", "database connection pooling and retries"),
            doc("2", "jwt token refresh and token validation"),
            doc("3", "rendering pipeline shaders"),
        ]);

        let hits = index.search("token refresh", 10);
        assert_eq!(hits[0].id, "2");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn test_code_convention_match() {
        let index = Bm25Index::build(vec![
            doc("camel", "function validateUserToken checks expiry"),
            doc("other", "unrelated rendering code"),
        ]);

        // snake_case query matches camelCase identifier
        let hits = index.search("validate_user_token", 10);
        assert_eq!(hits[0].id, "camel");
    }

    #[test]
    fn test_top_k_limit() {
        let docs = (0..20).map(|i| doc(&i.to_string(), "common term here")).collect();
        let index = Bm25Index::build(docs);
        assert_eq!(index.search("common", 5).len(), 5);
    }

    #[test]
    fn test_no_match_is_empty() {
        let index = Bm25Index::build(vec![doc("1", "alpha beta gamma")]);
        assert!(index.search("zeta", 10).is_empty());
    }
}

//! Embedding Facades
//!
//! The store never talks to a model directly: it takes an injected
//! [`Embedder`] that must produce comparable vectors for corpus documents
//! and queries. The default implementation (feature `embeddings`) runs
//! nomic-embed-text-v1.5 locally through fastembed; tests inject
//! deterministic embedders.

#[cfg(feature = "embeddings")]
mod local;
mod reranker;

#[cfg(feature = "embeddings")]
pub use local::{LocalEmbedder, MAX_TEXT_LENGTH};
pub use reranker::{RerankedResult, Reranker, RerankerConfig};

use std::sync::Arc;

/// Embedding dimensions used throughout the store (Matryoshka truncation
/// from 768, ~2% quality loss for 3x storage savings)
pub const EMBEDDING_DIMENSIONS: usize = 256;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error type
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbedError {
    /// Failed to initialize the embedding model
    #[error("Model initialization failed: {0}")]
    ModelInit(String),
    /// Failed to generate an embedding
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
    /// Invalid input (empty text)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

// ============================================================================
// EMBEDDER FACADE
// ============================================================================

/// Opaque adapter over a vector-embedding model.
///
/// Implementations must be deterministic per input and produce vectors of a
/// fixed dimensionality comparable under cosine similarity.
pub trait Embedder: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embed a batch of texts
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Dimensionality of produced vectors
    fn dimensions(&self) -> usize;
}

/// Shared embedder handle held by the service registry
pub type SharedEmbedder = Arc<dyn Embedder>;

// ============================================================================
// EMBEDDING TYPE
// ============================================================================

/// A dense embedding vector with storage round-trip helpers
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub dimensions: usize,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        let dimensions = vector.len();
        Self { vector, dimensions }
    }

    /// Serialize to little-endian bytes for BLOB storage
    pub fn to_bytes(&self) -> Vec<u8> {
        self.vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize from BLOB bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let vector: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Some(Self::new(vector))
    }
}

// ============================================================================
// SIMILARITY
// ============================================================================

/// Truncate to [`EMBEDDING_DIMENSIONS`] and L2-normalize.
///
/// Matryoshka representation learning: the first N dims of the model output
/// ARE a valid N-dim embedding.
#[inline]
pub fn matryoshka_truncate(mut vector: Vec<f32>) -> Vec<f32> {
    if vector.len() > EMBEDDING_DIMENSIONS {
        vector.truncate(EMBEDDING_DIMENSIONS);
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

/// Cosine similarity between two vectors (0.0 on length mismatch)
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = (norm_a * norm_b).sqrt();
    if denom > 0.0 { dot / denom } else { 0.0 }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_embedding_bytes_roundtrip() {
        let original = Embedding::new(vec![1.5, -2.5, 3.25]);
        let restored = Embedding::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(original.vector, restored.vector);
        assert_eq!(restored.dimensions, 3);
    }

    #[test]
    fn test_embedding_from_bad_bytes() {
        assert!(Embedding::from_bytes(&[1, 2, 3]).is_none());
    }

    #[test]
    fn test_matryoshka_truncate_normalizes() {
        let long = vec![1.0_f32; 768];
        let truncated = matryoshka_truncate(long);
        assert_eq!(truncated.len(), EMBEDDING_DIMENSIONS);
        let norm: f32 = truncated.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }
}

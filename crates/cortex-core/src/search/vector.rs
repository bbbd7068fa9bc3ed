//! HNSW Vector Index
//!
//! USearch-backed approximate-nearest-neighbor index over document
//! embeddings, keyed by document id. Serves the unfiltered query fast
//! path; the store rebuilds it from persisted embeddings at startup, so
//! the index itself never touches disk.

use std::collections::HashMap;

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

/// HNSW connectivity parameter (higher = better recall, more memory)
const DEFAULT_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for index building
const DEFAULT_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search
const DEFAULT_EXPANSION_SEARCH: usize = 64;

/// Vector index error type
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum VectorIndexError {
    #[error("Index creation failed: {0}")]
    Creation(String),
    #[error("Failed to add vector: {0}")]
    Add(String),
    #[error("Search failed: {0}")]
    Search(String),
    #[error("Invalid dimensions: expected {0}, got {1}")]
    InvalidDimensions(usize, usize),
}

/// In-memory HNSW index mapping document ids to embedding slots
pub struct VectorIndex {
    index: Index,
    dimensions: usize,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    next_id: u64,
}

impl VectorIndex {
    /// Create an empty index for vectors of the given dimensionality.
    pub fn new(dimensions: usize) -> Result<Self, VectorIndexError> {
        let options = IndexOptions {
            dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
            multi: false,
        };

        let index = Index::new(&options).map_err(|e| VectorIndexError::Creation(e.to_string()))?;

        Ok(Self {
            index,
            dimensions,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            next_id: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn reserve(&self, capacity: usize) -> Result<(), VectorIndexError> {
        self.index
            .reserve(capacity)
            .map_err(|e| VectorIndexError::Creation(format!("Failed to reserve capacity: {e}")))
    }

    /// Add or replace a vector keyed by document id.
    pub fn add(&mut self, key: &str, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimensions {
            return Err(VectorIndexError::InvalidDimensions(self.dimensions, vector.len()));
        }

        if let Some(&existing) = self.key_to_id.get(key) {
            self.index
                .remove(existing)
                .map_err(|e| VectorIndexError::Add(e.to_string()))?;
            self.reserve(self.index.size() + 1)?;
            self.index
                .add(existing, vector)
                .map_err(|e| VectorIndexError::Add(e.to_string()))?;
            return Ok(());
        }

        // usearch requires reserve() before add() once capacity is reached
        if self.index.size() >= self.index.capacity() {
            let new_capacity = std::cmp::max(self.index.capacity() * 2, 16);
            self.reserve(new_capacity)?;
        }

        let id = self.next_id;
        self.next_id += 1;

        self.index
            .add(id, vector)
            .map_err(|e| VectorIndexError::Add(e.to_string()))?;
        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());

        Ok(())
    }

    /// Remove a vector by document id. Returns whether it existed.
    pub fn remove(&mut self, key: &str) -> Result<bool, VectorIndexError> {
        if let Some(id) = self.key_to_id.remove(key) {
            self.id_to_key.remove(&id);
            self.index
                .remove(id)
                .map_err(|e| VectorIndexError::Add(e.to_string()))?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.key_to_id.contains_key(key)
    }

    /// Nearest neighbors by cosine similarity: `(id, similarity)` pairs,
    /// most similar first.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(String, f32)>, VectorIndexError> {
        if query.len() != self.dimensions {
            return Err(VectorIndexError::InvalidDimensions(self.dimensions, query.len()));
        }
        if self.is_empty() {
            return Ok(vec![]);
        }

        let results = self
            .index
            .search(query, limit)
            .map_err(|e| VectorIndexError::Search(e.to_string()))?;

        let mut out = Vec::with_capacity(results.keys.len());
        for (key, distance) in results.keys.iter().zip(results.distances.iter()) {
            if let Some(doc_id) = self.id_to_key.get(key) {
                // Cosine distance -> similarity
                out.push((doc_id.clone(), 1.0 - distance));
            }
        }

        Ok(out)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DIMS: usize = 8;

    fn vector(seed: f32) -> Vec<f32> {
        (0..DIMS).map(|i| ((i as f32 + seed) / DIMS as f32).sin()).collect()
    }

    #[test]
    fn test_add_and_search() {
        let mut index = VectorIndex::new(DIMS).unwrap();
        index.add("doc-1", &vector(1.0)).unwrap();
        index.add("doc-2", &vector(50.0)).unwrap();

        assert_eq!(index.len(), 2);
        assert!(index.contains("doc-1"));

        let results = index.search(&vector(1.0), 2).unwrap();
        assert_eq!(results[0].0, "doc-1");
    }

    #[test]
    fn test_update_replaces() {
        let mut index = VectorIndex::new(DIMS).unwrap();
        index.add("doc-1", &vector(1.0)).unwrap();
        index.add("doc-1", &vector(2.0)).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut index = VectorIndex::new(DIMS).unwrap();
        index.add("doc-1", &vector(1.0)).unwrap();
        assert!(index.remove("doc-1").unwrap());
        assert!(!index.remove("doc-1").unwrap());
        assert!(!index.contains("doc-1"));
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = VectorIndex::new(DIMS).unwrap();
        assert!(index.add("doc-1", &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_empty_search() {
        let index = VectorIndex::new(DIMS).unwrap();
        assert!(index.search(&vector(1.0), 5).unwrap().is_empty());
    }
}

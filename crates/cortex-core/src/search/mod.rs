//! Hybrid Search
//!
//! Keyword (BM25) + dense-vector retrieval, Reciprocal Rank Fusion,
//! cross-encoder reranking, and layered boosting with branch-aware
//! filtering and per-result staleness assessment.

mod bm25;
mod boosts;
mod hybrid;
mod pipeline;
#[cfg(feature = "vector-search")]
pub(crate) mod vector;

pub use bm25::{Bm25Hit, Bm25Index, tokenize_code};
pub use boosts::{
    INITIATIVE_BOOST_FACTOR, RECENCY_MIN_BOOST, apply_initiative_boost, apply_recency_boost,
    apply_type_boost, filter_by_initiative,
};
pub use hybrid::{Candidate, RRF_K, reciprocal_rank_fusion};
pub use pipeline::{
    RepositoryContext, SearchError, SearchRequest, SearchResponse, SearchResultItem, SkeletonData,
    StalenessSummary, build_branch_aware_filter, resolve_preset, search,
};

// Re-exported for the service registry
pub use crate::embed::{Reranker, RerankerConfig};

#[cfg(feature = "vector-search")]
pub use vector::{VectorIndex, VectorIndexError};

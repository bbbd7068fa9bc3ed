//! # Cortex Core
//!
//! Local, privacy-first semantic memory engine for coding assistants.
//!
//! Cortex indexes source repositories and the artifacts of coding sessions
//! (notes, insights, session summaries, initiatives) into a unified
//! vector+keyword store and serves hybrid ranked retrieval back to the
//! assistant across sessions:
//!
//! - **Document store**: one embedded SQLite collection of typed documents
//!   (code chunks, skeletons, notes, insights, session summaries, tech
//!   stacks, initiatives) with a small where-filter algebra and cosine ANN
//! - **Delta-sync ingestion**: git-diff or content-hash based change
//!   detection, language-aware chunking, stale-chunk garbage collection
//! - **Hybrid search**: BM25 keyword + dense-vector retrieval fused with
//!   Reciprocal Rank Fusion, cross-encoder reranking, and layered type /
//!   recency / initiative boosting with per-result staleness assessment
//! - **Initiatives**: multi-session workstreams with a focus pointer,
//!   completion signals, and inactivity staleness
//! - **Async tasks & auto-capture**: persistent single-worker queues and
//!   significance-gated session summarization through pluggable LLM
//!   providers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cortex_core::{Services, SearchRequest, search};
//!
//! let services = Services::new(data_dir, embedder, yaml_config)?;
//! let stats = cortex_core::ingest::ingest(&services, repo_root, Default::default(), None).await?;
//! let response = search(&services, SearchRequest::new("auth token refresh")).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `embeddings` (default): local embedding generation and cross-encoder
//!   reranking with fastembed
//! - `vector-search` (default): HNSW fast path for unfiltered vector queries
//! - `full`: all of the above

// ============================================================================
// MODULES
// ============================================================================

pub mod capture;
pub mod chunker;
pub mod config;
pub mod delta;
pub mod documents;
pub mod embed;
pub mod ingest;
pub mod initiative;
pub mod llm;
pub mod memory;
pub mod orient;
pub mod persist;
pub mod recall;
pub mod scrub;
pub mod search;
pub mod services;
pub mod staleness;
pub mod store;
pub mod tasks;
pub mod vcs;
pub mod walker;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use documents::{DocType, Metadata, MetadataExt, default_type_multipliers};

pub use store::{Filter, GetResult, QueryResult, Store, StoreError};

pub use embed::{Embedder, Embedding, cosine_similarity};

pub use search::{
    Bm25Hit, Bm25Index, Candidate, SearchError, SearchRequest, SearchResponse, Reranker,
    RerankerConfig, reciprocal_rank_fusion, tokenize_code, search,
};

pub use chunker::{Lang, chunk_code, detect_language, extract_scope};

pub use walker::{changed_files, compute_file_hash, walk};

pub use delta::DeltaState;

pub use ingest::{DeltaMode, HeaderProvider, IngestError, IngestOptions, IngestStats, ingest};

pub use staleness::{Staleness, StalenessConfig, StalenessLevel, format_warning};

pub use initiative::{InitiativeError, detect_completion_signals, format_duration};

pub use memory::MemoryError;

pub use tasks::{ASYNC_FILE_THRESHOLD, TaskQueue, TaskRecord, TaskStatus, run_worker};

pub use capture::{CaptureError, SessionCapture, SignificanceThresholds};

pub use llm::{LlmClient, LlmError, ProviderKind};

pub use orient::{OrientResponse, orient};

pub use recall::recall_recent_work;

pub use services::{ServiceError, Services};

pub use config::{RuntimeConfig, YamlConfig, data_path, ensure_data_dir};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model when the `embeddings` feature is enabled
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-ai/nomic-embed-text-v1.5";

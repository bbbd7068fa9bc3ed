//! Delta-Sync Ingestion
//!
//! Walks a repository, detects changed/renamed/deleted files via
//! version-control introspection (falling back to content hashing),
//! chunks code in a language-aware manner, garbage-collects stale chunks,
//! and regenerates the repository skeleton.

mod engine;
mod headers;
mod skeleton;

pub use engine::{
    CleanupReport, DeltaMode, IngestError, IngestFileError, IngestOptions, IngestStats,
    ProgressFn, cleanup_orphans, delete_file_chunks, ingest,
};
pub use headers::{HeaderProvider, generate_header};
pub use skeleton::{SkeletonStats, generate_tree, store_skeleton};

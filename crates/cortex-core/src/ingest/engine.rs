//! Ingestion Engine
//!
//! Orchestrates walker, VC adapter, delta state, chunker, and store into
//! one ingest run. Strategy selection: forced full rescan, git-diff delta
//! when an indexed commit exists, content-hash delta otherwise. Deleted
//! and renamed-away paths are garbage-collected from both the store and
//! the delta state. Per-file errors are recorded and never abort the run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::chunker::{self, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::delta::DeltaState;
use crate::documents::{FILE_SCOPED_TYPES, Metadata, MetadataExt, now_rfc3339};
use crate::scrub::scrub_secrets;
use crate::services::Services;
use crate::store::{Filter, Store, StoreError};
use crate::vcs;
use crate::walker::{self, WalkOptions};

use super::headers::{HeaderProvider, generate_header};
use super::skeleton::{self, SkeletonStats};

/// Progress checkpoint interval (files)
pub const PROGRESS_BATCH_SIZE: u64 = 10;

// ============================================================================
// TYPES
// ============================================================================

/// Ingest errors. Per-file failures land in [`IngestStats::errors`]
/// instead.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Root path does not exist: {0}")]
    RootMissing(PathBuf),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// How the set of files to process was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaMode {
    Full,
    Git,
    Hash,
}

/// A recorded per-file failure
#[derive(Debug, Clone, Serialize)]
pub struct IngestFileError {
    pub file: String,
    pub error: String,
}

/// Ingest run statistics
#[derive(Debug, Clone, Serialize)]
pub struct IngestStats {
    pub repository: String,
    pub branch: String,
    pub delta_mode: DeltaMode,
    pub files_scanned: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub files_deleted: usize,
    pub chunks_created: usize,
    pub chunks_deleted: usize,
    pub errors: Vec<IngestFileError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skeleton: Option<SkeletonStats>,
}

/// Ingest options
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Repository identifier (defaults to the root's basename)
    pub repository: Option<String>,
    /// Skip delta sync and rescan everything
    pub force_full: bool,
    /// Only index files matching these globs (relative to root)
    pub include_globs: Option<Vec<String>>,
    /// Merge global and project cortexignore patterns
    pub use_cortexignore: bool,
    /// Chunk header provider
    pub header_provider: HeaderProvider,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            repository: None,
            force_full: false,
            include_globs: None,
            use_cortexignore: true,
            header_provider: HeaderProvider::None,
        }
    }
}

/// Progress callback: `(files_done, files_total)`
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;

// ============================================================================
// ENGINE
// ============================================================================

/// Ingest a repository into the store.
pub async fn ingest(
    services: &Services,
    root: &Path,
    options: IngestOptions,
    progress: Option<&ProgressFn>,
) -> Result<IngestStats, IngestError> {
    if !root.is_dir() {
        return Err(IngestError::RootMissing(root.to_path_buf()));
    }

    let repository = options
        .repository
        .clone()
        .or_else(|| root.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .unwrap_or_else(|| "global".to_string());
    let branch = vcs::current_branch(root).await;

    tracing::info!(
        "Starting ingestion: {} (repository={}, branch={})",
        root.display(),
        repository,
        branch
    );

    let state_file = services.state_file();
    let mut state = if options.force_full {
        DeltaState::default()
    } else {
        DeltaState::load(&state_file)
    };

    let walk_options = WalkOptions {
        include_globs: options.include_globs.clone(),
        use_cortexignore: options.use_cortexignore,
        ..WalkOptions::new()
    };

    let is_repo = vcs::is_repo(root).await;
    let current_commit = if is_repo { vcs::head_commit(root).await } else { None };
    let last_commit = state.indexed_commit.clone();

    let mut stats = IngestStats {
        repository: repository.clone(),
        branch: branch.clone(),
        delta_mode: DeltaMode::Full,
        files_scanned: 0,
        files_processed: 0,
        files_skipped: 0,
        files_deleted: 0,
        chunks_created: 0,
        chunks_deleted: 0,
        errors: vec![],
        skeleton: None,
    };

    let mut deleted_files: Vec<PathBuf> = vec![];
    let mut renamed_files: Vec<(PathBuf, PathBuf)> = vec![];

    let files_to_process: Vec<PathBuf> = if options.force_full {
        stats.delta_mode = DeltaMode::Full;
        let all: Vec<PathBuf> = walker::walk(root, &walk_options).collect();
        stats.files_scanned = all.len();
        tracing::info!("Full ingestion: {} files", all.len());
        all
    } else if is_repo && last_commit.is_some() && current_commit.is_some() {
        // Git delta sync: diff + untracked, narrowed to walker-eligible files
        stats.delta_mode = DeltaMode::Git;
        let since = last_commit.as_deref().unwrap_or_default();
        let (modified, deleted, renamed) = vcs::changed_since(root, since).await;
        let untracked = vcs::untracked(root).await;

        let eligible: HashSet<PathBuf> = walker::walk(root, &walk_options).collect();
        let mut candidates: HashSet<PathBuf> = modified.into_iter().collect();
        candidates.extend(untracked);

        let mut files: Vec<PathBuf> = candidates
            .into_iter()
            .filter(|p| eligible.contains(p) && p.exists())
            .collect();
        files.sort();

        deleted_files = deleted;
        renamed_files = renamed;
        stats.files_scanned = files.len();
        tracing::info!(
            "Git delta sync: {} modified, {} deleted, {} renamed",
            files.len(),
            deleted_files.len(),
            renamed_files.len()
        );
        files
    } else {
        // Hash fallback: first index or non-VC directory
        stats.delta_mode = DeltaMode::Hash;
        let all: Vec<PathBuf> = walker::walk(root, &walk_options).collect();
        stats.files_scanned = all.len();
        let changed = walker::changed_files(&all, &state.file_hashes);
        let unchanged = all.len() - changed.len();
        if unchanged > 0 {
            tracing::debug!("Skipped (unchanged by hash): {} files", unchanged);
        }
        changed
    };

    // --- Garbage collection ---
    let store = &services.store;
    if !deleted_files.is_empty() {
        let chunks = delete_file_chunks(store, &deleted_files, &repository, &mut stats.errors);
        stats.files_deleted = deleted_files.len();
        stats.chunks_deleted += chunks;
        let paths: Vec<String> = deleted_files.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        state.purge_paths(&paths);
        tracing::info!("Garbage collected: {} files, {} chunks", deleted_files.len(), chunks);
    }

    if !renamed_files.is_empty() {
        let old_paths: Vec<PathBuf> = renamed_files.iter().map(|(old, _)| old.clone()).collect();
        let chunks = delete_file_chunks(store, &old_paths, &repository, &mut stats.errors);
        stats.chunks_deleted += chunks;
        let paths: Vec<String> = old_paths.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        state.purge_paths(&paths);
        tracing::info!("Cleaned up {} renamed files", renamed_files.len());
    }

    // --- Per-file processing ---
    let total = files_to_process.len() as u64;
    for (index, file_path) in files_to_process.iter().enumerate() {
        match ingest_file(services, file_path, &repository, &branch, options.header_provider).await {
            Ok(doc_ids) if !doc_ids.is_empty() => {
                stats.files_processed += 1;
                stats.chunks_created += doc_ids.len();
                match walker::compute_file_hash(file_path) {
                    Ok(hash) => {
                        state
                            .file_hashes
                            .insert(file_path.to_string_lossy().into_owned(), hash);
                    }
                    Err(e) => tracing::debug!("Hash failed for {}: {}", file_path.display(), e),
                }
            }
            Ok(_) => stats.files_skipped += 1,
            Err(e) => {
                tracing::warn!("Error processing {}: {}", file_path.display(), e);
                stats.errors.push(IngestFileError {
                    file: file_path.to_string_lossy().into_owned(),
                    error: e,
                });
                stats.files_skipped += 1;
            }
        }

        let done = (index + 1) as u64;
        if let Some(progress) = progress {
            if done % PROGRESS_BATCH_SIZE == 0 || done == total {
                progress(done, total);
            }
        }
    }

    // --- State update ---
    state.repository = Some(repository.clone());
    state.branch = Some(branch.clone());
    state.indexed_commit = current_commit.clone();
    state.indexed_at = Some(now_rfc3339());
    if let Err(e) = state.save(&state_file) {
        // Chunk work already persisted stays valid
        tracing::warn!("Failed to save delta state: {}", e);
        stats.errors.push(IngestFileError {
            file: state_file.to_string_lossy().into_owned(),
            error: e.to_string(),
        });
    }

    // --- Skeleton ---
    let ignore = walker::load_ignore_patterns(root, options.use_cortexignore);
    let (tree, tree_stats) = skeleton::generate_tree(root, &ignore).await;
    match skeleton::store_skeleton(
        store,
        &tree,
        &repository,
        &branch,
        tree_stats,
        current_commit.as_deref(),
    ) {
        Ok(_) => {
            stats.skeleton = Some(tree_stats);
            tracing::info!(
                "Skeleton indexed: {} files, {} dirs",
                tree_stats.total_files,
                tree_stats.total_dirs
            );
        }
        Err(e) => {
            tracing::warn!("Skeleton generation failed: {}", e);
            stats.errors.push(IngestFileError {
                file: format!("{repository}:skeleton:{branch}"),
                error: e.to_string(),
            });
        }
    }

    services.mark_index_dirty();

    tracing::info!(
        "Ingestion complete ({:?}): {} files, {} chunks, {} deleted",
        stats.delta_mode,
        stats.files_processed,
        stats.chunks_created,
        stats.chunks_deleted
    );

    Ok(stats)
}

/// Ingest one file: read, scrub, chunk, header, upsert. Returns the
/// created document ids; empty when the file was skipped.
async fn ingest_file(
    services: &Services,
    file_path: &Path,
    repository: &str,
    branch: &str,
    header_provider: HeaderProvider,
) -> Result<Vec<String>, String> {
    let bytes = std::fs::read(file_path).map_err(|e| e.to_string())?;
    let content = String::from_utf8_lossy(&bytes);
    if content.trim().is_empty() {
        tracing::debug!("Skipped (empty): {}", file_path.display());
        return Ok(vec![]);
    }

    let path_str = file_path.to_string_lossy().into_owned();
    let lang = chunker::detect_language(&path_str, Some(&content));
    let content = scrub_secrets(&content);

    let chunks = chunker::chunk_code(&content, lang, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP);
    if chunks.is_empty() {
        tracing::debug!("Skipped (no chunks): {}", file_path.display());
        return Ok(vec![]);
    }

    let lang_str = lang.map(|l| l.as_str()).unwrap_or("unknown");
    let indexed_at = now_rfc3339();
    let total_chunks = chunks.len();
    let mut doc_ids = Vec::with_capacity(total_chunks);

    for (i, chunk) in chunks.iter().enumerate() {
        let header =
            generate_header(&services.llm, header_provider, chunk, &path_str, lang).await;
        let full_text = format!("{header}\n\n---\n\n{chunk}");
        let scope = chunker::extract_scope(chunk, lang);

        let doc_id = format!("{repository}:{path_str}:{i}");

        let mut meta = Metadata::new();
        meta.set_str("type", "code");
        meta.set_str("file_path", path_str.clone());
        meta.set_str("repository", repository);
        meta.set_str("branch", branch);
        meta.insert("chunk_index".to_string(), (i as i64).into());
        meta.insert("total_chunks".to_string(), (total_chunks as i64).into());
        meta.set_str("language", lang_str);
        meta.set_str("indexed_at", indexed_at.clone());
        meta.set_str("created_at", indexed_at.clone());
        meta.set_str("updated_at", indexed_at.clone());
        if let Some(function_name) = scope.function_name {
            meta.set_str("function_name", function_name);
        }
        if let Some(class_name) = scope.class_name {
            meta.set_str("class_name", class_name);
        }
        if let Some(scope_path) = scope.scope {
            meta.set_str("scope", scope_path);
        }

        services
            .store
            .upsert(&doc_id, &full_text, meta, None)
            .map_err(|e| e.to_string())?;
        doc_ids.push(doc_id);
    }

    tracing::debug!(
        "File: {} -> {} chunks ({})",
        file_path.display(),
        total_chunks,
        lang_str
    );
    Ok(doc_ids)
}

/// Orphan-cleanup report for the `cleanup_storage` tool
#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub repository: String,
    pub action: String,
    pub orphaned_files: Vec<String>,
    pub orphaned_chunks: usize,
    pub chunks_deleted: usize,
}

/// Find (and with `execute`, delete) chunks whose source files no longer
/// exist under `root`. Preview mode reports without touching the store.
pub fn cleanup_orphans(
    services: &Services,
    repository: &str,
    root: &Path,
    execute: bool,
) -> Result<CleanupReport, StoreError> {
    let store = &services.store;
    let filter = Filter::and(vec![
        Filter::eq("repository", repository),
        Filter::is_in("type", FILE_SCOPED_TYPES.iter().copied()),
    ]);
    let docs = store.get_where(Some(&filter), None)?;

    let mut orphaned_files: Vec<String> = vec![];
    let mut orphaned_chunks = 0;
    for meta in &docs.metadatas {
        let Some(file_path) = meta.str_of("file_path") else { continue };
        let path = Path::new(file_path);
        let exists = if path.is_absolute() {
            path.exists()
        } else {
            root.join(path).exists()
        };
        if !exists {
            orphaned_chunks += 1;
            if !orphaned_files.contains(&file_path.to_string()) {
                orphaned_files.push(file_path.to_string());
            }
        }
    }

    let mut chunks_deleted = 0;
    if execute && !orphaned_files.is_empty() {
        let paths: Vec<PathBuf> = orphaned_files.iter().map(PathBuf::from).collect();
        let mut errors = vec![];
        chunks_deleted = delete_file_chunks(store, &paths, repository, &mut errors);

        let state_file = services.state_file();
        let mut state = DeltaState::load(&state_file);
        state.purge_paths(&orphaned_files);
        if let Err(e) = state.save(&state_file) {
            tracing::warn!("Failed to update delta state after cleanup: {}", e);
        }
        services.mark_index_dirty();
    }

    Ok(CleanupReport {
        repository: repository.to_string(),
        action: if execute { "execute" } else { "preview" }.to_string(),
        orphaned_files,
        orphaned_chunks,
        chunks_deleted,
    })
}

/// Delete all code-family chunks for the given paths, scoped by
/// repository. Returns the number of chunks removed.
pub fn delete_file_chunks(
    store: &Store,
    paths: &[PathBuf],
    repository: &str,
    errors: &mut Vec<IngestFileError>,
) -> usize {
    let mut deleted = 0;
    for path in paths {
        let path_str = path.to_string_lossy().into_owned();
        let filter = Filter::and(vec![
            Filter::eq("file_path", path_str.clone()),
            Filter::eq("repository", repository),
            Filter::is_in("type", FILE_SCOPED_TYPES.iter().copied()),
        ]);
        match store.delete_where(&filter) {
            Ok(ids) => {
                if !ids.is_empty() {
                    tracing::debug!("Deleted {} chunks for: {}", ids.len(), path_str);
                }
                deleted += ids.len();
            }
            Err(e) => {
                tracing::warn!("Failed to delete chunks for {}: {}", path_str, e);
                errors.push(IngestFileError {
                    file: path_str,
                    error: e.to_string(),
                });
            }
        }
    }
    deleted
}

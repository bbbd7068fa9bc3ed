//! Memory Operations
//!
//! Writing understanding into the store: notes (decisions, learnings),
//! insights (analysis anchored to specific files, with content hashes for
//! staleness tracking), and end-of-session summaries. All bodies are
//! secret-scrubbed before upsert; writes inherit the focused initiative
//! tag unless an explicit initiative is given.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::documents::{DocType, Metadata, MetadataExt, new_doc_id, now_rfc3339};
use crate::initiative::{self, detect_completion_signals};
use crate::scrub::scrub_secrets;
use crate::services::Services;
use crate::store::{Filter, StoreError};
use crate::walker::compute_file_hash;
use crate::vcs;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Memory operation errors
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("files parameter is required when kind='insight'")]
    InsightRequiresFiles,
    #[error("Unknown kind: {0}. Valid kinds: 'note', 'insight'")]
    UnknownKind(String),
    #[error("Unknown validation result: {0}")]
    UnknownValidationResult(String),
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Document {0} is not an insight (type={1})")]
    NotAnInsight(String, String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Memory result type
pub type Result<T> = std::result::Result<T, MemoryError>;

// ============================================================================
// RESPONSE SHAPES
// ============================================================================

#[derive(Debug, Serialize)]
pub struct InitiativeTag {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_signal_detected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct SavedMemory {
    pub status: &'static str,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub repository: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiative: Option<InitiativeTag>,
}

#[derive(Debug, Serialize)]
pub struct ConcludedSession {
    pub status: &'static str,
    pub session_id: String,
    pub summary_saved: bool,
    pub files_recorded: usize,
    pub repository: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiative: Option<InitiativeTag>,
}

#[derive(Debug, Serialize)]
pub struct ValidatedInsight {
    pub status: &'static str,
    pub insight_id: String,
    pub validation_result: String,
    pub verified_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_hashes_refreshed: Option<bool>,
}

// ============================================================================
// REPOSITORY RESOLUTION
// ============================================================================

/// Resolve the repository tag for a write.
///
/// Order: explicit argument, current directory when it is a VC repo, the
/// repository of any existing focus document, then the literal "global".
pub async fn resolve_repository(services: &Services, repository: Option<&str>) -> String {
    if let Some(repo) = repository.filter(|r| !r.is_empty()) {
        return repo.to_string();
    }

    if let Ok(cwd) = std::env::current_dir() {
        if vcs::is_repo(&cwd).await {
            if let Some(name) = cwd.file_name().and_then(|n| n.to_str()) {
                return name.to_string();
            }
        }
    }

    // Any focus document identifies the repository being worked on
    let focus = services
        .store
        .get_where(Some(&Filter::eq("type", "focus")), Some(1));
    if let Ok(result) = focus {
        if let Some(meta) = result.metadatas.first() {
            if let Some(repo) = meta.str_of("repository") {
                if !repo.is_empty() {
                    return repo.to_string();
                }
            }
        }
    }

    "global".to_string()
}

async fn branch_and_commit(services: &Services, repository: &str) -> (String, Option<String>, Option<PathBuf>) {
    let repo_path = services.repo_path(Some(repository)).await;
    match &repo_path {
        Some(path) => {
            let branch = vcs::current_branch(path).await;
            let commit = vcs::head_commit(path).await;
            (branch, commit, repo_path)
        }
        None => ("unknown".to_string(), None, None),
    }
}

fn initiative_tag(
    services: &Services,
    repository: &str,
    initiative: Option<&str>,
    timestamp: &str,
) -> Option<(String, String)> {
    let (id, name) = initiative::resolve_initiative(&services.store, repository, initiative);
    let id = id?;
    initiative::touch_initiative(&services.store, &id, timestamp);
    Some((id, name.unwrap_or_default()))
}

// ============================================================================
// SAVE OPERATIONS
// ============================================================================

/// Dispatcher for the `save_memory` tool.
pub async fn save_memory(
    services: &Services,
    content: &str,
    kind: &str,
    title: Option<&str>,
    tags: &[String],
    repository: Option<&str>,
    initiative: Option<&str>,
    files: &[String],
) -> Result<SavedMemory> {
    match kind {
        "note" => save_note(services, content, title, tags, repository, initiative).await,
        "insight" => {
            if files.is_empty() {
                return Err(MemoryError::InsightRequiresFiles);
            }
            save_insight(services, content, files, title, tags, repository, initiative).await
        }
        other => Err(MemoryError::UnknownKind(other.to_string())),
    }
}

/// Save a note (decision, learning, documentation snippet).
pub async fn save_note(
    services: &Services,
    content: &str,
    title: Option<&str>,
    tags: &[String],
    repository: Option<&str>,
    initiative: Option<&str>,
) -> Result<SavedMemory> {
    let repo = resolve_repository(services, repository).await;
    tracing::info!("Saving note: title={:?}, repository={}", title, repo);

    let note_id = new_doc_id(DocType::Note);
    let (branch, commit, _) = branch_and_commit(services, &repo).await;
    let timestamp = now_rfc3339();

    let mut text = String::new();
    if let Some(title) = title {
        text.push_str(title);
        text.push_str("\n\n");
    }
    text.push_str(&scrub_secrets(content));

    let mut meta = Metadata::new();
    meta.set_str("type", "note");
    meta.set_str("title", title.unwrap_or(""));
    meta.set_str("tags", serde_json::to_string(tags).unwrap_or_else(|_| "[]".into()));
    meta.set_str("repository", repo.clone());
    meta.set_str("branch", branch);
    meta.set_str("created_at", timestamp.clone());
    meta.set_str("updated_at", timestamp.clone());
    meta.set_str("verified_at", timestamp.clone());
    meta.set_str("status", "active");
    if let Some(commit) = commit {
        meta.set_str("created_commit", commit);
    }

    let tag = initiative_tag(services, &repo, initiative, &timestamp);
    if let Some((id, name)) = &tag {
        meta.set_str("initiative_id", id.clone());
        meta.set_str("initiative_name", name.clone());
    }

    services.store.upsert(&note_id, &text, meta, None)?;
    services.mark_index_dirty();
    tracing::info!("Note saved: {}", note_id);

    Ok(SavedMemory {
        status: "saved",
        id: note_id,
        kind: "note",
        title: title.map(str::to_string),
        repository: repo,
        files: vec![],
        tags: tags.to_vec(),
        initiative: tag.map(|(id, name)| InitiativeTag {
            id,
            name,
            completion_signal_detected: None,
            prompt: None,
        }),
    })
}

/// Save an insight anchored to files. Requires a non-empty file list;
/// hashes are computed relative to the repository working tree and missing
/// files are omitted (not rejected).
pub async fn save_insight(
    services: &Services,
    content: &str,
    files: &[String],
    title: Option<&str>,
    tags: &[String],
    repository: Option<&str>,
    initiative: Option<&str>,
) -> Result<SavedMemory> {
    if files.is_empty() {
        return Err(MemoryError::InsightRequiresFiles);
    }

    let repo = resolve_repository(services, repository).await;
    tracing::info!(
        "Saving insight: title={:?}, files={}, repository={}",
        title,
        files.len(),
        repo
    );

    let insight_id = new_doc_id(DocType::Insight);
    let (branch, commit, repo_path) = branch_and_commit(services, &repo).await;
    let timestamp = now_rfc3339();

    let mut text = String::new();
    if let Some(title) = title {
        text.push_str(title);
        text.push_str("\n\n");
    }
    text.push_str(&scrub_secrets(content));
    text.push_str(&format!("\n\nLinked files: {}", files.join(", ")));

    let file_hashes = hash_linked_files(files, repo_path.as_deref());

    let mut meta = Metadata::new();
    meta.set_str("type", "insight");
    meta.set_str("title", title.unwrap_or(""));
    meta.set_str("files", serde_json::to_string(files).unwrap_or_else(|_| "[]".into()));
    meta.set_str("tags", serde_json::to_string(tags).unwrap_or_else(|_| "[]".into()));
    meta.set_str(
        "file_hashes",
        serde_json::to_string(&file_hashes).unwrap_or_else(|_| "{}".into()),
    );
    meta.set_str("repository", repo.clone());
    meta.set_str("branch", branch);
    meta.set_str("created_at", timestamp.clone());
    meta.set_str("updated_at", timestamp.clone());
    meta.set_str("verified_at", timestamp.clone());
    meta.set_str("status", "active");
    if let Some(commit) = commit {
        meta.set_str("created_commit", commit);
    }

    let tag = initiative_tag(services, &repo, initiative, &timestamp);
    if let Some((id, name)) = &tag {
        meta.set_str("initiative_id", id.clone());
        meta.set_str("initiative_name", name.clone());
    }

    services.store.upsert(&insight_id, &text, meta, None)?;
    services.mark_index_dirty();
    tracing::info!("Insight saved: {}", insight_id);

    Ok(SavedMemory {
        status: "saved",
        id: insight_id,
        kind: "insight",
        title: title.map(str::to_string),
        repository: repo,
        files: files.to_vec(),
        tags: tags.to_vec(),
        initiative: tag.map(|(id, name)| InitiativeTag {
            id,
            name,
            completion_signal_detected: None,
            prompt: None,
        }),
    })
}

/// Save an end-of-session summary. Completion signals in the summary
/// produce a `mark_complete` prompt on the tagged initiative.
pub async fn conclude_session(
    services: &Services,
    summary: &str,
    changed_files: &[String],
    repository: Option<&str>,
    initiative: Option<&str>,
) -> Result<ConcludedSession> {
    let repo = resolve_repository(services, repository).await;
    tracing::info!(
        "Saving session summary: {} files, repository={}",
        changed_files.len(),
        repo
    );

    let session_id = new_doc_id(DocType::SessionSummary);
    let (branch, commit, _) = branch_and_commit(services, &repo).await;
    let timestamp = now_rfc3339();

    let text = format!(
        "Session Summary:\n\n{}\n\nChanged files: {}",
        scrub_secrets(summary),
        changed_files.join(", ")
    );

    let mut meta = Metadata::new();
    meta.set_str("type", "session_summary");
    meta.set_str("repository", repo.clone());
    meta.set_str("branch", branch);
    meta.set_str(
        "files",
        serde_json::to_string(changed_files).unwrap_or_else(|_| "[]".into()),
    );
    meta.set_str("created_at", timestamp.clone());
    meta.set_str("updated_at", timestamp.clone());
    meta.set_str("status", "active");
    if let Some(commit) = commit {
        meta.set_str("created_commit", commit);
    }

    let tag = initiative_tag(services, &repo, initiative, &timestamp);
    if let Some((id, name)) = &tag {
        meta.set_str("initiative_id", id.clone());
        meta.set_str("initiative_name", name.clone());
    }

    services.store.upsert(&session_id, &text, meta, None)?;
    services.mark_index_dirty();
    tracing::info!("Session summary saved: {}", session_id);

    let initiative = tag.map(|(id, name)| {
        let signal = detect_completion_signals(summary);
        InitiativeTag {
            id,
            name,
            completion_signal_detected: Some(signal),
            prompt: signal.then_some("mark_complete"),
        }
    });

    Ok(ConcludedSession {
        status: "success",
        session_id,
        summary_saved: true,
        files_recorded: changed_files.len(),
        repository: repo,
        initiative,
    })
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Record the outcome of re-verifying an insight against the current code.
///
/// `still_valid` refreshes file hashes and the commit reference;
/// `no_longer_valid` with `deprecate` marks the insight deprecated and
/// optionally saves a replacement, wiring `superseded_by` on the original.
pub async fn validate_insight(
    services: &Services,
    insight_id: &str,
    validation_result: &str,
    notes: Option<&str>,
    deprecate: bool,
    replacement_insight: Option<&str>,
    repository: Option<&str>,
) -> Result<ValidatedInsight> {
    if !matches!(
        validation_result,
        "still_valid" | "partially_valid" | "no_longer_valid"
    ) {
        return Err(MemoryError::UnknownValidationResult(
            validation_result.to_string(),
        ));
    }

    let repo = resolve_repository(services, repository).await;
    tracing::info!("Validating insight: {} -> {}", insight_id, validation_result);

    let store = &services.store;
    let Some((text, mut meta)) = store.get_one(insight_id)? else {
        return Err(MemoryError::NotFound(insight_id.to_string()));
    };

    let doc_type = meta.str_of("type").unwrap_or("").to_string();
    if doc_type != "insight" {
        return Err(MemoryError::NotAnInsight(insight_id.to_string(), doc_type));
    }

    let timestamp = now_rfc3339();
    meta.set_str("verified_at", timestamp.clone());
    meta.set_str("updated_at", timestamp.clone());
    meta.set_str("last_validation_result", validation_result);
    if meta.str_of("created_at").unwrap_or("").is_empty() {
        meta.set_str("created_at", timestamp.clone());
    }
    if let Some(notes) = notes {
        meta.set_str("validation_notes", notes);
    }

    let mut response = ValidatedInsight {
        status: "validated",
        insight_id: insight_id.to_string(),
        validation_result: validation_result.to_string(),
        verified_at: timestamp.clone(),
        deprecated: None,
        replacement_id: None,
        file_hashes_refreshed: None,
    };

    if validation_result == "no_longer_valid" && deprecate {
        meta.set_str("status", "deprecated");
        meta.set_str("deprecated_at", timestamp.clone());
        meta.set_str(
            "deprecation_reason",
            notes.unwrap_or("Marked invalid during validation"),
        );
        response.deprecated = Some(true);
        tracing::info!("Deprecated insight: {}", insight_id);

        if let Some(replacement) = replacement_insight {
            let linked_files = meta.json_list_of("files");
            let tags = meta.json_list_of("tags");
            let title = meta
                .str_of("title")
                .filter(|t| !t.is_empty())
                .map(|t| format!("{t} (Updated)"));
            let insight_repo = meta.str_of("repository").unwrap_or(&repo).to_string();

            let saved = Box::pin(save_insight(
                services,
                replacement,
                &linked_files,
                title.as_deref(),
                &tags,
                Some(&insight_repo),
                None,
            ))
            .await?;

            meta.set_str("superseded_by", saved.id.clone());
            response.replacement_id = Some(saved.id);
        }
    } else if validation_result == "still_valid" {
        let linked_files = meta.json_list_of("files");
        let insight_repo = meta.str_of("repository").unwrap_or(repo.as_str()).to_string();
        let repo_path = services.repo_path(Some(&insight_repo)).await;

        if !linked_files.is_empty() {
            let refreshed = hash_linked_files(&linked_files, repo_path.as_deref());
            meta.set_str(
                "file_hashes",
                serde_json::to_string(&refreshed).unwrap_or_else(|_| "{}".into()),
            );
            response.file_hashes_refreshed = Some(true);
        }

        if let Some(path) = &repo_path {
            if let Some(commit) = vcs::head_commit(path).await {
                meta.set_str("created_commit", commit);
            }
        }
        tracing::info!("Insight validated as still valid: {}", insight_id);
    }

    let embedding = store.get_embedding(insight_id)?;
    store.upsert(insight_id, &text, meta, embedding)?;
    services.mark_index_dirty();

    Ok(response)
}

/// Hash linked files relative to the repository root; unreadable or
/// missing files are omitted.
fn hash_linked_files(files: &[String], repo_path: Option<&Path>) -> HashMap<String, String> {
    let mut hashes = HashMap::new();
    let Some(repo_path) = repo_path else {
        return hashes;
    };

    for file in files {
        let p = Path::new(file);
        let full = if p.is_absolute() {
            p.to_path_buf()
        } else {
            repo_path.join(p)
        };
        if !full.exists() {
            continue;
        }
        match compute_file_hash(&full) {
            Ok(hash) => {
                hashes.insert(file.clone(), hash);
            }
            Err(e) => tracing::warn!("Could not hash {}: {}", file, e),
        }
    }

    hashes
}

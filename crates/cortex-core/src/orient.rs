//! Session Orientation
//!
//! Composes everything the assistant needs at session start: index
//! status, reindex signals (branch switch, new commits, file-count
//! drift), the repository skeleton and tech stack, the focused
//! initiative with its inactivity staleness, and recent work highlights.
//! Every sub-fetch is guarded so one failure degrades instead of
//! erroring the whole orientation.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::delta::DeltaState;
use crate::documents::MetadataExt;
use crate::initiative::{self, STALE_THRESHOLD_DAYS, check_initiative_staleness};
use crate::services::Services;
use crate::store::{Filter, Store};
use crate::vcs;

/// Tracked-file-count drift beyond this triggers a reindex prompt
const FILE_COUNT_DRIFT_THRESHOLD: u64 = 5;

/// Recent-work window (days) and item cap
const RECENT_WORK_DAYS: i64 = 7;
const RECENT_WORK_LIMIT: usize = 5;

// ============================================================================
// RESPONSE SHAPES
// ============================================================================

#[derive(Debug, Serialize)]
pub struct OrientSkeleton {
    pub tree: String,
    pub total_files: i64,
    pub total_dirs: i64,
    pub branch: String,
}

#[derive(Debug, Serialize)]
pub struct FocusedInitiativeInfo {
    pub id: String,
    pub name: String,
    pub goal: String,
    pub status: String,
    pub updated_at: String,
    pub days_inactive: i64,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ActiveInitiativeInfo {
    pub id: String,
    pub name: String,
    pub goal: String,
}

/// The orientation payload
#[derive(Debug, Serialize)]
pub struct OrientResponse {
    pub repository: String,
    pub branch: String,
    pub indexed: bool,
    pub last_indexed: String,
    pub file_count: usize,
    pub needs_reindex: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reindex_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skeleton: Option<OrientSkeleton>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_set_context: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recent_work: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused_initiative: Option<FocusedInitiativeInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub active_initiatives: Vec<ActiveInitiativeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OrientResponse {
    fn degraded(error: String) -> Self {
        Self {
            repository: String::new(),
            branch: "unknown".to_string(),
            indexed: false,
            last_indexed: "never".to_string(),
            file_count: 0,
            needs_reindex: false,
            reindex_reason: None,
            skeleton: None,
            tech_stack: None,
            prompt_set_context: None,
            recent_work: vec![],
            focused_initiative: None,
            active_initiatives: vec![],
            error: Some(error),
        }
    }
}

// ============================================================================
// ORIENT
// ============================================================================

/// Orient a session for the given project path.
pub async fn orient(services: &Services, project_path: &str) -> OrientResponse {
    let path = Path::new(project_path);
    let repository = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_default();
    if repository.is_empty() {
        return OrientResponse::degraded(format!("Invalid project path: {project_path}"));
    }

    tracing::info!("Orienting session for: {}", project_path);

    let current_branch = vcs::current_branch(path).await;
    let state = DeltaState::load(&services.state_file());

    let indexed = state.repository.as_deref() == Some(repository.as_str())
        && (state.indexed_commit.is_some() || !state.file_hashes.is_empty());
    let last_indexed = indexed.then(|| state.indexed_at.clone()).flatten();
    let indexed_branch = if indexed { state.branch.clone() } else { None };
    let indexed_file_count = if indexed { state.file_hashes.len() } else { 0 };

    // Reindex signals
    let mut needs_reindex = false;
    let mut reasons: Vec<String> = vec![];

    if indexed {
        if let Some(last_indexed_at) = &last_indexed {
            if let Some(old_branch) = &indexed_branch {
                if old_branch != &current_branch {
                    needs_reindex = true;
                    reasons.push(format!("Branch changed: {old_branch} -> {current_branch}"));
                }
            }

            let commits = vcs::commits_since(path, last_indexed_at).await;
            if commits > 0 {
                needs_reindex = true;
                reasons.push(format!("{commits} new commit(s) since last index"));

                let merges = vcs::merge_commits_since(path, last_indexed_at).await;
                if merges > 0 {
                    reasons.push(format!("Including {merges} merge commit(s)"));
                }
            }

            let tracked = vcs::tracked_file_count(path).await;
            let drift = tracked.abs_diff(indexed_file_count as u64);
            if drift > FILE_COUNT_DRIFT_THRESHOLD {
                needs_reindex = true;
                reasons.push(format!(
                    "File count changed: {indexed_file_count} -> {tracked}"
                ));
            }
        }
    }

    let store = &services.store;
    let skeleton = fetch_skeleton(store, &repository, &current_branch);
    let tech_stack = fetch_tech_stack(store, &repository);
    let focused_initiative = fetch_focused_initiative(store, &repository);
    let active_initiatives = fetch_active_initiatives(store, &repository);
    let recent_work = fetch_recent_work(store, &repository);

    let response = OrientResponse {
        prompt_set_context: tech_stack.is_none().then_some(
            "No repo context set. Use configure_cortex to describe this project's tech stack and patterns.",
        ),
        repository,
        branch: current_branch,
        indexed,
        last_indexed: last_indexed.unwrap_or_else(|| "never".to_string()),
        file_count: indexed_file_count,
        needs_reindex,
        reindex_reason: (!reasons.is_empty()).then(|| reasons.join("; ")),
        skeleton,
        tech_stack,
        recent_work,
        focused_initiative,
        active_initiatives,
        error: None,
    };

    tracing::info!(
        "Orient complete: indexed={}, needs_reindex={}",
        response.indexed,
        response.needs_reindex
    );
    response
}

// ============================================================================
// GUARDED SUB-FETCHES
// ============================================================================

fn fetch_skeleton(store: &Store, repository: &str, branch: &str) -> Option<OrientSkeleton> {
    let direct_id = format!("{repository}:skeleton:{branch}");
    let result = store
        .get(&[&direct_id], false)
        .ok()
        .filter(|r| !r.is_empty())
        .or_else(|| {
            let filter = Filter::and(vec![
                Filter::eq("type", "skeleton"),
                Filter::eq("repository", repository),
            ]);
            store.get_where(Some(&filter), Some(1)).ok()
        })?;

    if result.is_empty() {
        return None;
    }
    let meta = &result.metadatas[0];
    Some(OrientSkeleton {
        tree: result.texts[0].clone(),
        total_files: meta.i64_of("total_files").unwrap_or(0),
        total_dirs: meta.i64_of("total_dirs").unwrap_or(0),
        branch: meta.str_of("branch").unwrap_or("unknown").to_string(),
    })
}

fn fetch_tech_stack(store: &Store, repository: &str) -> Option<String> {
    let doc_id = format!("{repository}:tech_stack");
    let result = store.get(&[&doc_id], false).ok()?;
    (!result.is_empty()).then(|| result.texts[0].clone())
}

fn fetch_focused_initiative(store: &Store, repository: &str) -> Option<FocusedInitiativeInfo> {
    let initiative_id = initiative::focus_id(store, repository)?;
    let result = store.get(&[&initiative_id], false).ok().filter(|r| !r.is_empty())?;
    let meta = &result.metadatas[0];

    let updated_at = meta.str_of("updated_at").unwrap_or("").to_string();
    let (stale, days_inactive) = check_initiative_staleness(&updated_at, STALE_THRESHOLD_DAYS);

    Some(FocusedInitiativeInfo {
        id: initiative_id,
        name: meta.str_of("name").unwrap_or("").to_string(),
        goal: meta.str_of("goal").unwrap_or("").to_string(),
        status: meta.str_of("status").unwrap_or("active").to_string(),
        updated_at,
        days_inactive,
        stale,
        prompt: stale.then_some("still_working_or_complete"),
    })
}

fn fetch_active_initiatives(store: &Store, repository: &str) -> Vec<ActiveInitiativeInfo> {
    let filter = Filter::and(vec![
        Filter::eq("type", "initiative"),
        Filter::eq("repository", repository),
        Filter::eq("status", "active"),
    ]);
    let Ok(result) = store.get_where(Some(&filter), None) else {
        return vec![];
    };

    result
        .ids
        .iter()
        .zip(result.metadatas.iter())
        .map(|(id, meta)| ActiveInitiativeInfo {
            id: id.clone(),
            name: meta.str_of("name").unwrap_or("").to_string(),
            goal: meta.str_of("goal").unwrap_or("").to_string(),
        })
        .collect()
}

/// Brief highlights of the last week's notes and session summaries.
fn fetch_recent_work(store: &Store, repository: &str) -> Vec<String> {
    let filter = Filter::and(vec![
        Filter::eq("repository", repository),
        Filter::is_in("type", ["note", "session_summary"]),
    ]);
    let Ok(result) = store.get_where(Some(&filter), None) else {
        return vec![];
    };

    let cutoff = Utc::now() - Duration::days(RECENT_WORK_DAYS);
    let mut items: Vec<(String, String)> = vec![];

    for ((_, text), meta) in result
        .ids
        .iter()
        .zip(result.texts.iter())
        .zip(result.metadatas.iter())
    {
        let Some(created_at) = meta.str_of("created_at") else { continue };
        let Ok(created) = DateTime::parse_from_rfc3339(created_at) else { continue };
        if created.with_timezone(&Utc) < cutoff {
            continue;
        }

        let highlight = match meta.str_of("title").filter(|t| !t.is_empty()) {
            Some(title) => title.to_string(),
            None => extract_highlight(text),
        };
        if !highlight.is_empty() {
            items.push((created_at.to_string(), highlight));
        }
    }

    items.sort_by(|a, b| b.0.cmp(&a.0));
    items.truncate(RECENT_WORK_LIMIT);
    items.into_iter().map(|(_, highlight)| highlight).collect()
}

/// First meaningful line of a document body, skipping the
/// "Session Summary:" preamble.
fn extract_highlight(text: &str) -> String {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let Some(first) = lines.next() else {
        return String::new();
    };
    let line = if first.to_lowercase().starts_with("session summary") {
        lines.next().unwrap_or(first)
    } else {
        first
    };
    line.chars().take(100).collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_highlight_skips_preamble() {
        let text = "Session Summary:\n\nImplemented JWT refresh\n\nChanged files: a.py";
        assert_eq!(extract_highlight(text), "Implemented JWT refresh");
    }

    #[test]
    fn test_extract_highlight_plain() {
        assert_eq!(extract_highlight("Decision: use RS256\nbecause..."), "Decision: use RS256");
        assert_eq!(extract_highlight("   \n\n"), "");
    }
}

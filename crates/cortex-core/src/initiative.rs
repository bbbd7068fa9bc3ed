//! Initiative Management
//!
//! Initiatives are multi-session workstreams (migrations, features,
//! refactors) acting as a cross-document tag. Each repository has at most
//! one `focus` document pointing at the currently active initiative; new
//! notes, insights, and session summaries inherit that tag.

use serde::Serialize;

use crate::documents::{DocType, Metadata, MetadataExt, new_doc_id, now_rfc3339};
use crate::services::Services;
use crate::store::{Filter, Store, StoreError};
use crate::vcs;

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

/// Days of inactivity after which an active initiative is considered stale
pub const STALE_THRESHOLD_DAYS: i64 = 5;

/// Whole-word completion signals scanned in session summaries
const COMPLETION_SIGNALS: &[&str] = &[
    "complete", "completed", "done", "finished", "shipped", "merged", "released", "wrapped up",
    "closes",
];

static COMPLETION_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = COMPLETION_SIGNALS
        .iter()
        .map(|s| regex::escape(s))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("static pattern must compile")
});

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Initiative operation errors
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum InitiativeError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("Initiative '{0}' not found")]
    NotFound(String),
    #[error("Initiative '{0}' is already completed")]
    AlreadyCompleted(String),
    #[error("Cannot focus completed initiative '{0}'")]
    FocusCompleted(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Initiative result type
pub type Result<T> = std::result::Result<T, InitiativeError>;

// ============================================================================
// RESPONSE SHAPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct FocusInfo {
    pub initiative_id: String,
    pub initiative_name: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedInitiative {
    pub status: &'static str,
    pub initiative_id: String,
    pub name: String,
    pub goal: String,
    pub repository: String,
    pub focused: bool,
}

#[derive(Debug, Serialize)]
pub struct InitiativeSummary {
    pub id: String,
    pub name: String,
    pub goal: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: String,
    pub session_summary_count: usize,
    pub note_count: usize,
}

#[derive(Debug, Serialize)]
pub struct InitiativeList {
    pub repository: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused: Option<FocusInfo>,
    pub initiatives: Vec<InitiativeSummary>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ContextItem {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub created_at: String,
    pub preview: String,
}

#[derive(Debug, Serialize)]
pub struct FocusedInitiative {
    pub status: &'static str,
    pub initiative_id: String,
    pub name: String,
    pub goal: String,
    pub repository: String,
    pub recent_context: Vec<ContextItem>,
}

#[derive(Debug, Serialize)]
pub struct ArchiveStats {
    pub session_summary_count: usize,
    pub note_count: usize,
    pub duration: String,
}

#[derive(Debug, Serialize)]
pub struct CompletedInitiative {
    pub status: &'static str,
    pub initiative_id: String,
    pub name: String,
    pub repository: String,
    pub summary: String,
    pub archive: ArchiveStats,
}

#[derive(Debug, Serialize)]
pub struct InitiativeReport {
    pub initiative_id: String,
    pub name: String,
    pub status: String,
    pub narrative: String,
    pub session_summary_count: usize,
    pub note_count: usize,
    pub timeline: Vec<ContextItem>,
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Create an initiative, focusing it by default.
pub async fn create(
    services: &Services,
    repository: &str,
    name: &str,
    goal: &str,
    auto_focus: bool,
) -> Result<CreatedInitiative> {
    if repository.is_empty() {
        return Err(InitiativeError::MissingField("repository"));
    }
    if name.is_empty() {
        return Err(InitiativeError::MissingField("initiative name"));
    }

    let store = &services.store;
    let repo_path = services.repo_path(Some(repository)).await;
    let branch = match &repo_path {
        Some(p) => vcs::current_branch(p).await,
        None => "unknown".to_string(),
    };
    let timestamp = now_rfc3339();
    let initiative_id = new_doc_id(DocType::Initiative);

    let mut text = name.to_string();
    if !goal.is_empty() {
        text.push_str(&format!("\n\nGoal: {goal}"));
    }

    let mut meta = Metadata::new();
    meta.set_str("type", "initiative");
    meta.set_str("repository", repository);
    meta.set_str("name", name);
    meta.set_str("goal", goal);
    meta.set_str("status", "active");
    meta.set_str("completion_summary", "");
    meta.set_str("branch", branch);
    meta.set_str("created_at", timestamp.clone());
    meta.set_str("updated_at", timestamp.clone());
    meta.set_str("completed_at", "");

    store.upsert(&initiative_id, &text, meta, None)?;
    tracing::info!("Initiative created: {} ({})", initiative_id, name);

    let focused = if auto_focus {
        set_focus(store, repository, &initiative_id, name, &timestamp)?;
        true
    } else {
        false
    };

    services.mark_index_dirty();

    Ok(CreatedInitiative {
        status: "created",
        initiative_id,
        name: name.to_string(),
        goal: goal.to_string(),
        repository: repository.to_string(),
        focused,
    })
}

/// List initiatives for a repository, newest activity first, with derived
/// per-initiative document counts and the current focus.
pub fn list(services: &Services, repository: &str, status: &str) -> Result<InitiativeList> {
    if repository.is_empty() {
        return Err(InitiativeError::MissingField("repository"));
    }

    let store = &services.store;
    let mut conditions = vec![
        Filter::eq("type", "initiative"),
        Filter::eq("repository", repository),
    ];
    match status {
        "active" => conditions.push(Filter::eq("status", "active")),
        "completed" => conditions.push(Filter::eq("status", "completed")),
        _ => {}
    }

    let results = store.get_where(Some(&Filter::and(conditions)), None)?;

    let mut initiatives = Vec::with_capacity(results.len());
    for (id, meta) in results.ids.iter().zip(results.metadatas.iter()) {
        let (session_summary_count, note_count) = count_items(store, id)?;
        initiatives.push(InitiativeSummary {
            id: id.clone(),
            name: meta.str_of("name").unwrap_or("").to_string(),
            goal: meta.str_of("goal").unwrap_or("").to_string(),
            status: meta.str_of("status").unwrap_or("active").to_string(),
            created_at: meta.str_of("created_at").unwrap_or("").to_string(),
            updated_at: meta.str_of("updated_at").unwrap_or("").to_string(),
            completed_at: meta.str_of("completed_at").unwrap_or("").to_string(),
            session_summary_count,
            note_count,
        });
    }

    initiatives.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    let total = initiatives.len();

    Ok(InitiativeList {
        repository: repository.to_string(),
        focused: get_focus(store, repository)?,
        initiatives,
        total,
    })
}

/// Focus an initiative for a repository. Completed initiatives cannot be
/// focused.
pub fn focus(services: &Services, repository: &str, initiative: &str) -> Result<FocusedInitiative> {
    if repository.is_empty() {
        return Err(InitiativeError::MissingField("repository"));
    }
    if initiative.is_empty() {
        return Err(InitiativeError::MissingField("initiative"));
    }

    let store = &services.store;
    let found = find_initiative(store, Some(repository), initiative)?
        .ok_or_else(|| InitiativeError::NotFound(initiative.to_string()))?;

    let name = found.meta.str_of("name").unwrap_or("").to_string();
    if found.meta.str_of("status") == Some("completed") {
        return Err(InitiativeError::FocusCompleted(name));
    }

    set_focus(store, repository, &found.id, &name, &now_rfc3339())?;

    Ok(FocusedInitiative {
        status: "focused",
        recent_context: recent_context(store, &found.id, 5)?,
        goal: found.meta.str_of("goal").unwrap_or("").to_string(),
        initiative_id: found.id,
        name,
        repository: repository.to_string(),
    })
}

/// Complete an initiative with a summary. Terminal: re-completion is
/// rejected. Clears the focus when this initiative was focused.
pub fn complete(
    services: &Services,
    initiative: &str,
    summary: &str,
    repository: Option<&str>,
) -> Result<CompletedInitiative> {
    if initiative.is_empty() {
        return Err(InitiativeError::MissingField("initiative"));
    }
    if summary.is_empty() {
        return Err(InitiativeError::MissingField("completion summary"));
    }

    let store = &services.store;
    let found = find_initiative(store, repository, initiative)?
        .ok_or_else(|| InitiativeError::NotFound(initiative.to_string()))?;

    let name = found.meta.str_of("name").unwrap_or("").to_string();
    if found.meta.str_of("status") == Some("completed") {
        return Err(InitiativeError::AlreadyCompleted(name));
    }

    let repo = found
        .meta
        .str_of("repository")
        .map(str::to_string)
        .or_else(|| repository.map(str::to_string))
        .unwrap_or_default();
    let timestamp = now_rfc3339();
    let created_at = found.meta.str_of("created_at").unwrap_or("").to_string();

    let goal = found.meta.str_of("goal").unwrap_or("").to_string();
    let text = format!("{name}\n\nGoal: {goal}\n\nCompletion Summary: {summary}");

    let mut meta = found.meta.clone();
    meta.set_str("status", "completed");
    meta.set_str("completion_summary", summary);
    meta.set_str("updated_at", timestamp.clone());
    meta.set_str("completed_at", timestamp.clone());
    store.upsert(&found.id, &text, meta, None)?;

    // Completing the focused initiative must drop the focus pointer
    if let Some(current) = get_focus(store, &repo)? {
        if current.initiative_id == found.id {
            clear_focus(store, &repo)?;
        }
    }

    let (session_summary_count, note_count) = count_items(store, &found.id)?;
    services.mark_index_dirty();

    Ok(CompletedInitiative {
        status: "completed",
        initiative_id: found.id,
        name,
        repository: repo,
        summary: summary.to_string(),
        archive: ArchiveStats {
            session_summary_count,
            note_count,
            duration: format_duration(&created_at, &timestamp),
        },
    })
}

/// Narrative summary of an initiative with its tagged-document timeline.
pub fn summarize(
    services: &Services,
    repository: Option<&str>,
    initiative: &str,
) -> Result<InitiativeReport> {
    let store = &services.store;
    let found = find_initiative(store, repository, initiative)?
        .ok_or_else(|| InitiativeError::NotFound(initiative.to_string()))?;

    let name = found.meta.str_of("name").unwrap_or("").to_string();
    let status = found.meta.str_of("status").unwrap_or("active").to_string();
    let goal = found.meta.str_of("goal").unwrap_or("").to_string();
    let (session_summary_count, note_count) = count_items(store, &found.id)?;

    let mut timeline = recent_context(store, &found.id, usize::MAX)?;
    timeline.reverse(); // oldest first for a readable history

    let span = match (found.meta.str_of("created_at"), found.meta.str_of("completed_at")) {
        (Some(created), Some(completed)) if !completed.is_empty() => {
            format!(" over {}", format_duration(created, completed))
        }
        (Some(created), _) => format!(" over {}", format_duration(created, &now_rfc3339())),
        _ => String::new(),
    };

    let narrative = format!(
        "Initiative '{name}' ({status}){}: {session_summary_count} session(s) and \
         {note_count} note(s){span}.",
        if goal.is_empty() {
            String::new()
        } else {
            format!(" - goal: {goal}")
        }
    );

    Ok(InitiativeReport {
        initiative_id: found.id,
        name,
        status,
        narrative,
        session_summary_count,
        note_count,
        timeline,
    })
}

// ============================================================================
// HELPERS
// ============================================================================

/// A located initiative document
pub struct FoundInitiative {
    pub id: String,
    pub text: String,
    pub meta: Metadata,
}

/// Find an initiative by id (`initiative:` prefix) or by name within a
/// repository.
pub fn find_initiative(
    store: &Store,
    repository: Option<&str>,
    initiative: &str,
) -> std::result::Result<Option<FoundInitiative>, StoreError> {
    if initiative.starts_with("initiative:") {
        let result = store.get(&[initiative], false)?;
        if !result.is_empty() {
            let mut result = result;
            return Ok(Some(FoundInitiative {
                id: result.ids.remove(0),
                text: result.texts.remove(0),
                meta: result.metadatas.remove(0),
            }));
        }
    }

    let mut conditions = vec![Filter::eq("type", "initiative"), Filter::eq("name", initiative)];
    if let Some(repo) = repository {
        conditions.push(Filter::eq("repository", repo));
    }

    let mut result = store.get_where(Some(&Filter::and(conditions)), Some(1))?;
    if result.is_empty() {
        return Ok(None);
    }
    Ok(Some(FoundInitiative {
        id: result.ids.remove(0),
        text: result.texts.remove(0),
        meta: result.metadatas.remove(0),
    }))
}

/// Current focus for a repository, if any.
pub fn get_focus(store: &Store, repository: &str) -> std::result::Result<Option<FocusInfo>, StoreError> {
    let focus_id = format!("{repository}:focus");
    let result = store.get(&[&focus_id], false)?;
    if result.is_empty() {
        return Ok(None);
    }
    let meta = &result.metadatas[0];
    Ok(Some(FocusInfo {
        initiative_id: meta.str_of("initiative_id").unwrap_or("").to_string(),
        initiative_name: meta.str_of("initiative_name").unwrap_or("").to_string(),
    }))
}

/// Focused initiative id for a repository, if any.
pub fn focus_id(store: &Store, repository: &str) -> Option<String> {
    get_focus(store, repository)
        .ok()
        .flatten()
        .map(|f| f.initiative_id)
        .filter(|id| !id.is_empty())
}

pub(crate) fn set_focus(
    store: &Store,
    repository: &str,
    initiative_id: &str,
    initiative_name: &str,
    timestamp: &str,
) -> std::result::Result<(), StoreError> {
    let focus_doc_id = format!("{repository}:focus");
    let mut meta = Metadata::new();
    meta.set_str("type", "focus");
    meta.set_str("repository", repository);
    meta.set_str("initiative_id", initiative_id);
    meta.set_str("initiative_name", initiative_name);
    meta.set_str("created_at", timestamp);
    meta.set_str("updated_at", timestamp);

    store.upsert(
        &focus_doc_id,
        &format!("Current focus: {initiative_name}"),
        meta,
        None,
    )
}

pub(crate) fn clear_focus(store: &Store, repository: &str) -> std::result::Result<(), StoreError> {
    let focus_doc_id = format!("{repository}:focus");
    store.delete(&[&focus_doc_id])?;
    Ok(())
}

/// Session-summary and note counts for an initiative
pub fn count_items(store: &Store, initiative_id: &str) -> std::result::Result<(usize, usize), StoreError> {
    let sessions = store.count_where(&Filter::and(vec![
        Filter::eq("type", "session_summary"),
        Filter::eq("initiative_id", initiative_id),
    ]))?;
    let notes = store.count_where(&Filter::and(vec![
        Filter::eq("type", "note"),
        Filter::eq("initiative_id", initiative_id),
    ]))?;
    Ok((sessions, notes))
}

/// Most recent tagged documents for an initiative, 200-char previews.
fn recent_context(
    store: &Store,
    initiative_id: &str,
    limit: usize,
) -> std::result::Result<Vec<ContextItem>, StoreError> {
    let filter = Filter::and(vec![
        Filter::eq("initiative_id", initiative_id),
        Filter::is_in("type", ["session_summary", "note", "insight"]),
    ]);
    let results = store.get_where(Some(&filter), None)?;

    let mut items: Vec<ContextItem> = results
        .ids
        .into_iter()
        .zip(results.texts)
        .zip(results.metadatas)
        .map(|((id, text), meta)| {
            let preview = if text.chars().count() > 200 {
                let truncated: String = text.chars().take(200).collect();
                format!("{truncated}...")
            } else {
                text
            };
            ContextItem {
                id,
                doc_type: meta.str_of("type").unwrap_or("").to_string(),
                created_at: meta.str_of("created_at").unwrap_or("").to_string(),
                preview,
            }
        })
        .collect();

    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items.truncate(limit);
    Ok(items)
}

/// Refresh an initiative's `updated_at` (called when tagged documents are
/// written).
pub(crate) fn touch_initiative(store: &Store, initiative_id: &str, timestamp: &str) {
    let result = (|| -> std::result::Result<(), StoreError> {
        let Some((text, mut meta)) = store.get_one(initiative_id)? else {
            return Ok(());
        };
        let embedding = store.get_embedding(initiative_id)?;
        meta.set_str("updated_at", timestamp);
        store.upsert(initiative_id, &text, meta, embedding)
    })();

    if let Err(e) = result {
        tracing::warn!("Failed to touch initiative {}: {}", initiative_id, e);
    }
}

/// Resolve an initiative argument to `(id, name)`.
///
/// Order: explicit id, explicit name within the repository, then the
/// current focus.
pub fn resolve_initiative(
    store: &Store,
    repository: &str,
    initiative: Option<&str>,
) -> (Option<String>, Option<String>) {
    if let Some(arg) = initiative.filter(|s| !s.is_empty()) {
        match find_initiative(store, Some(repository), arg) {
            Ok(Some(found)) => {
                let name = found.meta.str_of("name").map(str::to_string);
                return (Some(found.id), name);
            }
            Ok(None) => {
                tracing::debug!("Initiative '{}' not found in {}", arg, repository);
                return (None, None);
            }
            Err(e) => {
                tracing::warn!("Initiative lookup failed: {}", e);
                return (None, None);
            }
        }
    }

    match get_focus(store, repository) {
        Ok(Some(focus)) if !focus.initiative_id.is_empty() => {
            (Some(focus.initiative_id), Some(focus.initiative_name))
        }
        _ => (None, None),
    }
}

/// True when the text contains a completion signal as a whole word.
pub fn detect_completion_signals(text: &str) -> bool {
    COMPLETION_RE.is_match(text)
}

/// `(is_stale, days_inactive)` from an initiative's `updated_at`.
pub fn check_initiative_staleness(updated_at: &str, threshold_days: i64) -> (bool, i64) {
    let Ok(updated) = DateTime::parse_from_rfc3339(updated_at) else {
        return (false, 0);
    };
    let days = (Utc::now() - updated.with_timezone(&Utc)).num_days();
    (days >= threshold_days, days)
}

/// Human-readable duration between two RFC 3339 timestamps.
pub fn format_duration(created_at: &str, completed_at: &str) -> String {
    let parse = |s: &str| DateTime::parse_from_rfc3339(s).map(|d| d.with_timezone(&Utc));
    let (Ok(created), Ok(completed)) = (parse(created_at), parse(completed_at)) else {
        return "unknown".to_string();
    };

    let delta = completed - created;
    let days = delta.num_days();
    if days == 0 {
        let hours = delta.num_hours();
        if hours == 0 {
            "less than 1 hour".to_string()
        } else if hours == 1 {
            "1 hour".to_string()
        } else {
            format!("{hours} hours")
        }
    } else if days == 1 {
        "1 day".to_string()
    } else if days < 7 {
        format!("{days} days")
    } else if days < 30 {
        let weeks = days / 7;
        if weeks == 1 {
            "1 week".to_string()
        } else {
            format!("{weeks} weeks")
        }
    } else {
        let months = days / 30;
        if months == 1 {
            "1 month".to_string()
        } else {
            format!("{months} months")
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_signals_whole_words() {
        assert!(detect_completion_signals("Feature shipped to production"));
        assert!(detect_completion_signals("this CLOSES the migration"));
        assert!(detect_completion_signals("all wrapped up now"));
        // Substrings must not trigger
        assert!(!detect_completion_signals("the doneness of the steak"));
        assert!(!detect_completion_signals("still in progress"));
    }

    #[test]
    fn test_staleness_threshold() {
        let recent = Utc::now().to_rfc3339();
        let (stale, days) = check_initiative_staleness(&recent, STALE_THRESHOLD_DAYS);
        assert!(!stale);
        assert_eq!(days, 0);

        let old = (Utc::now() - chrono::Duration::days(10)).to_rfc3339();
        let (stale, days) = check_initiative_staleness(&old, STALE_THRESHOLD_DAYS);
        assert!(stale);
        assert_eq!(days, 10);

        assert_eq!(check_initiative_staleness("garbage", 5), (false, 0));
    }

    #[test]
    fn test_format_duration_buckets() {
        let base = Utc::now();
        let fmt = |minutes: i64| {
            format_duration(
                &base.to_rfc3339(),
                &(base + chrono::Duration::minutes(minutes)).to_rfc3339(),
            )
        };

        assert_eq!(fmt(30), "less than 1 hour");
        assert_eq!(fmt(90), "1 hour");
        assert_eq!(fmt(60 * 5), "5 hours");
        assert_eq!(fmt(60 * 24), "1 day");
        assert_eq!(fmt(60 * 24 * 3), "3 days");
        assert_eq!(fmt(60 * 24 * 14), "2 weeks");
        assert_eq!(fmt(60 * 24 * 70), "2 months");
        assert_eq!(format_duration("bad", "worse"), "unknown");
    }
}

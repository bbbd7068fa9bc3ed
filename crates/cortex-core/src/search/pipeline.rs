//! Search Pipeline
//!
//! The full retrieval path: context resolution (branch, initiative),
//! branch-aware filter construction, hybrid retrieval (vector + BM25),
//! RRF fusion, cross-encoder reranking, layered boosting, score
//! thresholding, staleness annotation, and response shaping with the
//! repository skeleton and context attached.

use serde::Serialize;

use crate::documents::{BRANCH_SCOPED_TYPES, CROSS_BRANCH_TYPES, MetadataExt};
use crate::initiative;
use crate::services::{ServiceError, Services};
use crate::staleness::{self, Staleness};
use crate::store::{Filter, Store, StoreError};
use crate::vcs;

use super::boosts::{
    apply_initiative_boost, apply_recency_boost, apply_type_boost, filter_by_initiative,
};
use super::hybrid::{Candidate, RRF_K, reciprocal_rank_fusion};

/// Returned result content is truncated to this many characters (2 KB)
const CONTENT_TRUNCATE_CHARS: usize = 2000;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Search pipeline errors
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Query cannot be empty")]
    EmptyQuery,
    #[error("Cortex is disabled")]
    Disabled,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

// ============================================================================
// REQUEST / RESPONSE
// ============================================================================

/// Search inputs
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub repository: Option<String>,
    pub branch: Option<String>,
    pub initiative: Option<String>,
    /// Explicit type allow-list; overrides `preset`
    pub types: Option<Vec<String>>,
    /// Named preset resolving to a type allow-list
    pub preset: Option<String>,
    pub min_score: Option<f64>,
    pub include_completed: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            include_completed: true,
            ..Default::default()
        }
    }
}

/// One shaped search result
#[derive(Debug, Serialize)]
pub struct SearchResultItem {
    pub content: String,
    pub file_path: String,
    pub repository: String,
    pub branch: String,
    pub language: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiative_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiative_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness: Option<Staleness>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_boost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recency_boost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiative_boost: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct StalenessSummary {
    pub verification_required_count: usize,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SkeletonData {
    pub repository: String,
    pub branch: String,
    pub total_files: i64,
    pub total_dirs: i64,
    pub tree: String,
}

#[derive(Debug, Serialize)]
pub struct TechStackContext {
    pub content: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct InitiativeContext {
    pub id: String,
    pub name: String,
    pub status: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct RepositoryContext {
    pub repository: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_stack: Option<TechStackContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiative: Option<InitiativeContext>,
}

/// Shaped search response
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResultItem>,
    pub total_candidates: usize,
    pub returned: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness_summary: Option<StalenessSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_skeleton: Option<SkeletonData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_context: Option<RepositoryContext>,
}

// ============================================================================
// PRESETS
// ============================================================================

/// Resolve a named preset to a type allow-list. `all` (and unknown names)
/// mean no restriction.
pub fn resolve_preset(preset: &str) -> Option<Vec<String>> {
    let types: &[&str] = match preset {
        "code" => &[
            "code",
            "entry_point",
            "file_metadata",
            "dependency",
            "data_contract",
            "skeleton",
        ],
        "memory" => &["note", "insight", "session_summary"],
        "context" => &["tech_stack", "skeleton", "initiative"],
        _ => return None,
    };
    Some(types.iter().map(|s| s.to_string()).collect())
}

// ============================================================================
// FILTER CONSTRUCTION
// ============================================================================

/// Build a filter that applies branch scoping only to code-family types.
/// Semantic memory types are always cross-branch.
pub fn build_branch_aware_filter(
    repository: Option<&str>,
    branches: &[String],
    types: Option<&[String]>,
) -> Option<Filter> {
    let branch_values: Vec<&str> = branches.iter().map(String::as_str).collect();
    let branch_filtering = !branches.is_empty() && branches != ["unknown"];

    let type_filter = if let Some(types) = types {
        let branch_types: Vec<&String> = types
            .iter()
            .filter(|t| BRANCH_SCOPED_TYPES.contains(&t.as_str()))
            .collect();
        let cross_types: Vec<&String> = types
            .iter()
            .filter(|t| !BRANCH_SCOPED_TYPES.contains(&t.as_str()))
            .collect();

        if !branch_types.is_empty() && branch_filtering {
            let mut conditions = vec![Filter::and(vec![
                Filter::is_in("type", branch_types.iter().map(|t| t.as_str())),
                Filter::is_in("branch", branch_values.clone()),
            ])];
            if !cross_types.is_empty() {
                conditions.push(Filter::is_in("type", cross_types.iter().map(|t| t.as_str())));
            }
            Some(if conditions.len() > 1 {
                Filter::or(conditions)
            } else {
                conditions.remove(0)
            })
        } else {
            Some(Filter::is_in("type", types.iter().map(String::as_str)))
        }
    } else if branch_filtering {
        Some(Filter::or(vec![
            Filter::and(vec![
                Filter::is_in("type", BRANCH_SCOPED_TYPES.iter().copied()),
                Filter::is_in("branch", branch_values),
            ]),
            Filter::is_in("type", CROSS_BRANCH_TYPES.iter().copied()),
        ]))
    } else {
        None
    };

    match (repository, type_filter) {
        (Some(repo), Some(tf)) => Some(Filter::and(vec![Filter::eq("repository", repo), tf])),
        (Some(repo), None) => Some(Filter::eq("repository", repo)),
        (None, tf) => tf,
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Execute the search pipeline.
pub async fn search(services: &Services, request: SearchRequest) -> Result<SearchResponse, SearchError> {
    let runtime = services.runtime();
    if !runtime.enabled {
        return Err(SearchError::Disabled);
    }
    if request.query.trim().is_empty() {
        return Err(SearchError::EmptyQuery);
    }

    tracing::info!(
        "Search query: '{}' (repository={:?}, branch={:?}, initiative={:?})",
        request.query,
        request.repository,
        request.branch,
        request.initiative
    );

    // Phase 1: resolve branch + initiative context
    let repo_path = services.repo_path(request.repository.as_deref()).await;
    let current_branch = match &repo_path {
        Some(path) => vcs::current_branch(path).await,
        None => "unknown".to_string(),
    };
    let effective_branch = request.branch.clone().unwrap_or(current_branch);
    let mut branches = vec![effective_branch.clone()];
    if !matches!(effective_branch.as_str(), "main" | "master" | "unknown") {
        branches.push("main".to_string());
    }

    let store = &services.store;
    let initiative_id = request.initiative.as_deref().and_then(|arg| {
        initiative::find_initiative(store, request.repository.as_deref(), arg)
            .ok()
            .flatten()
            .map(|found| found.id)
    });
    // With no explicit initiative filter, the focused initiative becomes
    // the boost target
    let focused_id = match (&initiative_id, &request.repository) {
        (None, Some(repo)) => initiative::focus_id(store, repo),
        _ => None,
    };

    // Phase 2: filter construction
    let types = request
        .types
        .clone()
        .or_else(|| request.preset.as_deref().and_then(resolve_preset));
    let filter = build_branch_aware_filter(
        request.repository.as_deref(),
        &branches,
        types.as_deref(),
    );

    // Phase 3: hybrid retrieval
    services.ensure_bm25()?;

    let vector = store.query(&request.query, runtime.top_k_retrieve, filter.as_ref())?;
    let vector_candidates: Vec<Candidate> = vector
        .ids
        .into_iter()
        .zip(vector.texts)
        .zip(vector.metadatas)
        .zip(vector.distances)
        .map(|(((id, text), meta), distance)| {
            let mut c = Candidate::new(id, text, meta);
            c.vector_distance = Some(distance as f64);
            c
        })
        .collect();

    let bm25_candidates: Vec<Candidate> = services
        .bm25_search(&request.query, runtime.top_k_retrieve)
        .into_iter()
        .map(|hit| {
            let mut c = Candidate::new(hit.id, hit.text, hit.meta);
            c.bm25_score = Some(hit.score);
            c
        })
        .collect();

    tracing::debug!(
        "Hybrid retrieval: {} vector + {} bm25 candidates",
        vector_candidates.len(),
        bm25_candidates.len()
    );

    // Phase 4: RRF fusion
    let fused = reciprocal_rank_fusion(vector_candidates, bm25_candidates, RRF_K);
    let total_candidates = fused.len();

    if fused.is_empty() {
        return Ok(SearchResponse {
            query: request.query,
            results: vec![],
            total_candidates: 0,
            returned: 0,
            message: Some(
                "No results found. Try ingesting code first with ingest_codebase.".to_string(),
            ),
            staleness_summary: None,
            repository_skeleton: None,
            repository_context: None,
        });
    }

    // Phase 5: cross-encoder rerank
    let pairs: Vec<(Candidate, String)> = fused
        .into_iter()
        .map(|c| {
            let text = c.text.clone();
            (c, text)
        })
        .collect();
    let mut ranked: Vec<Candidate> = services
        .rerank(&request.query, pairs, runtime.top_k_rerank)
        .into_iter()
        .map(|r| {
            let mut c = r.item;
            c.rerank_score = Some(r.score as f64);
            c.score = r.score as f64;
            c
        })
        .collect();

    // Phases 6-8: layered boosting
    if runtime.type_boost {
        ranked = apply_type_boost(ranked, &runtime.type_multipliers);
    }
    if runtime.recency_boost {
        ranked = apply_recency_boost(ranked, runtime.recency_half_life_days);
    }
    if let Some(id) = &initiative_id {
        ranked = filter_by_initiative(ranked, id);
    } else if let Some(id) = &focused_id {
        ranked = apply_initiative_boost(ranked, id);
    }
    if !request.include_completed {
        ranked.retain(|c| {
            !(c.meta.str_of("type") == Some("initiative")
                && c.meta.str_of("status") == Some("completed"))
        });
    }

    // Phase 9: threshold
    let min_score = request.min_score.unwrap_or(runtime.min_score);
    ranked.retain(|c| c.score >= min_score);

    // Phase 10: staleness annotation; Phase 11: shaping
    let staleness_config = services.staleness_config();
    let mut verification_count = 0;
    let mut results = Vec::with_capacity(ranked.len());

    for (idx, candidate) in ranked.iter().enumerate() {
        let meta = &candidate.meta;
        let doc_type = meta.str_of("type").unwrap_or("");

        let mut item = SearchResultItem {
            content: truncate_content(&candidate.text),
            file_path: meta.str_of("file_path").unwrap_or("unknown").to_string(),
            repository: meta.str_of("repository").unwrap_or("unknown").to_string(),
            branch: meta.str_of("branch").unwrap_or("unknown").to_string(),
            language: meta.str_of("language").unwrap_or("unknown").to_string(),
            score: (candidate.score * 10_000.0).round() / 10_000.0,
            created_at: meta.str_of("created_at").map(str::to_string),
            initiative_id: meta
                .str_of("initiative_id")
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            initiative_name: meta
                .str_of("initiative_name")
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            staleness: None,
            verification_warning: None,
            type_boost: runtime.verbose.then_some(candidate.type_boost).flatten(),
            recency_boost: runtime.verbose.then_some(candidate.recency_boost).flatten(),
            initiative_boost: runtime.verbose.then_some(candidate.initiative_boost).flatten(),
        };

        if runtime.staleness_check_enabled && idx < runtime.staleness_check_limit {
            let assessment = match doc_type {
                "insight" => Some(staleness::check_insight(
                    meta,
                    repo_path.as_deref(),
                    &staleness_config,
                )),
                "note" | "session_summary" => Some(staleness::check_note(meta, &staleness_config)),
                _ => None,
            };

            if let Some(assessment) = assessment {
                if assessment.verification_required || !assessment.is_fresh() {
                    item.verification_warning = staleness::format_warning(&assessment, meta);
                    if assessment.verification_required {
                        verification_count += 1;
                    }
                    item.staleness = Some(assessment);
                }
            }
        }

        results.push(item);
    }

    // Context: skeleton + tech stack + focused initiative
    let detected_repo = request
        .repository
        .clone()
        .or_else(|| results.first().map(|r| r.repository.clone()))
        .filter(|r| !r.is_empty() && r != "unknown");
    let repository_skeleton = detected_repo
        .as_deref()
        .and_then(|repo| fetch_skeleton(store, repo, &branches));
    let repository_context = detected_repo
        .as_deref()
        .and_then(|repo| fetch_context(store, repo));

    let returned = results.len();
    tracing::info!("Search complete: {} results", returned);

    Ok(SearchResponse {
        query: request.query,
        results,
        total_candidates,
        returned,
        message: None,
        staleness_summary: (verification_count > 0).then(|| StalenessSummary {
            verification_required_count: verification_count,
            message: format!(
                "{verification_count} result(s) may be stale and require verification before trusting."
            ),
        }),
        repository_skeleton,
        repository_context,
    })
}

fn truncate_content(text: &str) -> String {
    if text.chars().count() <= CONTENT_TRUNCATE_CHARS {
        text.to_string()
    } else {
        text.chars().take(CONTENT_TRUNCATE_CHARS).collect()
    }
}

/// Skeleton for the branch list, falling back to any skeleton for the
/// repository.
fn fetch_skeleton(store: &Store, repository: &str, branches: &[String]) -> Option<SkeletonData> {
    let branch_scoped = Filter::and(vec![
        Filter::eq("type", "skeleton"),
        Filter::eq("repository", repository),
        Filter::is_in("branch", branches.iter().map(String::as_str)),
    ]);
    let any_branch = Filter::and(vec![
        Filter::eq("type", "skeleton"),
        Filter::eq("repository", repository),
    ]);

    let result = store
        .get_where(Some(&branch_scoped), Some(1))
        .ok()
        .filter(|r| !r.is_empty())
        .or_else(|| store.get_where(Some(&any_branch), Some(1)).ok())?;

    if result.is_empty() {
        return None;
    }

    let meta = &result.metadatas[0];
    Some(SkeletonData {
        repository: repository.to_string(),
        branch: meta.str_of("branch").unwrap_or("unknown").to_string(),
        total_files: meta.i64_of("total_files").unwrap_or(0),
        total_dirs: meta.i64_of("total_dirs").unwrap_or(0),
        tree: result.texts[0].clone(),
    })
}

/// Tech stack and focused initiative for the repository.
fn fetch_context(store: &Store, repository: &str) -> Option<RepositoryContext> {
    let tech_stack_id = format!("{repository}:tech_stack");
    let tech_stack = store
        .get(&[&tech_stack_id], false)
        .ok()
        .filter(|r| !r.is_empty())
        .map(|r| TechStackContext {
            content: r.texts[0].clone(),
            updated_at: r.metadatas[0].str_of("updated_at").unwrap_or("unknown").to_string(),
        });

    let focused = initiative::focus_id(store, repository).and_then(|id| {
        let result = store.get(&[&id], false).ok().filter(|r| !r.is_empty())?;
        let meta = &result.metadatas[0];
        Some(InitiativeContext {
            id,
            name: meta.str_of("name").unwrap_or("").to_string(),
            status: meta.str_of("status").unwrap_or("").to_string(),
            updated_at: meta.str_of("updated_at").unwrap_or("unknown").to_string(),
        })
    });

    if tech_stack.is_none() && focused.is_none() {
        return None;
    }

    Some(RepositoryContext {
        repository: repository.to_string(),
        tech_stack,
        initiative: focused,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_resolution() {
        assert!(resolve_preset("memory").unwrap().contains(&"insight".to_string()));
        assert!(resolve_preset("code").unwrap().contains(&"code".to_string()));
        assert!(resolve_preset("all").is_none());
        assert!(resolve_preset("bogus").is_none());
    }

    #[test]
    fn test_branch_filter_scopes_code_only() {
        let branches = vec!["feature-x".to_string(), "main".to_string()];
        let filter = build_branch_aware_filter(Some("demo"), &branches, None).unwrap();

        // Code on a listed branch passes
        let mut code = crate::documents::Metadata::new();
        code.set_str("type", "code");
        code.set_str("repository", "demo");
        code.set_str("branch", "main");
        assert!(filter.matches(&code));

        // Code on an unlisted branch is excluded
        code.set_str("branch", "other");
        assert!(!filter.matches(&code));

        // Notes are cross-branch
        let mut note = crate::documents::Metadata::new();
        note.set_str("type", "note");
        note.set_str("repository", "demo");
        note.set_str("branch", "other");
        assert!(filter.matches(&note));
    }

    #[test]
    fn test_unknown_branch_disables_branch_filter() {
        let branches = vec!["unknown".to_string()];
        let filter = build_branch_aware_filter(Some("demo"), &branches, None).unwrap();

        let mut code = crate::documents::Metadata::new();
        code.set_str("type", "code");
        code.set_str("repository", "demo");
        code.set_str("branch", "anything");
        assert!(filter.matches(&code));
    }

    #[test]
    fn test_type_filter_with_branch_scoping() {
        let branches = vec!["dev".to_string(), "main".to_string()];
        let types = vec!["code".to_string(), "note".to_string()];
        let filter = build_branch_aware_filter(Some("demo"), &branches, Some(&types)).unwrap();

        let mut code = crate::documents::Metadata::new();
        code.set_str("type", "code");
        code.set_str("repository", "demo");
        code.set_str("branch", "dev");
        assert!(filter.matches(&code));

        code.set_str("branch", "stale-branch");
        assert!(!filter.matches(&code));

        let mut note = crate::documents::Metadata::new();
        note.set_str("type", "note");
        note.set_str("repository", "demo");
        assert!(filter.matches(&note));

        // Types outside the allow-list are excluded entirely
        let mut skeleton = crate::documents::Metadata::new();
        skeleton.set_str("type", "tech_stack");
        skeleton.set_str("repository", "demo");
        assert!(!filter.matches(&skeleton));
    }

    #[test]
    fn test_no_filters_at_all() {
        assert!(build_branch_aware_filter(None, &["unknown".to_string()], None).is_none());
    }
}

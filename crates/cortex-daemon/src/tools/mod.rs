//! Tool Registry
//!
//! The twelve tools the assistant sees through the tool channel. Each
//! tool parses its arguments into a typed struct, delegates to the core
//! operation, and serializes the typed response. Tool-level failures
//! (missing arguments, invalid enums, unknown ids) come back as
//! `{status: "error", error}` bodies with HTTP 200 - only transport
//! problems surface as HTTP errors.

mod schemas;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Value, json};

use cortex_core::documents::{Metadata, MetadataExt, now_rfc3339};
use cortex_core::ingest::{self, HeaderProvider, IngestOptions};
use cortex_core::scrub::scrub_secrets;
use cortex_core::search::{SearchRequest, search};
use cortex_core::store::Filter;
use cortex_core::tasks::{ASYNC_FILE_THRESHOLD, TaskRecord};
use cortex_core::walker::{WalkOptions, walk};
use cortex_core::{initiative, memory, orient, recall, vcs};

use crate::http::AppState;

pub use schemas::tool_list;

/// Dispatch a tool call by name. Always returns a JSON body; errors use
/// the structured `{status, error}` shape.
pub async fn call_tool(state: &AppState, name: &str, args: Value) -> Value {
    let result = match name {
        "orient_session" => orient_session(state, args).await,
        "search_cortex" => search_cortex(state, args).await,
        "recall_recent_work" => recall_recent_work(state, args).await,
        "get_skeleton" => get_skeleton(state, args).await,
        "manage_initiative" => manage_initiative(state, args).await,
        "save_memory" => save_memory(state, args).await,
        "conclude_session" => conclude_session(state, args).await,
        "ingest_codebase" => ingest_codebase(state, args).await,
        "validate_insight" => validate_insight(state, args).await,
        "configure_cortex" => configure_cortex(state, args).await,
        "cleanup_storage" => cleanup_storage(state, args).await,
        "delete_document" => delete_document(state, args).await,
        other => Err(format!("Unknown tool: {other}")),
    };

    match result {
        Ok(value) => value,
        Err(error) => json!({ "status": "error", "error": error }),
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {e}"))
}

/// Header provider from the configured LLM primary (summarization-only
/// providers degrade to trivial headers).
pub fn configured_header_provider(state: &AppState) -> HeaderProvider {
    let yaml = state.services.yaml();
    let kind = cortex_core::llm::resolve_primary(&yaml.llm);
    HeaderProvider::parse_name(kind.as_str()).unwrap_or_default()
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

// ============================================================================
// ORIENT / SEARCH / RECALL
// ============================================================================

#[derive(Deserialize)]
struct OrientArgs {
    project_path: String,
}

async fn orient_session(state: &AppState, args: Value) -> Result<Value, String> {
    let args: OrientArgs = parse_args(args)?;
    to_json(orient::orient(&state.services, &args.project_path).await)
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    repository: Option<String>,
    branch: Option<String>,
    initiative: Option<String>,
    types: Option<Vec<String>>,
    preset: Option<String>,
    min_score: Option<f64>,
    #[serde(default = "default_true")]
    include_completed: bool,
}

fn default_true() -> bool {
    true
}

async fn search_cortex(state: &AppState, args: Value) -> Result<Value, String> {
    let args: SearchArgs = parse_args(args)?;
    let request = SearchRequest {
        query: args.query,
        repository: args.repository,
        branch: args.branch,
        initiative: args.initiative,
        types: args.types,
        preset: args.preset,
        min_score: args.min_score,
        include_completed: args.include_completed,
    };
    match search(&state.services, request).await {
        Ok(response) => to_json(response),
        Err(e) => Err(e.to_string()),
    }
}

#[derive(Deserialize)]
struct RecallArgs {
    repository: String,
    #[serde(default = "default_days")]
    days: i64,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    include_code: bool,
}

fn default_days() -> i64 {
    recall::DEFAULT_DAYS
}

fn default_limit() -> usize {
    recall::DEFAULT_LIMIT
}

async fn recall_recent_work(state: &AppState, args: Value) -> Result<Value, String> {
    let args: RecallArgs = parse_args(args)?;
    if args.repository.is_empty() {
        return Err("repository is required".to_string());
    }
    recall::recall_recent_work(
        &state.services,
        &args.repository,
        args.days,
        args.limit,
        args.include_code,
    )
    .map_err(|e| e.to_string())
    .and_then(to_json)
}

#[derive(Deserialize)]
struct SkeletonArgs {
    repository: String,
    branch: Option<String>,
}

async fn get_skeleton(state: &AppState, args: Value) -> Result<Value, String> {
    let args: SkeletonArgs = parse_args(args)?;
    let store = &state.services.store;

    let result = match &args.branch {
        Some(branch) => {
            let doc_id = format!("{}:skeleton:{}", args.repository, branch);
            store.get(&[&doc_id], false).map_err(|e| e.to_string())?
        }
        None => {
            let filter = Filter::and(vec![
                Filter::eq("type", "skeleton"),
                Filter::eq("repository", args.repository.as_str()),
            ]);
            store.get_where(Some(&filter), Some(1)).map_err(|e| e.to_string())?
        }
    };

    if result.is_empty() {
        return Ok(json!({
            "status": "not_found",
            "error": format!("No skeleton indexed for repository '{}'", args.repository),
        }));
    }

    let meta = &result.metadatas[0];
    Ok(json!({
        "repository": args.repository,
        "branch": meta.str_of("branch").unwrap_or("unknown"),
        "total_files": meta.i64_of("total_files").unwrap_or(0),
        "total_dirs": meta.i64_of("total_dirs").unwrap_or(0),
        "indexed_commit": meta.str_of("indexed_commit").unwrap_or(""),
        "tree": result.texts[0],
    }))
}

// ============================================================================
// INITIATIVES
// ============================================================================

#[derive(Deserialize)]
struct InitiativeArgs {
    action: String,
    repository: Option<String>,
    name: Option<String>,
    #[serde(default)]
    goal: String,
    initiative: Option<String>,
    summary: Option<String>,
    #[serde(default = "default_status")]
    status: String,
    #[serde(default = "default_true")]
    auto_focus: bool,
}

fn default_status() -> String {
    "all".to_string()
}

async fn manage_initiative(state: &AppState, args: Value) -> Result<Value, String> {
    let args: InitiativeArgs = parse_args(args)?;
    let services = &state.services;
    let repository = args.repository.as_deref().unwrap_or("");

    match args.action.as_str() {
        "create" => {
            let name = args.name.as_deref().unwrap_or("");
            initiative::create(services, repository, name, &args.goal, args.auto_focus)
                .await
                .map_err(|e| e.to_string())
                .and_then(to_json)
        }
        "list" => initiative::list(services, repository, &args.status)
            .map_err(|e| e.to_string())
            .and_then(to_json),
        "focus" => {
            let target = args.initiative.as_deref().unwrap_or("");
            initiative::focus(services, repository, target)
                .map_err(|e| e.to_string())
                .and_then(to_json)
        }
        "complete" => {
            let target = args.initiative.as_deref().unwrap_or("");
            let summary = args.summary.as_deref().unwrap_or("");
            initiative::complete(services, target, summary, args.repository.as_deref())
                .map_err(|e| e.to_string())
                .and_then(to_json)
        }
        "summarize" => {
            let target = args.initiative.as_deref().unwrap_or("");
            if target.is_empty() {
                return Err("initiative is required".to_string());
            }
            initiative::summarize(services, args.repository.as_deref(), target)
                .map_err(|e| e.to_string())
                .and_then(to_json)
        }
        other => Err(format!(
            "Unknown action: {other}. Valid actions: create, list, focus, complete, summarize"
        )),
    }
}

// ============================================================================
// MEMORY
// ============================================================================

#[derive(Deserialize)]
struct SaveMemoryArgs {
    content: String,
    kind: String,
    title: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    repository: Option<String>,
    initiative: Option<String>,
    #[serde(default)]
    files: Vec<String>,
}

async fn save_memory(state: &AppState, args: Value) -> Result<Value, String> {
    let args: SaveMemoryArgs = parse_args(args)?;
    memory::save_memory(
        &state.services,
        &args.content,
        &args.kind,
        args.title.as_deref(),
        &args.tags,
        args.repository.as_deref(),
        args.initiative.as_deref(),
        &args.files,
    )
    .await
    .map_err(|e| e.to_string())
    .and_then(to_json)
}

#[derive(Deserialize)]
struct ConcludeArgs {
    summary: String,
    changed_files: Vec<String>,
    repository: Option<String>,
    initiative: Option<String>,
}

async fn conclude_session(state: &AppState, args: Value) -> Result<Value, String> {
    let args: ConcludeArgs = parse_args(args)?;
    memory::conclude_session(
        &state.services,
        &args.summary,
        &args.changed_files,
        args.repository.as_deref(),
        args.initiative.as_deref(),
    )
    .await
    .map_err(|e| e.to_string())
    .and_then(to_json)
}

#[derive(Deserialize)]
struct ValidateArgs {
    insight_id: String,
    validation_result: String,
    notes: Option<String>,
    #[serde(default)]
    deprecate: bool,
    replacement_insight: Option<String>,
    repository: Option<String>,
}

async fn validate_insight(state: &AppState, args: Value) -> Result<Value, String> {
    let args: ValidateArgs = parse_args(args)?;
    memory::validate_insight(
        &state.services,
        &args.insight_id,
        &args.validation_result,
        args.notes.as_deref(),
        args.deprecate,
        args.replacement_insight.as_deref(),
        args.repository.as_deref(),
    )
    .await
    .map_err(|e| e.to_string())
    .and_then(to_json)
}

// ============================================================================
// INGEST
// ============================================================================

#[derive(Deserialize)]
struct IngestArgs {
    action: String,
    path: Option<String>,
    repository: Option<String>,
    #[serde(default)]
    force_full: bool,
    task_id: Option<String>,
}

async fn ingest_codebase(state: &AppState, args: Value) -> Result<Value, String> {
    let args: IngestArgs = parse_args(args)?;

    match args.action.as_str() {
        "ingest" => {
            let Some(path) = args.path.as_deref().filter(|p| !p.is_empty()) else {
                return Err("path is required for action='ingest'".to_string());
            };
            let root = PathBuf::from(path);
            if !root.is_dir() {
                return Err(format!("Path does not exist: {path}"));
            }

            let repository = args
                .repository
                .clone()
                .or_else(|| {
                    root.file_name()
                        .and_then(|n| n.to_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| "global".to_string());

            // Large repositories go through the async queue
            let eligible = walk(&root, &WalkOptions::new()).count();
            if eligible >= ASYNC_FILE_THRESHOLD {
                let mut record = TaskRecord::new("ingest", repository.clone());
                record.path = Some(path.to_string());
                record.force_full = args.force_full;
                record.files_total = eligible as u64;
                let task_id = state.ingest_queue.enqueue(record);
                return Ok(json!({
                    "status": "queued",
                    "task_id": task_id,
                    "repository": repository,
                    "files_total": eligible,
                    "hint": "Poll with ingest_codebase(action='status', task_id=...)",
                }));
            }

            let options = IngestOptions {
                repository: Some(repository),
                force_full: args.force_full,
                header_provider: configured_header_provider(state),
                ..Default::default()
            };
            ingest::ingest(&state.services, &root, options, None)
                .await
                .map_err(|e| e.to_string())
                .and_then(to_json)
        }
        "status" => {
            let Some(task_id) = args.task_id.as_deref() else {
                return Err("task_id is required for action='status'".to_string());
            };
            match state.ingest_queue.status(task_id) {
                Some(task) => Ok(json!({
                    "task_id": task.task_id,
                    "status": task.status,
                    "repository": task.repository,
                    "progress": {
                        "files_processed": task.files_processed,
                        "files_total": task.files_total,
                        "percent": task.percent,
                    },
                    "result": task.result,
                    "error": task.error,
                })),
                None => Ok(json!({
                    "status": "not_found",
                    "error": format!("Unknown or expired task: {task_id}"),
                })),
            }
        }
        other => Err(format!("Unknown action: {other}. Valid actions: ingest, status")),
    }
}

// ============================================================================
// CONFIGURE
// ============================================================================

#[derive(Deserialize)]
struct TechStackArgs {
    repository: String,
    content: String,
}

#[derive(Deserialize)]
struct AutocaptureArgs {
    enabled: Option<bool>,
    auto_commit_async: Option<bool>,
    sync_timeout: Option<u64>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ConfigureArgs {
    min_score: Option<f64>,
    verbose: Option<bool>,
    recency_boost: Option<bool>,
    recency_half_life_days: Option<f64>,
    top_k_retrieve: Option<usize>,
    top_k_rerank: Option<usize>,
    type_boost: Option<bool>,
    type_multipliers: Option<HashMap<String, f64>>,
    staleness_check_enabled: Option<bool>,
    staleness_check_limit: Option<usize>,
    staleness_time_threshold_days: Option<i64>,
    staleness_very_stale_threshold_days: Option<i64>,
    set_tech_stack: Option<TechStackArgs>,
    autocapture: Option<AutocaptureArgs>,
    get_status: bool,
}

async fn configure_cortex(state: &AppState, args: Value) -> Result<Value, String> {
    let args: ConfigureArgs = parse_args(args)?;
    let services = &state.services;
    let mut updated: Vec<&'static str> = vec![];

    macro_rules! apply {
        ($($field:ident),* $(,)?) => {
            $(if let Some(v) = args.$field {
                services.update_runtime(|r| r.$field = v);
                updated.push(stringify!($field));
            })*
        };
    }
    apply!(
        min_score,
        verbose,
        recency_boost,
        recency_half_life_days,
        top_k_retrieve,
        top_k_rerank,
        type_boost,
        staleness_check_enabled,
        staleness_check_limit,
        staleness_time_threshold_days,
        staleness_very_stale_threshold_days,
    );
    if let Some(multipliers) = args.type_multipliers {
        services.update_runtime(|r| r.type_multipliers = multipliers.clone());
        updated.push("type_multipliers");
    }

    if let Some(tech_stack) = args.set_tech_stack {
        set_tech_stack(state, &tech_stack.repository, &tech_stack.content).await?;
        updated.push("tech_stack");
    }

    if let Some(autocapture) = args.autocapture {
        let mut yaml = services.yaml();
        if let Some(v) = autocapture.enabled {
            yaml.autocapture.enabled = v;
        }
        if let Some(v) = autocapture.auto_commit_async {
            yaml.autocapture.auto_commit_async = v;
        }
        if let Some(v) = autocapture.sync_timeout {
            yaml.autocapture.sync_timeout = v;
        }
        if let Err(e) = cortex_core::config::save_yaml_config(&yaml) {
            tracing::warn!("Failed to persist config.yaml: {}", e);
        }
        services.set_yaml(yaml);
        updated.push("autocapture");
    }

    let mut response = json!({
        "status": if updated.is_empty() { "unchanged" } else { "updated" },
        "updated": updated,
    });

    if args.get_status {
        let runtime = services.runtime();
        let yaml = services.yaml();
        response["config"] = json!({
            "runtime": runtime,
            "autocapture": yaml.autocapture,
            "llm_provider": cortex_core::llm::resolve_primary(&yaml.llm).as_str(),
        });
        response["document_count"] = json!(services.store.count().map_err(|e| e.to_string())?);
    }

    Ok(response)
}

/// Upsert the singleton `<repository>:tech_stack` document.
async fn set_tech_stack(state: &AppState, repository: &str, content: &str) -> Result<(), String> {
    if repository.is_empty() {
        return Err("set_tech_stack.repository is required".to_string());
    }
    let services = &state.services;

    let branch = match services.repo_path(Some(repository)).await {
        Some(path) => vcs::current_branch(&path).await,
        None => "unknown".to_string(),
    };
    let timestamp = now_rfc3339();

    let mut meta = Metadata::new();
    meta.set_str("type", "tech_stack");
    meta.set_str("repository", repository);
    meta.set_str("branch", branch);
    meta.set_str("created_at", timestamp.clone());
    meta.set_str("updated_at", timestamp);

    let doc_id = format!("{repository}:tech_stack");
    services
        .store
        .upsert(&doc_id, &scrub_secrets(content), meta, None)
        .map_err(|e| e.to_string())?;
    services.mark_index_dirty();
    Ok(())
}

// ============================================================================
// MAINTENANCE
// ============================================================================

#[derive(Deserialize)]
struct CleanupArgs {
    repository: String,
    path: String,
    action: String,
}

async fn cleanup_storage(state: &AppState, args: Value) -> Result<Value, String> {
    let args: CleanupArgs = parse_args(args)?;
    let execute = match args.action.as_str() {
        "preview" => false,
        "execute" => true,
        other => {
            return Err(format!("Unknown action: {other}. Valid actions: preview, execute"));
        }
    };

    ingest::cleanup_orphans(
        &state.services,
        &args.repository,
        Path::new(&args.path),
        execute,
    )
    .map_err(|e| e.to_string())
    .and_then(to_json)
}

#[derive(Deserialize)]
struct DeleteArgs {
    document_id: String,
}

async fn delete_document(state: &AppState, args: Value) -> Result<Value, String> {
    let args: DeleteArgs = parse_args(args)?;
    let deleted = state
        .services
        .store
        .delete(&[&args.document_id])
        .map_err(|e| e.to_string())?;

    if deleted == 0 {
        return Ok(json!({
            "status": "not_found",
            "error": format!("Document not found: {}", args.document_id),
        }));
    }

    state.services.mark_index_dirty();
    Ok(json!({ "status": "deleted", "document_id": args.document_id }))
}

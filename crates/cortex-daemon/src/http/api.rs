//! API Endpoints
//!
//! Health/info, the tool channel, and the capture/admin endpoints used by
//! the session-end hook.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use cortex_core::capture::{self, SessionCapture};
use cortex_core::tasks::TaskRecord;
use cortex_core::{initiative, memory};

use crate::tools;

use super::AppState;

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// GET /info
pub async fn info(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "git_commit": std::env::var("CORTEX_GIT_COMMIT").unwrap_or_else(|_| "unknown".to_string()),
        "build_time": std::env::var("CORTEX_BUILD_TIME").unwrap_or_else(|_| "unknown".to_string()),
        "startup_time": state.started_at.to_rfc3339(),
    }))
}

// ============================================================================
// TOOL CHANNEL
// ============================================================================

#[derive(Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// POST /mcp/tools/call - tool-level errors return 200 with a structured
/// `{status, error}` body.
pub async fn tools_call(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ToolCallRequest>,
) -> Json<Value> {
    Json(tools::call_tool(&state, &request.name, request.arguments).await)
}

/// GET /mcp/tools/list
pub async fn tools_list() -> Json<Value> {
    Json(json!({ "tools": tools::tool_list() }))
}

// ============================================================================
// CAPTURE / ADMIN
// ============================================================================

#[derive(Deserialize)]
pub struct SessionSummaryRequest {
    pub summary: String,
    #[serde(default)]
    pub changed_files: Vec<String>,
    #[serde(default = "default_repository")]
    pub repository: String,
    /// Initiative id captured at session end (preferred)
    pub initiative_id: Option<String>,
    /// Initiative name (legacy)
    pub initiative: Option<String>,
}

fn default_repository() -> String {
    "global".to_string()
}

/// POST /session-summary - the hook's direct commit path.
pub async fn session_summary(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SessionSummaryRequest>,
) -> (StatusCode, Json<Value>) {
    let initiative = request.initiative_id.as_deref().or(request.initiative.as_deref());

    match memory::conclude_session(
        &state.services,
        &request.summary,
        &request.changed_files,
        Some(&request.repository),
        initiative,
    )
    .await
    {
        Ok(saved) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "session_id": saved.session_id,
                "summary_length": request.summary.len(),
                "files_count": request.changed_files.len(),
                "initiative": saved.initiative,
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "error": e.to_string() })),
        ),
    }
}

/// POST /process-queue - enqueue a session for async capture (when a
/// payload is supplied) and wake the capture worker.
pub async fn process_queue(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<SessionCapture>>,
) -> Json<Value> {
    if let Some(Json(capture)) = payload {
        let mut record = TaskRecord::new("capture", capture.repository.clone());
        record.params = serde_json::to_value(&capture).ok();
        let task_id = state.capture_queue.enqueue(record);
        tracing::debug!("Capture task enqueued: {}", task_id);
        return Json(json!({ "status": "queued", "task_id": task_id }));
    }

    state.capture_queue.trigger();
    tracing::debug!("Queue processing triggered");
    Json(json!({ "status": "triggered" }))
}

#[derive(Deserialize)]
pub struct ProcessSyncRequest {
    #[serde(flatten)]
    pub capture: SessionCapture,
}

/// POST /process-sync - summarize and commit immediately, bounded by the
/// configured sync timeout; on timeout the session falls through to the
/// async queue.
pub async fn process_sync(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProcessSyncRequest>,
) -> (StatusCode, Json<Value>) {
    let capture = request.capture;
    if capture.transcript_text.trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "status": "skipped", "reason": "empty transcript" })),
        );
    }

    let sync_timeout = state.services.yaml().autocapture.sync_timeout;
    let work = capture::process_session(&state.services, capture.clone());

    match tokio::time::timeout(Duration::from_secs(sync_timeout), work).await {
        Ok(Ok(result)) => (
            StatusCode::OK,
            Json(serde_json::to_value(&result).unwrap_or_else(|_| json!({"status": "success"}))),
        ),
        Ok(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "error": e.to_string() })),
        ),
        Err(_) => {
            // Timed out: hand the session to the async worker instead
            let mut record = TaskRecord::new("capture", capture.repository.clone());
            record.params = serde_json::to_value(&capture).ok();
            let task_id = state.capture_queue.enqueue(record);
            tracing::warn!(
                "Sync capture timed out after {}s, queued as {}",
                sync_timeout,
                task_id
            );
            (
                StatusCode::ACCEPTED,
                Json(json!({ "status": "queued_async", "task_id": task_id })),
            )
        }
    }
}

/// GET /autocapture/status
pub async fn autocapture_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let yaml = state.services.yaml();
    Json(json!({
        "enabled": yaml.autocapture.enabled,
        "auto_commit_async": yaml.autocapture.auto_commit_async,
        "sync_timeout": yaml.autocapture.sync_timeout,
        "significance": yaml.autocapture.significance,
        "queued_sessions_count": state.capture_queue.pending_count(),
        "recent_tasks": state.capture_queue.list(None).into_iter().take(5).collect::<Vec<_>>(),
    }))
}

#[derive(Deserialize)]
pub struct FocusedInitiativeQuery {
    pub repository: String,
}

/// GET /focused-initiative?repository=
pub async fn focused_initiative(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FocusedInitiativeQuery>,
) -> Json<Value> {
    match initiative::get_focus(&state.services.store, &query.repository) {
        Ok(Some(focus)) => Json(json!({
            "status": "success",
            "initiative_id": focus.initiative_id,
            "initiative_name": focus.initiative_name,
        })),
        Ok(None) => Json(json!({
            "status": "success",
            "initiative_id": null,
            "initiative_name": null,
        })),
        Err(e) => Json(json!({
            "status": "error",
            "error": e.to_string(),
            "initiative_id": null,
            "initiative_name": null,
        })),
    }
}

/// GET /ingest-status - all ingest tasks, newest first.
pub async fn ingest_status_list(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "tasks": state.ingest_queue.list(None) }))
}

/// GET /ingest-status/{task_id}
pub async fn ingest_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.ingest_queue.status(&task_id) {
        Some(task) => (StatusCode::OK, Json(json!(task))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "status": "not_found",
                "error": format!("Unknown or expired task: {task_id}"),
            })),
        ),
    }
}

/// POST /admin/backup - copy the store to a timestamped file under
/// `<data>/backups/`.
pub async fn admin_backup(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    let dest = state
        .services
        .data_dir()
        .join("backups")
        .join(format!("cortex-{stamp}.db"));

    match state.services.store.backup(&dest) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "success", "backup_path": dest.to_string_lossy() })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "error": e.to_string() })),
        ),
    }
}

/// GET /migrations/status
pub async fn migrations_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let applied = state.services.store.schema_version().unwrap_or(0);
    let available: Vec<Value> = cortex_core::store::MIGRATIONS
        .iter()
        .map(|m| {
            json!({
                "version": m.version,
                "description": m.description,
                "applied": m.version <= applied,
            })
        })
        .collect();

    Json(json!({
        "schema_version": applied,
        "migrations": available,
    }))
}

//! HTTP Surface
//!
//! Router assembly and shared application state. Three endpoint families:
//! the tool channel (`/mcp/tools/*`), the browse/maintenance surface
//! (`/browse/*`), and the capture/admin endpoints. Tool-channel errors
//! stay HTTP 200 with a structured body; direct REST endpoints use real
//! status codes.

mod api;
mod browse;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use chrono::{DateTime, Utc};

use cortex_core::{Services, TaskQueue};

/// Shared application state
pub struct AppState {
    pub services: Arc<Services>,
    pub ingest_queue: Arc<TaskQueue>,
    pub capture_queue: Arc<TaskQueue>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        services: Arc<Services>,
        ingest_queue: Arc<TaskQueue>,
        capture_queue: Arc<TaskQueue>,
    ) -> Self {
        Self {
            services,
            ingest_queue,
            capture_queue,
            started_at: Utc::now(),
        }
    }
}

/// Build the daemon router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health / info
        .route("/health", get(api::health))
        .route("/info", get(api::info))
        // Tool channel
        .route("/mcp/tools/call", post(api::tools_call))
        .route("/mcp/tools/list", get(api::tools_list))
        // Browse / maintenance
        .route("/browse/stats", get(browse::stats))
        .route("/browse/list", get(browse::list))
        .route("/browse/get", get(browse::get_document))
        .route("/browse/search", get(browse::search))
        .route("/browse/sample", get(browse::sample))
        .route("/browse/update", post(browse::update))
        .route("/browse/delete", post(browse::delete))
        .route("/browse/delete-by-type", post(browse::delete_by_type))
        .route("/browse/cleanup", post(browse::cleanup))
        .route("/browse/purge", post(browse::purge))
        // Capture / admin
        .route("/session-summary", post(api::session_summary))
        .route("/process-queue", post(api::process_queue))
        .route("/process-sync", post(api::process_sync))
        .route("/autocapture/status", get(api::autocapture_status))
        .route("/focused-initiative", get(api::focused_initiative))
        .route("/ingest-status", get(api::ingest_status_list))
        .route("/ingest-status/{task_id}", get(api::ingest_status))
        .route("/admin/backup", post(api::admin_backup))
        .route("/migrations/status", get(api::migrations_status))
        .with_state(state)
}

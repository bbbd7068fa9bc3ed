//! Background Workers
//!
//! One worker per queue: ingestion (delta-synced repository indexing with
//! progress checkpointing) and session capture (significance-gated LLM
//! summarization + commit). Handlers return Results so a failing task
//! lands in `failed` without killing its worker.

use std::path::PathBuf;
use std::sync::Arc;

use cortex_core::capture::{self, SessionCapture};
use cortex_core::ingest::{self, IngestOptions, ProgressFn};
use cortex_core::tasks::{TaskQueue, TaskRecord, run_worker};
use cortex_core::Services;

/// Run the single ingest worker for the queue.
pub async fn run_ingest_worker(services: Arc<Services>, queue: Arc<TaskQueue>) {
    let worker_queue = Arc::clone(&queue);
    run_worker(worker_queue, "ingest", move |task: TaskRecord| {
        let services = Arc::clone(&services);
        let queue = Arc::clone(&queue);
        async move {
            let Some(path) = task.path.clone() else {
                return Err("ingest task has no path".to_string());
            };

            let task_id = task.task_id.clone();
            let progress_queue = Arc::clone(&queue);
            let progress: ProgressFn = Box::new(move |done, total| {
                progress_queue.update(&task_id, |t| {
                    t.files_processed = done;
                    t.files_total = total;
                    t.percent = if total > 0 {
                        (done as f64 / total as f64 * 100.0).min(100.0)
                    } else {
                        100.0
                    };
                });
            });

            let options = IngestOptions {
                repository: Some(task.repository.clone()),
                force_full: task.force_full,
                ..Default::default()
            };

            ingest::ingest(&services, &PathBuf::from(path), options, Some(&progress))
                .await
                .map_err(|e| e.to_string())
                .and_then(|stats| serde_json::to_value(&stats).map_err(|e| e.to_string()))
        }
    })
    .await;
}

/// Run the single capture worker for the queue.
pub async fn run_capture_worker(services: Arc<Services>, queue: Arc<TaskQueue>) {
    run_worker(queue, "capture", move |task: TaskRecord| {
        let services = Arc::clone(&services);
        async move {
            let Some(params) = task.params else {
                return Err("capture task has no payload".to_string());
            };
            let session: SessionCapture =
                serde_json::from_value(params).map_err(|e| format!("bad capture payload: {e}"))?;

            capture::process_session(&services, session)
                .await
                .map_err(|e| e.to_string())
                .and_then(|result| serde_json::to_value(&result).map_err(|e| e.to_string()))
        }
    })
    .await;
}

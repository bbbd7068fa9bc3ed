//! Async Task Queues
//!
//! Persistent task records for long-running work (ingestion, session
//! capture) so request handlers never block. One queue per logical
//! worker; a single worker task per queue wakes on enqueue/trigger or a
//! 5-second poll, picks the oldest queued task, and checkpoints every
//! state transition through the same rename-over-temp discipline as the
//! delta state. Startup recovery resets `running` tasks to `queued` -
//! ingest work is delta-based and therefore idempotent.

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;

use crate::documents::now_rfc3339;
use crate::persist;

/// Repositories at or above this many eligible files are ingested
/// asynchronously through the queue
pub const ASYNC_FILE_THRESHOLD: usize = 50;

/// Terminal tasks older than this are dropped on the next scan
pub const MAX_TASK_AGE_HOURS: i64 = 24;

/// Worker poll interval when idle
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

// ============================================================================
// TASK RECORDS
// ============================================================================

/// Task lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Complete,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }
}

/// A persisted task record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub kind: String,
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub force_full: bool,
    #[serde(default)]
    pub files_total: u64,
    #[serde(default)]
    pub files_processed: u64,
    #[serde(default)]
    pub percent: f64,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Kind-specific payload (e.g. the capture input)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl TaskRecord {
    pub fn new(kind: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            task_id: format!("task:{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
            kind: kind.into(),
            repository: repository.into(),
            path: None,
            status: TaskStatus::Queued,
            force_full: false,
            files_total: 0,
            files_processed: 0,
            percent: 0.0,
            created_at: now_rfc3339(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            params: None,
        }
    }
}

// ============================================================================
// QUEUE
// ============================================================================

/// A persistent FIFO task queue backed by one JSON file
pub struct TaskQueue {
    path: PathBuf,
    tasks: Mutex<Vec<TaskRecord>>,
    notify: Notify,
}

impl TaskQueue {
    /// Load the queue, recovering any `running` task back to `queued`
    /// (crash-safe resume).
    pub fn load(path: PathBuf) -> Self {
        let mut tasks: Vec<TaskRecord> = match persist::read_json(&path) {
            Ok(Some(tasks)) => tasks,
            Ok(None) => vec![],
            Err(e) => {
                tracing::warn!("Failed to read task queue {}: {}", path.display(), e);
                vec![]
            }
        };

        let mut recovered = 0;
        for task in &mut tasks {
            if task.status == TaskStatus::Running {
                task.status = TaskStatus::Queued;
                task.started_at = None;
                recovered += 1;
            }
        }
        if recovered > 0 {
            tracing::info!("Recovered {} interrupted task(s) in {}", recovered, path.display());
        }

        let queue = Self {
            path,
            tasks: Mutex::new(tasks),
            notify: Notify::new(),
        };
        if recovered > 0 {
            queue.checkpoint();
        }
        queue
    }

    fn checkpoint(&self) {
        let Ok(tasks) = self.tasks.lock() else { return };
        if let Err(e) = persist::write_json(&self.path, &*tasks) {
            tracing::warn!("Failed to persist task queue {}: {}", self.path.display(), e);
        }
    }

    /// Enqueue a task and wake the worker. Returns the task id.
    pub fn enqueue(&self, record: TaskRecord) -> String {
        let task_id = record.task_id.clone();
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(record);
        }
        self.checkpoint();
        self.notify.notify_one();
        tracing::info!("Task enqueued: {}", task_id);
        task_id
    }

    /// Wake the worker without enqueuing (external trigger endpoints).
    pub fn trigger(&self) {
        self.notify.notify_one();
    }

    /// Look up a task by id.
    pub fn status(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks
            .lock()
            .ok()?
            .iter()
            .find(|t| t.task_id == task_id)
            .cloned()
    }

    /// List tasks, optionally filtered by repository, newest first.
    pub fn list(&self, repository: Option<&str>) -> Vec<TaskRecord> {
        let Ok(tasks) = self.tasks.lock() else {
            return vec![];
        };
        let mut out: Vec<TaskRecord> = tasks
            .iter()
            .filter(|t| repository.map(|r| t.repository == r).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Number of queued tasks.
    pub fn pending_count(&self) -> usize {
        self.tasks
            .lock()
            .map(|tasks| tasks.iter().filter(|t| t.status == TaskStatus::Queued).count())
            .unwrap_or(0)
    }

    /// Mutate a task in place and checkpoint. Returns whether it existed.
    pub fn update<F: FnOnce(&mut TaskRecord)>(&self, task_id: &str, f: F) -> bool {
        let found = {
            let Ok(mut tasks) = self.tasks.lock() else {
                return false;
            };
            match tasks.iter_mut().find(|t| t.task_id == task_id) {
                Some(task) => {
                    f(task);
                    true
                }
                None => false,
            }
        };
        if found {
            self.checkpoint();
        }
        found
    }

    /// Drop terminal tasks past their expiry. Returns whether anything
    /// changed.
    fn gc_expired(tasks: &mut Vec<TaskRecord>) -> bool {
        let cutoff = Utc::now() - chrono::Duration::hours(MAX_TASK_AGE_HOURS);
        let before = tasks.len();
        tasks.retain(|task| {
            if !task.status.is_terminal() {
                return true;
            }
            let reference = task.completed_at.as_deref().unwrap_or(&task.created_at);
            match DateTime::parse_from_rfc3339(reference) {
                Ok(t) => t.with_timezone(&Utc) > cutoff,
                Err(_) => true,
            }
        });
        tasks.len() != before
    }

    /// Claim the oldest queued task: transition to `running`, checkpoint,
    /// return a copy. Expired terminal tasks are dropped during the scan.
    pub fn claim_next(&self) -> Option<TaskRecord> {
        let claimed = {
            let mut tasks = self.tasks.lock().ok()?;
            let gc_changed = Self::gc_expired(&mut tasks);

            let next = tasks
                .iter_mut()
                .filter(|t| t.status == TaskStatus::Queued)
                .min_by(|a, b| a.created_at.cmp(&b.created_at));

            match next {
                Some(task) => {
                    task.status = TaskStatus::Running;
                    task.started_at = Some(now_rfc3339());
                    Some(task.clone())
                }
                None => {
                    if gc_changed {
                        // Still persist the GC
                        drop(tasks);
                        self.checkpoint();
                    }
                    return None;
                }
            }
        };
        self.checkpoint();
        claimed
    }

    /// Block until new work may be available: an enqueue/trigger signal or
    /// the poll interval, whichever first.
    pub async fn wait_for_work(&self) {
        tokio::select! {
            _ = self.notify.notified() => {}
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}

// ============================================================================
// WORKER
// ============================================================================

/// Run the single worker loop for a queue. The handler returns the task
/// result value or an error string; either way the worker records the
/// terminal state and keeps going - one failing task never kills the
/// worker.
pub async fn run_worker<F, Fut>(queue: Arc<TaskQueue>, name: &'static str, handler: F)
where
    F: Fn(TaskRecord) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send,
{
    tracing::info!("{} worker started", name);
    loop {
        let Some(task) = queue.claim_next() else {
            queue.wait_for_work().await;
            continue;
        };

        let task_id = task.task_id.clone();
        tracing::info!("{} worker picked up {}", name, task_id);

        match handler(task).await {
            Ok(result) => {
                queue.update(&task_id, |t| {
                    t.status = TaskStatus::Complete;
                    t.completed_at = Some(now_rfc3339());
                    t.percent = 100.0;
                    t.result = Some(result);
                });
                tracing::info!("{} task complete: {}", name, task_id);
            }
            Err(error) => {
                queue.update(&task_id, |t| {
                    t.status = TaskStatus::Failed;
                    t.completed_at = Some(now_rfc3339());
                    t.error = Some(error.clone());
                });
                tracing::warn!("{} task failed: {}: {}", name, task_id, error);
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_in(dir: &tempfile::TempDir) -> TaskQueue {
        TaskQueue::load(dir.path().join("tasks.json"))
    }

    #[test]
    fn test_enqueue_status_list() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(&dir);

        let mut record = TaskRecord::new("ingest", "demo");
        record.path = Some("/repo/demo".to_string());
        let id = queue.enqueue(record);

        let task = queue.status(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.repository, "demo");

        assert_eq!(queue.list(Some("demo")).len(), 1);
        assert!(queue.list(Some("other")).is_empty());
        assert_eq!(queue.pending_count(), 1);
    }

    #[test]
    fn test_claim_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(&dir);

        let mut first = TaskRecord::new("ingest", "a");
        first.created_at = "2026-01-01T00:00:00+00:00".to_string();
        let first_id = first.task_id.clone();
        let mut second = TaskRecord::new("ingest", "b");
        second.created_at = "2026-01-02T00:00:00+00:00".to_string();

        queue.enqueue(second);
        queue.enqueue(first);

        let claimed = queue.claim_next().unwrap();
        assert_eq!(claimed.task_id, first_id);
        assert_eq!(claimed.status, TaskStatus::Running);
        assert!(claimed.started_at.is_some());
    }

    #[test]
    fn test_recovery_resets_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");

        {
            let queue = TaskQueue::load(path.clone());
            let id = queue.enqueue(TaskRecord::new("ingest", "demo"));
            queue.claim_next().unwrap();
            assert_eq!(queue.status(&id).unwrap().status, TaskStatus::Running);
        }

        // Simulated restart: running resets to queued
        let reloaded = TaskQueue::load(path);
        let tasks = reloaded.list(None);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Queued);
    }

    #[test]
    fn test_expired_terminal_tasks_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(&dir);

        let mut old = TaskRecord::new("ingest", "demo");
        old.status = TaskStatus::Complete;
        old.completed_at = Some((Utc::now() - chrono::Duration::hours(48)).to_rfc3339());
        queue.enqueue(old);

        let mut fresh = TaskRecord::new("ingest", "demo");
        fresh.status = TaskStatus::Complete;
        fresh.completed_at = Some(now_rfc3339());
        queue.enqueue(fresh);

        assert!(queue.claim_next().is_none());
        assert_eq!(queue.list(None).len(), 1);
    }

    #[tokio::test]
    async fn test_worker_processes_to_terminal_state() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(queue_in(&dir));

        let ok_id = queue.enqueue(TaskRecord::new("ok", "demo"));
        let fail_id = queue.enqueue(TaskRecord::new("fail", "demo"));

        let worker_queue = Arc::clone(&queue);
        let worker = tokio::spawn(run_worker(worker_queue, "test", |task: TaskRecord| async move {
            if task.kind == "fail" {
                Err("boom".to_string())
            } else {
                Ok(serde_json::json!({"done": true}))
            }
        }));

        // Poll until both reach terminal state
        for _ in 0..100 {
            let ok_done = queue
                .status(&ok_id)
                .map(|t| t.status.is_terminal())
                .unwrap_or(false);
            let fail_done = queue
                .status(&fail_id)
                .map(|t| t.status.is_terminal())
                .unwrap_or(false);
            if ok_done && fail_done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        worker.abort();

        let ok_task = queue.status(&ok_id).unwrap();
        assert_eq!(ok_task.status, TaskStatus::Complete);
        assert_eq!(ok_task.percent, 100.0);
        assert_eq!(ok_task.result.unwrap()["done"], true);

        let fail_task = queue.status(&fail_id).unwrap();
        assert_eq!(fail_task.status, TaskStatus::Failed);
        assert_eq!(fail_task.error.as_deref(), Some("boom"));
    }
}

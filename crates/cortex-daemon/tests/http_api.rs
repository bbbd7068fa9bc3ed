//! HTTP surface integration tests
//!
//! Drives the router directly with tower's oneshot - no listening socket
//! needed. Covers the health/info endpoints, the tool channel round trip
//! (including the tool-level error shape), and the browse REST error
//! codes.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use cortex_core::config::YamlConfig;
use cortex_core::embed::{EmbedError, Embedder};
use cortex_core::services::Services;
use cortex_core::tasks::TaskQueue;
use cortex_daemon::http::{AppState, router};

struct TestEmbedder;

impl Embedder for TestEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut v = vec![0.0_f32; 16];
        for token in text.split_whitespace() {
            let mut h: u32 = 2166136261;
            for b in token.to_lowercase().bytes() {
                h ^= b as u32;
                h = h.wrapping_mul(16777619);
            }
            v[(h % 16) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        Ok(v.into_iter().map(|x| x / norm).collect())
    }

    fn dimensions(&self) -> usize {
        16
    }
}

fn test_app(tmp: &tempfile::TempDir) -> Router {
    let services = Arc::new(
        Services::new(
            tmp.path().join("data"),
            Arc::new(TestEmbedder),
            YamlConfig::default(),
        )
        .unwrap(),
    );
    let ingest_queue = Arc::new(TaskQueue::load(tmp.path().join("ingest_tasks.json")));
    let capture_queue = Arc::new(TaskQueue::load(tmp.path().join("capture_queue.json")));
    router(Arc::new(AppState::new(services, ingest_queue, capture_queue)))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let tmp = tempfile::tempdir().unwrap();
    let (status, body) = get(test_app(&tmp), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_info_has_build_metadata_fields() {
    let tmp = tempfile::tempdir().unwrap();
    let (status, body) = get(test_app(&tmp), "/info").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["version"].is_string());
    assert!(body["git_commit"].is_string());
    assert!(body["startup_time"].is_string());
}

#[tokio::test]
async fn test_tools_list() {
    let tmp = tempfile::tempdir().unwrap();
    let (status, body) = get(test_app(&tmp), "/mcp/tools/list").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tools"].as_array().unwrap().len(), 12);
}

#[tokio::test]
async fn test_tool_save_then_search_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_app(&tmp);

    let (status, body) = post(
        app.clone(),
        "/mcp/tools/call",
        json!({
            "name": "save_memory",
            "arguments": {
                "content": "Chose RS256 for token signing",
                "kind": "note",
                "title": "JWT decision",
                "repository": "demo"
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "saved");
    assert!(body["id"].as_str().unwrap().starts_with("note:"));

    let (status, body) = post(
        app,
        "/mcp/tools/call",
        json!({
            "name": "search_cortex",
            "arguments": {
                "query": "RS256 token signing",
                "repository": "demo",
                "min_score": 0.0
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().any(|r| {
        r["content"].as_str().unwrap_or("").contains("RS256")
    }));
}

#[tokio::test]
async fn test_tool_error_is_structured_with_http_200() {
    let tmp = tempfile::tempdir().unwrap();

    // Insight without files is a tool-level validation error
    let (status, body) = post(
        test_app(&tmp),
        "/mcp/tools/call",
        json!({
            "name": "save_memory",
            "arguments": { "content": "x", "kind": "insight" }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert!(body["error"].as_str().unwrap().contains("files"));
}

#[tokio::test]
async fn test_unknown_tool() {
    let tmp = tempfile::tempdir().unwrap();
    let (status, body) = post(
        test_app(&tmp),
        "/mcp/tools/call",
        json!({ "name": "not_a_tool", "arguments": {} }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_browse_search_empty_query_is_422() {
    let tmp = tempfile::tempdir().unwrap();
    let (status, _) = get(test_app(&tmp), "/browse/search?q=").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_browse_stats_and_delete_by_type() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_app(&tmp);

    post(
        app.clone(),
        "/mcp/tools/call",
        json!({
            "name": "save_memory",
            "arguments": { "content": "a note", "kind": "note", "repository": "demo" }
        }),
    )
    .await;

    let (status, body) = get(app.clone(), "/browse/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["by_type"]["note"], 1);

    let (status, body) = post(
        app.clone(),
        "/browse/delete-by-type",
        json!({ "type": "note", "repository": "demo" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);

    let (_, body) = get(app, "/browse/stats").await;
    assert_eq!(body["total_documents"], 0);
}

#[tokio::test]
async fn test_ingest_status_unknown_task_is_404() {
    let tmp = tempfile::tempdir().unwrap();
    let (status, body) = get(test_app(&tmp), "/ingest-status/task:missing1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "not_found");
}

#[tokio::test]
async fn test_focused_initiative_endpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_app(&tmp);

    let (status, body) = get(app.clone(), "/focused-initiative?repository=demo").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["initiative_id"], Value::Null);

    post(
        app.clone(),
        "/mcp/tools/call",
        json!({
            "name": "manage_initiative",
            "arguments": { "action": "create", "repository": "demo", "name": "Migration" }
        }),
    )
    .await;

    let (_, body) = get(app, "/focused-initiative?repository=demo").await;
    assert_eq!(body["initiative_name"], "Migration");
}

#[tokio::test]
async fn test_migrations_status() {
    let tmp = tempfile::tempdir().unwrap();
    let (status, body) = get(test_app(&tmp), "/migrations/status").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["schema_version"].as_u64().unwrap() >= 1);
    assert!(body["migrations"].as_array().unwrap().iter().all(|m| m["applied"] == true));
}

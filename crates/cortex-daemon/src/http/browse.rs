//! Browse Endpoints
//!
//! Introspection and maintenance over the raw document collection:
//! stats, listing, point reads, quick search, sampling, metadata edits,
//! and destructive cleanup (scoped deletes and repository purge).
//! Validation failures use 4xx here - these are direct REST endpoints,
//! not the tool channel.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use cortex_core::documents::{Metadata, MetadataExt};
use cortex_core::search::{SearchRequest, search as run_search};
use cortex_core::store::Filter;

use super::AppState;

type ApiResult = (StatusCode, Json<Value>);

fn ok(value: Value) -> ApiResult {
    (StatusCode::OK, Json(value))
}

fn bad_request(error: impl Into<String>) -> ApiResult {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "status": "error", "error": error.into() })),
    )
}

fn not_found(error: impl Into<String>) -> ApiResult {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "status": "not_found", "error": error.into() })),
    )
}

fn internal(error: impl std::fmt::Display) -> ApiResult {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "status": "error", "error": error.to_string() })),
    )
}

// ============================================================================
// READS
// ============================================================================

/// GET /browse/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult {
    let store = &state.services.store;
    let total = match store.count() {
        Ok(n) => n,
        Err(e) => return internal(e),
    };
    let by_type = store.counts_by_type().unwrap_or_default();
    let by_repository = store.counts_by_repository().unwrap_or_default();

    ok(json!({
        "total_documents": total,
        "by_type": by_type,
        "by_repository": by_repository,
    }))
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    doc_type: Option<String>,
    repository: Option<String>,
    #[serde(default = "default_list_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_list_limit() -> usize {
    50
}

/// GET /browse/list?type=&repository=&limit=&offset=
pub async fn list(State(state): State<Arc<AppState>>, Query(query): Query<ListQuery>) -> ApiResult {
    let mut conditions = vec![];
    if let Some(doc_type) = &query.doc_type {
        conditions.push(Filter::eq("type", doc_type.as_str()));
    }
    if let Some(repository) = &query.repository {
        conditions.push(Filter::eq("repository", repository.as_str()));
    }
    let filter = (!conditions.is_empty()).then(|| Filter::and(conditions));

    let result = match state
        .services
        .store
        .get_where(filter.as_ref(), Some(query.offset + query.limit))
    {
        Ok(r) => r,
        Err(e) => return internal(e),
    };

    let documents: Vec<Value> = result
        .ids
        .iter()
        .zip(result.texts.iter())
        .zip(result.metadatas.iter())
        .skip(query.offset)
        .map(|((id, text), meta)| {
            let preview: String = text.chars().take(200).collect();
            json!({
                "id": id,
                "type": meta.str_of("type").unwrap_or(""),
                "repository": meta.str_of("repository").unwrap_or(""),
                "created_at": meta.str_of("created_at").unwrap_or(""),
                "preview": preview,
            })
        })
        .collect();

    ok(json!({ "documents": documents, "count": documents.len(), "offset": query.offset }))
}

#[derive(Deserialize)]
pub struct GetQuery {
    id: String,
}

/// GET /browse/get?id=
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GetQuery>,
) -> ApiResult {
    match state.services.store.get(&[&query.id], false) {
        Ok(result) if !result.is_empty() => ok(json!({
            "id": result.ids[0],
            "text": result.texts[0],
            "metadata": result.metadatas[0],
        })),
        Ok(_) => not_found(format!("Document not found: {}", query.id)),
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: String,
    repository: Option<String>,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    10
}

/// GET /browse/search?q=&repository=&limit=
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult {
    if query.q.trim().is_empty() {
        return bad_request("Query cannot be empty");
    }

    let request = SearchRequest {
        query: query.q,
        repository: query.repository,
        min_score: Some(0.0),
        include_completed: true,
        ..Default::default()
    };

    match run_search(&state.services, request).await {
        Ok(mut response) => {
            response.results.truncate(query.limit);
            ok(serde_json::to_value(&response).unwrap_or_else(|_| json!({"results": []})))
        }
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
pub struct SampleQuery {
    #[serde(default = "default_sample_size")]
    n: usize,
}

fn default_sample_size() -> usize {
    5
}

/// GET /browse/sample?n=
pub async fn sample(State(state): State<Arc<AppState>>, Query(query): Query<SampleQuery>) -> ApiResult {
    match state.services.store.get_where(None, Some(query.n)) {
        Ok(result) => {
            let documents: Vec<Value> = result
                .ids
                .iter()
                .zip(result.texts.iter())
                .zip(result.metadatas.iter())
                .map(|((id, text), meta)| {
                    let preview: String = text.chars().take(500).collect();
                    json!({ "id": id, "metadata": meta, "preview": preview })
                })
                .collect();
            ok(json!({ "documents": documents }))
        }
        Err(e) => internal(e),
    }
}

// ============================================================================
// WRITES / MAINTENANCE
// ============================================================================

#[derive(Deserialize)]
pub struct UpdateRequest {
    id: String,
    text: Option<String>,
    metadata: Option<Metadata>,
}

/// POST /browse/update - replace text and/or merge metadata keys.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateRequest>,
) -> ApiResult {
    let store = &state.services.store;
    let existing = match store.get_one(&request.id) {
        Ok(Some(doc)) => doc,
        Ok(None) => return not_found(format!("Document not found: {}", request.id)),
        Err(e) => return internal(e),
    };

    let (old_text, mut meta) = existing;
    if let Some(patch) = request.metadata {
        for (key, value) in patch {
            meta.insert(key, value);
        }
    }
    let text_replaced = request.text.is_some();
    let text = request.text.unwrap_or(old_text);

    // Text changes need a fresh embedding; metadata-only edits keep it
    let embedding = if text_replaced {
        None
    } else {
        store.get_embedding(&request.id).unwrap_or(None)
    };

    match store.upsert(&request.id, &text, meta, embedding) {
        Ok(()) => {
            state.services.mark_index_dirty();
            ok(json!({ "status": "updated", "id": request.id }))
        }
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
pub struct DeleteRequest {
    id: Option<String>,
    #[serde(default)]
    ids: Vec<String>,
}

/// POST /browse/delete
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteRequest>,
) -> ApiResult {
    let mut ids = request.ids;
    if let Some(id) = request.id {
        ids.push(id);
    }
    if ids.is_empty() {
        return bad_request("id or ids is required");
    }

    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    match state.services.store.delete(&refs) {
        Ok(deleted) => {
            state.services.mark_index_dirty();
            ok(json!({ "status": "deleted", "deleted": deleted }))
        }
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
pub struct DeleteByTypeRequest {
    #[serde(rename = "type")]
    doc_type: String,
    repository: Option<String>,
}

/// POST /browse/delete-by-type
pub async fn delete_by_type(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteByTypeRequest>,
) -> ApiResult {
    if request.doc_type.is_empty() {
        return bad_request("type is required");
    }

    let mut conditions = vec![Filter::eq("type", request.doc_type.as_str())];
    if let Some(repository) = &request.repository {
        conditions.push(Filter::eq("repository", repository.as_str()));
    }

    match state.services.store.delete_where(&Filter::and(conditions)) {
        Ok(ids) => {
            state.services.mark_index_dirty();
            ok(json!({ "status": "deleted", "deleted": ids.len(), "type": request.doc_type }))
        }
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
pub struct CleanupRequest {
    repository: String,
    path: String,
    action: String,
}

/// POST /browse/cleanup - GC chunks for files that no longer exist.
pub async fn cleanup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CleanupRequest>,
) -> ApiResult {
    let execute = match request.action.as_str() {
        "preview" => false,
        "execute" => true,
        other => return bad_request(format!("Unknown action: {other}")),
    };

    match cortex_core::ingest::cleanup_orphans(
        &state.services,
        &request.repository,
        std::path::Path::new(&request.path),
        execute,
    ) {
        Ok(report) => ok(serde_json::to_value(&report).unwrap_or_default()),
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
pub struct PurgeRequest {
    repository: String,
}

/// POST /browse/purge - delete every document for a repository.
pub async fn purge(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PurgeRequest>,
) -> ApiResult {
    if request.repository.is_empty() {
        return bad_request("repository is required");
    }

    let filter = Filter::eq("repository", request.repository.as_str());
    match state.services.store.delete_where(&filter) {
        Ok(ids) => {
            state.services.mark_index_dirty();
            tracing::info!("Purged {} documents for {}", ids.len(), request.repository);
            ok(json!({
                "status": "purged",
                "repository": request.repository,
                "deleted": ids.len(),
            }))
        }
        Err(e) => internal(e),
    }
}

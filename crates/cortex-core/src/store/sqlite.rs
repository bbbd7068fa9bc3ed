//! SQLite Store Implementation
//!
//! Reader/writer connections behind mutexes make [`Store`] `Send + Sync`,
//! so the daemon shares it through a plain `Arc`. Embeddings live as BLOBs
//! next to the documents and are reloaded into the in-memory HNSW index at
//! startup.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lru::LruCache;
use rusqlite::{Connection, OptionalExtension, params};

use crate::documents::{Metadata, MetadataExt};
use crate::embed::{Embedding, SharedEmbedder, cosine_similarity};

use super::filter::{Filter, FilterError};
use super::migrations;

#[cfg(feature = "vector-search")]
use crate::search::vector::VectorIndex;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Store error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Document not found
    #[error("Document not found: {0}")]
    NotFound(String),
    /// Invalid filter
    #[error("Invalid filter: {0}")]
    Filter(#[from] FilterError),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Store result type
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// RESULT SHAPES
// ============================================================================

/// Parallel arrays returned by `get`-style operations
#[derive(Debug, Clone, Default)]
pub struct GetResult {
    pub ids: Vec<String>,
    pub texts: Vec<String>,
    pub metadatas: Vec<Metadata>,
    /// Present only when embeddings were requested
    pub embeddings: Option<Vec<Option<Vec<f32>>>>,
}

impl GetResult {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Parallel arrays returned by vector queries; `distances` are cosine
/// distances (1 - similarity), ascending
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub ids: Vec<String>,
    pub texts: Vec<String>,
    pub metadatas: Vec<Metadata>,
    pub distances: Vec<f32>,
}

// ============================================================================
// STORE
// ============================================================================

/// Persistent typed-document collection with vector+metadata+text
pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    embedder: SharedEmbedder,
    #[cfg(feature = "vector-search")]
    vector_index: Mutex<VectorIndex>,
    /// LRU cache for query embeddings so repeated queries skip the model
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
    path: PathBuf,
}

impl Store {
    /// Apply performance pragmas to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) the store under `db_dir` with the given embedder.
    pub fn open(db_dir: &Path, embedder: SharedEmbedder) -> Result<Self> {
        std::fs::create_dir_all(db_dir)?;
        let path = db_dir.join("cortex.db");

        let writer = Connection::open(&path)?;
        Self::configure_connection(&writer)?;
        migrations::apply_migrations(&writer)?;

        let reader = Connection::open(&path)?;
        Self::configure_connection(&reader)?;

        #[cfg(feature = "vector-search")]
        let vector_index = VectorIndex::new(embedder.dimensions())
            .map_err(|e| StoreError::Init(format!("Failed to create vector index: {e}")))?;

        // 100 cached query embeddings is plenty for interactive use
        let query_cache = Mutex::new(LruCache::new(
            NonZeroUsize::new(100).expect("100 is non-zero"),
        ));

        let store = Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            embedder,
            #[cfg(feature = "vector-search")]
            vector_index: Mutex::new(vector_index),
            query_cache,
            path,
        };

        #[cfg(feature = "vector-search")]
        store.load_embeddings_into_index()?;

        Ok(store)
    }

    /// Path of the backing database file
    pub fn db_file(&self) -> &Path {
        &self.path
    }

    /// Applied schema version (for the migrations status endpoint)
    pub fn schema_version(&self) -> Result<u32> {
        let reader = self.lock_reader()?;
        Ok(migrations::schema_version(&reader)?)
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StoreError::Init("Writer lock poisoned".to_string()))
    }

    fn lock_reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StoreError::Init("Reader lock poisoned".to_string()))
    }

    /// Rebuild the HNSW index from persisted embeddings
    #[cfg(feature = "vector-search")]
    fn load_embeddings_into_index(&self) -> Result<()> {
        let rows: Vec<(String, Vec<u8>)> = {
            let reader = self.lock_reader()?;
            let mut stmt =
                reader.prepare("SELECT id, embedding FROM documents WHERE embedding IS NOT NULL")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        let mut index = self
            .vector_index
            .lock()
            .map_err(|_| StoreError::Init("Vector index lock poisoned".to_string()))?;

        for (id, bytes) in rows {
            if let Some(embedding) = Embedding::from_bytes(&bytes) {
                if embedding.dimensions == index.dimensions() {
                    if let Err(e) = index.add(&id, &embedding.vector) {
                        tracing::warn!("Failed to index embedding for {}: {}", id, e);
                    }
                }
            }
        }

        Ok(())
    }

    #[cfg(feature = "vector-search")]
    fn index_put(&self, id: &str, embedding: Option<&[f32]>) {
        if let Ok(mut index) = self.vector_index.lock() {
            let result = match embedding {
                Some(vector) => index.add(id, vector).map(|_| true),
                None => index.remove(id),
            };
            if let Err(e) = result {
                tracing::warn!("Vector index update failed for {}: {}", id, e);
            }
        }
    }

    #[cfg(feature = "vector-search")]
    fn index_remove(&self, id: &str) {
        if let Ok(mut index) = self.vector_index.lock() {
            if let Err(e) = index.remove(id) {
                tracing::warn!("Vector index removal failed for {}: {}", id, e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert or replace a document. The embedding is computed from `text`
    /// unless one is provided; an embedding failure degrades to a
    /// keyword-only document rather than failing the upsert.
    pub fn upsert(
        &self,
        id: &str,
        text: &str,
        metadata: Metadata,
        embedding: Option<Vec<f32>>,
    ) -> Result<()> {
        let embedding = match embedding {
            Some(v) => Some(v),
            None => match self.embedder.embed(text) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Embedding failed for {}: {} - storing without vector", id, e);
                    None
                }
            },
        };

        let doc_type = metadata.str_of("type").unwrap_or("").to_string();
        let repository = metadata.str_of("repository").unwrap_or("").to_string();
        let updated_at = metadata.str_of("updated_at").unwrap_or("").to_string();
        let metadata_json = serde_json::Value::Object(metadata).to_string();
        let blob = embedding.as_ref().map(|v| Embedding::new(v.clone()).to_bytes());

        {
            let writer = self.lock_writer()?;
            writer.execute(
                "INSERT OR REPLACE INTO documents
                    (id, doc_type, repository, text, metadata, embedding, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, doc_type, repository, text, metadata_json, blob, updated_at],
            )?;
        }

        #[cfg(feature = "vector-search")]
        self.index_put(id, embedding.as_deref());

        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    fn parse_metadata(raw: &str) -> Metadata {
        serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .and_then(|v| match v {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Fetch documents by id, preserving request order for found ids.
    pub fn get(&self, ids: &[&str], include_embeddings: bool) -> Result<GetResult> {
        let reader = self.lock_reader()?;
        let mut result = GetResult {
            embeddings: include_embeddings.then(Vec::new),
            ..Default::default()
        };

        for id in ids {
            let row: Option<(String, String, String, Option<Vec<u8>>)> = reader
                .query_row(
                    "SELECT id, text, metadata, embedding FROM documents WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;

            if let Some((id, text, meta_raw, blob)) = row {
                result.ids.push(id);
                result.texts.push(text);
                result.metadatas.push(Self::parse_metadata(&meta_raw));
                if let Some(embeddings) = &mut result.embeddings {
                    embeddings.push(
                        blob.as_deref()
                            .and_then(Embedding::from_bytes)
                            .map(|e| e.vector),
                    );
                }
            }
        }

        Ok(result)
    }

    /// Fetch a single document, if present.
    pub fn get_one(&self, id: &str) -> Result<Option<(String, Metadata)>> {
        let result = self.get(&[id], false)?;
        if result.is_empty() {
            return Ok(None);
        }
        let mut result = result;
        Ok(Some((result.texts.remove(0), result.metadatas.remove(0))))
    }

    /// Stored embedding for a document, if any.
    pub fn get_embedding(&self, id: &str) -> Result<Option<Vec<f32>>> {
        let reader = self.lock_reader()?;
        let blob: Option<Option<Vec<u8>>> = reader
            .query_row(
                "SELECT embedding FROM documents WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob
            .flatten()
            .as_deref()
            .and_then(Embedding::from_bytes)
            .map(|e| e.vector))
    }

    /// Fetch all documents matching `filter` (all documents when `None`),
    /// bounded by `limit`.
    pub fn get_where(&self, filter: Option<&Filter>, limit: Option<usize>) -> Result<GetResult> {
        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare("SELECT id, text, metadata FROM documents ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut result = GetResult::default();
        let max = limit.unwrap_or(usize::MAX);

        for row in rows {
            let (id, text, meta_raw) = row?;
            let meta = Self::parse_metadata(&meta_raw);
            if filter.map(|f| f.matches(&meta)).unwrap_or(true) {
                result.ids.push(id);
                result.texts.push(text);
                result.metadatas.push(meta);
                if result.ids.len() >= max {
                    break;
                }
            }
        }

        Ok(result)
    }

    /// Embed the query text (LRU-cached) and run a vector query.
    pub fn query(&self, query_text: &str, top_k: usize, filter: Option<&Filter>) -> Result<QueryResult> {
        let vector = {
            let cached = self
                .query_cache
                .lock()
                .ok()
                .and_then(|mut cache| cache.get(query_text).cloned());
            match cached {
                Some(v) => v,
                None => match self.embedder.embed(query_text) {
                    Ok(v) => {
                        if let Ok(mut cache) = self.query_cache.lock() {
                            cache.put(query_text.to_string(), v.clone());
                        }
                        v
                    }
                    Err(e) => {
                        tracing::warn!("Query embedding failed: {} - returning empty", e);
                        return Ok(QueryResult::default());
                    }
                },
            }
        };

        self.query_by_vector(&vector, top_k, filter)
    }

    /// Approximate nearest neighbors by cosine similarity, optionally
    /// pre-filtered. Filtered queries score candidates from stored
    /// embeddings; unfiltered queries take the HNSW fast path.
    pub fn query_by_vector(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<QueryResult> {
        #[cfg(feature = "vector-search")]
        if filter.is_none() {
            return self.query_via_index(vector, top_k);
        }

        self.query_via_scan(vector, top_k, filter)
    }

    #[cfg(feature = "vector-search")]
    fn query_via_index(&self, vector: &[f32], top_k: usize) -> Result<QueryResult> {
        let hits = {
            let index = self
                .vector_index
                .lock()
                .map_err(|_| StoreError::Init("Vector index lock poisoned".to_string()))?;
            index
                .search(vector, top_k)
                .map_err(|e| StoreError::Init(format!("Vector search failed: {e}")))?
        };

        let mut result = QueryResult::default();
        for (id, similarity) in hits {
            let fetched = self.get(&[id.as_str()], false)?;
            if fetched.is_empty() {
                continue;
            }
            result.ids.push(id);
            result.texts.push(fetched.texts[0].clone());
            result.metadatas.push(fetched.metadatas[0].clone());
            result.distances.push(1.0 - similarity);
        }
        Ok(result)
    }

    fn query_via_scan(&self, vector: &[f32], top_k: usize, filter: Option<&Filter>) -> Result<QueryResult> {
        let rows: Vec<(String, String, String, Vec<u8>)> = {
            let reader = self.lock_reader()?;
            let mut stmt = reader.prepare(
                "SELECT id, text, metadata, embedding FROM documents WHERE embedding IS NOT NULL",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        let mut scored: Vec<(f32, String, String, Metadata)> = Vec::new();
        for (id, text, meta_raw, blob) in rows {
            let meta = Self::parse_metadata(&meta_raw);
            if !filter.map(|f| f.matches(&meta)).unwrap_or(true) {
                continue;
            }
            let Some(embedding) = Embedding::from_bytes(&blob) else {
                continue;
            };
            let similarity = cosine_similarity(vector, &embedding.vector);
            scored.push((similarity, id, text, meta));
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        let mut result = QueryResult::default();
        for (similarity, id, text, meta) in scored {
            result.ids.push(id);
            result.texts.push(text);
            result.metadatas.push(meta);
            result.distances.push(1.0 - similarity);
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Deletes / counts
    // ------------------------------------------------------------------

    /// Delete documents by id. Returns how many existed.
    pub fn delete(&self, ids: &[&str]) -> Result<usize> {
        let mut deleted = 0;
        {
            let writer = self.lock_writer()?;
            for id in ids {
                deleted += writer.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
            }
        }

        #[cfg(feature = "vector-search")]
        for id in ids {
            self.index_remove(id);
        }

        Ok(deleted)
    }

    /// Delete every document matching the filter. Returns the deleted ids.
    pub fn delete_where(&self, filter: &Filter) -> Result<Vec<String>> {
        let matching = self.get_where(Some(filter), None)?;
        let ids: Vec<&str> = matching.ids.iter().map(String::as_str).collect();
        self.delete(&ids)?;
        Ok(matching.ids)
    }

    /// Total document count
    pub fn count(&self) -> Result<usize> {
        let reader = self.lock_reader()?;
        let count: i64 = reader.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Count documents matching a filter
    pub fn count_where(&self, filter: &Filter) -> Result<usize> {
        Ok(self.get_where(Some(filter), None)?.len())
    }

    /// Document counts grouped by type (for browse stats)
    pub fn counts_by_type(&self) -> Result<HashMap<String, usize>> {
        self.counts_grouped("doc_type")
    }

    /// Document counts grouped by repository (for browse stats)
    pub fn counts_by_repository(&self) -> Result<HashMap<String, usize>> {
        self.counts_grouped("repository")
    }

    fn counts_grouped(&self, column: &str) -> Result<HashMap<String, usize>> {
        let reader = self.lock_reader()?;
        let sql = format!("SELECT {column}, COUNT(*) FROM documents GROUP BY {column}");
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (key, count) = row?;
            counts.insert(key, count as usize);
        }
        Ok(counts)
    }

    /// Copy the database to `dest` (admin backup endpoint).
    pub fn backup(&self, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if dest.exists() {
            std::fs::remove_file(dest)?;
        }
        let writer = self.lock_writer()?;
        writer.execute("VACUUM INTO ?1", params![dest.to_string_lossy().into_owned()])?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::{EmbedError, Embedder};
    use std::sync::Arc;

    /// Deterministic embedder: hashes character trigrams into a small
    /// vector so related texts land near each other.
    struct TestEmbedder;

    impl Embedder for TestEmbedder {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbedError> {
            let mut v = vec![0.0_f32; 16];
            for token in text.split_whitespace() {
                let mut h: u32 = 2166136261;
                for b in token.bytes() {
                    h ^= b as u32;
                    h = h.wrapping_mul(16777619);
                }
                v[(h % 16) as usize] += 1.0;
            }
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in &mut v {
                    *x /= norm;
                }
            }
            Ok(v)
        }

        fn dimensions(&self) -> usize {
            16
        }
    }

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), Arc::new(TestEmbedder)).unwrap();
        (dir, store)
    }

    fn meta(doc_type: &str, repository: &str) -> Metadata {
        let mut m = Metadata::new();
        m.set_str("type", doc_type);
        m.set_str("repository", repository);
        m.set_str("created_at", "2026-01-01T00:00:00+00:00");
        m.set_str("updated_at", "2026-01-01T00:00:00+00:00");
        m
    }

    #[test]
    fn test_upsert_get_roundtrip() {
        let (_dir, store) = test_store();
        store
            .upsert("note:1", "jwt auth decision", meta("note", "demo"), None)
            .unwrap();

        let result = store.get(&["note:1"], false).unwrap();
        assert_eq!(result.ids, vec!["note:1"]);
        assert_eq!(result.texts[0], "jwt auth decision");
        assert_eq!(result.metadatas[0].str_of("type"), Some("note"));
    }

    #[test]
    fn test_upsert_replaces() {
        let (_dir, store) = test_store();
        store
            .upsert("note:1", "first", meta("note", "demo"), None)
            .unwrap();
        store
            .upsert("note:1", "second", meta("note", "demo"), None)
            .unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let result = store.get(&["note:1"], false).unwrap();
        assert_eq!(result.texts[0], "second");
    }

    #[test]
    fn test_get_where_filter() {
        let (_dir, store) = test_store();
        store
            .upsert("code:1", "fn a() {}", meta("code", "demo"), None)
            .unwrap();
        store
            .upsert("note:1", "a note", meta("note", "demo"), None)
            .unwrap();
        store
            .upsert("note:2", "other repo", meta("note", "other"), None)
            .unwrap();

        let filter = Filter::and(vec![Filter::eq("type", "note"), Filter::eq("repository", "demo")]);
        let result = store.get_where(Some(&filter), None).unwrap();
        assert_eq!(result.ids, vec!["note:1"]);
    }

    #[test]
    fn test_query_ranks_similar_first() {
        let (_dir, store) = test_store();
        store
            .upsert(
                "code:1",
                "authentication token refresh flow",
                meta("code", "demo"),
                None,
            )
            .unwrap();
        store
            .upsert(
                "code:2",
                "database connection pool sizing",
                meta("code", "demo"),
                None,
            )
            .unwrap();

        let result = store
            .query("authentication token refresh flow", 2, None)
            .unwrap();
        assert_eq!(result.ids[0], "code:1");
        assert!(result.distances[0] <= result.distances[1]);
    }

    #[test]
    fn test_query_with_filter() {
        let (_dir, store) = test_store();
        store
            .upsert("code:1", "token parsing", meta("code", "demo"), None)
            .unwrap();
        store
            .upsert("code:2", "token parsing", meta("code", "other"), None)
            .unwrap();

        let filter = Filter::eq("repository", "other");
        let result = store.query("token parsing", 10, Some(&filter)).unwrap();
        assert_eq!(result.ids, vec!["code:2"]);
    }

    #[test]
    fn test_delete_and_delete_where() {
        let (_dir, store) = test_store();
        store
            .upsert("code:1", "x", meta("code", "demo"), None)
            .unwrap();
        store
            .upsert("code:2", "y", meta("code", "demo"), None)
            .unwrap();

        assert_eq!(store.delete(&["code:1"]).unwrap(), 1);
        assert_eq!(store.count().unwrap(), 1);

        let deleted = store.delete_where(&Filter::eq("repository", "demo")).unwrap();
        assert_eq!(deleted, vec!["code:2"]);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path(), Arc::new(TestEmbedder)).unwrap();
            store
                .upsert("note:1", "persisted", meta("note", "demo"), None)
                .unwrap();
        }

        let store = Store::open(dir.path(), Arc::new(TestEmbedder)).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        // Reloaded index serves unfiltered queries
        let result = store.query("persisted", 1, None).unwrap();
        assert_eq!(result.ids, vec!["note:1"]);
    }

    #[test]
    fn test_counts_by_type() {
        let (_dir, store) = test_store();
        store
            .upsert("code:1", "x", meta("code", "demo"), None)
            .unwrap();
        store
            .upsert("code:2", "y", meta("code", "demo"), None)
            .unwrap();
        store
            .upsert("note:1", "z", meta("note", "demo"), None)
            .unwrap();

        let counts = store.counts_by_type().unwrap();
        assert_eq!(counts["code"], 2);
        assert_eq!(counts["note"], 1);
    }

    #[test]
    fn test_provided_embedding_used() {
        let (_dir, store) = test_store();
        let custom = vec![1.0_f32; 16];
        store
            .upsert("code:1", "text", meta("code", "demo"), Some(custom.clone()))
            .unwrap();

        let stored = store.get_embedding("code:1").unwrap().unwrap();
        assert_eq!(stored, custom);
    }
}

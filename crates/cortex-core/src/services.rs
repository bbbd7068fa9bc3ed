//! Service Registry
//!
//! One process-wide bundle of shared services: the store, the BM25 index
//! with its dirty flag, the reranker, the LLM client, and the runtime
//! configuration. Constructed explicitly at daemon bootstrap so
//! initialization errors surface immediately; readers share it through an
//! `Arc` without further locking.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::config::{RuntimeConfig, YamlConfig};
use crate::embed::{Reranker, RerankerConfig, SharedEmbedder};
use crate::llm::LlmClient;
use crate::search::{Bm25Hit, Bm25Index};
use crate::staleness::StalenessConfig;
use crate::store::{Store, StoreError};
use crate::vcs;

/// Service registry error
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Lock poisoned: {0}")]
    Poisoned(String),
}

/// Shared services for the daemon and its workers
pub struct Services {
    pub store: Arc<Store>,
    pub llm: LlmClient,
    reranker: Mutex<Reranker>,
    runtime: RwLock<RuntimeConfig>,
    yaml: RwLock<YamlConfig>,
    bm25: RwLock<Bm25Index>,
    bm25_dirty: AtomicBool,
    data_dir: PathBuf,
}

impl Services {
    /// Build the registry. The store opens under `<data_dir>/db` unless
    /// `CORTEX_DB_PATH` overrides it.
    pub fn new(
        data_dir: PathBuf,
        embedder: SharedEmbedder,
        yaml: YamlConfig,
    ) -> Result<Self, ServiceError> {
        std::fs::create_dir_all(&data_dir)?;

        let db_dir = crate::config::db_path(&data_dir);
        let store = Arc::new(Store::open(&db_dir, embedder)?);

        let runtime = RuntimeConfig::resolve(&yaml);
        let reranker = Reranker::new(RerankerConfig {
            result_count: runtime.top_k_rerank,
        });
        let llm = LlmClient::new(yaml.llm.clone());

        Ok(Self {
            store,
            llm,
            reranker: Mutex::new(reranker),
            runtime: RwLock::new(runtime),
            yaml: RwLock::new(yaml),
            bm25: RwLock::new(Bm25Index::default()),
            // Force a build before the first search
            bm25_dirty: AtomicBool::new(true),
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Delta-sync state file location
    pub fn state_file(&self) -> PathBuf {
        crate::config::state_file_path(&self.data_dir)
    }

    // ------------------------------------------------------------------
    // Runtime config
    // ------------------------------------------------------------------

    /// Snapshot of the runtime configuration
    pub fn runtime(&self) -> RuntimeConfig {
        self.runtime
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Mutate the runtime configuration under the write lock
    pub fn update_runtime<F: FnOnce(&mut RuntimeConfig)>(&self, f: F) {
        if let Ok(mut guard) = self.runtime.write() {
            f(&mut guard);
        }
    }

    /// Snapshot of the YAML configuration
    pub fn yaml(&self) -> YamlConfig {
        self.yaml
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Replace the YAML configuration (after a config write)
    pub fn set_yaml(&self, config: YamlConfig) {
        if let Ok(mut guard) = self.yaml.write() {
            *guard = config;
        }
    }

    /// Staleness thresholds from the current runtime config
    pub fn staleness_config(&self) -> StalenessConfig {
        let runtime = self.runtime();
        StalenessConfig {
            stale_threshold_days: runtime.staleness_time_threshold_days,
            very_stale_threshold_days: runtime.staleness_very_stale_threshold_days,
        }
    }

    // ------------------------------------------------------------------
    // BM25 index
    // ------------------------------------------------------------------

    /// Mark the keyword index stale. Called after any store write; the
    /// next search rebuilds.
    pub fn mark_index_dirty(&self) {
        self.bm25_dirty.store(true, Ordering::Release);
    }

    /// Rebuild the BM25 index from the store if any write happened since
    /// the last build. Idempotent and cheap when clean.
    pub fn ensure_bm25(&self) -> Result<(), ServiceError> {
        if !self.bm25_dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let all = self.store.get_where(None, None)?;
        let docs: Vec<_> = all
            .ids
            .into_iter()
            .zip(all.texts)
            .zip(all.metadatas)
            .map(|((id, text), meta)| (id, text, meta))
            .collect();

        let rebuilt = Bm25Index::build(docs);
        tracing::debug!("BM25 index rebuilt: {} docs", rebuilt.len());

        let mut guard = self
            .bm25
            .write()
            .map_err(|_| ServiceError::Poisoned("bm25".to_string()))?;
        *guard = rebuilt;
        Ok(())
    }

    /// Keyword search over the current index snapshot
    pub fn bm25_search(&self, query: &str, top_k: usize) -> Vec<Bm25Hit> {
        match self.bm25.read() {
            Ok(index) => index.search(query, top_k),
            Err(_) => vec![],
        }
    }

    // ------------------------------------------------------------------
    // Reranker
    // ------------------------------------------------------------------

    /// Run the cross-encoder (or its fallback) over `(item, text)` pairs
    pub fn rerank<T: Clone>(
        &self,
        query: &str,
        candidates: Vec<(T, String)>,
        top_k: usize,
    ) -> Vec<crate::embed::RerankedResult<T>> {
        match self.reranker.lock() {
            Ok(mut reranker) => reranker.rerank(query, candidates, Some(top_k)),
            Err(_) => vec![],
        }
    }

    /// Load the cross-encoder model (daemon startup only)
    #[cfg(feature = "embeddings")]
    pub fn init_reranker(&self) {
        if let Ok(mut reranker) = self.reranker.lock() {
            reranker.init_cross_encoder();
        }
    }

    // ------------------------------------------------------------------
    // Repository resolution
    // ------------------------------------------------------------------

    /// Resolve the working-tree path for a repository name.
    ///
    /// A configured `code_paths` entry whose basename matches wins, then a
    /// direct child of a configured path; with no name, the current
    /// directory when it is a VC repo.
    pub async fn repo_path(&self, repository: Option<&str>) -> Option<PathBuf> {
        let code_paths: Vec<PathBuf> = self
            .yaml()
            .code_paths
            .iter()
            .map(|p| expand_home(p))
            .collect();

        if let Some(name) = repository {
            for base in &code_paths {
                if base.file_name().and_then(|n| n.to_str()) == Some(name) && base.is_dir() {
                    return Some(base.clone());
                }
                let child = base.join(name);
                if child.is_dir() {
                    return Some(child);
                }
            }
            return None;
        }

        let cwd = std::env::current_dir().ok()?;
        if vcs::is_repo(&cwd).await {
            return Some(cwd);
        }
        None
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(base) = directories::BaseDirs::new() {
            return base.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{Metadata, MetadataExt};
    use crate::embed::{EmbedError, Embedder};

    struct TestEmbedder;

    impl Embedder for TestEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            let mut v = vec![0.0_f32; 8];
            for (i, b) in text.bytes().enumerate() {
                v[i % 8] += b as f32;
            }
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1.0);
            Ok(v.into_iter().map(|x| x / norm).collect())
        }

        fn dimensions(&self) -> usize {
            8
        }
    }

    fn test_services() -> (tempfile::TempDir, Services) {
        let dir = tempfile::tempdir().unwrap();
        let services = Services::new(
            dir.path().to_path_buf(),
            Arc::new(TestEmbedder),
            YamlConfig::default(),
        )
        .unwrap();
        (dir, services)
    }

    #[test]
    fn test_bm25_rebuild_on_dirty() {
        let (_dir, services) = test_services();

        let mut meta = Metadata::new();
        meta.set_str("type", "note");
        meta.set_str("repository", "demo");
        services
            .store
            .upsert("note:1", "jwt refresh token logic", meta, None)
            .unwrap();
        services.mark_index_dirty();

        services.ensure_bm25().unwrap();
        let hits = services.bm25_search("jwt refresh", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "note:1");
    }

    #[test]
    fn test_ensure_bm25_idempotent_when_clean() {
        let (_dir, services) = test_services();
        services.ensure_bm25().unwrap();
        // Second call with no writes is a no-op
        services.ensure_bm25().unwrap();
        assert!(services.bm25_search("anything", 10).is_empty());
    }

    #[test]
    fn test_runtime_update() {
        let (_dir, services) = test_services();
        services.update_runtime(|r| r.min_score = 0.05);
        assert_eq!(services.runtime().min_score, 0.05);
    }
}

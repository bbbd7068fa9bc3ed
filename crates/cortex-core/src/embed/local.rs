//! Local Embeddings
//!
//! fastembed-backed [`Embedder`]: nomic-embed-text-v1.5 (768 dims,
//! Matryoshka-truncated to 256) running on local ONNX inference, no
//! external API. The model is a process-wide singleton loaded on first
//! use.

use std::sync::{Mutex, OnceLock};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{EMBEDDING_DIMENSIONS, EmbedError, Embedder, matryoshka_truncate};

/// Maximum text length for embedding (longer inputs are truncated)
pub const MAX_TEXT_LENGTH: usize = 8192;

/// Batch size for embedding generation
const BATCH_SIZE: usize = 32;

static EMBEDDING_MODEL: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

/// Model cache directory: `FASTEMBED_CACHE_PATH` env var, else the platform
/// cache dir, else `.fastembed_cache`.
fn cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return std::path::PathBuf::from(path);
    }

    if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "cortex", "core") {
        return proj_dirs.cache_dir().join("fastembed");
    }

    std::path::PathBuf::from(".fastembed_cache")
}

fn get_model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbedError> {
    let result = EMBEDDING_MODEL.get_or_init(|| {
        let cache = cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache) {
            tracing::warn!("Failed to create model cache dir {:?}: {}", cache, e);
        }

        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(true)
            .with_cache_dir(cache);

        TextEmbedding::try_new(options).map(Mutex::new).map_err(|e| {
            format!(
                "Failed to initialize nomic-embed-text-v1.5: {}. \
                Ensure ONNX runtime is available and model files can be downloaded.",
                e
            )
        })
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbedError::ModelInit(format!("Model lock poisoned: {e}"))),
        Err(err) => Err(EmbedError::ModelInit(err.clone())),
    }
}

/// Local fastembed-backed embedder
pub struct LocalEmbedder {
    _unused: (),
}

impl Default for LocalEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalEmbedder {
    /// Create the embedder. The model is NOT loaded here - it loads lazily
    /// on first `embed` or explicitly via [`LocalEmbedder::init`].
    pub fn new() -> Self {
        Self { _unused: () }
    }

    /// Force model load (downloads on first run). Call during daemon
    /// startup so initialization errors surface immediately.
    pub fn init(&self) -> Result<(), EmbedError> {
        get_model().map(|_| ())
    }

    /// True when the model loaded successfully
    pub fn is_ready(&self) -> bool {
        get_model().is_ok()
    }

    fn truncate(text: &str) -> &str {
        if text.len() > MAX_TEXT_LENGTH {
            let mut end = MAX_TEXT_LENGTH;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            &text[..end]
        } else {
            text
        }
    }
}

impl Embedder for LocalEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.is_empty() {
            return Err(EmbedError::InvalidInput("Text cannot be empty".to_string()));
        }

        let mut model = get_model()?;
        let embeddings = model
            .embed(vec![Self::truncate(text)], None)
            .map_err(|e| EmbedError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .map(matryoshka_truncate)
            .ok_or_else(|| EmbedError::EmbeddingFailed("No embedding generated".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = get_model()?;
        let mut all = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let truncated: Vec<&str> = chunk.iter().map(|t| Self::truncate(t)).collect();
            let embeddings = model
                .embed(truncated, None)
                .map_err(|e| EmbedError::EmbeddingFailed(e.to_string()))?;
            all.extend(embeddings.into_iter().map(matryoshka_truncate));
        }

        Ok(all)
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}

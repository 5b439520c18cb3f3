//! Local Semantic Embeddings
//!
//! fastembed-backed [`Embedder`] using all-MiniLM-L6-v2 (384 dimensions,
//! the dimension the vector index is sized for). The model is loaded
//! lazily on first use; a load failure is remembered and reported as
//! [`EmbeddingError::Unavailable`] on every subsequent call so hybrid
//! search can degrade instead of retrying a broken install.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Mutex, OnceLock};

use super::{Embedder, EmbeddingError, Result, EMBEDDING_DIMENSIONS};

/// Model identifier persisted alongside vectors.
pub const LOCAL_MODEL_NAME: &str = "sentence-transformers/all-MiniLM-L6-v2";

static EMBEDDING_MODEL_RESULT: OnceLock<std::result::Result<Mutex<TextEmbedding>, String>> =
    OnceLock::new();

/// Cache directory for downloaded model files. Respects
/// `FASTEMBED_CACHE_PATH`, then falls back to the platform cache dir.
fn cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return std::path::PathBuf::from(path);
    }
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "lfi", "rekall") {
        return proj_dirs.cache_dir().join("fastembed");
    }
    std::path::PathBuf::from(".fastembed_cache")
}

fn get_model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>> {
    let result = EMBEDDING_MODEL_RESULT.get_or_init(|| {
        let cache = cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache) {
            tracing::warn!("Failed to create fastembed cache dir {:?}: {e}", cache);
        }

        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(false)
            .with_cache_dir(cache);

        TextEmbedding::try_new(options).map(Mutex::new).map_err(|e| {
            format!(
                "Failed to initialize all-MiniLM-L6-v2: {e}. \
                 Ensure ONNX runtime is available and model files can be downloaded."
            )
        })
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::Failed(format!("Model lock poisoned: {e}"))),
        Err(err) => Err(EmbeddingError::Unavailable(err.clone())),
    }
}

/// Embedder backed by a locally cached ONNX model.
#[derive(Debug, Clone, Default)]
pub struct LocalEmbedder;

impl LocalEmbedder {
    /// Create a local embedder. The model loads on first encode.
    pub fn new() -> Self {
        Self
    }

    /// Whether the model is loaded and usable.
    pub fn is_ready(&self) -> bool {
        get_model().is_ok()
    }

    /// Force model initialization (downloads on first run).
    pub fn init(&self) -> Result<()> {
        get_model().map(|_| ())
    }
}

impl Embedder for LocalEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.encode_batch(std::slice::from_ref(&text.to_string()))?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Failed("model returned no vector".to_string()))
    }

    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut model = get_model()?;
        let vectors = model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::Failed(e.to_string()))?;

        for vector in &vectors {
            if vector.len() != EMBEDDING_DIMENSIONS {
                return Err(EmbeddingError::Failed(format!(
                    "expected {EMBEDDING_DIMENSIONS} dimensions, model produced {}",
                    vector.len()
                )));
            }
        }
        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        LOCAL_MODEL_NAME
    }
}

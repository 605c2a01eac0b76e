//! Local neural embeddings via fastembed.
//!
//! Uses `multilingual-e5-small` (384 dimensions) so non-English decisions and
//! checkpoints land in the same vector space. The model loads lazily on first
//! use and is cached for the life of the process.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Mutex, OnceLock};

use super::provider::{
    truncate_for_embedding, Embedding, EmbeddingError, EmbeddingProvider, EMBEDDING_DIMENSIONS,
};

/// Result of one-time model initialization
static EMBEDDING_MODEL_RESULT: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

/// Model cache directory: `FASTEMBED_CACHE_PATH` env var, platform cache dir,
/// or a local dotdir as a last resort.
fn get_cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return std::path::PathBuf::from(path);
    }

    if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "mama", "core") {
        return proj_dirs.cache_dir().join("fastembed");
    }

    if let Some(base_dirs) = directories::BaseDirs::new() {
        return base_dirs.home_dir().join(".cache/mama/fastembed");
    }

    std::path::PathBuf::from(".fastembed_cache")
}

fn get_model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let result = EMBEDDING_MODEL_RESULT.get_or_init(|| {
        let cache_dir = get_cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!("Failed to create cache directory {:?}: {}", cache_dir, e);
        }

        let options = InitOptions::new(EmbeddingModel::MultilingualE5Small)
            .with_show_download_progress(false)
            .with_cache_dir(cache_dir);

        TextEmbedding::try_new(options).map(Mutex::new).map_err(|e| {
            format!(
                "Failed to initialize multilingual-e5-small embedding model: {}. \
                Ensure ONNX runtime is available and model files can be downloaded.",
                e
            )
        })
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::ModelInit(format!("Lock poisoned: {}", e))),
        Err(err) => Err(EmbeddingError::ModelInit(err.clone())),
    }
}

/// Neural embedding provider backed by a local ONNX model.
pub struct NeuralEmbedder {
    _unused: (),
}

impl Default for NeuralEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl NeuralEmbedder {
    /// Create the provider; the model itself loads on first `embed`.
    pub fn new() -> Self {
        Self { _unused: () }
    }
}

impl EmbeddingProvider for NeuralEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut model = get_model()?;
        let text = truncate_for_embedding(text);

        let vectors = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::Failed(e.to_string()))?;

        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Failed("no embedding generated".to_string()))?;

        if vector.len() != EMBEDDING_DIMENSIONS {
            return Err(EmbeddingError::Failed(format!(
                "model produced {} dimensions, expected {}",
                vector.len(),
                EMBEDDING_DIMENSIONS
            )));
        }

        let mut embedding = Embedding::new(vector);
        embedding.normalize();
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn name(&self) -> &'static str {
        "multilingual-e5-small"
    }

    fn is_available(&self) -> bool {
        match get_model() {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Embedding model not ready: {}", e);
                false
            }
        }
    }
}

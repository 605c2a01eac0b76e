//! Embedding generation with graceful degradation.
//!
//! The engine prefers the neural provider when the `embeddings` feature is on
//! and the model is loadable, and falls back to the deterministic hashed
//! provider otherwise. Both produce unit-normalized 384-dim vectors, so the
//! rest of the core never cares which one served a request.

mod hashed;
mod provider;

#[cfg(feature = "embeddings")]
mod local;

pub use hashed::HashedEmbedder;
pub use provider::{
    cosine_similarity, dot_product, Embedding, EmbeddingError, EmbeddingProvider,
    EMBEDDING_DIMENSIONS, MAX_TEXT_LENGTH, NORM_TOLERANCE,
};

#[cfg(feature = "embeddings")]
pub use local::NeuralEmbedder;

/// Provider chain: neural first (when compiled in and loadable), hashed
/// fallback always.
pub struct EmbeddingEngine {
    #[cfg(feature = "embeddings")]
    neural: NeuralEmbedder,
    hashed: HashedEmbedder,
}

impl Default for EmbeddingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingEngine {
    /// Create the engine. Model loading is deferred to first use.
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "embeddings")]
            neural: NeuralEmbedder::new(),
            hashed: HashedEmbedder::default(),
        }
    }

    /// Embed text, degrading from neural to hashed. `EmptyInput` propagates
    /// (an entity with no embeddable text stores no vector); any other neural
    /// failure falls through to the hashed provider.
    pub fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        #[cfg(feature = "embeddings")]
        {
            match self.neural.embed(text) {
                Ok(embedding) => return Ok(embedding),
                Err(EmbeddingError::EmptyInput) => return Err(EmbeddingError::EmptyInput),
                Err(e) => {
                    tracing::warn!(
                        "Neural embedding unavailable ({}), using {} fallback",
                        e,
                        self.hashed.name()
                    );
                }
            }
        }

        self.hashed.embed(text)
    }

    /// Name of the provider that would currently serve requests
    pub fn provider_name(&self) -> &'static str {
        #[cfg(feature = "embeddings")]
        if self.neural.is_available() {
            return self.neural.name();
        }
        self.hashed.name()
    }

    /// Vector dimension of every provider in the chain
    pub fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}

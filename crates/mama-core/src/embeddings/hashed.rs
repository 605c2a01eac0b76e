//! Hashed term-frequency fallback provider.
//!
//! Produces deterministic dense vectors by hashing terms into fixed-dimension
//! buckets and weighting by term frequency. Not as semantically rich as
//! neural embeddings, but always available and fully offline, so search keeps
//! working when the model cannot be loaded.

use std::collections::HashMap;

use super::provider::{
    truncate_for_embedding, Embedding, EmbeddingError, EmbeddingProvider, EMBEDDING_DIMENSIONS,
};

/// Deterministic hashed term-frequency embedder.
pub struct HashedEmbedder {
    dimensions: usize,
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIMENSIONS)
    }
}

impl HashedEmbedder {
    /// Create an embedder producing vectors of the given dimension.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Hash a term into a bucket index using FNV-1a.
    fn hash_term(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h as usize) % dims
    }

    /// Tokenize text into lowercase alphanumeric terms. Unicode-aware, so
    /// multilingual input degrades gracefully.
    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|s| s.chars().count() >= 2)
            .map(|s| s.to_lowercase())
            .collect()
    }

    fn term_vector(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let tokens = Self::tokenize(truncate_for_embedding(text));
        if tokens.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut tf: HashMap<String, f32> = HashMap::new();
        for tok in &tokens {
            *tf.entry(tok.clone()).or_default() += 1.0;
        }

        let total = tokens.len() as f32;
        let mut vec = vec![0.0f32; self.dimensions];

        for (term, count) in &tf {
            let freq = count / total;
            // Longer terms carry more signal; short ones are likely stopwords
            let weight = 1.0 + (term.chars().count() as f32).ln();
            let bucket = Self::hash_term(term, self.dimensions);
            vec[bucket] += freq * weight;
        }

        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm <= f32::EPSILON {
            return Err(EmbeddingError::EmptyInput);
        }
        for v in &mut vec {
            *v /= norm;
        }
        Ok(vec)
    }
}

impl EmbeddingProvider for HashedEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.term_vector(text).map(Embedding::new)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &'static str {
        "hashed-tf"
    }

    fn is_available(&self) -> bool {
        true
    }
}

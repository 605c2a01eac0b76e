//! Embedding contract shared by all providers.

// ============================================================================
// CONSTANTS
// ============================================================================

/// Fixed embedding dimension the rest of the core relies on
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// Maximum text length for embedding (longer input is truncated)
pub const MAX_TEXT_LENGTH: usize = 8192;

/// Tolerance for the unit-norm invariant
pub const NORM_TOLERANCE: f32 = 1e-5;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Failed to initialize the embedding model
    #[error("model initialization failed: {0}")]
    ModelInit(String),
    /// Failed to generate an embedding
    #[error("embedding generation failed: {0}")]
    Failed(String),
    /// Input had no embeddable text
    #[error("no embeddable text")]
    EmptyInput,
}

// ============================================================================
// EMBEDDING TYPE
// ============================================================================

/// A unit-normalized semantic embedding vector
#[derive(Debug, Clone)]
pub struct Embedding {
    /// The embedding vector
    pub vector: Vec<f32>,
    /// Dimensions of the vector
    pub dimensions: usize,
}

impl Embedding {
    /// Create a new embedding from a vector
    pub fn new(vector: Vec<f32>) -> Self {
        let dimensions = vector.len();
        Self { vector, dimensions }
    }

    /// Normalize the vector to unit length in place
    pub fn normalize(&mut self) {
        let norm = self.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut self.vector {
                *x /= norm;
            }
        }
    }

    /// Check the unit-norm invariant: |‖v‖ − 1| < tolerance
    pub fn is_normalized(&self) -> bool {
        let norm = self.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        (norm - 1.0).abs() < NORM_TOLERANCE
    }

    /// Convert to little-endian bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        self.vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Create from stored bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let vector: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Some(Self::new(vector))
    }

    /// Cosine similarity with another embedding
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.dimensions != other.dimensions {
            return 0.0;
        }
        cosine_similarity(&self.vector, &other.vector)
    }
}

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// A source of fixed-dimension unit-normalized vectors. Implementations must
/// be deterministic for identical input within a process.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for the given text
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Vector dimension this provider produces
    fn dimensions(&self) -> usize;

    /// Provider name for logging and embedding provenance
    fn name(&self) -> &'static str;

    /// Whether the provider can serve requests right now
    fn is_available(&self) -> bool;
}

// ============================================================================
// SIMILARITY FUNCTIONS
// ============================================================================

/// Compute cosine similarity between two vectors
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 { dot / denominator } else { 0.0 }
}

/// Dot product between two vectors. Equals cosine similarity when both are
/// unit-normalized.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Truncate text to at most `MAX_TEXT_LENGTH` bytes on a char boundary.
pub(crate) fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_TEXT_LENGTH {
        return text;
    }
    let mut end = MAX_TEXT_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ============================================================================
// TESTS
// ============================================================================

//! Retrieval: exact vector index plus the scoring engine.

mod engine;
mod vector;

pub use engine::{recency_factor, type_affinity, SearchHit, SearchOptions};
pub use vector::{VectorIndex, VectorIndexStats};

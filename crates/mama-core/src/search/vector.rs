//! Exact nearest-neighbor search over stored vectors.
//!
//! A linear scan with dot-product scoring. All stored vectors are
//! unit-normalized, so the dot product *is* the exact cosine similarity.
//! At the target scale (tens of thousands of entities) a scan is faster than
//! maintaining an approximate structure, and it never trades away exactness.

use std::collections::{HashMap, HashSet};

use crate::deadline::Deadline;
use crate::embeddings::dot_product;
use crate::error::{MamaError, Result};

/// How often the scan loop checks the deadline
const DEADLINE_STRIDE: usize = 1024;

/// Index statistics
#[derive(Debug, Clone)]
pub struct VectorIndexStats {
    /// Total number of vectors
    pub total_vectors: usize,
    /// Vector dimensions
    pub dimensions: usize,
    /// Approximate memory usage in bytes
    pub memory_bytes: usize,
}

/// In-memory exact vector index, keyed by entity id.
///
/// Kept in sync by the entity store; rebuilt from the embeddings table at
/// open.
pub struct VectorIndex {
    vectors: HashMap<String, Vec<f32>>,
    dimensions: usize,
}

impl VectorIndex {
    /// Create an empty index for vectors of the given dimension
    pub fn new(dimensions: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            dimensions,
        }
    }

    /// Number of vectors in the index
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Vector dimension of the index
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Add or replace a vector. Rejects dimension mismatches.
    pub fn add(&mut self, key: &str, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(MamaError::InvariantViolated(format!(
                "vector for {key} has {} dimensions, index expects {}",
                vector.len(),
                self.dimensions
            )));
        }
        self.vectors.insert(key.to_string(), vector.to_vec());
        Ok(())
    }

    /// Remove a vector by key. Returns whether it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.vectors.remove(key).is_some()
    }

    /// Whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.vectors.contains_key(key)
    }

    /// Top-k keys with cosine similarity ≥ `threshold`, excluding
    /// `exclude_ids`, sorted by similarity descending (key ascending on ties
    /// for determinism).
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
        exclude_ids: &HashSet<String>,
        deadline: &Deadline,
    ) -> Result<Vec<(String, f32)>> {
        if query.len() != self.dimensions {
            return Err(MamaError::InvariantViolated(format!(
                "query has {} dimensions, index expects {}",
                query.len(),
                self.dimensions
            )));
        }
        if k == 0 || self.vectors.is_empty() {
            return Ok(vec![]);
        }

        let mut hits: Vec<(String, f32)> = Vec::new();
        for (scanned, (key, vector)) in self.vectors.iter().enumerate() {
            if scanned % DEADLINE_STRIDE == 0 {
                deadline.check("vector scan")?;
            }
            if exclude_ids.contains(key) {
                continue;
            }
            let similarity = dot_product(query, vector);
            if similarity >= threshold {
                hits.push((key.clone(), similarity));
            }
        }

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Index statistics
    pub fn stats(&self) -> VectorIndexStats {
        VectorIndexStats {
            total_vectors: self.vectors.len(),
            dimensions: self.dimensions,
            memory_bytes: self.vectors.len() * self.dimensions * std::mem::size_of::<f32>(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DIMS: usize = 8;

    /// Unit vector pointing mostly along axis `axis`
    fn unit_vector(axis: usize) -> Vec<f32> {
        let mut v = vec![0.05f32; DIMS];
        v[axis % DIMS] = 1.0;
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / norm).collect()
    }

    #[test]
    fn test_add_and_search() {
        let mut index = VectorIndex::new(DIMS);
        index.add("node-1", &unit_vector(1)).unwrap();
        index.add("node-2", &unit_vector(2)).unwrap();
        index.add("node-3", &unit_vector(5)).unwrap();

        assert_eq!(index.len(), 3);
        assert!(index.contains("node-1"));
        assert!(!index.contains("node-999"));

        let results = index
            .search(&unit_vector(1), 3, 0.0, &HashSet::new(), &Deadline::none())
            .unwrap();
        assert_eq!(results[0].0, "node-1");
        assert!((results[0].1 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_threshold_filters() {
        let mut index = VectorIndex::new(DIMS);
        index.add("similar", &unit_vector(0)).unwrap();
        index.add("different", &unit_vector(4)).unwrap();

        let results = index
            .search(&unit_vector(0), 10, 0.9, &HashSet::new(), &Deadline::none())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "similar");
    }

    #[test]
    fn test_exclusions() {
        let mut index = VectorIndex::new(DIMS);
        index.add("a", &unit_vector(0)).unwrap();
        index.add("b", &unit_vector(0)).unwrap();

        let exclude: HashSet<String> = ["a".to_string()].into();
        let results = index
            .search(&unit_vector(0), 10, 0.0, &exclude, &Deadline::none())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "b");
    }

    #[test]
    fn test_results_sorted_descending() {
        let mut index = VectorIndex::new(DIMS);
        for axis in 0..DIMS {
            index.add(&format!("node-{axis}"), &unit_vector(axis)).unwrap();
        }

        let results = index
            .search(&unit_vector(0), DIMS, -1.0, &HashSet::new(), &Deadline::none())
            .unwrap();
        for pair in results.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn test_update_replaces() {
        let mut index = VectorIndex::new(DIMS);
        index.add("node-1", &unit_vector(0)).unwrap();
        index.add("node-1", &unit_vector(3)).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut index = VectorIndex::new(DIMS);
        index.add("node-1", &unit_vector(0)).unwrap();
        assert!(index.remove("node-1"));
        assert!(!index.remove("node-1"));
        assert!(index.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = VectorIndex::new(DIMS);
        assert!(index.add("node-1", &[1.0, 2.0]).is_err());
        let err = index.search(&[1.0], 5, 0.0, &HashSet::new(), &Deadline::none());
        assert!(err.is_err());
    }
}

//! Semantic search with recency and cross-type affinity boosting.
//!
//! The vector index proposes candidates by exact cosine similarity; the
//! engine re-scores them with a small fixed affinity table and an
//! exponential recency factor, keeping the raw similarity on every hit.

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::deadline::Deadline;
use crate::embeddings::EmbeddingError;
use crate::error::{MamaError, Result};
use crate::memory::{Entity, EntityType};
use crate::storage::{Storage, ENTITY_COLUMNS};

/// Minimum candidate overfetch from the vector index
const MIN_CANDIDATES: usize = 20;

/// Half-life shape of the recency factor, in days
const RECENCY_SCALE_DAYS: f64 = 30.0;

/// Options for a semantic search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Number of results to return
    pub k: usize,
    /// Minimum cosine similarity for candidates
    pub threshold: f32,
    /// Restrict results to one entity type
    pub type_filter: Option<EntityType>,
    /// Weight of the recency factor in the final score
    pub recency_weight: f64,
    /// Type of the querying context, for cross-type affinity boosting
    pub context_type: Option<EntityType>,
    /// Entity ids to exclude from results
    pub exclude_ids: Vec<String>,
    /// Cooperative deadline
    pub deadline: Deadline,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            k: 10,
            threshold: 0.7,
            type_filter: None,
            recency_weight: 0.3,
            context_type: None,
            exclude_ids: Vec::new(),
            deadline: Deadline::none(),
        }
    }
}

/// One search result: the entity, its exact cosine similarity, and the final
/// boosted score results are ordered by.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// The matched entity
    pub entity: Entity,
    /// Raw cosine similarity to the query
    pub similarity: f32,
    /// Final score: `sim · boost · (1 + w · recency)`, clamped to 1
    pub score: f64,
}

/// Cross-type affinity: how much a candidate of one type matters to a query
/// issued from the context of another.
pub fn type_affinity(context: EntityType, candidate: EntityType) -> f64 {
    match (context, candidate) {
        (EntityType::Decision, EntityType::Checkpoint) => 1.2,
        (EntityType::Checkpoint, EntityType::Checkpoint) => 0.8,
        (EntityType::Insight, EntityType::Decision) => 1.1,
        _ => 1.0,
    }
}

/// Recency factor `exp(-age_days / 30)`: 1.0 for brand-new entities, ~0.37
/// after a month.
pub fn recency_factor(age_days: f64) -> f64 {
    (-age_days.max(0.0) / RECENCY_SCALE_DAYS).exp()
}

impl Storage {
    /// Embed a query, caching the vector for repeated searches.
    pub(crate) fn query_embedding(&self, query: &str) -> Result<Vec<f32>> {
        {
            let mut cache = self
                .query_cache
                .lock()
                .map_err(|_| MamaError::Storage("query cache lock poisoned".to_string()))?;
            if let Some(vector) = cache.get(query) {
                return Ok(vector.clone());
            }
        }

        let embedding = self.embedder.embed(query).map_err(|e| match e {
            EmbeddingError::EmptyInput => MamaError::validation("query must not be empty"),
            other => MamaError::EmbedUnavailable(other.to_string()),
        })?;

        let mut cache = self
            .query_cache
            .lock()
            .map_err(|_| MamaError::Storage("query cache lock poisoned".to_string()))?;
        cache.put(query.to_string(), embedding.vector.clone());
        Ok(embedding.vector)
    }

    /// Semantic search: embed the query, collect candidates above the
    /// threshold, score with affinity and recency, return the top k ordered
    /// by final score (descending).
    pub fn search(&self, query_text: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        let query = self.query_embedding(query_text)?;

        let overfetch = (options.k * 4).max(MIN_CANDIDATES);
        let exclude: HashSet<String> = options.exclude_ids.iter().cloned().collect();
        let candidates = {
            let index = self.vectors()?;
            index.search(
                &query,
                overfetch,
                options.threshold,
                &exclude,
                &options.deadline,
            )?
        };

        let now = Utc::now();
        let mut hits: Vec<SearchHit> = Vec::with_capacity(candidates.len());
        for (id, similarity) in candidates {
            options.deadline.check("search scoring")?;
            let Some(entity) = self.get_opt(&id)? else {
                // Index briefly ahead of a concurrent delete; skip
                continue;
            };
            if let Some(filter) = options.type_filter {
                if entity.entity_type != filter {
                    continue;
                }
            }

            let boost = options
                .context_type
                .map(|context| type_affinity(context, entity.entity_type))
                .unwrap_or(1.0);
            let age_days =
                (now - entity.created_at).num_milliseconds() as f64 / 86_400_000.0;
            let score = (similarity as f64
                * boost
                * (1.0 + options.recency_weight * recency_factor(age_days)))
            .min(1.0);

            hits.push(SearchHit {
                entity,
                similarity,
                score,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.similarity
                        .partial_cmp(&a.similarity)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.entity.id.cmp(&b.entity.id))
        });
        hits.truncate(options.k);
        Ok(hits)
    }

    /// Exact, case-sensitive topic match, newest first; ties keep insertion
    /// order.
    pub fn search_by_topic(&self, topic: &str) -> Result<Vec<Entity>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE topic = ?1
             ORDER BY created_at DESC, rowid ASC"
        ))?;
        let rows = stmt.query_map([topic], crate::storage::row_to_entity)?;
        let mut entities = Vec::new();
        for row in rows {
            entities.push(row?);
        }
        Ok(entities)
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Data model: entities, links, audit, restart metrics.

mod entity;
mod link;

pub use entity::{
    generate_entity_id, searchable_text, validate_outcome_update, Entity, EntityDraft, EntityType,
    Outcome, DEFAULT_DECISION_CONFIDENCE, MAX_OUTCOME_DETAIL,
};
pub use link::{
    AuditAction, AuditActor, AuditEntry, Link, LinkCategory, LinkDraft, LinkOrigin, RestartFailure,
    RestartMetric, RestartMode, RestartStatus,
};

use serde::{Deserialize, Serialize};

/// Storage-wide counts for health surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    /// Total entities
    pub total_entities: i64,
    /// Entities by type (decision, checkpoint, insight, context)
    pub decisions: i64,
    /// Checkpoint count
    pub checkpoints: i64,
    /// Insight count
    pub insights: i64,
    /// Context count
    pub contexts: i64,
    /// Entities carrying an embedding vector
    pub with_embedding: i64,
    /// Total links
    pub total_links: i64,
    /// Approved links
    pub approved_links: i64,
    /// Pending (unapproved) links
    pub pending_links: i64,
    /// Audit log entries
    pub audit_entries: i64,
    /// Restart metric rows
    pub restart_metrics: i64,
}

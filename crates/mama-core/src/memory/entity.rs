//! Memory entity - the fundamental unit of decision memory
//!
//! Each entity is a typed record with:
//! - Primary content and an optional short topic key
//! - Narrative fields (reasoning, evidence, alternatives, risks, next steps)
//! - An outcome lifecycle for decisions
//! - Embedding metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MamaError, Result};

/// Maximum length for outcome detail fields (`failure_reason`, `limitation`)
pub const MAX_OUTCOME_DETAIL: usize = 2000;

/// Default confidence assigned to decisions that do not specify one
pub const DEFAULT_DECISION_CONFIDENCE: f64 = 0.7;

// ============================================================================
// ENTITY TYPES
// ============================================================================

/// Types of memory entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// An architectural or implementation decision with reasoning
    Decision,
    /// A session checkpoint for resume
    Checkpoint,
    /// A learned insight or reflection
    Insight,
    /// Background context
    #[default]
    Context,
}

const ENTITY_TYPE_NAMES: &[&str] = &["decision", "checkpoint", "insight", "context"];

impl EntityType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Decision => "decision",
            EntityType::Checkpoint => "checkpoint",
            EntityType::Insight => "insight",
            EntityType::Context => "context",
        }
    }

    /// Parse from string name, case-insensitive
    pub fn parse_name(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "decision" => Ok(EntityType::Decision),
            "checkpoint" => Ok(EntityType::Checkpoint),
            "insight" => Ok(EntityType::Insight),
            "context" => Ok(EntityType::Context),
            _ => Err(MamaError::unknown_variant("entity type", s, ENTITY_TYPE_NAMES)),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

/// Outcome of a decision, updated as the work plays out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    /// Not yet resolved
    Pending,
    /// Worked as decided
    Success,
    /// Worked with a known limitation
    Partial,
    /// Did not work
    Failed,
    /// Replaced by a later decision
    Superseded,
}

const OUTCOME_NAMES: &[&str] = &["PENDING", "SUCCESS", "PARTIAL", "FAILED", "SUPERSEDED"];

impl Outcome {
    /// Canonical uppercase representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pending => "PENDING",
            Outcome::Success => "SUCCESS",
            Outcome::Partial => "PARTIAL",
            Outcome::Failed => "FAILED",
            Outcome::Superseded => "SUPERSEDED",
        }
    }

    /// Parse from string, case-insensitive (`Success`, `failed` both accepted).
    /// Unknown values return a validation error with a nearest-match hint.
    pub fn parse_name(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(Outcome::Pending),
            "SUCCESS" => Ok(Outcome::Success),
            "PARTIAL" => Ok(Outcome::Partial),
            "FAILED" => Ok(Outcome::Failed),
            "SUPERSEDED" => Ok(Outcome::Superseded),
            _ => Err(MamaError::unknown_variant("outcome", s, OUTCOME_NAMES)),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// ENTITY
// ============================================================================

/// A stored memory entity
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Opaque stable id, monotonically sortable by creation
    pub id: String,
    /// Entity type
    pub entity_type: EntityType,
    /// Short topic key (required for decisions)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Primary text
    pub content: String,

    // ========== Narrative fields ==========
    /// Why the decision was made (required for decisions)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Supporting evidence (file:line, benchmark output, ...)
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Alternatives that were considered and rejected
    #[serde(default)]
    pub alternatives: Vec<String>,
    /// Known risks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risks: Option<String>,
    /// Planned next steps (markdown task list by convention)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_steps: Option<String>,
    /// Files open when the entity was recorded
    #[serde(default)]
    pub open_files: Vec<String>,
    /// Confidence in [0, 1]; defaults to 0.7 for decisions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    // ========== Outcome lifecycle ==========
    /// Resolution of the decision, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// Required when outcome is FAILED
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Required when outcome is PARTIAL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limitation: Option<String>,

    // ========== Embedding metadata ==========
    /// Whether a vector is stored for this entity
    pub has_embedding: bool,

    /// Creation time (ms epoch on the wire)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Last modification time (ms epoch on the wire)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Text used for embedding generation: topic (when present) plus content.
    pub fn searchable_text(&self) -> String {
        searchable_text(self.topic.as_deref(), &self.content)
    }

    /// True when every narrative field a complete decision needs is present.
    pub fn narrative_complete(&self) -> bool {
        self.reasoning.as_deref().is_some_and(|r| !r.trim().is_empty())
            && !self.evidence.is_empty()
            && !self.alternatives.is_empty()
            && self.risks.as_deref().is_some_and(|r| !r.trim().is_empty())
    }
}

/// Embedding input for an entity: topic key prepended to the content so
/// topic-adjacent queries land nearby in vector space.
pub fn searchable_text(topic: Option<&str>, content: &str) -> String {
    match topic {
        Some(t) if !t.trim().is_empty() => format!("{t}: {content}"),
        _ => content.to_string(),
    }
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Input for creating a new entity.
///
/// Uses `deny_unknown_fields` to reject mistyped adapter payloads early.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntityDraft {
    /// Entity type
    #[serde(default)]
    pub entity_type: EntityType,
    /// Topic key (required for decisions)
    pub topic: Option<String>,
    /// Primary text
    pub content: String,
    /// Why (required for decisions)
    pub reasoning: Option<String>,
    /// Supporting evidence
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Rejected alternatives
    #[serde(default)]
    pub alternatives: Vec<String>,
    /// Known risks
    pub risks: Option<String>,
    /// Planned next steps
    pub next_steps: Option<String>,
    /// Open files at record time
    #[serde(default)]
    pub open_files: Vec<String>,
    /// Confidence in [0, 1]
    pub confidence: Option<f64>,
}

impl EntityDraft {
    /// Draft a decision with the three required fields.
    pub fn decision(
        topic: impl Into<String>,
        content: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: EntityType::Decision,
            topic: Some(topic.into()),
            content: content.into(),
            reasoning: Some(reasoning.into()),
            ..Default::default()
        }
    }

    /// Draft a checkpoint; `summary` becomes the content.
    pub fn checkpoint(summary: impl Into<String>) -> Self {
        Self {
            entity_type: EntityType::Checkpoint,
            content: summary.into(),
            ..Default::default()
        }
    }

    /// Draft an insight.
    pub fn insight(content: impl Into<String>) -> Self {
        Self {
            entity_type: EntityType::Insight,
            content: content.into(),
            ..Default::default()
        }
    }

    /// Validate type-specific invariants. Called by the store on insert.
    pub fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(MamaError::validation("content must not be empty"));
        }
        if self.entity_type == EntityType::Decision {
            if !self.topic.as_deref().is_some_and(|t| !t.trim().is_empty()) {
                return Err(MamaError::validation("decision requires a non-empty topic"));
            }
            if !self
                .reasoning
                .as_deref()
                .is_some_and(|r| !r.trim().is_empty())
            {
                return Err(MamaError::validation(
                    "decision requires non-empty reasoning",
                ));
            }
        }
        if let Some(confidence) = self.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(MamaError::validation(format!(
                    "confidence must be within [0, 1], got {confidence}"
                )));
            }
        }
        Ok(())
    }

    /// Confidence to store: the provided value, or 0.7 for decisions.
    pub fn effective_confidence(&self) -> Option<f64> {
        match (self.confidence, self.entity_type) {
            (Some(c), _) => Some(c),
            (None, EntityType::Decision) => Some(DEFAULT_DECISION_CONFIDENCE),
            (None, _) => None,
        }
    }
}

// ============================================================================
// OUTCOME UPDATE
// ============================================================================

/// Validate an outcome update against its detail requirements.
///
/// FAILED requires `failure_reason`; PARTIAL requires `limitation`; details
/// are capped at [`MAX_OUTCOME_DETAIL`] chars and only valid with the outcome
/// that requires them.
pub fn validate_outcome_update(
    outcome: Outcome,
    failure_reason: Option<&str>,
    limitation: Option<&str>,
) -> Result<()> {
    match outcome {
        Outcome::Failed => {
            if !failure_reason.is_some_and(|r| !r.trim().is_empty()) {
                return Err(MamaError::validation(
                    "outcome FAILED requires a non-empty failure_reason",
                ));
            }
        }
        _ => {
            if failure_reason.is_some() {
                return Err(MamaError::validation(format!(
                    "failure_reason is only valid with outcome FAILED, not {outcome}"
                )));
            }
        }
    }
    match outcome {
        Outcome::Partial => {
            if !limitation.is_some_and(|l| !l.trim().is_empty()) {
                return Err(MamaError::validation(
                    "outcome PARTIAL requires a non-empty limitation",
                ));
            }
        }
        _ => {
            if limitation.is_some() {
                return Err(MamaError::validation(format!(
                    "limitation is only valid with outcome PARTIAL, not {outcome}"
                )));
            }
        }
    }
    for (name, value) in [("failure_reason", failure_reason), ("limitation", limitation)] {
        if let Some(v) = value {
            if v.chars().count() > MAX_OUTCOME_DETAIL {
                return Err(MamaError::validation(format!(
                    "{name} exceeds {MAX_OUTCOME_DETAIL} chars"
                )));
            }
        }
    }
    Ok(())
}

// ============================================================================
// ID GENERATION
// ============================================================================

/// Generate an entity id: `<type>_<topic?>_<ms>_<rand>`.
///
/// The ms-epoch component makes ids sortable by creation; the random suffix
/// disambiguates same-millisecond inserts.
pub fn generate_entity_id(
    entity_type: EntityType,
    topic: Option<&str>,
    created_at: DateTime<Utc>,
) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let suffix = &suffix[..6];
    let ms = created_at.timestamp_millis();
    match topic.map(sanitize_topic).filter(|t| !t.is_empty()) {
        Some(topic) => format!("{entity_type}_{topic}_{ms}_{suffix}"),
        None => format!("{entity_type}_{ms}_{suffix}"),
    }
}

/// Lowercase, alphanumeric + underscore, at most 40 chars.
fn sanitize_topic(topic: &str) -> String {
    topic
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .take(40)
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

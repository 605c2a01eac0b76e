//! Links, audit entries, and restart metrics
//!
//! A link is a directed, typed edge between two entities. It is inert until a
//! user approves it; only approved links participate in graph traversal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MamaError, Result};

// ============================================================================
// LINK CATEGORIES
// ============================================================================

/// Query/boost classification derived from the free-form relationship token.
/// Not persisted separately; derived on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkCategory {
    /// One decision evolving into another (refines, supersedes, ...)
    Evolution,
    /// Realization of a decision (implements, fulfills, ...)
    Implementation,
    /// General association (relates_to, depends_on, ...)
    Association,
    /// Time ordering (precedes, follows, ...)
    Temporal,
}

impl LinkCategory {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkCategory::Evolution => "evolution",
            LinkCategory::Implementation => "implementation",
            LinkCategory::Association => "association",
            LinkCategory::Temporal => "temporal",
        }
    }

    /// Classify a relationship token. Unknown tokens fall back to
    /// `Association`.
    pub fn of_relationship(relationship: &str) -> Self {
        match relationship.to_lowercase().as_str() {
            "refines" | "supersedes" | "replaces" | "evolved_from" | "extends" | "revises" => {
                LinkCategory::Evolution
            }
            "implements" | "implemented_by" | "fulfills" | "realizes" | "applies" => {
                LinkCategory::Implementation
            }
            "precedes" | "follows" | "preceded_by" | "concurrent_with" | "during" => {
                LinkCategory::Temporal
            }
            _ => LinkCategory::Association,
        }
    }
}

impl std::fmt::Display for LinkCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// LINK
// ============================================================================

/// Who created a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkOrigin {
    /// Proposed by the assistant
    Llm,
    /// Created directly by the user (or a legacy auto-linker acting as one)
    User,
}

impl LinkOrigin {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkOrigin::Llm => "llm",
            LinkOrigin::User => "user",
        }
    }

    /// Parse from storage representation
    pub fn parse_name(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "llm" => Ok(LinkOrigin::Llm),
            "user" => Ok(LinkOrigin::User),
            _ => Err(MamaError::unknown_variant("created_by", s, &["llm", "user"])),
        }
    }
}

/// A directed, typed edge between two entities.
///
/// `(from_id, to_id, relationship)` is the primary key. Approval fields are
/// the only mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    /// Source entity id
    pub from_id: String,
    /// Target entity id
    pub to_id: String,
    /// Free-form lowercase relationship token
    pub relationship: String,
    /// Why this link exists
    pub reason: String,
    /// Optional supporting evidence (file:line, benchmark reference, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    /// Who created the link
    pub created_by: LinkOrigin,
    /// Whether a user approved the link (active for traversal iff true)
    pub approved_by_user: bool,
    /// When the user approved it
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option",
        default
    )]
    pub approved_at: Option<DateTime<Utc>>,
    /// The decision that established the link, when known. Legacy auto-links
    /// are recognized by `created_by = user` with no decision id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<String>,
    /// Creation time (ms epoch on the wire)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Link {
    /// Derived category of the relationship token
    pub fn category(&self) -> LinkCategory {
        LinkCategory::of_relationship(&self.relationship)
    }

    /// Legacy auto-link: user-attributed with no establishing decision.
    pub fn is_legacy_auto(&self) -> bool {
        self.created_by == LinkOrigin::User && self.decision_id.is_none()
    }

    /// Protected from auto-link cleanup: user-approved with provenance, or
    /// assistant-proposed (those flow through normal governance).
    pub fn is_protected(&self) -> bool {
        (self.approved_by_user && self.decision_id.is_some())
            || self.created_by == LinkOrigin::Llm
    }
}

/// Input for inserting a link row directly (restore, seeding, migrations).
/// Governed creation goes through `propose_link` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkDraft {
    /// Source entity id
    pub from_id: String,
    /// Target entity id
    pub to_id: String,
    /// Relationship token (normalized to lowercase on insert)
    pub relationship: String,
    /// Why this link exists
    pub reason: String,
    /// Optional supporting evidence
    pub evidence: Option<String>,
    /// Who created the link
    pub created_by: LinkOrigin,
    /// Approval state to store
    pub approved_by_user: bool,
    /// Establishing decision, when known
    pub decision_id: Option<String>,
}

// ============================================================================
// AUDIT LOG
// ============================================================================

/// Link lifecycle actions recorded in the append-only audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    /// Link created, awaiting approval
    Proposed,
    /// User approved the link
    Approved,
    /// User rejected the link (row deleted)
    Rejected,
    /// Legacy auto-link removed by cleanup
    Deprecated,
}

impl AuditAction {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Proposed => "proposed",
            AuditAction::Approved => "approved",
            AuditAction::Rejected => "rejected",
            AuditAction::Deprecated => "deprecated",
        }
    }

    /// Parse from storage representation
    pub fn parse_name(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "proposed" => Ok(AuditAction::Proposed),
            "approved" => Ok(AuditAction::Approved),
            "rejected" => Ok(AuditAction::Rejected),
            "deprecated" => Ok(AuditAction::Deprecated),
            _ => Err(MamaError::unknown_variant(
                "audit action",
                s,
                &["proposed", "approved", "rejected", "deprecated"],
            )),
        }
    }
}

/// Who performed an audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditActor {
    /// The assistant
    Llm,
    /// The user
    User,
    /// The system itself (cleanup, migrations)
    System,
}

impl AuditActor {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditActor::Llm => "llm",
            AuditActor::User => "user",
            AuditActor::System => "system",
        }
    }

    /// Parse from storage representation
    pub fn parse_name(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "llm" => Ok(AuditActor::Llm),
            "user" => Ok(AuditActor::User),
            "system" => Ok(AuditActor::System),
            _ => Err(MamaError::unknown_variant(
                "audit actor",
                s,
                &["llm", "user", "system"],
            )),
        }
    }
}

/// One append-only audit log entry. Never deleted or mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Row id (serialization order of writes)
    pub id: i64,
    /// What happened
    pub action: AuditAction,
    /// Who did it
    pub actor: AuditActor,
    /// Link source
    pub from_id: String,
    /// Link target
    pub to_id: String,
    /// Relationship token
    pub relationship: String,
    /// Reason recorded with the action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When (ms epoch on the wire)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// RESTART METRICS
// ============================================================================

/// Result of one resume attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartStatus {
    /// Checkpoint loaded
    Success,
    /// Resume failed (see failure reason)
    Failure,
}

impl RestartStatus {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartStatus::Success => "success",
            RestartStatus::Failure => "failure",
        }
    }

    /// Parse from storage representation
    pub fn parse_name(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "success" => Ok(RestartStatus::Success),
            "failure" => Ok(RestartStatus::Failure),
            _ => Err(MamaError::unknown_variant(
                "restart status",
                s,
                &["success", "failure"],
            )),
        }
    }
}

/// Why a resume attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestartFailure {
    /// No checkpoint exists yet
    NoCheckpoint,
    /// Checkpoint row could not be loaded
    LoadError,
    /// Narrative or link context could not be assembled
    ContextIncomplete,
}

impl RestartFailure {
    /// Canonical SCREAMING_SNAKE name
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartFailure::NoCheckpoint => "NO_CHECKPOINT",
            RestartFailure::LoadError => "LOAD_ERROR",
            RestartFailure::ContextIncomplete => "CONTEXT_INCOMPLETE",
        }
    }

    /// Parse from storage representation
    pub fn parse_name(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "NO_CHECKPOINT" => Ok(RestartFailure::NoCheckpoint),
            "LOAD_ERROR" => Ok(RestartFailure::LoadError),
            "CONTEXT_INCOMPLETE" => Ok(RestartFailure::ContextIncomplete),
            _ => Err(MamaError::unknown_variant(
                "restart failure reason",
                s,
                &["NO_CHECKPOINT", "LOAD_ERROR", "CONTEXT_INCOMPLETE"],
            )),
        }
    }
}

/// Resume mode: full narrative + links, or summary only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartMode {
    /// Narrative window and link expansion included
    Full,
    /// Checkpoint summary only
    Summary,
}

impl RestartMode {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartMode::Full => "full",
            RestartMode::Summary => "summary",
        }
    }

    /// Parse from string, case-insensitive
    pub fn parse_name(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "full" => Ok(RestartMode::Full),
            "summary" => Ok(RestartMode::Summary),
            _ => Err(MamaError::unknown_variant(
                "restart mode",
                s,
                &["full", "summary"],
            )),
        }
    }
}

/// One append-only row describing a resume attempt and its latency
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartMetric {
    /// Row id
    pub id: i64,
    /// When the attempt happened (ms epoch on the wire)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Session performing the resume
    pub session_id: String,
    /// Success or failure
    pub status: RestartStatus,
    /// Failure reason when status is failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<RestartFailure>,
    /// Wall-clock latency of the load
    pub latency_ms: i64,
    /// Full or summary payload
    pub mode: RestartMode,
    /// Number of narrative decisions included
    pub narrative_count: i64,
    /// Number of expanded link nodes included
    pub link_count: i64,
}

// ============================================================================
// TESTS
// ============================================================================

//! # MAMA Core
//!
//! Local-first decision-memory engine for AI assistants. Preserves
//! architectural decisions, session checkpoints, and their relationships so
//! a stateless assistant resuming work can recover *why* a decision was
//! made, *what* happened next, and *where* to continue.
//!
//! - **Typed entity store**: decisions, checkpoints, insights, context, with
//!   narrative fields and outcome lifecycle
//! - **Governed link graph**: assistant-proposed links activate only after
//!   human approval; every transition is audited
//! - **Hybrid retrieval**: exact cosine search with cross-type affinity and
//!   recency boosting, plus exact topic lookup
//! - **Bounded graph expansion**: BFS over approved edges, depth-capped,
//!   with a TTL'd LRU cache and targeted invalidation
//! - **Auto-link cleanup**: scan → backup (SHA-256 checksummed) → report →
//!   batched execute → validate → restore
//! - **Restart observability**: every resume attempt is measured and
//!   reported against coverage and quality targets
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mama_core::{EntityDraft, SearchOptions, Storage};
//!
//! // Open storage (uses MAMA_DB_PATH or ~/.claude/mama-memory.db)
//! let storage = Storage::open(None)?;
//!
//! // Record a decision
//! let decision = storage.insert(EntityDraft::decision(
//!     "auth_strategy",
//!     "Use JWT with refresh tokens",
//!     "stateless auth scales horizontally",
//! ))?;
//!
//! // Recall it semantically
//! let hits = storage.search("how do we authenticate?", &SearchOptions::default())?;
//!
//! // Update the outcome once reality weighs in
//! storage.update_outcome(&decision.id, "failed", Some("DB bottleneck at 10K rps"), None)?;
//! ```
//!
//! ## Environment
//!
//! - `MAMA_DB_PATH`: storage file (default `~/.claude/mama-memory.db`)
//! - `MAMA_AUTH_TOKEN`: bearer token adapters must require from non-loopback
//!   callers (unused by the core)
//! - `MAMA_ENABLE_V1_1`: rollout gate consulted by adapters via
//!   [`config::v1_1_enabled`]
//!
//! ## Feature Flags
//!
//! - `embeddings` (default): local neural embeddings via fastembed
//!   (`multilingual-e5-small`); without it the deterministic hashed provider
//!   serves all text
//! - `bundled-sqlite` (default): compile SQLite into the binary

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod checkpoint;
pub mod config;
pub mod deadline;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod links;
pub mod memory;
pub mod metrics;
pub mod search;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Data model
pub use memory::{
    AuditAction, AuditActor, AuditEntry, Entity, EntityDraft, EntityType, Link, LinkCategory,
    LinkDraft, LinkOrigin, MemoryStats, Outcome, RestartFailure, RestartMetric, RestartMode,
    RestartStatus,
};

// Storage layer
pub use storage::Storage;

// Errors and deadlines
pub use deadline::Deadline;
pub use error::{MamaError, Result};

// Embeddings
pub use embeddings::{
    cosine_similarity, Embedding, EmbeddingEngine, EmbeddingError, EmbeddingProvider,
    HashedEmbedder, EMBEDDING_DIMENSIONS,
};

// Search
pub use search::{SearchHit, SearchOptions, VectorIndex};

// Graph expansion
pub use graph::{
    EdgeMeta, ExpandOptions, GraphVisit, DEPTH_CHECKPOINT_LOAD, DEPTH_SEMANTIC_CONTEXT,
    DEPTH_TOPIC_SEARCH, MAX_EXPANSION_DEPTH,
};

// Link governance and cleanup
pub use links::{
    AutoLinkScan, BackupInfo, BackupManifest, CleanupReport, CleanupRun, CleanupStatus,
    CleanupValidation, DeprecationRun, RestoreOutcome, RiskLevel,
};

// Checkpoints
pub use checkpoint::{
    CheckpointPayload, LoadCheckpointOptions, NextSteps, SaveCheckpointInput,
    FULL_LATENCY_TARGET_MS, SUMMARY_LATENCY_TARGET_MS,
};

// Metrics & reporting
pub use metrics::{
    CoverageMetrics, LatencyPercentiles, MetricsPeriod, QualityMetrics, QualityReport,
    ReportFormat, ReportThresholds, RestartStats,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Backup file format version written by `create_link_backup`
pub const BACKUP_FORMAT_VERSION: &str = "1";

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        CheckpointPayload, Entity, EntityDraft, EntityType, ExpandOptions, Link, LinkCategory,
        LinkDraft, LinkOrigin, LoadCheckpointOptions, MamaError, Outcome, Result,
        SaveCheckpointInput, SearchHit, SearchOptions, Storage,
    };

    pub use crate::{
        AutoLinkScan, CleanupRun, CleanupStatus, MetricsPeriod, QualityReport, ReportFormat,
    };
}

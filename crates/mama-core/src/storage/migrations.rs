//! Database Migrations
//!
//! Schema migration definitions for the storage layer.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: entities, embeddings, links, audit log",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Restart metrics for resume observability",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Link provenance: decision_id for auto-link deprecation",
        up: MIGRATION_V3_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL DEFAULT 'context',
    topic TEXT,
    content TEXT NOT NULL,

    -- Narrative fields (array fields stored as JSON text)
    reasoning TEXT,
    evidence TEXT NOT NULL DEFAULT '[]',
    alternatives TEXT NOT NULL DEFAULT '[]',
    risks TEXT,
    next_steps TEXT,
    open_files TEXT NOT NULL DEFAULT '[]',
    confidence REAL,

    -- Outcome lifecycle
    outcome TEXT,
    failure_reason TEXT,
    limitation TEXT,

    -- Embedding metadata
    has_embedding INTEGER NOT NULL DEFAULT 0,

    -- Timestamps are ms epoch
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);
CREATE INDEX IF NOT EXISTS idx_entities_topic ON entities(topic);
CREATE INDEX IF NOT EXISTS idx_entities_created ON entities(created_at);

-- Embeddings storage table (binary blob, little-endian f32)
CREATE TABLE IF NOT EXISTS entity_embeddings (
    entity_id TEXT PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL DEFAULT 384,
    model TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Directed typed edges; inert until approved
CREATE TABLE IF NOT EXISTS links (
    from_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    to_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    relationship TEXT NOT NULL,
    reason TEXT NOT NULL,
    evidence TEXT,
    created_by TEXT NOT NULL DEFAULT 'llm',
    approved_by_user INTEGER NOT NULL DEFAULT 0,
    approved_at INTEGER,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (from_id, to_id, relationship),
    CHECK (from_id <> to_id)
);

CREATE INDEX IF NOT EXISTS idx_links_from ON links(from_id);
CREATE INDEX IF NOT EXISTS idx_links_to ON links(to_id);
CREATE INDEX IF NOT EXISTS idx_links_approved ON links(approved_by_user);

-- Append-only audit trail; rows are never mutated or deleted, and carry no
-- foreign keys so they outlive the entities they mention
CREATE TABLE IF NOT EXISTS link_audit (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    action TEXT NOT NULL,
    actor TEXT NOT NULL,
    from_id TEXT NOT NULL,
    to_id TEXT NOT NULL,
    relationship TEXT NOT NULL,
    reason TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_action ON link_audit(action);
CREATE INDEX IF NOT EXISTS idx_audit_created ON link_audit(created_at);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Restart metrics
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS restart_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    session_id TEXT NOT NULL,
    status TEXT NOT NULL,
    failure_reason TEXT,
    latency_ms INTEGER NOT NULL,
    mode TEXT NOT NULL,
    narrative_count INTEGER NOT NULL DEFAULT 0,
    link_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_restart_timestamp ON restart_metrics(timestamp);
CREATE INDEX IF NOT EXISTS idx_restart_status ON restart_metrics(status);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// V3: Link provenance
/// Links created before governed proposals carried no establishing decision.
/// The NULL decision_id on user-attributed rows is what the auto-link
/// deprecation workflow keys on.
const MIGRATION_V3_UP: &str = r#"
ALTER TABLE links ADD COLUMN decision_id TEXT;

CREATE INDEX IF NOT EXISTS idx_links_decision ON links(decision_id);

UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );

            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}

//! SQLite Storage Implementation
//!
//! Core storage layer with integrated embeddings and vector search.
//!
//! Single-process, single-writer: reads go through a dedicated reader
//! connection, writes serialize through one writer connection so audit order
//! is the serialization order of writes. Point operations run in a
//! transaction; the entity row and its vector row commit together.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use lru::LruCache;
use rusqlite::{params, Connection, OptionalExtension};

use crate::config;
use crate::embeddings::{Embedding, EmbeddingEngine, EmbeddingError, EMBEDDING_DIMENSIONS, NORM_TOLERANCE};
use crate::error::{MamaError, Result};
use crate::graph::ExpansionCache;
use crate::memory::{
    generate_entity_id, searchable_text, validate_outcome_update, AuditAction, AuditActor,
    AuditEntry, Entity, EntityDraft, EntityType, Link, LinkDraft, LinkOrigin, MemoryStats, Outcome,
    RestartFailure, RestartMetric, RestartMode, RestartStatus,
};
use crate::search::VectorIndex;

/// Capacity of the query-embedding cache
const QUERY_CACHE_SIZE: usize = 100;

pub(crate) const ENTITY_COLUMNS: &str = "id, entity_type, topic, content, reasoning, evidence, \
     alternatives, risks, next_steps, open_files, confidence, outcome, failure_reason, \
     limitation, has_embedding, created_at, updated_at";

pub(crate) const LINK_COLUMNS: &str = "from_id, to_id, relationship, reason, evidence, \
     created_by, approved_by_user, approved_at, decision_id, created_at";

// ============================================================================
// STORAGE
// ============================================================================

/// The long-lived memory core: storage handle, vector index, caches.
///
/// All methods take `&self`, making `Storage` `Send + Sync` so adapters can
/// share it behind an `Arc` without an outer mutex. Lifecycle is
/// `open → use → close`; a failed `open` leaves no files behind.
pub struct Storage {
    pub(crate) writer: Mutex<Connection>,
    pub(crate) reader: Mutex<Connection>,
    pub(crate) embedder: EmbeddingEngine,
    pub(crate) vector_index: Mutex<VectorIndex>,
    /// Query embeddings for repeated searches within a session
    pub(crate) query_cache: Mutex<LruCache<String, Vec<f32>>>,
    /// Graph expansion results (see `graph::cache`)
    pub(crate) expansion_cache: Mutex<ExpansionCache>,
}

impl Storage {
    /// Apply performance and integrity PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open the store at `db_path`, or at `MAMA_DB_PATH` /
    /// `~/.claude/mama-memory.db` when `None`.
    pub fn open(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => config::resolve_db_path()?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(0o700);
                    let _ = std::fs::set_permissions(parent, perms);
                }
            }
        }

        let existed = path.exists();
        match Self::open_at(&path) {
            Ok(storage) => Ok(storage),
            Err(e) => {
                // A failed open must not leave a half-created database behind
                if !existed {
                    for suffix in ["", "-wal", "-shm"] {
                        let mut p = path.clone().into_os_string();
                        p.push(suffix);
                        let _ = std::fs::remove_file(PathBuf::from(p));
                    }
                }
                Err(e)
            }
        }
    }

    fn open_at(path: &Path) -> Result<Self> {
        let writer_conn = Connection::open(path)?;

        // Restrict database file permissions to owner-only on Unix
        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(path, perms);
        }

        Self::configure_connection(&writer_conn)?;

        // Migrations run on the writer only
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(path)?;
        Self::configure_connection(&reader_conn)?;

        // SAFETY: the capacity constant is non-zero
        let query_cache = Mutex::new(LruCache::new(
            NonZeroUsize::new(QUERY_CACHE_SIZE).expect("capacity is non-zero"),
        ));

        let storage = Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            embedder: EmbeddingEngine::new(),
            vector_index: Mutex::new(VectorIndex::new(EMBEDDING_DIMENSIONS)),
            query_cache,
            expansion_cache: Mutex::new(ExpansionCache::new()),
        };

        storage.load_vectors_into_index()?;

        Ok(storage)
    }

    /// Flush and release resources. Dropping works too; `close` additionally
    /// runs `PRAGMA optimize`.
    pub fn close(self) -> Result<()> {
        if let Ok(conn) = self.writer.into_inner() {
            let _ = conn.execute_batch("PRAGMA optimize;");
            let _ = conn.close();
        }
        if let Ok(conn) = self.reader.into_inner() {
            let _ = conn.close();
        }
        Ok(())
    }

    pub(crate) fn write(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| MamaError::Storage("writer lock poisoned".to_string()))
    }

    pub(crate) fn read(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| MamaError::Storage("reader lock poisoned".to_string()))
    }

    pub(crate) fn vectors(&self) -> Result<MutexGuard<'_, VectorIndex>> {
        self.vector_index
            .lock()
            .map_err(|_| MamaError::Storage("vector index lock poisoned".to_string()))
    }

    pub(crate) fn expansions(&self) -> Result<MutexGuard<'_, ExpansionCache>> {
        self.expansion_cache
            .lock()
            .map_err(|_| MamaError::Storage("expansion cache lock poisoned".to_string()))
    }

    /// Rebuild the in-memory vector index from stored embeddings
    fn load_vectors_into_index(&self) -> Result<()> {
        let rows: Vec<(String, Vec<u8>)> = {
            let reader = self.read()?;
            let mut stmt =
                reader.prepare("SELECT entity_id, embedding FROM entity_embeddings")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        let mut index = self.vectors()?;
        for (entity_id, bytes) in rows {
            match Embedding::from_bytes(&bytes) {
                Some(embedding) if embedding.dimensions == EMBEDDING_DIMENSIONS => {
                    if let Err(e) = index.add(&entity_id, &embedding.vector) {
                        tracing::warn!("Failed to load embedding for {}: {}", entity_id, e);
                    }
                }
                _ => {
                    tracing::warn!("Skipping malformed embedding for {}", entity_id);
                }
            }
        }

        Ok(())
    }

    /// Invalidate expansion-cache entries touching any of these nodes
    pub(crate) fn invalidate_expansions(&self, nodes: &[&str]) -> Result<()> {
        let mut cache = self.expansions()?;
        for node in nodes {
            cache.invalidate_node(node);
        }
        Ok(())
    }

    // ========================================================================
    // ENTITY STORE
    // ========================================================================

    /// Insert a new entity. Validates invariants, generates the id, computes
    /// and stores the embedding when searchable text is present (the entity
    /// row and its vector row commit in the same transaction), and syncs the
    /// in-memory vector index.
    pub fn insert(&self, draft: EntityDraft) -> Result<Entity> {
        draft.validate()?;

        let now = Utc::now();
        let id = generate_entity_id(draft.entity_type, draft.topic.as_deref(), now);
        let text = searchable_text(draft.topic.as_deref(), &draft.content);

        let embedding = match self.embedder.embed(&text) {
            Ok(embedding) => Some(embedding),
            Err(EmbeddingError::EmptyInput) => None,
            Err(e) => {
                // Degrade: the entity is stored without a vector and stays
                // findable by topic
                tracing::warn!("Storing {} without embedding: {}", id, e);
                None
            }
        };
        if let Some(embedding) = &embedding {
            if !embedding.is_normalized() {
                return Err(MamaError::InvariantViolated(format!(
                    "embedding norm outside 1 ± {NORM_TOLERANCE}"
                )));
            }
        }

        let evidence = serde_json::to_string(&draft.evidence).unwrap_or_else(|_| "[]".into());
        let alternatives =
            serde_json::to_string(&draft.alternatives).unwrap_or_else(|_| "[]".into());
        let open_files = serde_json::to_string(&draft.open_files).unwrap_or_else(|_| "[]".into());
        let outcome = match draft.entity_type {
            EntityType::Decision => Some(Outcome::Pending.as_str()),
            _ => None,
        };
        let now_ms = now.timestamp_millis();

        {
            let mut writer = self.write()?;
            let tx = writer.transaction()?;
            tx.execute(
                "INSERT INTO entities (
                    id, entity_type, topic, content, reasoning, evidence, alternatives,
                    risks, next_steps, open_files, confidence, outcome, failure_reason,
                    limitation, has_embedding, created_at, updated_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                    ?8, ?9, ?10, ?11, ?12, ?13,
                    ?14, ?15, ?16, ?17
                )",
                params![
                    id,
                    draft.entity_type.as_str(),
                    draft.topic,
                    draft.content,
                    draft.reasoning,
                    evidence,
                    alternatives,
                    draft.risks,
                    draft.next_steps,
                    open_files,
                    draft.effective_confidence(),
                    outcome,
                    Option::<String>::None,
                    Option::<String>::None,
                    embedding.is_some() as i64,
                    now_ms,
                    now_ms,
                ],
            )?;
            if let Some(embedding) = &embedding {
                tx.execute(
                    "INSERT INTO entity_embeddings (entity_id, embedding, dimensions, model, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        id,
                        embedding.to_bytes(),
                        embedding.dimensions as i64,
                        self.embedder.provider_name(),
                        now_ms,
                    ],
                )?;
            }
            tx.commit()?;
        }

        if let Some(embedding) = &embedding {
            self.vectors()?.add(&id, &embedding.vector)?;
        }

        self.get(&id)
    }

    /// Fetch an entity by id
    pub fn get(&self, id: &str) -> Result<Entity> {
        self.get_opt(id)?
            .ok_or_else(|| MamaError::NotFound(format!("entity {id}")))
    }

    /// Fetch an entity by id, `None` when absent
    pub fn get_opt(&self, id: &str) -> Result<Option<Entity>> {
        let reader = self.read()?;
        let entity = reader
            .query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1"),
                params![id],
                row_to_entity,
            )
            .optional()?;
        Ok(entity)
    }

    /// Stored embedding for an entity, if any.
    pub fn get_embedding(&self, id: &str) -> Result<Option<Embedding>> {
        let reader = self.read()?;
        let bytes: Option<Vec<u8>> = reader
            .query_row(
                "SELECT embedding FROM entity_embeddings WHERE entity_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(bytes.as_deref().and_then(Embedding::from_bytes))
    }

    /// Update a decision's outcome. The outcome string is accepted
    /// case-insensitively and canonicalized; detail requirements are
    /// enforced; `updated_at` is written; the embedding is not regenerated.
    pub fn update_outcome(
        &self,
        id: &str,
        outcome: &str,
        failure_reason: Option<&str>,
        limitation: Option<&str>,
    ) -> Result<Entity> {
        let outcome = Outcome::parse_name(outcome)?;
        validate_outcome_update(outcome, failure_reason, limitation)?;

        let now_ms = Utc::now().timestamp_millis();
        let updated = {
            let writer = self.write()?;
            writer.execute(
                "UPDATE entities
                 SET outcome = ?1, failure_reason = ?2, limitation = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![outcome.as_str(), failure_reason, limitation, now_ms, id],
            )?
        };
        if updated == 0 {
            return Err(MamaError::NotFound(format!("entity {id}")));
        }
        self.get(id)
    }

    /// Replace an entity's primary text. The embedding is regenerated because
    /// the searchable text changed.
    pub fn update_content(&self, id: &str, content: &str) -> Result<Entity> {
        if content.trim().is_empty() {
            return Err(MamaError::validation("content must not be empty"));
        }
        let existing = self.get(id)?;
        let text = searchable_text(existing.topic.as_deref(), content);

        let embedding = match self.embedder.embed(&text) {
            Ok(embedding) => Some(embedding),
            Err(EmbeddingError::EmptyInput) => None,
            Err(e) => {
                tracing::warn!("Updating {} without embedding: {}", id, e);
                None
            }
        };

        let now_ms = Utc::now().timestamp_millis();
        {
            let mut writer = self.write()?;
            let tx = writer.transaction()?;
            tx.execute(
                "UPDATE entities SET content = ?1, has_embedding = ?2, updated_at = ?3 WHERE id = ?4",
                params![content, embedding.is_some() as i64, now_ms, id],
            )?;
            match &embedding {
                Some(embedding) => {
                    tx.execute(
                        "INSERT INTO entity_embeddings (entity_id, embedding, dimensions, model, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT(entity_id) DO UPDATE SET
                             embedding = excluded.embedding,
                             dimensions = excluded.dimensions,
                             model = excluded.model,
                             created_at = excluded.created_at",
                        params![
                            id,
                            embedding.to_bytes(),
                            embedding.dimensions as i64,
                            self.embedder.provider_name(),
                            now_ms,
                        ],
                    )?;
                }
                None => {
                    tx.execute("DELETE FROM entity_embeddings WHERE entity_id = ?1", params![id])?;
                }
            }
            tx.commit()?;
        }

        let mut index = self.vectors()?;
        match &embedding {
            Some(embedding) => index.add(id, &embedding.vector)?,
            None => {
                index.remove(id);
            }
        }
        drop(index);

        self.get(id)
    }

    /// List entities of an optional type, newest first.
    pub fn list_recent(
        &self,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> Result<Vec<Entity>> {
        let reader = self.read()?;
        let mut entities = Vec::new();
        match entity_type {
            Some(entity_type) => {
                let mut stmt = reader.prepare(&format!(
                    "SELECT {ENTITY_COLUMNS} FROM entities WHERE entity_type = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![entity_type.as_str(), limit as i64], row_to_entity)?;
                for row in rows {
                    entities.push(row?);
                }
            }
            None => {
                let mut stmt = reader.prepare(&format!(
                    "SELECT {ENTITY_COLUMNS} FROM entities
                     ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                ))?;
                let rows = stmt.query_map(params![limit as i64], row_to_entity)?;
                for row in rows {
                    entities.push(row?);
                }
            }
        }
        Ok(entities)
    }

    /// Delete an entity. Links cascade through foreign keys; the vector row
    /// cascades; the expansion cache is invalidated for the node and every
    /// former neighbor.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let neighbors: Vec<String> = {
            let reader = self.read()?;
            let mut stmt = reader.prepare(
                "SELECT from_id, to_id FROM links WHERE from_id = ?1 OR to_id = ?1",
            )?;
            let rows = stmt.query_map(params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut neighbors = Vec::new();
            for row in rows {
                let (from_id, to_id) = row?;
                neighbors.push(if from_id == id { to_id } else { from_id });
            }
            neighbors
        };

        let deleted = {
            let writer = self.write()?;
            writer.execute("DELETE FROM entities WHERE id = ?1", params![id])?
        };
        if deleted == 0 {
            return Ok(false);
        }

        self.vectors()?.remove(id);

        let mut touched: Vec<&str> = vec![id];
        touched.extend(neighbors.iter().map(|s| s.as_str()));
        self.invalidate_expansions(&touched)?;

        Ok(true)
    }

    // ========================================================================
    // LINK STORE (row level; governance in links::governance)
    // ========================================================================

    /// Insert a link row directly. Used by restore, seeding, and migrations;
    /// governed creation goes through `propose_link`.
    pub fn insert_link(&self, draft: LinkDraft) -> Result<Link> {
        let relationship = draft.relationship.trim().to_lowercase();
        if relationship.is_empty() {
            return Err(MamaError::validation("relationship must not be empty"));
        }
        if draft.reason.trim().is_empty() {
            return Err(MamaError::validation("link reason must not be empty"));
        }
        if draft.from_id == draft.to_id {
            return Err(MamaError::InvariantViolated(format!(
                "self-loop link on {}",
                draft.from_id
            )));
        }
        for endpoint in [&draft.from_id, &draft.to_id] {
            if self.get_opt(endpoint)?.is_none() {
                return Err(MamaError::NotFound(format!("entity {endpoint}")));
            }
        }
        if self
            .fetch_link(&draft.from_id, &draft.to_id, &relationship)?
            .is_some()
        {
            return Err(MamaError::Conflict(format!(
                "link {} -[{}]-> {} already exists",
                draft.from_id, relationship, draft.to_id
            )));
        }

        let now = Utc::now();
        let approved_at = draft.approved_by_user.then(|| now.timestamp_millis());
        {
            let writer = self.write()?;
            writer.execute(
                "INSERT INTO links (from_id, to_id, relationship, reason, evidence,
                                    created_by, approved_by_user, approved_at, decision_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    draft.from_id,
                    draft.to_id,
                    relationship,
                    draft.reason,
                    draft.evidence,
                    draft.created_by.as_str(),
                    draft.approved_by_user as i64,
                    approved_at,
                    draft.decision_id,
                    now.timestamp_millis(),
                ],
            )?;
        }

        self.invalidate_expansions(&[draft.from_id.as_str(), draft.to_id.as_str()])?;

        self.fetch_link(&draft.from_id, &draft.to_id, &relationship)?
            .ok_or_else(|| MamaError::Storage("link vanished after insert".to_string()))
    }

    /// Fetch a single link by primary key
    pub fn fetch_link(
        &self,
        from_id: &str,
        to_id: &str,
        relationship: &str,
    ) -> Result<Option<Link>> {
        let reader = self.read()?;
        let link = reader
            .query_row(
                &format!(
                    "SELECT {LINK_COLUMNS} FROM links
                     WHERE from_id = ?1 AND to_id = ?2 AND relationship = ?3"
                ),
                params![from_id, to_id, relationship.to_lowercase()],
                row_to_link,
            )
            .optional()?;
        Ok(link)
    }

    /// Outgoing links from a node, in insertion order. The primary read path
    /// for traversal exposes approved edges only.
    pub(crate) fn links_from(&self, id: &str, approved_only: bool) -> Result<Vec<Link>> {
        let reader = self.read()?;
        let sql = if approved_only {
            format!(
                "SELECT {LINK_COLUMNS} FROM links
                 WHERE from_id = ?1 AND approved_by_user = 1 ORDER BY rowid"
            )
        } else {
            format!("SELECT {LINK_COLUMNS} FROM links WHERE from_id = ?1 ORDER BY rowid")
        };
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt.query_map(params![id], row_to_link)?;
        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }

    /// All links touching a node in either direction (governance read path;
    /// may include pending links).
    pub fn links_touching(&self, id: &str, approved_only: bool) -> Result<Vec<Link>> {
        let reader = self.read()?;
        let sql = if approved_only {
            format!(
                "SELECT {LINK_COLUMNS} FROM links
                 WHERE (from_id = ?1 OR to_id = ?1) AND approved_by_user = 1 ORDER BY rowid"
            )
        } else {
            format!(
                "SELECT {LINK_COLUMNS} FROM links
                 WHERE from_id = ?1 OR to_id = ?1 ORDER BY rowid"
            )
        };
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt.query_map(params![id], row_to_link)?;
        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }

    /// Every link in the store, in insertion order
    pub fn all_links(&self) -> Result<Vec<Link>> {
        let reader = self.read()?;
        let mut stmt =
            reader.prepare(&format!("SELECT {LINK_COLUMNS} FROM links ORDER BY rowid"))?;
        let rows = stmt.query_map([], row_to_link)?;
        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }

    // ========================================================================
    // AUDIT LOG
    // ========================================================================

    /// Recent audit entries, newest first
    pub fn get_audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, action, actor, from_id, to_id, relationship, reason, created_at
             FROM link_audit ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_audit)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Audit entries for one link, oldest first
    pub fn audit_for_link(
        &self,
        from_id: &str,
        to_id: &str,
        relationship: &str,
    ) -> Result<Vec<AuditEntry>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, action, actor, from_id, to_id, relationship, reason, created_at
             FROM link_audit
             WHERE from_id = ?1 AND to_id = ?2 AND relationship = ?3
             ORDER BY id",
        )?;
        let rows = stmt.query_map(
            params![from_id, to_id, relationship.to_lowercase()],
            row_to_audit,
        )?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    // ========================================================================
    // RESTART METRICS
    // ========================================================================

    /// Append one restart metric row
    pub(crate) fn record_restart_metric(
        &self,
        session_id: &str,
        status: RestartStatus,
        failure_reason: Option<RestartFailure>,
        latency_ms: i64,
        mode: RestartMode,
        narrative_count: i64,
        link_count: i64,
    ) -> Result<()> {
        let writer = self.write()?;
        writer.execute(
            "INSERT INTO restart_metrics
                 (timestamp, session_id, status, failure_reason, latency_ms, mode,
                  narrative_count, link_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Utc::now().timestamp_millis(),
                session_id,
                status.as_str(),
                failure_reason.map(|r| r.as_str()),
                latency_ms,
                mode.as_str(),
                narrative_count,
                link_count,
            ],
        )?;
        Ok(())
    }

    /// Recent restart metrics, newest first
    pub fn get_restart_metrics(&self, limit: usize) -> Result<Vec<RestartMetric>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT id, timestamp, session_id, status, failure_reason, latency_ms, mode,
                    narrative_count, link_count
             FROM restart_metrics ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_restart_metric)?;
        let mut metrics = Vec::new();
        for row in rows {
            metrics.push(row?);
        }
        Ok(metrics)
    }

    // ========================================================================
    // STATS
    // ========================================================================

    /// Storage-wide counts for health surfaces
    pub fn get_stats(&self) -> Result<MemoryStats> {
        let reader = self.read()?;
        let count = |sql: &str| -> Result<i64> {
            Ok(reader.query_row(sql, [], |row| row.get(0))?)
        };

        Ok(MemoryStats {
            total_entities: count("SELECT COUNT(*) FROM entities")?,
            decisions: count("SELECT COUNT(*) FROM entities WHERE entity_type = 'decision'")?,
            checkpoints: count("SELECT COUNT(*) FROM entities WHERE entity_type = 'checkpoint'")?,
            insights: count("SELECT COUNT(*) FROM entities WHERE entity_type = 'insight'")?,
            contexts: count("SELECT COUNT(*) FROM entities WHERE entity_type = 'context'")?,
            with_embedding: count("SELECT COUNT(*) FROM entities WHERE has_embedding = 1")?,
            total_links: count("SELECT COUNT(*) FROM links")?,
            approved_links: count("SELECT COUNT(*) FROM links WHERE approved_by_user = 1")?,
            pending_links: count("SELECT COUNT(*) FROM links WHERE approved_by_user = 0")?,
            audit_entries: count("SELECT COUNT(*) FROM link_audit")?,
            restart_metrics: count("SELECT COUNT(*) FROM restart_metrics")?,
        })
    }
}

// ============================================================================
// ROW MAPPERS
// ============================================================================

fn conversion_error(
    idx: usize,
    message: String,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

pub(crate) fn ms_to_datetime(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| conversion_error(idx, format!("invalid ms timestamp {ms}")))
}

fn json_list(idx: usize, raw: String) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(&raw)
        .map_err(|e| conversion_error(idx, format!("invalid JSON list: {e}")))
}

pub(crate) fn row_to_entity(row: &rusqlite::Row) -> rusqlite::Result<Entity> {
    let entity_type: String = row.get(1)?;
    let entity_type = EntityType::parse_name(&entity_type)
        .map_err(|e| conversion_error(1, e.to_string()))?;
    let outcome: Option<String> = row.get(11)?;
    let outcome = match outcome {
        Some(raw) => {
            Some(Outcome::parse_name(&raw).map_err(|e| conversion_error(11, e.to_string()))?)
        }
        None => None,
    };

    Ok(Entity {
        id: row.get(0)?,
        entity_type,
        topic: row.get(2)?,
        content: row.get(3)?,
        reasoning: row.get(4)?,
        evidence: json_list(5, row.get(5)?)?,
        alternatives: json_list(6, row.get(6)?)?,
        risks: row.get(7)?,
        next_steps: row.get(8)?,
        open_files: json_list(9, row.get(9)?)?,
        confidence: row.get(10)?,
        outcome,
        failure_reason: row.get(12)?,
        limitation: row.get(13)?,
        has_embedding: row.get::<_, i64>(14)? != 0,
        created_at: ms_to_datetime(15, row.get(15)?)?,
        updated_at: ms_to_datetime(16, row.get(16)?)?,
    })
}

pub(crate) fn row_to_link(row: &rusqlite::Row) -> rusqlite::Result<Link> {
    let created_by: String = row.get(5)?;
    let created_by =
        LinkOrigin::parse_name(&created_by).map_err(|e| conversion_error(5, e.to_string()))?;
    let approved_at: Option<i64> = row.get(7)?;
    let approved_at = match approved_at {
        Some(ms) => Some(ms_to_datetime(7, ms)?),
        None => None,
    };

    Ok(Link {
        from_id: row.get(0)?,
        to_id: row.get(1)?,
        relationship: row.get(2)?,
        reason: row.get(3)?,
        evidence: row.get(4)?,
        created_by,
        approved_by_user: row.get::<_, i64>(6)? != 0,
        approved_at,
        decision_id: row.get(8)?,
        created_at: ms_to_datetime(9, row.get(9)?)?,
    })
}

fn row_to_audit(row: &rusqlite::Row) -> rusqlite::Result<AuditEntry> {
    let action: String = row.get(1)?;
    let action =
        AuditAction::parse_name(&action).map_err(|e| conversion_error(1, e.to_string()))?;
    let actor: String = row.get(2)?;
    let actor = AuditActor::parse_name(&actor).map_err(|e| conversion_error(2, e.to_string()))?;

    Ok(AuditEntry {
        id: row.get(0)?,
        action,
        actor,
        from_id: row.get(3)?,
        to_id: row.get(4)?,
        relationship: row.get(5)?,
        reason: row.get(6)?,
        created_at: ms_to_datetime(7, row.get(7)?)?,
    })
}

fn row_to_restart_metric(row: &rusqlite::Row) -> rusqlite::Result<RestartMetric> {
    let status: String = row.get(3)?;
    let status =
        RestartStatus::parse_name(&status).map_err(|e| conversion_error(3, e.to_string()))?;
    let failure_reason: Option<String> = row.get(4)?;
    let failure_reason = match failure_reason {
        Some(raw) => Some(
            RestartFailure::parse_name(&raw).map_err(|e| conversion_error(4, e.to_string()))?,
        ),
        None => None,
    };
    let mode: String = row.get(6)?;
    let mode = RestartMode::parse_name(&mode).map_err(|e| conversion_error(6, e.to_string()))?;

    Ok(RestartMetric {
        id: row.get(0)?,
        timestamp: ms_to_datetime(1, row.get(1)?)?,
        session_id: row.get(2)?,
        status,
        failure_reason,
        latency_ms: row.get(5)?,
        mode,
        narrative_count: row.get(7)?,
        link_count: row.get(8)?,
    })
}

/// Append one audit row inside the caller's transaction or connection.
pub(crate) fn append_audit(
    conn: &Connection,
    action: AuditAction,
    actor: AuditActor,
    from_id: &str,
    to_id: &str,
    relationship: &str,
    reason: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO link_audit (action, actor, from_id, to_id, relationship, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            action.as_str(),
            actor.as_str(),
            from_id,
            to_id,
            relationship,
            reason,
            Utc::now().timestamp_millis(),
        ],
    )?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

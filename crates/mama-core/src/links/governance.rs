//! Link governance: propose → approve / reject.
//!
//! Every state change appends an audit entry in the same transaction as the
//! row mutation, and evicts expansion-cache entries touching either endpoint.
//! A proposed link is invisible to traversal until a user approves it.

use chrono::Utc;
use rusqlite::params;

use crate::error::{MamaError, Result};
use crate::memory::{AuditAction, AuditActor, Link, LinkOrigin};
use crate::storage::{append_audit, Storage};

impl Storage {
    /// Propose a link between two entities. The link is created unapproved
    /// with `created_by = llm` and a `proposed` audit entry; it does not
    /// appear in any traversal until approved.
    pub fn propose_link(
        &self,
        from_id: &str,
        to_id: &str,
        relationship: &str,
        reason: &str,
        evidence: Option<&str>,
    ) -> Result<Link> {
        let relationship = relationship.trim().to_lowercase();
        if relationship.is_empty() {
            return Err(MamaError::validation("relationship must not be empty"));
        }
        if reason.trim().is_empty() {
            return Err(MamaError::validation(
                "a link requires a reason explaining why it exists",
            ));
        }
        if from_id == to_id {
            return Err(MamaError::InvariantViolated(format!(
                "self-loop link on {from_id}"
            )));
        }
        for endpoint in [from_id, to_id] {
            if self.get_opt(endpoint)?.is_none() {
                return Err(MamaError::NotFound(format!("entity {endpoint}")));
            }
        }
        if self.fetch_link(from_id, to_id, &relationship)?.is_some() {
            return Err(MamaError::Conflict(format!(
                "link {from_id} -[{relationship}]-> {to_id} already exists"
            )));
        }

        {
            let mut writer = self.write()?;
            let tx = writer.transaction()?;
            tx.execute(
                "INSERT INTO links (from_id, to_id, relationship, reason, evidence,
                                    created_by, approved_by_user, approved_at, decision_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, NULL, ?7)",
                params![
                    from_id,
                    to_id,
                    relationship,
                    reason,
                    evidence,
                    LinkOrigin::Llm.as_str(),
                    Utc::now().timestamp_millis(),
                ],
            )?;
            append_audit(
                &tx,
                AuditAction::Proposed,
                AuditActor::Llm,
                from_id,
                to_id,
                &relationship,
                Some(reason),
            )?;
            tx.commit()?;
        }

        self.invalidate_expansions(&[from_id, to_id])?;

        self.fetch_link(from_id, to_id, &relationship)?
            .ok_or_else(|| MamaError::Storage("link vanished after propose".to_string()))
    }

    /// Approve a pending link. Sets the approval flag and timestamp, appends
    /// an `approved` audit entry, and invalidates caches touching either
    /// endpoint. Approving an already-approved link is a no-op.
    pub fn approve_link(&self, from_id: &str, to_id: &str, relationship: &str) -> Result<Link> {
        let relationship = relationship.trim().to_lowercase();
        let link = self
            .fetch_link(from_id, to_id, &relationship)?
            .ok_or_else(|| {
                MamaError::NotFound(format!(
                    "link {from_id} -[{relationship}]-> {to_id}"
                ))
            })?;
        if link.approved_by_user {
            return Ok(link);
        }

        {
            let mut writer = self.write()?;
            let tx = writer.transaction()?;
            tx.execute(
                "UPDATE links SET approved_by_user = 1, approved_at = ?1
                 WHERE from_id = ?2 AND to_id = ?3 AND relationship = ?4",
                params![
                    Utc::now().timestamp_millis(),
                    from_id,
                    to_id,
                    relationship
                ],
            )?;
            append_audit(
                &tx,
                AuditAction::Approved,
                AuditActor::User,
                from_id,
                to_id,
                &relationship,
                None,
            )?;
            tx.commit()?;
        }

        self.invalidate_expansions(&[from_id, to_id])?;

        self.fetch_link(from_id, to_id, &relationship)?
            .ok_or_else(|| MamaError::Storage("link vanished after approve".to_string()))
    }

    /// Reject a pending link: the row is deleted and survives only as a
    /// `rejected` audit entry carrying the reason.
    pub fn reject_link(
        &self,
        from_id: &str,
        to_id: &str,
        relationship: &str,
        reason: &str,
    ) -> Result<()> {
        let relationship = relationship.trim().to_lowercase();
        if self.fetch_link(from_id, to_id, &relationship)?.is_none() {
            return Err(MamaError::NotFound(format!(
                "link {from_id} -[{relationship}]-> {to_id}"
            )));
        }

        {
            let mut writer = self.write()?;
            let tx = writer.transaction()?;
            tx.execute(
                "DELETE FROM links
                 WHERE from_id = ?1 AND to_id = ?2 AND relationship = ?3",
                params![from_id, to_id, relationship],
            )?;
            append_audit(
                &tx,
                AuditAction::Rejected,
                AuditActor::User,
                from_id,
                to_id,
                &relationship,
                Some(reason),
            )?;
            tx.commit()?;
        }

        self.invalidate_expansions(&[from_id, to_id])?;
        Ok(())
    }

    /// Links awaiting approval, oldest first.
    pub fn get_pending_links(&self) -> Result<Vec<Link>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {} FROM links WHERE approved_by_user = 0 ORDER BY rowid",
            crate::storage::LINK_COLUMNS
        ))?;
        let rows = stmt.query_map([], crate::storage::row_to_link)?;
        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }
}

// ============================================================================
// TESTS
// ============================================================================

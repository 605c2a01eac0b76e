//! Auto-link cleanup: scan, backup, report, execute, validate, restore.
//!
//! Legacy auto-links (`created_by = user` with no establishing decision) are
//! removed in batches, but only after a checksum-valid backup younger than
//! 24 hours exists. Every deletion leaves a `deprecated` audit entry, and a
//! corrupted backup can never be restored silently.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config;
use crate::deadline::Deadline;
use crate::error::{MamaError, Result};
use crate::memory::{AuditAction, AuditActor, Link, LinkOrigin};
use crate::storage::{append_audit, Storage};

/// Maximum age of a backup that still authorizes cleanup execution
const BACKUP_MAX_AGE_HOURS: i64 = 24;

/// Deletions above this count raise a warning in dry-run output
const LARGE_DELETION_THRESHOLD: usize = 1000;

/// Sample size included in scans and reports
const SAMPLE_SIZE: usize = 10;

const BACKUP_PREFIX: &str = "links-backup-";
const MANIFEST_PREFIX: &str = "backup-manifest-";
const REPORT_PREFIX: &str = "pre-cleanup-report-";

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Result of scanning for legacy auto-links
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoLinkScan {
    /// Total links in the store
    pub total: usize,
    /// Legacy auto-links eligible for cleanup
    pub auto_count: usize,
    /// Links protected from cleanup
    pub protected_count: usize,
    /// The eligible links themselves
    pub targets: Vec<Link>,
}

/// A created backup: file, manifest, checksum, count
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    /// Backup file path
    pub file: PathBuf,
    /// Manifest file path
    pub manifest: PathBuf,
    /// SHA-256 over the canonical backup bytes
    pub checksum: String,
    /// Number of links backed up
    pub count: usize,
}

/// Sidecar manifest recording the backup file, count, checksum, timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Backup file name (relative to the backup directory)
    pub file: String,
    /// Number of links in the backup
    pub count: usize,
    /// SHA-256 over the canonical backup bytes
    pub checksum: String,
    /// RFC 3339 creation timestamp
    pub created_at: String,
}

/// Backup file contents (version 1)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupFile {
    version: String,
    created_at: i64,
    link_count: usize,
    links: Vec<BackupLinkRecord>,
}

/// One link as persisted in a backup file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupLinkRecord {
    from_id: String,
    to_id: String,
    relationship: String,
    reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    evidence: Option<String>,
    created_by: String,
    approved_by_user: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision_id: Option<String>,
    created_at: i64,
}

impl From<&Link> for BackupLinkRecord {
    fn from(link: &Link) -> Self {
        Self {
            from_id: link.from_id.clone(),
            to_id: link.to_id.clone(),
            relationship: link.relationship.clone(),
            reason: link.reason.clone(),
            evidence: link.evidence.clone(),
            created_by: link.created_by.as_str().to_string(),
            approved_by_user: link.approved_by_user as u8,
            decision_id: link.decision_id.clone(),
            created_at: link.created_at.timestamp_millis(),
        }
    }
}

/// Risk classification for the pre-cleanup report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// Under 30% of links would be deleted
    Low,
    /// 30–50%
    Medium,
    /// Over 50%
    High,
}

impl RiskLevel {
    /// Canonical uppercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

/// Risk-classified pre-cleanup report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Risk classification by deletion ratio
    pub risk: RiskLevel,
    /// Total links in the store
    pub total_links: usize,
    /// Legacy auto-links that would be deleted
    pub auto_count: usize,
    /// Protected links
    pub protected_count: usize,
    /// auto_count / total_links
    pub deletion_ratio: f64,
    /// Sample of links that would be deleted
    pub samples: Vec<Link>,
    /// Markdown report written to the backup directory
    pub file: PathBuf,
}

/// Result of `execute_cleanup`
#[derive(Debug, Clone, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum CleanupRun {
    /// Dry-run: what would happen, no mutations
    DryRun {
        /// Links that would be deleted
        would_delete: usize,
        /// Number of batches at the requested size
        batches: usize,
        /// Set when the deletion count exceeds 1000
        large_deletion_warning: bool,
    },
    /// Executed cleanup
    Executed {
        /// Links deleted
        deleted: usize,
        /// Point failures (counted, not aborting)
        failed: usize,
        /// deleted / (deleted + failed)
        success_rate: f64,
        /// Batches processed
        batches_processed: usize,
    },
}

/// Post-cleanup validation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CleanupStatus {
    /// Under 5% auto-links remain
    Success,
    /// 5–10% remain
    Partial,
    /// Over 10% remain
    Failed,
}

impl CleanupStatus {
    /// Canonical uppercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupStatus::Success => "SUCCESS",
            CleanupStatus::Partial => "PARTIAL",
            CleanupStatus::Failed => "FAILED",
        }
    }
}

/// Result of `validate_cleanup`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupValidation {
    /// Overall status
    pub status: CleanupStatus,
    /// Auto-links still present
    pub remaining_auto: usize,
    /// Total links
    pub total_links: usize,
    /// remaining_auto / total_links
    pub remaining_ratio: f64,
    /// Present when status is FAILED: how to roll back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_instructions: Option<String>,
}

/// Result of `restore_backup`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    /// Links in the backup file
    pub total: usize,
    /// Links reinserted
    pub restored: usize,
    /// Links that could not be reinserted (already present, missing endpoint)
    pub failed: usize,
}

/// Result of the one-shot auto-link deprecation migration
#[derive(Debug, Clone, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum DeprecationRun {
    /// Dry-run: counts and a sample, no side effects
    DryRun {
        /// Links that would be deprecated
        auto_count: usize,
        /// Links protected from deprecation
        protected_count: usize,
        /// Up to 10 sample links
        sample: Vec<Link>,
    },
    /// Executed migration
    Executed {
        /// Links deleted
        deleted: usize,
        /// Point failures
        failed: usize,
    },
}

// ============================================================================
// CANONICAL SERIALIZATION
// ============================================================================

/// Canonical JSON: compact, keys sorted. `serde_json::Value` maps are
/// BTree-backed, so a value round-trip sorts object keys.
fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)
        .map_err(|e| MamaError::Storage(format!("backup serialization failed: {e}")))?;
    Ok(value.to_string())
}

/// Hex SHA-256 of a byte sequence
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Filesystem-safe ISO stamp for backup artifacts
fn file_stamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H-%M-%S%.3fZ").to_string()
}

fn manifest_path_for(backup_file: &Path) -> Option<PathBuf> {
    let name = backup_file.file_name()?.to_str()?;
    let stamped = name.strip_prefix(BACKUP_PREFIX)?;
    Some(backup_file.with_file_name(format!("{MANIFEST_PREFIX}{stamped}")))
}

// ============================================================================
// OPERATIONS
// ============================================================================

impl Storage {
    /// Identify legacy auto-links and what is protected from cleanup.
    pub fn scan_auto_links(&self) -> Result<AutoLinkScan> {
        let all = self.all_links()?;
        let total = all.len();
        let protected_count = all.iter().filter(|l| l.is_protected()).count();
        let targets: Vec<Link> = all.into_iter().filter(Link::is_legacy_auto).collect();

        Ok(AutoLinkScan {
            total,
            auto_count: targets.len(),
            protected_count,
            targets,
        })
    }

    /// Write a checksummed backup of the given links plus its manifest.
    /// Files land in `backup_dir` (default `~/.claude/mama-backups/`).
    pub fn create_link_backup(
        &self,
        targets: &[Link],
        backup_dir: Option<&Path>,
    ) -> Result<BackupInfo> {
        let dir = match backup_dir {
            Some(dir) => dir.to_path_buf(),
            None => config::default_backup_dir()?,
        };
        std::fs::create_dir_all(&dir)?;

        let now = Utc::now();
        let stamp = file_stamp(now);

        let backup = BackupFile {
            version: "1".to_string(),
            created_at: now.timestamp_millis(),
            link_count: targets.len(),
            links: targets.iter().map(BackupLinkRecord::from).collect(),
        };
        let canonical = canonical_json(&backup)?;
        let checksum = sha256_hex(canonical.as_bytes());

        let file = dir.join(format!("{BACKUP_PREFIX}{stamp}.json"));
        std::fs::write(&file, &canonical)?;

        let manifest = BackupManifest {
            file: file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string(),
            count: targets.len(),
            checksum: checksum.clone(),
            created_at: now.to_rfc3339(),
        };
        let manifest_path = dir.join(format!("{MANIFEST_PREFIX}{stamp}.json"));
        std::fs::write(&manifest_path, canonical_json(&manifest)?)?;

        tracing::info!(
            "Backed up {} links to {} (sha256 {})",
            targets.len(),
            file.display(),
            &checksum[..12]
        );

        Ok(BackupInfo {
            file,
            manifest: manifest_path,
            checksum,
            count: targets.len(),
        })
    }

    /// Produce a risk-classified pre-cleanup report and write it as markdown
    /// next to the backups.
    pub fn generate_cleanup_report(&self, backup_dir: Option<&Path>) -> Result<CleanupReport> {
        let dir = match backup_dir {
            Some(dir) => dir.to_path_buf(),
            None => config::default_backup_dir()?,
        };
        std::fs::create_dir_all(&dir)?;

        let scan = self.scan_auto_links()?;
        let deletion_ratio = if scan.total == 0 {
            0.0
        } else {
            scan.auto_count as f64 / scan.total as f64
        };
        let risk = if deletion_ratio < 0.30 {
            RiskLevel::Low
        } else if deletion_ratio <= 0.50 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        };

        let samples: Vec<Link> = scan.targets.iter().take(SAMPLE_SIZE).cloned().collect();

        let mut markdown = String::new();
        markdown.push_str("# Pre-cleanup report\n\n");
        markdown.push_str(&format!("- Risk: **{}**\n", risk.as_str()));
        markdown.push_str(&format!("- Total links: {}\n", scan.total));
        markdown.push_str(&format!("- Auto-links to delete: {}\n", scan.auto_count));
        markdown.push_str(&format!("- Protected links: {}\n", scan.protected_count));
        markdown.push_str(&format!("- Deletion ratio: {:.1}%\n\n", deletion_ratio * 100.0));
        if !samples.is_empty() {
            markdown.push_str("## Sample of links to delete\n\n");
            for link in &samples {
                markdown.push_str(&format!(
                    "- `{}` -[{}]-> `{}` — {}\n",
                    link.from_id, link.relationship, link.to_id, link.reason
                ));
            }
        }

        let file = dir.join(format!("{REPORT_PREFIX}{}.md", file_stamp(Utc::now())));
        std::fs::write(&file, markdown)?;

        Ok(CleanupReport {
            risk,
            total_links: scan.total,
            auto_count: scan.auto_count,
            protected_count: scan.protected_count,
            deletion_ratio,
            samples,
            file,
        })
    }

    /// Delete legacy auto-links in batches.
    ///
    /// Execution refuses to run without a checksum-valid backup younger than
    /// 24 hours (`NoRecentBackup`). Dry-run reports what would happen without
    /// mutating anything. Point failures are counted and do not abort the
    /// batch.
    pub fn execute_cleanup(
        &self,
        batch_size: usize,
        dry_run: bool,
        backup_dir: Option<&Path>,
        deadline: &Deadline,
    ) -> Result<CleanupRun> {
        let batch_size = batch_size.max(1);
        let scan = self.scan_auto_links()?;
        let batches = scan.auto_count.div_ceil(batch_size);

        if dry_run {
            return Ok(CleanupRun::DryRun {
                would_delete: scan.auto_count,
                batches,
                large_deletion_warning: scan.auto_count > LARGE_DELETION_THRESHOLD,
            });
        }

        let dir = match backup_dir {
            Some(dir) => dir.to_path_buf(),
            None => config::default_backup_dir()?,
        };
        self.require_recent_backup(&dir)?;

        let mut deleted = 0usize;
        let mut failed = 0usize;
        let mut batches_processed = 0usize;

        for batch in scan.targets.chunks(batch_size) {
            deadline.check("link cleanup")?;
            let (batch_deleted, batch_failed) = self.deprecate_links_batch(batch)?;
            deleted += batch_deleted;
            failed += batch_failed;
            batches_processed += 1;
        }

        let attempted = deleted + failed;
        let success_rate = if attempted == 0 {
            1.0
        } else {
            deleted as f64 / attempted as f64
        };

        tracing::info!(
            "Cleanup deleted {} auto-links ({} failed) across {} batches",
            deleted,
            failed,
            batches_processed
        );

        Ok(CleanupRun::Executed {
            deleted,
            failed,
            success_rate,
            batches_processed,
        })
    }

    /// Check how much auto-link debt remains after a cleanup.
    pub fn validate_cleanup(&self, backup_dir: Option<&Path>) -> Result<CleanupValidation> {
        let scan = self.scan_auto_links()?;
        let remaining_ratio = if scan.total == 0 {
            0.0
        } else {
            scan.auto_count as f64 / scan.total as f64
        };
        let status = if remaining_ratio < 0.05 {
            CleanupStatus::Success
        } else if remaining_ratio <= 0.10 {
            CleanupStatus::Partial
        } else {
            CleanupStatus::Failed
        };

        let rollback_instructions = if status == CleanupStatus::Failed {
            let dir = match backup_dir {
                Some(dir) => dir.to_path_buf(),
                None => config::default_backup_dir()?,
            };
            let latest = self
                .latest_backup(&dir)
                .ok()
                .flatten()
                .map(|(file, _)| file.display().to_string())
                .unwrap_or_else(|| "<no backup file found>".to_string());
            Some(format!(
                "Cleanup left {:.1}% auto-links behind. To roll back:\n\
                 1. Verify the backup file: {latest}\n\
                 2. Run restore_link_backup with that file (checksum is verified).\n\
                 3. Re-run scan_auto_links and investigate the skipped links before retrying.",
                remaining_ratio * 100.0
            ))
        } else {
            None
        };

        Ok(CleanupValidation {
            status,
            remaining_auto: scan.auto_count,
            total_links: scan.total,
            remaining_ratio,
            rollback_instructions,
        })
    }

    /// Reinsert links from a backup file, verifying the manifest checksum
    /// first. Any corruption surfaces as `ChecksumMismatch`.
    pub fn restore_backup(&self, file: &Path) -> Result<RestoreOutcome> {
        let bytes = std::fs::read(file)?;

        let manifest_path = manifest_path_for(file).ok_or_else(|| {
            MamaError::validation(format!(
                "not a backup file name: {}",
                file.display()
            ))
        })?;
        let manifest: BackupManifest =
            serde_json::from_slice(&std::fs::read(&manifest_path).map_err(|_| {
                MamaError::validation(format!(
                    "manifest not found for backup {}",
                    file.display()
                ))
            })?)
            .map_err(|e| MamaError::Storage(format!("malformed manifest: {e}")))?;

        let actual = sha256_hex(&bytes);
        if actual != manifest.checksum {
            return Err(MamaError::ChecksumMismatch {
                file: file.to_path_buf(),
                expected: manifest.checksum,
                actual,
            });
        }

        let backup: BackupFile = serde_json::from_slice(&bytes)
            .map_err(|e| MamaError::Storage(format!("malformed backup: {e}")))?;

        let mut restored = 0usize;
        let mut failed = 0usize;
        {
            let writer = self.write()?;
            for record in &backup.links {
                let inserted = writer.execute(
                    "INSERT INTO links (from_id, to_id, relationship, reason, evidence,
                                        created_by, approved_by_user, approved_at, decision_id, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?9)",
                    params![
                        record.from_id,
                        record.to_id,
                        record.relationship,
                        record.reason,
                        record.evidence,
                        record.created_by,
                        record.approved_by_user as i64,
                        record.decision_id,
                        record.created_at,
                    ],
                );
                match inserted {
                    Ok(_) => restored += 1,
                    Err(e) => {
                        tracing::warn!(
                            "Could not restore link {} -> {}: {}",
                            record.from_id,
                            record.to_id,
                            e
                        );
                        failed += 1;
                    }
                }
            }
        }

        // A bulk reinsert touches too much to track per node
        self.expansions()?.clear();

        Ok(RestoreOutcome {
            total: backup.links.len(),
            restored,
            failed,
        })
    }

    /// One-shot migration deprecating every legacy auto-link. The governed
    /// Epic-5 path (`execute_cleanup`) adds backup gating and batching on
    /// top; this is the simple form for small stores.
    pub fn deprecate_auto_links(&self, dry_run: bool) -> Result<DeprecationRun> {
        let scan = self.scan_auto_links()?;
        // Belt and braces: is_legacy_auto and is_protected are disjoint, but
        // cleanup must never delete a protected link even if that changes
        let targets: Vec<Link> = scan
            .targets
            .into_iter()
            .filter(|l| !l.is_protected())
            .collect();

        if dry_run {
            return Ok(DeprecationRun::DryRun {
                auto_count: targets.len(),
                protected_count: scan.protected_count,
                sample: targets.iter().take(SAMPLE_SIZE).cloned().collect(),
            });
        }

        let (deleted, failed) = self.deprecate_links_batch(&targets)?;
        Ok(DeprecationRun::Executed { deleted, failed })
    }

    /// Delete a batch of links in one transaction, writing a `deprecated`
    /// audit row per deletion. Point failures are counted, not fatal.
    fn deprecate_links_batch(&self, links: &[Link]) -> Result<(usize, usize)> {
        let mut deleted = 0usize;
        let mut failed = 0usize;
        {
            let mut writer = self.write()?;
            let tx = writer.transaction()?;
            for link in links {
                let result = tx.execute(
                    "DELETE FROM links
                     WHERE from_id = ?1 AND to_id = ?2 AND relationship = ?3",
                    params![link.from_id, link.to_id, link.relationship],
                );
                match result {
                    Ok(1) => {
                        append_audit(
                            &tx,
                            AuditAction::Deprecated,
                            AuditActor::System,
                            &link.from_id,
                            &link.to_id,
                            &link.relationship,
                            Some("legacy auto-link cleanup"),
                        )?;
                        deleted += 1;
                    }
                    Ok(_) => failed += 1,
                    Err(e) => {
                        tracing::warn!(
                            "Failed to delete link {} -> {}: {}",
                            link.from_id,
                            link.to_id,
                            e
                        );
                        failed += 1;
                    }
                }
            }
            tx.commit()?;
        }

        let mut cache = self.expansions()?;
        for link in links {
            cache.invalidate_node(&link.from_id);
            cache.invalidate_node(&link.to_id);
        }

        Ok((deleted, failed))
    }

    /// Require a checksum-valid backup younger than 24 hours in `dir`.
    fn require_recent_backup(&self, dir: &Path) -> Result<()> {
        let (file, manifest) = self
            .latest_backup(dir)?
            .ok_or_else(|| MamaError::NoRecentBackup("no backup file present".to_string()))?;

        let created_at = DateTime::parse_from_rfc3339(&manifest.created_at)
            .map_err(|e| MamaError::Storage(format!("malformed manifest timestamp: {e}")))?
            .with_timezone(&Utc);
        if Utc::now() - created_at > Duration::hours(BACKUP_MAX_AGE_HOURS) {
            return Err(MamaError::NoRecentBackup(format!(
                "latest backup {} is older than {BACKUP_MAX_AGE_HOURS} h",
                file.display()
            )));
        }

        let bytes = std::fs::read(&file)?;
        if sha256_hex(&bytes) != manifest.checksum {
            return Err(MamaError::NoRecentBackup(format!(
                "latest backup {} failed checksum verification",
                file.display()
            )));
        }
        Ok(())
    }

    /// Newest backup file (by stamp) together with its manifest. Backups
    /// without a manifest are ignored.
    fn latest_backup(&self, dir: &Path) -> Result<Option<(PathBuf, BackupManifest)>> {
        if !dir.is_dir() {
            return Ok(None);
        }
        let mut backups: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(".json"))
            })
            .collect();
        backups.sort();

        for file in backups.into_iter().rev() {
            let Some(manifest_path) = manifest_path_for(&file) else {
                continue;
            };
            let Ok(raw) = std::fs::read(&manifest_path) else {
                continue;
            };
            if let Ok(manifest) = serde_json::from_slice::<BackupManifest>(&raw) {
                return Ok(Some((file, manifest)));
            }
        }
        Ok(None)
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Session checkpoints: save and resume.
//!
//! A checkpoint is an ordinary entity; resume assembles it together with the
//! narrative window (decisions from the hour before the checkpoint), an
//! approved-only link expansion, and parsed next steps. Every resume attempt
//! records a restart metric, including the no-checkpoint case.

use std::time::Instant;

use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::deadline::Deadline;
use crate::error::Result;
use crate::graph::{ExpandOptions, GraphVisit, DEPTH_CHECKPOINT_LOAD};
use crate::memory::{
    Entity, EntityDraft, EntityType, Outcome, RestartFailure, RestartMode, RestartStatus,
};
use crate::storage::{row_to_entity, Storage, ENTITY_COLUMNS};

/// Narrative window: decisions created this long before the checkpoint
pub const NARRATIVE_WINDOW_MS: i64 = 60 * 60 * 1000;

/// Maximum decisions included in the narrative
pub const NARRATIVE_LIMIT: usize = 20;

/// Latency target for a full resume (warn above this)
pub const FULL_LATENCY_TARGET_MS: i64 = 2500;

/// Latency target for a summary resume (warn above this)
pub const SUMMARY_LATENCY_TARGET_MS: i64 = 1000;

/// Input for saving a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SaveCheckpointInput {
    /// What happened this session
    pub summary: String,
    /// Files that were open
    #[serde(default)]
    pub open_files: Vec<String>,
    /// Remaining work, markdown task list by convention
    pub next_steps: Option<String>,
}

/// Options for loading the latest checkpoint.
#[derive(Debug, Clone)]
pub struct LoadCheckpointOptions {
    /// Include the narrative window of recent decisions
    pub include_narrative: bool,
    /// Include the approved-link expansion of the checkpoint
    pub include_links: bool,
    /// Expansion depth; clamped to 2 for checkpoint loads
    pub link_depth: u32,
    /// Session performing the resume (a fresh id is generated when absent)
    pub session_id: Option<String>,
    /// Cooperative deadline
    pub deadline: Deadline,
}

impl Default for LoadCheckpointOptions {
    fn default() -> Self {
        Self {
            include_narrative: true,
            include_links: true,
            link_depth: 1,
            session_id: None,
            deadline: Deadline::none(),
        }
    }
}

/// Next steps assembled for a resume payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextSteps {
    /// Unchecked task-list lines from the checkpoint's next_steps
    pub unfinished: Vec<String>,
    /// Derived suggestions (unresolved or failed decisions to revisit)
    pub recommendations: Vec<String>,
    /// Risks collected from the narrative decisions
    pub risks: Vec<String>,
}

/// Resume payload. With no checkpoint stored, `checkpoint` is `None` and
/// everything else is empty; that is a benign success, not an error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointPayload {
    /// The most recent checkpoint, if any
    pub checkpoint: Option<Entity>,
    /// Decisions created within the narrative window before the checkpoint,
    /// in time order
    pub narrative: Vec<Entity>,
    /// Approved-link expansion of the checkpoint
    pub links: Vec<GraphVisit>,
    /// Parsed and derived next steps
    pub next_steps: NextSteps,
    /// Which resume mode this payload represents
    pub mode: RestartMode,
    /// Measured load latency
    pub latency_ms: i64,
}

impl Storage {
    /// Save a session checkpoint.
    pub fn save_checkpoint(&self, input: SaveCheckpointInput) -> Result<Entity> {
        self.insert(EntityDraft {
            entity_type: EntityType::Checkpoint,
            content: input.summary,
            open_files: input.open_files,
            next_steps: input.next_steps,
            ..Default::default()
        })
    }

    /// Load the most recent checkpoint with narrative window and link
    /// context, recording a restart metric either way.
    pub fn load_checkpoint(&self, options: &LoadCheckpointOptions) -> Result<CheckpointPayload> {
        let start = Instant::now();
        let session_id = options
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mode = if options.include_narrative && options.include_links {
            RestartMode::Full
        } else {
            RestartMode::Summary
        };

        let checkpoint = match self.list_recent(Some(EntityType::Checkpoint), 1) {
            Ok(mut checkpoints) => checkpoints.pop(),
            Err(e) => {
                self.record_restart_metric(
                    &session_id,
                    RestartStatus::Failure,
                    Some(RestartFailure::LoadError),
                    start.elapsed().as_millis() as i64,
                    mode,
                    0,
                    0,
                )?;
                return Err(e);
            }
        };

        let Some(checkpoint) = checkpoint else {
            let latency_ms = start.elapsed().as_millis() as i64;
            self.record_restart_metric(
                &session_id,
                RestartStatus::Failure,
                Some(RestartFailure::NoCheckpoint),
                latency_ms,
                mode,
                0,
                0,
            )?;
            return Ok(CheckpointPayload {
                checkpoint: None,
                narrative: Vec::new(),
                links: Vec::new(),
                next_steps: NextSteps::default(),
                mode,
                latency_ms,
            });
        };

        let assembled = self.assemble_context(&checkpoint, options);
        let (narrative, links) = match assembled {
            Ok(parts) => parts,
            Err(e) => {
                self.record_restart_metric(
                    &session_id,
                    RestartStatus::Failure,
                    Some(RestartFailure::ContextIncomplete),
                    start.elapsed().as_millis() as i64,
                    mode,
                    0,
                    0,
                )?;
                return Err(e);
            }
        };

        let next_steps = build_next_steps(&checkpoint, &narrative);

        let latency_ms = start.elapsed().as_millis() as i64;
        let target = match mode {
            RestartMode::Full => FULL_LATENCY_TARGET_MS,
            RestartMode::Summary => SUMMARY_LATENCY_TARGET_MS,
        };
        if latency_ms > target {
            tracing::warn!(
                "Checkpoint load took {} ms (target {} ms, mode {})",
                latency_ms,
                target,
                mode.as_str()
            );
        }

        self.record_restart_metric(
            &session_id,
            RestartStatus::Success,
            None,
            latency_ms,
            mode,
            narrative.len() as i64,
            links.len() as i64,
        )?;

        Ok(CheckpointPayload {
            checkpoint: Some(checkpoint),
            narrative,
            links,
            next_steps,
            mode,
            latency_ms,
        })
    }

    fn assemble_context(
        &self,
        checkpoint: &Entity,
        options: &LoadCheckpointOptions,
    ) -> Result<(Vec<Entity>, Vec<GraphVisit>)> {
        let narrative = if options.include_narrative {
            self.narrative_window(checkpoint)?
        } else {
            Vec::new()
        };

        let links = if options.include_links {
            self.expand(
                std::slice::from_ref(&checkpoint.id),
                &ExpandOptions {
                    depth: options.link_depth.min(DEPTH_CHECKPOINT_LOAD),
                    deadline: options.deadline.clone(),
                    ..Default::default()
                },
            )?
        } else {
            Vec::new()
        };

        Ok((narrative, links))
    }

    /// Decisions created within the hour before the checkpoint, time order.
    fn narrative_window(&self, checkpoint: &Entity) -> Result<Vec<Entity>> {
        let end_ms = checkpoint.created_at.timestamp_millis();
        let start_ms = end_ms - NARRATIVE_WINDOW_MS;

        let reader = self.read()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE entity_type = 'decision' AND created_at >= ?1 AND created_at <= ?2
             ORDER BY created_at ASC, rowid ASC LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![start_ms, end_ms, NARRATIVE_LIMIT as i64],
            row_to_entity,
        )?;
        let mut decisions = Vec::new();
        for row in rows {
            decisions.push(row?);
        }
        Ok(decisions)
    }
}

/// Unchecked markdown task lines: `- [ ] something`.
fn parse_unfinished(next_steps: Option<&str>) -> Vec<String> {
    next_steps
        .unwrap_or_default()
        .lines()
        .filter_map(|line| line.trim().strip_prefix("- [ ]"))
        .map(|rest| rest.trim().to_string())
        .filter(|rest| !rest.is_empty())
        .collect()
}

fn build_next_steps(checkpoint: &Entity, narrative: &[Entity]) -> NextSteps {
    let unfinished = parse_unfinished(checkpoint.next_steps.as_deref());

    let mut recommendations = Vec::new();
    let mut risks = Vec::new();
    for decision in narrative {
        let topic = decision.topic.as_deref().unwrap_or(&decision.id);
        match decision.outcome {
            Some(Outcome::Failed) => {
                let reason = decision
                    .failure_reason
                    .as_deref()
                    .unwrap_or("no reason recorded");
                recommendations.push(format!("Revisit decision '{topic}': failed ({reason})"));
            }
            Some(Outcome::Pending) => {
                recommendations.push(format!("Resolve outcome for decision '{topic}'"));
            }
            _ => {}
        }
        if let Some(risk) = decision.risks.as_deref() {
            if !risk.trim().is_empty() {
                risks.push(risk.trim().to_string());
            }
        }
    }

    NextSteps {
        unfinished,
        recommendations,
        risks,
    }
}

// ============================================================================
// TESTS
// ============================================================================

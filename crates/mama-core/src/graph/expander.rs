//! Bounded breadth-first expansion over approved links.
//!
//! Traversal follows outgoing edges, visits each node at most once, and
//! clamps depth to a hard cap, so cyclic graphs always terminate. Results
//! are cached; any link mutation touching a traversed node evicts the entry.

use std::collections::HashSet;

use crate::error::Result;
use crate::storage::Storage;

use super::cache::ExpansionCache;
use super::{EdgeMeta, ExpandOptions, GraphVisit};

/// Hard cap on traversal depth; caller-supplied depths are clamped
pub const MAX_EXPANSION_DEPTH: u32 = 5;

impl Storage {
    /// Expand from `start_ids` over active edges, breadth-first.
    ///
    /// Returns the visit order with each node's shortest-path depth and the
    /// incoming edge metadata. Start nodes are not emitted. A missing start
    /// id contributes nothing (not an error).
    pub fn expand(&self, start_ids: &[String], options: &ExpandOptions) -> Result<Vec<GraphVisit>> {
        let depth = options.depth.min(MAX_EXPANSION_DEPTH);
        if depth == 0 || start_ids.is_empty() {
            return Ok(vec![]);
        }

        let key = ExpansionCache::key(start_ids, options.categories.as_deref(), depth);
        // Pending-link traversal is a governance read path; only the
        // approved-only path is cached
        let cacheable = options.approved_only;
        if cacheable {
            if let Some(visits) = self.expansions()?.get(key) {
                tracing::debug!("expansion cache hit ({} start nodes)", start_ids.len());
                return Ok(visits);
            }
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: Vec<String> = Vec::new();
        for id in start_ids {
            if visited.insert(id.clone()) {
                frontier.push(id.clone());
            }
        }
        // Every node the traversal touches, starts included, for targeted
        // cache invalidation
        let mut touched: HashSet<String> = visited.clone();
        let mut order: Vec<GraphVisit> = Vec::new();

        for level in 1..=depth {
            options.deadline.check("graph expansion")?;
            let mut next: Vec<String> = Vec::new();
            for node in &frontier {
                for link in self.links_from(node, options.approved_only)? {
                    let category = link.category();
                    if let Some(categories) = &options.categories {
                        if !categories.contains(&category) {
                            continue;
                        }
                    }
                    touched.insert(link.to_id.clone());
                    if visited.insert(link.to_id.clone()) {
                        next.push(link.to_id.clone());
                        order.push(GraphVisit {
                            id: link.to_id,
                            depth: level,
                            via: Some(EdgeMeta {
                                from_id: link.from_id,
                                relationship: link.relationship,
                                reason: link.reason,
                                category,
                            }),
                        });
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        if cacheable {
            self.expansions()?.insert(key, order.clone(), touched);
        }
        Ok(order)
    }
}

// ============================================================================
// TESTS
// ============================================================================

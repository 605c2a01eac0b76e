//! Bounded graph expansion over approved links.

mod cache;
mod expander;

pub use cache::{ExpansionCache, EXPANSION_CACHE_SIZE, EXPANSION_CACHE_TTL};
pub use expander::MAX_EXPANSION_DEPTH;

use serde::{Deserialize, Serialize};

use crate::deadline::Deadline;
use crate::memory::LinkCategory;

/// Default depth for topic-search expansion
pub const DEPTH_TOPIC_SEARCH: u32 = 3;

/// Default depth for semantic-context expansion
pub const DEPTH_SEMANTIC_CONTEXT: u32 = 5;

/// Default depth for checkpoint-load expansion
pub const DEPTH_CHECKPOINT_LOAD: u32 = 2;

/// Metadata of the edge a traversal arrived through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeMeta {
    /// Node the edge came from
    pub from_id: String,
    /// Relationship token on the edge
    pub relationship: String,
    /// Why the link exists
    pub reason: String,
    /// Derived category of the relationship
    pub category: LinkCategory,
}

/// One visited node: shortest-path depth plus the incoming edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphVisit {
    /// Visited entity id
    pub id: String,
    /// Shortest-path depth from the start set (1 = direct neighbor)
    pub depth: u32,
    /// Edge the BFS arrived through (None only for start nodes, which are
    /// not emitted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<EdgeMeta>,
}

/// Options for a graph expansion.
#[derive(Debug, Clone)]
pub struct ExpandOptions {
    /// Requested depth; clamped to [`MAX_EXPANSION_DEPTH`]
    pub depth: u32,
    /// Traverse only user-approved links (the default; pending links are
    /// invisible to traversal)
    pub approved_only: bool,
    /// Restrict traversal to edges in these categories
    pub categories: Option<Vec<LinkCategory>>,
    /// Cooperative deadline
    pub deadline: Deadline,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            depth: DEPTH_SEMANTIC_CONTEXT,
            approved_only: true,
            categories: None,
            deadline: Deadline::none(),
        }
    }
}

impl ExpandOptions {
    /// Expansion to the given depth with all other options default.
    pub fn depth(depth: u32) -> Self {
        Self {
            depth,
            ..Default::default()
        }
    }
}

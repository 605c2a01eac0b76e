//! Traversal result cache.
//!
//! LRU of 100 entries with a 5-minute TTL, keyed by
//! `hash(start_ids || sorted(categories) || depth)`. A reverse index from
//! node id to cache keys makes invalidation targeted: any link mutation that
//! touches a node evicts every entry that started at or traversed that node.
//! Invalidation may over-evict, never under-evict.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::memory::LinkCategory;

use super::GraphVisit;

/// Maximum cached expansions
pub const EXPANSION_CACHE_SIZE: usize = 100;

/// Entry time-to-live
pub const EXPANSION_CACHE_TTL: Duration = Duration::from_secs(300);

struct CachedExpansion {
    visits: Vec<GraphVisit>,
    /// Every node the traversal touched (starts included), for invalidation
    nodes: HashSet<String>,
    inserted_at: Instant,
}

/// Process-local LRU cache for graph expansions.
pub struct ExpansionCache {
    entries: LruCache<u64, CachedExpansion>,
    by_node: HashMap<String, HashSet<u64>>,
    ttl: Duration,
}

impl Default for ExpansionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpansionCache {
    /// Cache with the default capacity and TTL.
    pub fn new() -> Self {
        Self::with_capacity(EXPANSION_CACHE_SIZE, EXPANSION_CACHE_TTL)
    }

    /// Cache with explicit capacity and TTL (tests use short TTLs).
    pub fn with_capacity(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity.max(1)).expect("capacity >= 1")),
            by_node: HashMap::new(),
            ttl,
        }
    }

    /// Cache key for a query: start ids in call order, categories sorted,
    /// then depth.
    pub fn key(start_ids: &[String], categories: Option<&[LinkCategory]>, depth: u32) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for id in start_ids {
            id.hash(&mut hasher);
        }
        if let Some(categories) = categories {
            let mut sorted: Vec<LinkCategory> = categories.to_vec();
            sorted.sort();
            sorted.dedup();
            for category in sorted {
                category.as_str().hash(&mut hasher);
            }
        }
        depth.hash(&mut hasher);
        hasher.finish()
    }

    /// Cached result for a key, unless it has expired.
    pub fn get(&mut self, key: u64) -> Option<Vec<GraphVisit>> {
        let expired = match self.entries.get(&key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            self.evict(key);
            return None;
        }
        self.entries.get(&key).map(|entry| entry.visits.clone())
    }

    /// Store a result together with the node set the traversal touched.
    pub fn insert(&mut self, key: u64, visits: Vec<GraphVisit>, nodes: HashSet<String>) {
        for node in &nodes {
            self.by_node.entry(node.clone()).or_default().insert(key);
        }
        let entry = CachedExpansion {
            visits,
            nodes,
            inserted_at: Instant::now(),
        };
        if let Some((evicted_key, evicted)) = self.entries.push(key, entry) {
            // LRU displacement (or replacement of the same key): drop the
            // displaced entry's reverse-index references
            if evicted_key != key {
                self.unindex(evicted_key, &evicted.nodes);
            }
        }
    }

    /// Evict every entry that started at or traversed `node`.
    pub fn invalidate_node(&mut self, node: &str) {
        if let Some(keys) = self.by_node.remove(node) {
            for key in keys {
                self.evict(key);
            }
            tracing::debug!("expansion cache invalidated for node {}", node);
        }
    }

    /// Drop everything (used when bulk operations touch too much to track).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_node.clear();
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict(&mut self, key: u64) {
        if let Some(entry) = self.entries.pop(&key) {
            self.unindex(key, &entry.nodes);
        }
    }

    fn unindex(&mut self, key: u64, nodes: &HashSet<String>) {
        for node in nodes {
            if let Some(keys) = self.by_node.get_mut(node) {
                keys.remove(&key);
                if keys.is_empty() {
                    self.by_node.remove(node);
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(id: &str, depth: u32) -> GraphVisit {
        GraphVisit {
            id: id.to_string(),
            depth,
            via: None,
        }
    }

    fn nodes(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_hit_and_miss() {
        let mut cache = ExpansionCache::new();
        let key = ExpansionCache::key(&["a".into()], None, 2);
        assert!(cache.get(key).is_none());

        cache.insert(key, vec![visit("b", 1)], nodes(&["a", "b"]));
        let hit = cache.get(key).unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].id, "b");
    }

    #[test]
    fn test_key_depends_on_depth_and_categories() {
        let start = vec!["a".to_string()];
        let k1 = ExpansionCache::key(&start, None, 1);
        let k2 = ExpansionCache::key(&start, None, 2);
        assert_ne!(k1, k2);

        let k3 = ExpansionCache::key(&start, Some(&[LinkCategory::Evolution]), 1);
        assert_ne!(k1, k3);

        // Category order does not matter
        let k4 = ExpansionCache::key(
            &start,
            Some(&[LinkCategory::Temporal, LinkCategory::Evolution]),
            1,
        );
        let k5 = ExpansionCache::key(
            &start,
            Some(&[LinkCategory::Evolution, LinkCategory::Temporal]),
            1,
        );
        assert_eq!(k4, k5);
    }

    #[test]
    fn test_invalidate_traversed_node() {
        let mut cache = ExpansionCache::new();
        let key = ExpansionCache::key(&["a".into()], None, 2);
        cache.insert(key, vec![visit("b", 1), visit("c", 2)], nodes(&["a", "b", "c"]));

        // Mutating a link that touches a traversed node evicts the entry
        cache.invalidate_node("c");
        assert!(cache.get(key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_unrelated_node_keeps_entry() {
        let mut cache = ExpansionCache::new();
        let key = ExpansionCache::key(&["a".into()], None, 2);
        cache.insert(key, vec![visit("b", 1)], nodes(&["a", "b"]));

        cache.invalidate_node("zzz");
        assert!(cache.get(key).is_some());
    }

    #[test]
    fn test_ttl_expiry() {
        let mut cache = ExpansionCache::with_capacity(10, Duration::from_millis(0));
        let key = ExpansionCache::key(&["a".into()], None, 1);
        cache.insert(key, vec![visit("b", 1)], nodes(&["a", "b"]));
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.get(key).is_none());
    }

    #[test]
    fn test_lru_displacement_cleans_reverse_index() {
        let mut cache = ExpansionCache::with_capacity(1, Duration::from_secs(60));
        let k1 = ExpansionCache::key(&["a".into()], None, 1);
        let k2 = ExpansionCache::key(&["b".into()], None, 1);

        cache.insert(k1, vec![visit("x", 1)], nodes(&["a", "x"]));
        cache.insert(k2, vec![visit("y", 1)], nodes(&["b", "y"]));

        assert!(cache.get(k1).is_none());
        assert!(cache.get(k2).is_some());
        // Invalidating nodes from the displaced entry is a no-op
        cache.invalidate_node("x");
        assert!(cache.get(k2).is_some());
    }
}

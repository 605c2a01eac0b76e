//! Temp-database management and seeding helpers.

use mama_core::{EntityDraft, LinkDraft, LinkOrigin, Storage};
use tempfile::TempDir;

/// A storage instance on a throwaway database. The directory lives as long
/// as the handle.
pub struct TestDb {
    pub storage: Storage,
    pub dir: TempDir,
}

/// Open a fresh store in a temp directory.
pub fn open_test_db() -> TestDb {
    let dir = TempDir::new().expect("temp dir");
    let storage = Storage::open(Some(dir.path().join("mama-memory.db"))).expect("open storage");
    TestDb { storage, dir }
}

/// Insert a minimal decision and return its id.
pub fn seed_decision(storage: &Storage, topic: &str, content: &str) -> String {
    storage
        .insert(EntityDraft::decision(topic, content, "seeded for testing"))
        .expect("insert decision")
        .id
}

/// Insert a legacy auto-link (user-attributed, no establishing decision).
pub fn seed_auto_link(storage: &Storage, from: &str, to: &str, relationship: &str) {
    storage
        .insert_link(LinkDraft {
            from_id: from.to_string(),
            to_id: to.to_string(),
            relationship: relationship.to_string(),
            reason: format!("auto-linked {from} to {to}"),
            evidence: None,
            created_by: LinkOrigin::User,
            approved_by_user: false,
            decision_id: None,
        })
        .expect("insert auto link");
}

/// Insert a protected link (user-approved with provenance).
pub fn seed_protected_link(storage: &Storage, from: &str, to: &str, relationship: &str) {
    storage
        .insert_link(LinkDraft {
            from_id: from.to_string(),
            to_id: to.to_string(),
            relationship: relationship.to_string(),
            reason: format!("user linked {from} to {to} while deciding"),
            evidence: None,
            created_by: LinkOrigin::User,
            approved_by_user: true,
            decision_id: Some(from.to_string()),
        })
        .expect("insert protected link");
}

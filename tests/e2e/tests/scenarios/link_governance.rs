//! Pending links are invisible; approved links traverse; rejection leaves
//! only the audit trail.

use mama_core::{AuditAction, ExpandOptions, MamaError};
use mama_e2e_tests::harness::{open_test_db, seed_decision};

#[test]
fn approved_link_appears_pending_does_not() {
    let db = open_test_db();
    let d1 = seed_decision(&db.storage, "d1", "first decision");
    let d2 = seed_decision(&db.storage, "d2", "second decision");

    db.storage
        .propose_link(&d1, &d2, "refines", "D2 refines D1 because scope narrowed", None)
        .unwrap();

    // Pending: invisible to traversal
    let visits = db
        .storage
        .expand(&[d1.clone()], &ExpandOptions::depth(1))
        .unwrap();
    assert!(visits.is_empty());

    db.storage.approve_link(&d1, &d2, "refines").unwrap();

    // Approved: visible with edge metadata
    let visits = db
        .storage
        .expand(&[d1.clone()], &ExpandOptions::depth(1))
        .unwrap();
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0].id, d2);
    let via = visits[0].via.as_ref().unwrap();
    assert_eq!(via.from_id, d1);
    assert_eq!(via.relationship, "refines");
    assert!(via.reason.contains("scope narrowed"));
}

#[test]
fn rejected_link_survives_only_in_audit() {
    let db = open_test_db();
    let d1 = seed_decision(&db.storage, "d1", "first decision");
    let d2 = seed_decision(&db.storage, "d2", "second decision");

    db.storage
        .propose_link(&d1, &d2, "relates_to", "might be related", None)
        .unwrap();
    db.storage
        .reject_link(&d1, &d2, "relates_to", "superficial similarity only")
        .unwrap();

    // Row is gone
    assert!(db
        .storage
        .fetch_link(&d1, &d2, "relates_to")
        .unwrap()
        .is_none());
    assert!(db.storage.get_pending_links().unwrap().is_empty());

    // Audit holds the full story
    let audit = db.storage.audit_for_link(&d1, &d2, "relates_to").unwrap();
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[0].action, AuditAction::Proposed);
    assert_eq!(audit[1].action, AuditAction::Rejected);
    assert_eq!(
        audit[1].reason.as_deref(),
        Some("superficial similarity only")
    );
}

#[test]
fn self_loops_and_duplicates_are_refused() {
    let db = open_test_db();
    let d1 = seed_decision(&db.storage, "d1", "first decision");
    let d2 = seed_decision(&db.storage, "d2", "second decision");

    assert!(matches!(
        db.storage.propose_link(&d1, &d1, "refines", "loop", None),
        Err(MamaError::InvariantViolated(_))
    ));
    assert!(matches!(
        db.storage
            .propose_link(&d1, "decision_ghost", "refines", "dangling", None),
        Err(MamaError::NotFound(_))
    ));

    db.storage
        .propose_link(&d1, &d2, "refines", "first proposal", None)
        .unwrap();
    assert!(matches!(
        db.storage
            .propose_link(&d1, &d2, "refines", "second proposal", None),
        Err(MamaError::Conflict(_))
    ));
}

#[test]
fn pending_queue_lists_only_unapproved() {
    let db = open_test_db();
    let d1 = seed_decision(&db.storage, "d1", "first decision");
    let d2 = seed_decision(&db.storage, "d2", "second decision");
    let d3 = seed_decision(&db.storage, "d3", "third decision");

    db.storage
        .propose_link(&d1, &d2, "refines", "scope narrowed", None)
        .unwrap();
    db.storage
        .propose_link(&d2, &d3, "precedes", "chronology", None)
        .unwrap();
    db.storage.approve_link(&d1, &d2, "refines").unwrap();

    let pending = db.storage.get_pending_links().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].relationship, "precedes");
    assert!(!pending[0].approved_by_user);
}

#[test]
fn deleting_an_entity_cascades_its_links() {
    let db = open_test_db();
    let d1 = seed_decision(&db.storage, "d1", "first decision");
    let d2 = seed_decision(&db.storage, "d2", "second decision");
    db.storage
        .propose_link(&d1, &d2, "refines", "scope narrowed", None)
        .unwrap();
    db.storage.approve_link(&d1, &d2, "refines").unwrap();

    assert!(db.storage.delete(&d2).unwrap());

    // No dangling edges: traversal from d1 finds nothing
    assert!(db
        .storage
        .expand(&[d1.clone()], &ExpandOptions::depth(3))
        .unwrap()
        .is_empty());
    assert!(db.storage.all_links().unwrap().is_empty());
}

//! Cached expansions never go stale across link mutations.

use mama_core::{ExpandOptions, LinkCategory};
use mama_e2e_tests::harness::{open_test_db, seed_decision};

fn propose_and_approve(db: &mama_e2e_tests::harness::TestDb, from: &str, to: &str, rel: &str) {
    db.storage
        .propose_link(from, to, rel, &format!("{from} {rel} {to}"), None)
        .unwrap();
    db.storage.approve_link(from, to, rel).unwrap();
}

#[test]
fn approving_a_reachable_link_refreshes_cached_expansion() {
    let db = open_test_db();
    let d1 = seed_decision(&db.storage, "d1", "first decision");
    let d2 = seed_decision(&db.storage, "d2", "second decision");
    let d3 = seed_decision(&db.storage, "d3", "third decision");
    propose_and_approve(&db, &d1, &d2, "relates_to");

    // Prime the cache
    let first = db
        .storage
        .expand(&[d1.clone()], &ExpandOptions::depth(2))
        .unwrap();
    assert_eq!(first.len(), 1);

    // d3 becomes reachable from d1 through d2
    propose_and_approve(&db, &d2, &d3, "relates_to");

    let second = db
        .storage
        .expand(&[d1.clone()], &ExpandOptions::depth(2))
        .unwrap();
    assert_eq!(second.len(), 2);
    assert!(second.iter().any(|v| v.id == d3));
}

#[test]
fn rejecting_a_pending_link_does_not_resurrect_cache_staleness() {
    let db = open_test_db();
    let d1 = seed_decision(&db.storage, "d1", "first decision");
    let d2 = seed_decision(&db.storage, "d2", "second decision");
    propose_and_approve(&db, &d1, &d2, "relates_to");

    let d3 = seed_decision(&db.storage, "d3", "third decision");
    db.storage
        .propose_link(&d2, &d3, "relates_to", "maybe related", None)
        .unwrap();

    // Cache primed while d2->d3 is pending
    let visits = db
        .storage
        .expand(&[d1.clone()], &ExpandOptions::depth(2))
        .unwrap();
    assert_eq!(visits.len(), 1);

    // Rejection also invalidates; the result stays correct
    db.storage
        .reject_link(&d2, &d3, "relates_to", "not related")
        .unwrap();
    let visits = db
        .storage
        .expand(&[d1], &ExpandOptions::depth(2))
        .unwrap();
    assert_eq!(visits.len(), 1);
}

#[test]
fn repeated_expansions_are_consistent() {
    let db = open_test_db();
    let d1 = seed_decision(&db.storage, "d1", "first decision");
    let d2 = seed_decision(&db.storage, "d2", "second decision");
    propose_and_approve(&db, &d1, &d2, "refines");

    // Second call is served from cache and must equal the first
    let first = db
        .storage
        .expand(&[d1.clone()], &ExpandOptions::depth(3))
        .unwrap();
    let second = db
        .storage
        .expand(&[d1.clone()], &ExpandOptions::depth(3))
        .unwrap();
    assert_eq!(first.len(), second.len());
    assert_eq!(first[0].id, second[0].id);
    assert_eq!(first[0].depth, second[0].depth);
}

#[test]
fn category_filtered_expansions_cache_independently() {
    let db = open_test_db();
    let d1 = seed_decision(&db.storage, "d1", "first decision");
    let d2 = seed_decision(&db.storage, "d2", "second decision");
    let d3 = seed_decision(&db.storage, "d3", "third decision");
    propose_and_approve(&db, &d1, &d2, "refines"); // evolution
    propose_and_approve(&db, &d1, &d3, "precedes"); // temporal

    let all = db
        .storage
        .expand(&[d1.clone()], &ExpandOptions::depth(1))
        .unwrap();
    assert_eq!(all.len(), 2);

    let evolution_only = db
        .storage
        .expand(
            &[d1.clone()],
            &ExpandOptions {
                categories: Some(vec![LinkCategory::Evolution]),
                ..ExpandOptions::depth(1)
            },
        )
        .unwrap();
    assert_eq!(evolution_only.len(), 1);
    assert_eq!(evolution_only[0].id, d2);

    // The unfiltered cached entry is untouched by the filtered query
    let all_again = db
        .storage
        .expand(&[d1], &ExpandOptions::depth(1))
        .unwrap();
    assert_eq!(all_again.len(), 2);
}

#[test]
fn deleting_an_entity_invalidates_expansions_through_it() {
    let db = open_test_db();
    let d1 = seed_decision(&db.storage, "d1", "first decision");
    let d2 = seed_decision(&db.storage, "d2", "second decision");
    let d3 = seed_decision(&db.storage, "d3", "third decision");
    propose_and_approve(&db, &d1, &d2, "relates_to");
    propose_and_approve(&db, &d2, &d3, "relates_to");

    let before = db
        .storage
        .expand(&[d1.clone()], &ExpandOptions::depth(3))
        .unwrap();
    assert_eq!(before.len(), 2);

    db.storage.delete(&d2).unwrap();

    let after = db
        .storage
        .expand(&[d1], &ExpandOptions::depth(3))
        .unwrap();
    assert!(after.is_empty());
}

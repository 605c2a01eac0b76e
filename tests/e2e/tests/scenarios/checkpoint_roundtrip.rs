//! Checkpoint save → resume round trip with narrative window and links.

use mama_core::{
    ExpandOptions, LoadCheckpointOptions, RestartFailure, RestartMode, RestartStatus,
    SaveCheckpointInput,
};
use mama_e2e_tests::harness::{open_test_db, seed_decision};

#[test]
fn checkpoint_round_trip() {
    let db = open_test_db();
    let decision = seed_decision(&db.storage, "auth_strategy", "Use JWT with refresh tokens");

    let checkpoint = db
        .storage
        .save_checkpoint(SaveCheckpointInput {
            summary: "Implemented JWT in auth.js".into(),
            open_files: vec!["auth.js".into()],
            next_steps: Some("- [ ] load test".into()),
        })
        .unwrap();

    let payload = db
        .storage
        .load_checkpoint(&LoadCheckpointOptions {
            include_narrative: true,
            include_links: true,
            link_depth: 1,
            ..Default::default()
        })
        .unwrap();

    let loaded = payload.checkpoint.unwrap();
    assert_eq!(loaded.id, checkpoint.id);
    assert_eq!(loaded.content, "Implemented JWT in auth.js");
    assert_eq!(loaded.open_files, vec!["auth.js".to_string()]);

    // Narrative contains decisions from the preceding hour
    assert!(payload.narrative.iter().any(|e| e.id == decision));
    // Unfinished tasks parsed out of the markdown task list
    assert_eq!(payload.next_steps.unfinished, vec!["load test".to_string()]);
    assert_eq!(payload.mode, RestartMode::Full);
}

#[test]
fn resume_includes_approved_checkpoint_links() {
    let db = open_test_db();
    let decision = seed_decision(&db.storage, "auth", "Use JWT");
    let checkpoint = db
        .storage
        .save_checkpoint(SaveCheckpointInput {
            summary: "JWT done".into(),
            open_files: vec![],
            next_steps: None,
        })
        .unwrap();
    db.storage
        .propose_link(
            &checkpoint.id,
            &decision,
            "implements",
            "session realized this decision",
            None,
        )
        .unwrap();
    db.storage
        .approve_link(&checkpoint.id, &decision, "implements")
        .unwrap();

    let payload = db
        .storage
        .load_checkpoint(&LoadCheckpointOptions::default())
        .unwrap();
    assert_eq!(payload.links.len(), 1);
    assert_eq!(payload.links[0].id, decision);

    // link_depth clamps to 2 for checkpoint loads
    let payload = db
        .storage
        .load_checkpoint(&LoadCheckpointOptions {
            link_depth: 50,
            ..Default::default()
        })
        .unwrap();
    assert!(payload.links.iter().all(|v| v.depth <= 2));
}

#[test]
fn empty_store_resume_is_benign_and_recorded() {
    let db = open_test_db();

    let payload = db
        .storage
        .load_checkpoint(&LoadCheckpointOptions::default())
        .unwrap();
    assert!(payload.checkpoint.is_none());
    assert!(payload.narrative.is_empty());
    assert!(payload.links.is_empty());
    assert!(payload.next_steps.unfinished.is_empty());

    let metrics = db.storage.get_restart_metrics(10).unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].status, RestartStatus::Failure);
    assert_eq!(metrics[0].failure_reason, Some(RestartFailure::NoCheckpoint));
}

#[test]
fn restart_metrics_record_mode_and_counts() {
    let db = open_test_db();
    seed_decision(&db.storage, "auth", "Use JWT");
    db.storage
        .save_checkpoint(SaveCheckpointInput {
            summary: "done".into(),
            open_files: vec![],
            next_steps: None,
        })
        .unwrap();

    db.storage
        .load_checkpoint(&LoadCheckpointOptions::default())
        .unwrap();
    db.storage
        .load_checkpoint(&LoadCheckpointOptions {
            include_narrative: false,
            include_links: false,
            ..Default::default()
        })
        .unwrap();

    let metrics = db.storage.get_restart_metrics(10).unwrap();
    assert_eq!(metrics.len(), 2);
    // Newest first: the summary load
    assert_eq!(metrics[0].mode, RestartMode::Summary);
    assert_eq!(metrics[0].narrative_count, 0);
    assert_eq!(metrics[1].mode, RestartMode::Full);
    assert_eq!(metrics[1].narrative_count, 1);
    assert!(metrics.iter().all(|m| m.latency_ms >= 0));
}

#[test]
fn checkpoint_expansion_is_depth_limited_in_graph() {
    // A long approved chain hanging off the checkpoint stays bounded
    let db = open_test_db();
    let ids: Vec<String> = (0..5)
        .map(|i| seed_decision(&db.storage, &format!("n{i}"), &format!("decision {i}")))
        .collect();
    let checkpoint = db
        .storage
        .save_checkpoint(SaveCheckpointInput {
            summary: "chained".into(),
            open_files: vec![],
            next_steps: None,
        })
        .unwrap();

    db.storage
        .propose_link(&checkpoint.id, &ids[0], "relates_to", "session context", None)
        .unwrap();
    db.storage
        .approve_link(&checkpoint.id, &ids[0], "relates_to")
        .unwrap();
    for pair in ids.windows(2) {
        db.storage
            .propose_link(&pair[0], &pair[1], "precedes", "chronology", None)
            .unwrap();
        db.storage.approve_link(&pair[0], &pair[1], "precedes").unwrap();
    }

    // Direct expansion at depth 5 sees the whole chain
    let full = db
        .storage
        .expand(&[checkpoint.id.clone()], &ExpandOptions::depth(5))
        .unwrap();
    assert_eq!(full.len(), 5);

    // The resume payload clamps to depth 2
    let payload = db
        .storage
        .load_checkpoint(&LoadCheckpointOptions {
            link_depth: 5,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(payload.links.len(), 2);
}

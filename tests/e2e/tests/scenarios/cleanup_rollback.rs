//! Cleanup requires a fresh backup and supports checksummed rollback.

use mama_core::{AuditAction, CleanupRun, CleanupStatus, Deadline, MamaError};
use mama_e2e_tests::harness::{open_test_db, seed_auto_link, seed_decision, seed_protected_link};

/// Seed 15 legacy auto-links and 5 protected links around a hub decision.
fn seed_cleanup_fixture(db: &mama_e2e_tests::harness::TestDb) {
    let hub = seed_decision(&db.storage, "hub", "hub decision");
    for i in 0..15 {
        let spoke = seed_decision(&db.storage, &format!("auto_{i}"), "auto spoke");
        seed_auto_link(&db.storage, &hub, &spoke, "relates_to");
    }
    for i in 0..5 {
        let spoke = seed_decision(&db.storage, &format!("kept_{i}"), "kept spoke");
        seed_protected_link(&db.storage, &hub, &spoke, "refines");
    }
}

#[test]
fn cleanup_requires_backup_then_validates_success() {
    let db = open_test_db();
    seed_cleanup_fixture(&db);
    let backup_dir = db.dir.path().join("backups");

    // Execution without a recent backup is refused
    let result = db
        .storage
        .execute_cleanup(10, false, Some(&backup_dir), &Deadline::none());
    assert!(matches!(result, Err(MamaError::NoRecentBackup(_))));

    // Scan, back up the targets, then execute
    let scan = db.storage.scan_auto_links().unwrap();
    assert_eq!(scan.auto_count, 15);
    assert_eq!(scan.protected_count, 5);

    db.storage
        .create_link_backup(&scan.targets, Some(&backup_dir))
        .unwrap();

    match db
        .storage
        .execute_cleanup(10, false, Some(&backup_dir), &Deadline::none())
        .unwrap()
    {
        CleanupRun::Executed {
            deleted,
            failed,
            success_rate,
            batches_processed,
        } => {
            assert_eq!(deleted, 15);
            assert_eq!(failed, 0);
            assert!((success_rate - 1.0).abs() < 1e-9);
            assert_eq!(batches_processed, 2);
        }
        other => panic!("expected executed cleanup, got {other:?}"),
    }

    // No auto-links remain; the deprecated audit count equals the deletions
    let after = db.storage.scan_auto_links().unwrap();
    assert_eq!(after.auto_count, 0);
    assert_eq!(after.total, 5);
    let deprecated = db
        .storage
        .get_audit_log(1000)
        .unwrap()
        .into_iter()
        .filter(|e| e.action == AuditAction::Deprecated)
        .count();
    assert_eq!(deprecated, 15);

    let validation = db.storage.validate_cleanup(Some(&backup_dir)).unwrap();
    assert_eq!(validation.status, CleanupStatus::Success);
}

#[test]
fn corrupted_backup_is_detected_intact_backup_restores() {
    let db = open_test_db();
    seed_cleanup_fixture(&db);
    let backup_dir = db.dir.path().join("backups");

    let scan = db.storage.scan_auto_links().unwrap();
    let info = db
        .storage
        .create_link_backup(&scan.targets, Some(&backup_dir))
        .unwrap();
    db.storage
        .execute_cleanup(10, false, Some(&backup_dir), &Deadline::none())
        .unwrap();

    // Corrupt one byte of the backup file
    let pristine = std::fs::read(&info.file).unwrap();
    let mut corrupted = pristine.clone();
    corrupted[0] ^= 0x01;
    std::fs::write(&info.file, &corrupted).unwrap();

    assert!(matches!(
        db.storage.restore_backup(&info.file),
        Err(MamaError::ChecksumMismatch { .. })
    ));
    // Nothing was restored from the corrupted file
    assert_eq!(db.storage.scan_auto_links().unwrap().auto_count, 0);

    // The intact backup restores all 15 links
    std::fs::write(&info.file, &pristine).unwrap();
    let outcome = db.storage.restore_backup(&info.file).unwrap();
    assert_eq!(outcome.total, 15);
    assert_eq!(outcome.restored, 15);
    assert_eq!(outcome.failed, 0);
    assert_eq!(db.storage.scan_auto_links().unwrap().auto_count, 15);
}

#[test]
fn backup_restore_round_trip_preserves_link_fields() {
    let db = open_test_db();
    let hub = seed_decision(&db.storage, "hub", "hub decision");
    let spoke = seed_decision(&db.storage, "spoke", "spoke decision");
    seed_auto_link(&db.storage, &hub, &spoke, "relates_to");

    let before = db.storage.all_links().unwrap();
    let backup_dir = db.dir.path().join("backups");
    let info = db
        .storage
        .create_link_backup(&before, Some(&backup_dir))
        .unwrap();

    db.storage.deprecate_auto_links(false).unwrap();
    assert!(db.storage.all_links().unwrap().is_empty());

    db.storage.restore_backup(&info.file).unwrap();
    let after = db.storage.all_links().unwrap();
    assert_eq!(after.len(), before.len());
    let (a, b) = (&before[0], &after[0]);
    assert_eq!(a.from_id, b.from_id);
    assert_eq!(a.to_id, b.to_id);
    assert_eq!(a.relationship, b.relationship);
    assert_eq!(a.reason, b.reason);
    assert_eq!(a.created_by, b.created_by);
    assert_eq!(a.approved_by_user, b.approved_by_user);
    assert_eq!(a.decision_id, b.decision_id);
    assert_eq!(a.created_at, b.created_at);
}

#[test]
fn dry_run_previews_without_mutating() {
    let db = open_test_db();
    seed_cleanup_fixture(&db);
    let backup_dir = db.dir.path().join("backups");

    // Dry-run works without any backup present
    match db
        .storage
        .execute_cleanup(4, true, Some(&backup_dir), &Deadline::none())
        .unwrap()
    {
        CleanupRun::DryRun {
            would_delete,
            batches,
            large_deletion_warning,
        } => {
            assert_eq!(would_delete, 15);
            assert_eq!(batches, 4);
            assert!(!large_deletion_warning);
        }
        other => panic!("expected dry run, got {other:?}"),
    }
    assert_eq!(db.storage.scan_auto_links().unwrap().auto_count, 15);
    assert!(db.storage.get_audit_log(1000).unwrap().is_empty());
}

#[test]
fn restore_counts_duplicates_as_failed() {
    let db = open_test_db();
    let hub = seed_decision(&db.storage, "hub", "hub decision");
    let spoke = seed_decision(&db.storage, "spoke", "spoke decision");
    seed_auto_link(&db.storage, &hub, &spoke, "relates_to");

    let backup_dir = db.dir.path().join("backups");
    let links = db.storage.all_links().unwrap();
    let info = db
        .storage
        .create_link_backup(&links, Some(&backup_dir))
        .unwrap();

    // Restoring over live rows: the duplicate is a point failure, not an abort
    let outcome = db.storage.restore_backup(&info.file).unwrap();
    assert_eq!(outcome.total, 1);
    assert_eq!(outcome.restored, 0);
    assert_eq!(outcome.failed, 1);
    assert_eq!(db.storage.all_links().unwrap().len(), 1);
}

//! Coverage, quality, and restart reporting over a worked store.

use mama_core::{
    EntityDraft, LoadCheckpointOptions, MetricsPeriod, ReportFormat, ReportThresholds,
    SaveCheckpointInput,
};
use mama_e2e_tests::harness::{open_test_db, seed_decision};

fn complete_decision(topic: &str) -> EntityDraft {
    let mut draft = EntityDraft::decision(
        topic,
        format!("decision about {topic}"),
        "benchmarks made the tradeoff clear",
    );
    draft.evidence = vec!["bench/report.txt:42".into()];
    draft.alternatives = vec!["keep the status quo".into()];
    draft.risks = Some("operational complexity".into());
    draft
}

#[test]
fn report_reflects_store_state() {
    let db = open_test_db();

    // One complete + linked decision, one bare decision
    let a = db.storage.insert(complete_decision("caching")).unwrap();
    let b = seed_decision(&db.storage, "bare", "undocumented decision");
    db.storage
        .propose_link(
            &a.id,
            &b,
            "refines",
            "the caching decision superseded the quick hack we shipped first",
            None,
        )
        .unwrap();
    db.storage.approve_link(&a.id, &b, "refines").unwrap();

    let report = db.storage.quality_report(MetricsPeriod::Week, None).unwrap();
    assert_eq!(report.coverage.decisions, 2);
    assert_eq!(report.coverage.complete, 1);
    assert!((report.coverage.narrative_coverage - 0.5).abs() < 1e-9);
    assert!((report.coverage.link_coverage - 1.0).abs() < 1e-9);
    assert_eq!(report.quality.total_links, 1);
    assert!((report.quality.rich_reason_ratio - 1.0).abs() < 1e-9);
    assert!((report.quality.approved_ratio - 1.0).abs() < 1e-9);

    // Narrative coverage (50%) is under the 80% default threshold
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.contains("Narrative coverage")));
}

#[test]
fn restart_block_separates_modes() {
    let db = open_test_db();
    db.storage
        .save_checkpoint(SaveCheckpointInput {
            summary: "session end".into(),
            open_files: vec![],
            next_steps: None,
        })
        .unwrap();

    for _ in 0..3 {
        db.storage
            .load_checkpoint(&LoadCheckpointOptions::default())
            .unwrap();
    }
    db.storage
        .load_checkpoint(&LoadCheckpointOptions {
            include_narrative: false,
            include_links: false,
            ..Default::default()
        })
        .unwrap();

    let stats = db.storage.restart_stats(MetricsPeriod::Day).unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.successes, 4);
    assert!((stats.success_rate - 1.0).abs() < 1e-9);
    assert!(stats.full.p95_ms.is_some());
    assert!(stats.summary.p50_ms.is_some());
    // At 100% success there is no restart recommendation
    let report = db.storage.quality_report(MetricsPeriod::Day, None).unwrap();
    assert!(!report
        .recommendations
        .iter()
        .any(|r| r.contains("Restart success rate")));
}

#[test]
fn failed_restarts_drag_the_success_rate() {
    let db = open_test_db();
    // Two misses against an empty store
    for _ in 0..2 {
        db.storage
            .load_checkpoint(&LoadCheckpointOptions::default())
            .unwrap();
    }

    let stats = db.storage.restart_stats(MetricsPeriod::Day).unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.failures, 2);
    assert!((stats.success_rate - 0.0).abs() < 1e-9);

    let report = db.storage.quality_report(MetricsPeriod::Day, None).unwrap();
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.contains("Restart success rate")));
}

#[test]
fn report_renders_as_json_and_markdown() {
    let db = open_test_db();
    db.storage.insert(complete_decision("caching")).unwrap();

    let json = db
        .storage
        .generate_quality_report(ReportFormat::Json, MetricsPeriod::Week, None)
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(parsed["coverage"]["narrativeCoverage"].is_number());
    assert!(parsed["restart"]["successRate"].is_number());

    let markdown = db
        .storage
        .generate_quality_report(ReportFormat::Markdown, MetricsPeriod::Week, None)
        .unwrap();
    assert!(markdown.contains("## Coverage"));
    assert!(markdown.contains("## Restart"));
}

#[test]
fn custom_thresholds_silence_recommendations() {
    let db = open_test_db();
    seed_decision(&db.storage, "bare", "undocumented decision");

    let thresholds = ReportThresholds {
        narrative_coverage: 0.0,
        link_coverage: 0.0,
        link_quality: 0.0,
        restart_success: 0.0,
        ..Default::default()
    };
    let report = db
        .storage
        .quality_report(MetricsPeriod::Month, Some(thresholds))
        .unwrap();
    assert!(report.recommendations.is_empty());
}

#[test]
fn stats_surface_matches_store() {
    let db = open_test_db();
    let a = db.storage.insert(complete_decision("caching")).unwrap();
    let b = seed_decision(&db.storage, "other", "second decision");
    db.storage
        .propose_link(&a.id, &b, "relates_to", "same subsystem", None)
        .unwrap();

    let stats = db.storage.get_stats().unwrap();
    assert_eq!(stats.total_entities, 2);
    assert_eq!(stats.decisions, 2);
    assert_eq!(stats.total_links, 1);
    assert_eq!(stats.pending_links, 1);
    assert_eq!(stats.approved_links, 0);
    assert_eq!(stats.audit_entries, 1);
}

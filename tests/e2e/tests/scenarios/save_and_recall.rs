//! Save a decision, recall it by topic and semantics, update its outcome.

use mama_core::{EntityDraft, EntityType, MamaError, Outcome, SearchOptions};
use mama_e2e_tests::harness::open_test_db;

#[test]
fn save_and_recall_a_decision() {
    let db = open_test_db();

    let mut draft = EntityDraft::decision(
        "auth_strategy",
        "Use JWT with refresh tokens",
        "stateless auth",
    );
    draft.confidence = Some(0.9);
    let decision = db.storage.insert(draft).unwrap();
    assert_eq!(decision.entity_type, EntityType::Decision);
    assert_eq!(decision.confidence, Some(0.9));

    // Topic search: exact, case-sensitive, returns the decision
    let by_topic = db.storage.search_by_topic("auth_strategy").unwrap();
    assert_eq!(by_topic.len(), 1);
    assert_eq!(by_topic[0].id, decision.id);

    // Outcome update without the required failure_reason is a validation error
    let err = db
        .storage
        .update_outcome(&decision.id, "failed", None, None)
        .unwrap_err();
    assert!(matches!(err, MamaError::Validation { .. }));

    let updated = db
        .storage
        .update_outcome(
            &decision.id,
            "failed",
            Some("DB bottleneck at 10K rps"),
            None,
        )
        .unwrap();
    assert_eq!(updated.outcome, Some(Outcome::Failed));
    assert_eq!(
        updated.failure_reason.as_deref(),
        Some("DB bottleneck at 10K rps")
    );
}

#[test]
fn outcome_accepts_any_case_and_hints_on_typos() {
    let db = open_test_db();
    let decision = db
        .storage
        .insert(EntityDraft::decision("auth", "Use JWT", "stateless"))
        .unwrap();

    // Mixed case canonicalizes
    let updated = db
        .storage
        .update_outcome(&decision.id, "Success", None, None)
        .unwrap();
    assert_eq!(updated.outcome, Some(Outcome::Success));

    // A near-miss gets a repair suggestion
    let err = db
        .storage
        .update_outcome(&decision.id, "Succes", None, None)
        .unwrap_err();
    assert!(err.to_string().contains("Did you mean SUCCESS?"));

    // The typo did not clobber the stored outcome
    assert_eq!(
        db.storage.get(&decision.id).unwrap().outcome,
        Some(Outcome::Success)
    );
}

#[test]
fn semantic_search_ranks_by_score_and_keeps_similarity() {
    let db = open_test_db();
    db.storage
        .insert(EntityDraft::decision(
            "auth_strategy",
            "Use JWT with refresh tokens for stateless authentication",
            "horizontal scaling",
        ))
        .unwrap();
    db.storage
        .insert(EntityDraft::decision(
            "retention",
            "Prune restart metrics after ninety days",
            "bounded storage growth",
        ))
        .unwrap();

    let options = SearchOptions {
        threshold: 0.0,
        ..Default::default()
    };
    let hits = db
        .storage
        .search("jwt refresh tokens authentication", &options)
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits[0].entity.topic.as_deref() == Some("auth_strategy"));

    // Scores are monotonically non-increasing in returned order
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for hit in &hits {
        assert!(hit.similarity <= 1.0 + 1e-5);
    }
}

#[test]
fn stored_embeddings_are_unit_normalized() {
    let db = open_test_db();
    let decision = db
        .storage
        .insert(EntityDraft::decision("auth", "Use JWT", "stateless"))
        .unwrap();
    assert!(decision.has_embedding);

    let embedding = db.storage.get_embedding(&decision.id).unwrap().unwrap();
    let norm: f32 = embedding.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}

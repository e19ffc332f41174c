use crate::api::{Nexus, NexusConfig};
use crate::index::RecordDraft;
use crate::linker::ReviewDecision;
use crate::rules::{AutoLinkCondition, ConditionOperator, RecordLinkRule};
use crate::storage::SuggestionFilter;
use crate::types::{LinkType, SuggestionStatus};
use crate::NexusError;
use serde_json::json;
use std::sync::atomic::AtomicBool;
use tempfile::TempDir;

fn open_nexus() -> (Nexus, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nexus_test.redb");
    (Nexus::open(&db_path, NexusConfig::default()).unwrap(), temp_dir)
}

fn vendor_number_rule() -> RecordLinkRule {
    RecordLinkRule::new(
        "vendor-number-match",
        "vendors",
        "tasks",
        LinkType::new("related_to").unwrap(),
    )
    .with_condition(AutoLinkCondition::new(
        "vendorNumber",
        ConditionOperator::Equals,
        1.0,
    ))
    .with_threshold(0.8)
}

fn index_vendor_and_task(nexus: &Nexus, vendor_no: &str, task_vendor_no: &str) {
    nexus
        .index_record(
            RecordDraft::new("vendors", "V-1")
                .with_title("Acme Industrial")
                .with_field("vendorNumber", json!(vendor_no)),
        )
        .unwrap();
    nexus
        .index_record(
            RecordDraft::new("tasks", "T-1")
                .with_title("Renew contract")
                .with_field("vendorNumber", json!(task_vendor_no)),
        )
        .unwrap();
}

#[test]
fn test_matching_pair_produces_suggestion_and_link() {
    let (nexus, _temp) = open_nexus();
    nexus.create_rule(vendor_number_rule()).unwrap();
    index_vendor_and_task(&nexus, "V-1001", "V-1001");

    let metrics = nexus.scan().unwrap();
    assert_eq!(metrics.suggestions_created, 1);

    let suggestions = nexus.list_suggestions("vendors/V-1").unwrap();
    assert_eq!(suggestions.len(), 1);
    let suggestion = &suggestions[0];
    assert_eq!(suggestion.confidence, 1.0);
    assert_eq!(suggestion.evidence.len(), 1);
    assert_eq!(suggestion.evidence[0].strength, 1.0);
    assert_eq!(suggestion.status, SuggestionStatus::Pending);

    let link = nexus
        .resolve_suggestion(suggestion.id, ReviewDecision::Accept, "reviewer", None)
        .unwrap()
        .unwrap();
    assert_eq!(link.link_type, suggestion.link_type);
    assert!(link.automatically_created);
    assert_eq!(link.confidence, Some(1.0));

    // Exactly one active link with the suggestion's key.
    let links = nexus.list_links("vendors/V-1", Some("related_to")).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].target_record_id, "tasks/T-1");

    let stored = nexus.suggestion(suggestion.id).unwrap().unwrap();
    assert_eq!(stored.status, SuggestionStatus::Accepted);
    assert_eq!(stored.reviewed_by.as_deref(), Some("reviewer"));
}

#[test]
fn test_non_matching_pair_produces_nothing() {
    let (nexus, _temp) = open_nexus();
    nexus.create_rule(vendor_number_rule()).unwrap();
    index_vendor_and_task(&nexus, "V-1001", "V-2002");

    let metrics = nexus.scan().unwrap();
    assert_eq!(metrics.suggestions_created, 0);
    assert!(nexus.list_suggestions("vendors/V-1").unwrap().is_empty());
}

#[test]
fn test_scan_is_idempotent() {
    let (nexus, _temp) = open_nexus();
    nexus.create_rule(vendor_number_rule()).unwrap();
    index_vendor_and_task(&nexus, "V-1001", "V-1001");

    nexus.scan().unwrap();
    let after_first = nexus.list_suggestions("vendors/V-1").unwrap();
    assert_eq!(after_first.len(), 1);
    let evidence_before = after_first[0].evidence.clone();

    // Unchanged index: second scan creates nothing and duplicates no
    // evidence.
    let metrics = nexus.scan().unwrap();
    assert_eq!(metrics.suggestions_created, 0);
    assert_eq!(metrics.suggestions_updated, 1);

    let after_second = nexus.list_suggestions("vendors/V-1").unwrap();
    assert_eq!(after_second.len(), 1);
    assert_eq!(after_second[0].id, after_first[0].id);
    assert_eq!(after_second[0].evidence, evidence_before);
}

#[test]
fn test_materially_changed_evidence_supersedes() {
    let (nexus, _temp) = open_nexus();

    // Two conditions so evidence can gain an item on re-scan.
    let rule = RecordLinkRule::new(
        "vendor-and-city",
        "vendors",
        "tasks",
        LinkType::new("related_to").unwrap(),
    )
    .with_condition(AutoLinkCondition::new(
        "vendorNumber",
        ConditionOperator::Equals,
        1.0,
    ))
    .with_condition(AutoLinkCondition::new(
        "city",
        ConditionOperator::Equals,
        1.0,
    ))
    .with_threshold(0.4);
    nexus.create_rule(rule).unwrap();

    nexus
        .index_record(
            RecordDraft::new("vendors", "V-1")
                .with_field("vendorNumber", json!("V-1001"))
                .with_field("city", json!("Leeds")),
        )
        .unwrap();
    nexus
        .index_record(
            RecordDraft::new("tasks", "T-1")
                .with_field("vendorNumber", json!("V-1001"))
                .with_field("city", json!("York")),
        )
        .unwrap();

    nexus.scan().unwrap();
    let first = nexus.list_suggestions("vendors/V-1").unwrap();
    assert_eq!(first.len(), 1);
    let s1 = first[0].clone();
    assert_eq!(s1.evidence.len(), 1);

    // Target's city now matches: a new evidence item appears, which is
    // a material change.
    nexus
        .index_record(
            RecordDraft::new("tasks", "T-1")
                .with_field("vendorNumber", json!("V-1001"))
                .with_field("city", json!("Leeds")),
        )
        .unwrap();

    let metrics = nexus.scan().unwrap();
    assert_eq!(metrics.suggestions_superseded, 1);

    let s1_after = nexus.suggestion(s1.id).unwrap().unwrap();
    assert_eq!(s1_after.status, SuggestionStatus::Superseded);

    let pending = nexus.list_suggestions("vendors/V-1").unwrap();
    assert_eq!(pending.len(), 1);
    let s2 = &pending[0];
    assert_ne!(s2.id, s1.id);
    assert_eq!(s2.evidence.len(), 2);
    assert_eq!(s2.confidence, 1.0);
}

#[test]
fn test_concurrent_manual_link_conflicts_acceptance() {
    let (nexus, _temp) = open_nexus();
    nexus.create_rule(vendor_number_rule()).unwrap();
    index_vendor_and_task(&nexus, "V-1001", "V-1001");

    nexus.scan().unwrap();
    let suggestion = nexus.list_suggestions("vendors/V-1").unwrap().remove(0);

    // Another process takes the key before acceptance commits.
    nexus
        .link(
            "vendors",
            "V-1",
            "tasks",
            "T-1",
            LinkType::new("related_to").unwrap(),
            "general",
            false,
            "someone-else",
        )
        .unwrap();

    let err = nexus.resolve_suggestion(suggestion.id, ReviewDecision::Accept, "reviewer", None);
    assert!(matches!(err, Err(NexusError::Conflict { .. })));

    // Losing suggestion is superseded, not accepted.
    let after = nexus.suggestion(suggestion.id).unwrap().unwrap();
    assert_eq!(after.status, SuggestionStatus::Superseded);

    // The manual link is the only active one.
    let links = nexus.list_links("vendors/V-1", Some("related_to")).unwrap();
    assert_eq!(links.len(), 1);
    assert!(!links[0].automatically_created);
}

#[test]
fn test_rejected_suggestion_not_regenerated_within_cooldown() {
    let (nexus, _temp) = open_nexus();
    nexus.create_rule(vendor_number_rule()).unwrap();
    index_vendor_and_task(&nexus, "V-1001", "V-1001");

    nexus.scan().unwrap();
    let suggestion = nexus.list_suggestions("vendors/V-1").unwrap().remove(0);

    nexus
        .resolve_suggestion(
            suggestion.id,
            ReviewDecision::Reject,
            "reviewer",
            Some("not actually related".into()),
        )
        .unwrap();

    let rejected = nexus.suggestion(suggestion.id).unwrap().unwrap();
    assert_eq!(rejected.status, SuggestionStatus::Rejected);
    let feedback = rejected.feedback.unwrap();
    assert!(!feedback.helpful);
    assert_eq!(feedback.comment.as_deref(), Some("not actually related"));

    // Identical evidence within the cool-down window: no regeneration.
    let metrics = nexus.scan().unwrap();
    assert_eq!(metrics.suggestions_created, 0);
    assert_eq!(metrics.suggestions_skipped_cooldown, 1);
    assert!(nexus.list_suggestions("vendors/V-1").unwrap().is_empty());
}

#[test]
fn test_accepted_pair_skipped_by_later_scans() {
    let (nexus, _temp) = open_nexus();
    nexus.create_rule(vendor_number_rule()).unwrap();
    index_vendor_and_task(&nexus, "V-1001", "V-1001");

    nexus.scan().unwrap();
    let suggestion = nexus.list_suggestions("vendors/V-1").unwrap().remove(0);
    nexus
        .resolve_suggestion(suggestion.id, ReviewDecision::Accept, "reviewer", None)
        .unwrap();

    let metrics = nexus.scan().unwrap();
    assert_eq!(metrics.suggestions_created, 0);
    // The pair is covered by an active link and never scored.
    assert_eq!(metrics.pairs_scored, 0);
}

#[test]
fn test_max_suggestions_keeps_highest_confidence() {
    let (nexus, _temp) = open_nexus();

    let rule = RecordLinkRule::new(
        "title-similarity",
        "vendors",
        "tasks",
        LinkType::new("related_to").unwrap(),
    )
    .with_condition(AutoLinkCondition::new(
        "title",
        ConditionOperator::SimilarTo,
        1.0,
    ))
    .with_threshold(0.5)
    .with_max_suggestions(1);
    nexus.create_rule(rule).unwrap();

    nexus
        .index_record(RecordDraft::new("vendors", "V-1").with_title("Acme Industrial"))
        .unwrap();
    nexus
        .index_record(RecordDraft::new("tasks", "T-1").with_title("Acme Industrial"))
        .unwrap();
    nexus
        .index_record(RecordDraft::new("tasks", "T-2").with_title("Acme Industries"))
        .unwrap();

    let metrics = nexus.scan().unwrap();
    assert_eq!(metrics.suggestions_created, 1);
    assert_eq!(metrics.suggestions_capped, 1);

    // The exact-title pair won.
    let pending = nexus.list_suggestions("vendors/V-1").unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].target_record_id, "tasks/T-1");
    assert_eq!(pending[0].confidence, 1.0);
}

#[test]
fn test_remove_record_expires_pending_suggestions() {
    let (nexus, _temp) = open_nexus();
    nexus.create_rule(vendor_number_rule()).unwrap();
    index_vendor_and_task(&nexus, "V-1001", "V-1001");

    nexus.scan().unwrap();
    let suggestion = nexus.list_suggestions("vendors/V-1").unwrap().remove(0);

    let expired = nexus.remove_record("tasks", "T-1").unwrap();
    assert_eq!(expired, 1);

    let after = nexus.suggestion(suggestion.id).unwrap().unwrap();
    assert_eq!(after.status, SuggestionStatus::Expired);
}

#[test]
fn test_bidirectional_link_visible_from_both_sides() {
    let (nexus, _temp) = open_nexus();
    nexus
        .index_record(RecordDraft::new("vendors", "V-1"))
        .unwrap();
    nexus
        .index_record(RecordDraft::new("tasks", "T-1"))
        .unwrap();

    let link = nexus
        .link(
            "vendors",
            "V-1",
            "tasks",
            "T-1",
            LinkType::new("partner_of").unwrap(),
            "organisational",
            true,
            "operator",
        )
        .unwrap();

    let from_source = nexus.list_links("vendors/V-1", None).unwrap();
    let from_target = nexus.list_links("tasks/T-1", None).unwrap();
    assert_eq!(from_source.len(), 1);
    assert_eq!(from_target.len(), 1);
    assert_eq!(from_source[0].id, link.id);
    assert_eq!(from_target[0].id, link.id);
}

#[test]
fn test_duplicate_manual_link_rejected() {
    let (nexus, _temp) = open_nexus();
    nexus
        .index_record(RecordDraft::new("vendors", "V-1"))
        .unwrap();
    nexus
        .index_record(RecordDraft::new("tasks", "T-1"))
        .unwrap();

    nexus
        .link(
            "vendors", "V-1", "tasks", "T-1",
            LinkType::new("related_to").unwrap(),
            "general", false, "operator",
        )
        .unwrap();

    let err = nexus.link(
        "vendors", "V-1", "tasks", "T-1",
        LinkType::new("related_to").unwrap(),
        "general", false, "operator",
    );
    assert!(matches!(err, Err(NexusError::DuplicateLink { .. })));
}

#[test]
fn test_rule_usage_statistics_track_outcomes() {
    let (nexus, _temp) = open_nexus();
    let rule_id = nexus.create_rule(vendor_number_rule()).unwrap();
    index_vendor_and_task(&nexus, "V-1001", "V-1001");

    nexus.scan().unwrap();
    let usage = nexus.rule(rule_id).unwrap().unwrap().usage;
    assert_eq!(usage.execution_count, 1);
    assert!(usage.last_executed.is_some());
    assert!((usage.average_confidence - 1.0).abs() < 1e-6);

    let suggestion = nexus.list_suggestions("vendors/V-1").unwrap().remove(0);
    nexus
        .resolve_suggestion(suggestion.id, ReviewDecision::Accept, "reviewer", None)
        .unwrap();

    let usage = nexus.rule(rule_id).unwrap().unwrap().usage;
    assert_eq!(usage.successful_links, 1);

    nexus.reset_rule_usage(rule_id).unwrap();
    let usage = nexus.rule(rule_id).unwrap().unwrap().usage;
    assert_eq!(usage.execution_count, 0);
    assert_eq!(usage.successful_links, 0);
}

#[test]
fn test_disabled_rule_not_scanned() {
    let (nexus, _temp) = open_nexus();
    let rule_id = nexus.create_rule(vendor_number_rule()).unwrap();
    index_vendor_and_task(&nexus, "V-1001", "V-1001");

    nexus.disable_rule(rule_id).unwrap();
    let metrics = nexus.scan().unwrap();
    assert_eq!(metrics.rules_evaluated, 0);
    assert_eq!(metrics.suggestions_created, 0);
}

#[test]
fn test_rule_admin_validation() {
    let (nexus, _temp) = open_nexus();

    let bad = vendor_number_rule().with_threshold(2.0);
    assert!(nexus.create_rule(bad).is_err());

    let rule_id = nexus.create_rule(vendor_number_rule()).unwrap();

    // Updates preserve usage and validate too.
    let mut updated = nexus.rule(rule_id).unwrap().unwrap();
    updated.confidence_threshold = 1.5;
    assert!(nexus.update_rule(updated).is_err());
}

#[test]
fn test_cancelled_scan_keeps_existing_suggestions() {
    let (nexus, _temp) = open_nexus();
    nexus.create_rule(vendor_number_rule()).unwrap();
    index_vendor_and_task(&nexus, "V-1001", "V-1001");

    nexus.scan().unwrap();
    assert_eq!(nexus.list_suggestions("vendors/V-1").unwrap().len(), 1);

    // A pre-cancelled scan does no pair work and leaves prior
    // suggestions intact.
    let cancel = AtomicBool::new(true);
    let metrics = nexus.scan_cancellable(&cancel).unwrap();
    assert!(metrics.cancelled);
    assert_eq!(metrics.pairs_scored, 0);
    assert_eq!(nexus.list_suggestions("vendors/V-1").unwrap().len(), 1);
}

#[test]
fn test_unlink_frees_key_for_rescan() {
    let (nexus, _temp) = open_nexus();
    nexus.create_rule(vendor_number_rule()).unwrap();
    index_vendor_and_task(&nexus, "V-1001", "V-1001");

    nexus.scan().unwrap();
    let suggestion = nexus.list_suggestions("vendors/V-1").unwrap().remove(0);
    let link = nexus
        .resolve_suggestion(suggestion.id, ReviewDecision::Accept, "reviewer", None)
        .unwrap()
        .unwrap();

    nexus.unlink(link.id).unwrap();
    assert!(nexus.list_links("vendors/V-1", None).unwrap().is_empty());

    // The pair is fair game again.
    let metrics = nexus.scan().unwrap();
    assert_eq!(metrics.suggestions_created, 1);
}

#[test]
fn test_suggestion_filter_by_status() {
    let (nexus, _temp) = open_nexus();
    nexus.create_rule(vendor_number_rule()).unwrap();
    index_vendor_and_task(&nexus, "V-1001", "V-1001");

    nexus.scan().unwrap();
    let suggestion = nexus.list_suggestions("vendors/V-1").unwrap().remove(0);
    nexus
        .resolve_suggestion(suggestion.id, ReviewDecision::Accept, "reviewer", None)
        .unwrap();

    let accepted = nexus
        .list_suggestions_filtered(
            SuggestionFilter::new().with_status(SuggestionStatus::Accepted),
        )
        .unwrap();
    assert_eq!(accepted.len(), 1);
    assert!(nexus.list_suggestions("vendors/V-1").unwrap().is_empty());
}

mod properties {
    use super::*;
    use crate::matcher::MatcherRegistry;
    use crate::scorer;
    use crate::RecordIndex;
    use proptest::prelude::*;

    proptest! {
        /// Confidence stays in [0,1] for arbitrary weights and field
        /// agreement, and all-zero weights always yield 0.
        #[test]
        fn confidence_bounded(
            conditions in prop::collection::vec((0.0f32..10.0, any::<bool>()), 1..8)
        ) {
            let index = RecordIndex::new();
            let mut source = RecordDraft::new("a", "1");
            let mut target = RecordDraft::new("b", "2");
            for (i, (_, matches)) in conditions.iter().enumerate() {
                let field = format!("f{}", i);
                source = source.with_field(&field, json!("left"));
                target = target.with_field(&field, json!(if *matches { "left" } else { "right" }));
            }
            let source = index.upsert(source).unwrap();
            let target = index.upsert(target).unwrap();

            let mut rule = RecordLinkRule::new(
                "prop", "a", "b", LinkType::new("related_to").unwrap(),
            );
            for (i, (weight, _)) in conditions.iter().enumerate() {
                rule = rule.with_condition(AutoLinkCondition::new(
                    format!("f{}", i),
                    ConditionOperator::Equals,
                    *weight,
                ));
            }

            let outcome = scorer::score(&rule, &source, &target, &MatcherRegistry::new());
            prop_assert!((0.0..=1.0).contains(&outcome.confidence));

            if conditions.iter().all(|(w, _)| *w == 0.0) {
                prop_assert_eq!(outcome.confidence, 0.0);
                prop_assert!(outcome.misconfigured);
            }

            // Evidence strengths are bounded too, one item per
            // contributing condition at most.
            prop_assert!(outcome.evidence.len() <= conditions.len());
            for item in &outcome.evidence {
                prop_assert!((0.0..=1.0).contains(&item.strength));
            }
        }
    }
}

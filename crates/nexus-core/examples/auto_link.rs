//! Example: Rule-driven link suggestions
//!
//! Run with: cargo run --example auto_link

use nexus_core::{
    AutoLinkCondition, ConditionOperator, LinkType, Nexus, NexusConfig, RecordDraft,
    RecordLinkRule, ReviewDecision,
};
use serde_json::json;
use tempfile::TempDir;

fn main() {
    // Initialize logging
    env_logger::init();

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("auto_link_demo.redb");
    let nexus = Nexus::open(&db_path, NexusConfig::default()).unwrap();

    println!("🔗 Nexus Auto-Link Demo\n");

    // One matching policy: vendors and invoices that share a vendor
    // number, with a graded title comparison as a tiebreaker.
    println!("Creating rule...");
    let rule = RecordLinkRule::new(
        "vendor-invoice",
        "vendors",
        "invoices",
        LinkType::new("billed_by").unwrap(),
    )
    .with_condition(AutoLinkCondition::new(
        "vendorNumber",
        ConditionOperator::Equals,
        3.0,
    ))
    .with_condition(AutoLinkCondition::new(
        "title",
        ConditionOperator::SimilarTo,
        1.0,
    ))
    .with_threshold(0.7)
    .with_category("financial");
    let rule_id = nexus.create_rule(rule).unwrap();

    println!("Indexing records...");
    nexus
        .index_record(
            RecordDraft::new("vendors", "V-1")
                .with_title("Acme Industrial")
                .with_field("vendorNumber", json!("V-1001")),
        )
        .unwrap();
    nexus
        .index_record(
            RecordDraft::new("invoices", "INV-443")
                .with_title("Acme Industrial (March)")
                .with_field("vendorNumber", json!("V-1001")),
        )
        .unwrap();
    nexus
        .index_record(
            RecordDraft::new("invoices", "INV-512")
                .with_title("Widget Supply (March)")
                .with_field("vendorNumber", json!("V-2002")),
        )
        .unwrap();

    println!("Scanning...\n");
    let metrics = nexus.scan().unwrap();
    println!("{}\n", metrics.summary());

    for suggestion in nexus.list_suggestions("vendors/V-1").unwrap() {
        println!(
            "Suggestion: {} -> {} ({:.2} confidence)",
            suggestion.source_record_id, suggestion.target_record_id, suggestion.confidence
        );
        for item in &suggestion.evidence {
            println!("  evidence: {} ({:.2})", item.description, item.strength);
        }

        let link = nexus
            .resolve_suggestion(suggestion.id, ReviewDecision::Accept, "demo", None)
            .unwrap()
            .unwrap();
        println!("Accepted -> link {} created\n", link.id);
    }

    let usage = nexus.rule_usage(rule_id).unwrap();
    println!(
        "Rule usage: {} executions, {} links, avg confidence {:.2}",
        usage.execution_count, usage.successful_links, usage.average_confidence
    );
}

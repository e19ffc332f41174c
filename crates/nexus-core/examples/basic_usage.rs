use nexus_core::{LinkType, Nexus, NexusConfig, RecordDraft, RecordMetadata};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Nexus Basic Usage Example ===\n");

    // 1. Open the link database
    println!("1. Opening database...");
    let nexus = Nexus::open("./data/example.redb", NexusConfig::default())?;
    println!("   ✓ Database opened at ./data/example.redb\n");

    // 2. Index record surrogates from two business modules
    println!("2. Indexing records...");

    let mut vendor_meta = RecordMetadata::default();
    vendor_meta
        .business_identifiers
        .insert("vendorNumber".to_string(), "V-1001".to_string());
    vendor_meta.categories.push("suppliers".to_string());

    let vendor = nexus.index_record(
        RecordDraft::new("vendors", "V-1")
            .with_type("supplier")
            .with_title("Acme Industrial Ltd")
            .with_metadata(vendor_meta)
            .with_field("city", json!("Manchester")),
    )?;
    println!("   ✓ Indexed {}/{}", vendor.module, vendor.record_id);

    let task = nexus.index_record(
        RecordDraft::new("tasks", "T-42")
            .with_type("follow_up")
            .with_title("Renew Acme supply contract")
            .with_field("vendorNumber", json!("V-1001")),
    )?;
    println!("   ✓ Indexed {}/{}\n", task.module, task.record_id);

    // 3. Create a manual link between them
    println!("3. Creating a manual link...");
    let link = nexus.link(
        "vendors",
        "V-1",
        "tasks",
        "T-42",
        LinkType::new("related_to")?,
        "workflow",
        true,
        "operator",
    )?;
    println!(
        "   ✓ Linked {} -> {} ({})\n",
        link.source_record_id, link.target_record_id, link.link_type
    );

    // 4. Query the graph from either endpoint
    println!("4. Querying links...");
    for l in nexus.list_links("tasks/T-42", None)? {
        println!(
            "   {} -[{}]-> {} (bidirectional: {})",
            l.source_record_id, l.link_type, l.target_record_id, l.bidirectional
        );
    }

    // 5. Revalidate the graph against the index
    println!("\n5. Validating links...");
    let report = nexus.validate_links()?;
    println!(
        "   ✓ {} checked, {} valid, {} stale, {} broken",
        report.checked, report.valid, report.stale, report.broken
    );

    Ok(())
}

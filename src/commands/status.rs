use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::Collection;

pub fn run(args: StatusArgs) -> Result<()> {
    if !args.collection_path.exists() {
        warn!(path = %args.collection_path.display(), "collection not found; run build first");
        return Ok(());
    }

    let raw = fs::read(&args.collection_path)
        .with_context(|| format!("failed to read {}", args.collection_path.display()))?;
    let collection: Collection = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", args.collection_path.display()))?;

    info!(
        generated_at = %collection.generated_at,
        groups = collection.groups.len(),
        processed = collection.stats.documents_processed,
        skipped = collection.stats.documents_skipped,
        vision = collection.stats.vision_documents,
        layout_text = collection.stats.layout_text_documents,
        raw_text = collection.stats.raw_text_documents,
        low_confidence = collection.stats.low_confidence_documents,
        exact_entries = collection.stats.exact_entries,
        range_entries = collection.stats.range_entries,
        unknown_entries = collection.stats.unknown_entries,
        "loaded collection"
    );

    for (group, records) in &collection.groups {
        let entries: usize = records.iter().map(|record| record.entries.len()).sum();
        info!(group = %group, documents = records.len(), entries, "group summary");
    }

    for skip in &collection.stats.skips {
        warn!(document = %skip.document_id, reason = %skip.reason, "skipped document");
    }

    Ok(())
}

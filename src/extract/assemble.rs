use std::collections::BTreeMap;

use crate::model::{
    Collection, CollectionStats, DocumentRecord, PageStatus, ParseMethod, SkipRecord,
};
use crate::util::now_utc_string;

/// Aggregates committed records per group and counts skips. The build
/// command wraps one assembler in a mutex; the append is the only
/// synchronization point between document workers, and a record is visible
/// here only once fully committed or fully skipped.
#[derive(Debug, Default)]
pub struct CollectionAssembler {
    groups: BTreeMap<String, Vec<DocumentRecord>>,
    skips: Vec<SkipRecord>,
}

impl CollectionAssembler {
    pub fn new() -> Self {
        CollectionAssembler::default()
    }

    pub fn add(&mut self, record: DocumentRecord, group_key: &str) {
        self.groups
            .entry(group_key.to_string())
            .or_default()
            .push(record);
    }

    pub fn record_skip(&mut self, document_id: &str, reason: &str) {
        self.skips.push(SkipRecord {
            document_id: document_id.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Computes the aggregate counters and freezes the collection. Group
    /// sequences are sorted by document id so report order is stable
    /// regardless of worker completion order.
    pub fn finalize(mut self) -> Collection {
        let mut stats = CollectionStats::default();

        for records in self.groups.values_mut() {
            records.sort_by(|a, b| a.document_id.cmp(&b.document_id));

            for record in records.iter() {
                stats.documents_processed += 1;
                match record.parse_method {
                    ParseMethod::Vision => stats.vision_documents += 1,
                    ParseMethod::LayoutText => stats.layout_text_documents += 1,
                    ParseMethod::RawText => stats.raw_text_documents += 1,
                }
                if record.low_confidence {
                    stats.low_confidence_documents += 1;
                }

                for entry in &record.entries {
                    match entry.status() {
                        PageStatus::Exact => stats.exact_entries += 1,
                        PageStatus::Range => stats.range_entries += 1,
                        PageStatus::Unknown => stats.unknown_entries += 1,
                    }
                }
            }
        }

        stats.documents_skipped = self.skips.len();
        stats.skips = self.skips;

        Collection {
            manifest_version: 1,
            generated_at: now_utc_string(),
            groups: self.groups,
            stats,
        }
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;

use super::backends::{
    LayoutExtractor, LayoutParse, PageRange, RawTextExtractor, TableGrid, VisionExtractor,
};
use super::orchestrate::{
    Collaborators, DocumentInput, Orchestrator, OrchestratorConfig, Outcome,
};
use super::parsers::OutlineParsers;
use super::validate::score;
use crate::model::{OutlineEntry, PageRef, PageStatus, ParseMethod};

fn entries_from(lines: &[(&str, &str, PageRef)]) -> Vec<OutlineEntry> {
    lines
        .iter()
        .map(|(number, title, page)| OutlineEntry::new(*number, *title, *page))
        .collect()
}

#[test]
fn clean_dotted_outline_scores_full_confidence() {
    let parsers = OutlineParsers::new().unwrap();
    let outcome = parsers.parse_dotted("1 General 5\n2 Summary 6\n2.1 Plots 7");

    assert_eq!(outcome.entries.len(), 3);
    assert!((outcome.applicability() - 1.0).abs() < f64::EPSILON);

    let report = score(outcome.entries, 10);
    assert_eq!(report.entries.len(), 3);
    assert!(report
        .entries
        .iter()
        .all(|entry| entry.status() == PageStatus::Exact));
    assert!((report.confidence - 1.0).abs() < f64::EPSILON);
    assert_eq!(report.bounds_violations, 0);
    assert_eq!(report.monotonicity_repairs, 0);
    assert_eq!(report.hierarchy_violations, 0);
}

#[test]
fn range_entries_earn_half_credit() {
    let parsers = OutlineParsers::new().unwrap();
    let outcome =
        parsers.parse_dotted("1 General 5\n6.1 General 13-14\n6.2 Incidents 13-14");

    let report = score(outcome.entries, 14);
    let statuses: Vec<PageStatus> = report.entries.iter().map(OutlineEntry::status).collect();
    assert_eq!(
        statuses,
        vec![PageStatus::Exact, PageStatus::Range, PageStatus::Range]
    );
    assert!((report.confidence - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn out_of_order_page_is_widened_to_range_not_dropped() {
    let entries = entries_from(&[
        ("1", "Scope", PageRef::Exact(5)),
        ("2", "Methods", PageRef::Exact(9)),
        ("3", "Results", PageRef::Exact(7)),
        ("4", "Annex", PageRef::Exact(11)),
    ]);

    let report = score(entries, 20);
    assert_eq!(report.entries.len(), 4);
    assert_eq!(report.monotonicity_repairs, 1);
    assert_eq!(
        report.entries[2].page,
        PageRef::Range { start: 9, end: 11 }
    );
}

#[test]
fn out_of_bounds_page_is_demoted_to_unknown() {
    let entries = entries_from(&[
        ("1", "Scope", PageRef::Exact(2)),
        ("2", "Methods", PageRef::Exact(3)),
        ("3", "Results", PageRef::Exact(99)),
    ]);

    let report = score(entries, 10);
    assert_eq!(report.bounds_violations, 1);
    assert_eq!(report.entries[2].page, PageRef::Unknown);
}

#[test]
fn hierarchy_violation_dents_confidence_without_removing_entries() {
    let entries = entries_from(&[
        ("2.1", "Late section", PageRef::Exact(4)),
        ("1", "Early section", PageRef::Exact(5)),
        ("3", "Next section", PageRef::Exact(6)),
    ]);

    let report = score(entries, 10);
    assert_eq!(report.entries.len(), 3);
    assert_eq!(report.hierarchy_violations, 1);
    assert!(report.confidence < 1.0);
    assert!(report.confidence > 0.8);
}

#[test]
fn confidence_grows_with_the_exact_fraction() {
    let mut previous = 0.0_f64;
    for exact_count in 1..=5 {
        let mut entries = Vec::new();
        for index in 0..exact_count {
            entries.push(OutlineEntry::new(
                (index + 1).to_string(),
                format!("Section {index}"),
                PageRef::Exact(index as u32 + 1),
            ));
        }
        entries.push(OutlineEntry::new(
            (exact_count + 1).to_string(),
            "Ranged",
            PageRef::Range {
                start: exact_count as u32 + 1,
                end: exact_count as u32 + 2,
            },
        ));
        entries.push(OutlineEntry::new(
            (exact_count + 2).to_string(),
            "Lost",
            PageRef::Unknown,
        ));

        let report = score(entries, 100);
        assert!(
            report.confidence >= previous,
            "confidence regressed at exact_count={exact_count}"
        );
        previous = report.confidence;
    }
}

#[test]
fn fewer_than_three_entries_floor_confidence_at_zero() {
    let entries = entries_from(&[
        ("1", "Only", PageRef::Exact(2)),
        ("2", "Two", PageRef::Exact(3)),
    ]);

    let report = score(entries, 10);
    assert_eq!(report.confidence, 0.0);
}

#[test]
fn page_column_is_found_in_any_position() {
    let parsers = OutlineParsers::new().unwrap();

    let layouts: Vec<Vec<Vec<&str>>> = vec![
        vec![
            vec!["1", "General", "5"],
            vec!["2", "Summary", "6"],
            vec!["2.1", "Plots", "7"],
        ],
        vec![
            vec!["5", "1", "General"],
            vec!["6", "2", "Summary"],
            vec!["7", "2.1", "Plots"],
        ],
        vec![
            vec!["1", "5", "General"],
            vec!["2", "6", "Summary"],
            vec!["2.1", "7", "Plots"],
        ],
    ];

    for rows in layouts {
        let grid = TableGrid {
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        };

        let outcome = parsers.parse_table(&grid);
        assert_eq!(outcome.entries.len(), 3);
        let pages: Vec<PageRef> = outcome.entries.iter().map(|entry| entry.page).collect();
        assert_eq!(
            pages,
            vec![PageRef::Exact(5), PageRef::Exact(6), PageRef::Exact(7)]
        );
    }
}

#[test]
fn noise_column_yields_unknown_pages_not_garbage() {
    let parsers = OutlineParsers::new().unwrap();
    let grid = TableGrid {
        rows: vec![
            vec!["zie ook deel A".into(), "1".into(), "General".into()],
            vec!["n.v.t.".into(), "2".into(), "Summary".into()],
            vec!["(vervolg)".into(), "2.1".into(), "Plots".into()],
        ],
    };

    let outcome = parsers.parse_table(&grid);
    assert_eq!(outcome.entries.len(), 3);
    assert!(outcome
        .entries
        .iter()
        .all(|entry| entry.page == PageRef::Unknown));
    assert_eq!(outcome.entries[0].number, "1");
}

#[test]
fn fused_title_and_page_cell_is_split_on_leaders() {
    let parsers = OutlineParsers::new().unwrap();
    let grid = TableGrid {
        rows: vec![
            vec!["1".into(), "General overview ........ 5".into()],
            vec!["2".into(), "Summary of findings ...... 6".into()],
            vec!["2.1".into(), "Plots and figures ........ 7".into()],
        ],
    };

    let outcome = parsers.parse_table(&grid);
    assert_eq!(outcome.entries.len(), 3);
    assert_eq!(outcome.entries[0].title, "General overview");
    assert_eq!(outcome.entries[0].page, PageRef::Exact(5));
    assert!(outcome.entries.iter().all(|entry| !entry.title.contains("..")));
}

#[test]
fn dotted_parser_strips_leader_artifacts_from_titles() {
    let parsers = OutlineParsers::new().unwrap();
    let outcome = parsers.parse_dotted("3.2 Risk register . . . . . . 12\n4 Appendix ------ 15\n5 Final word 17");

    assert_eq!(outcome.entries.len(), 3);
    assert_eq!(outcome.entries[0].title, "Risk register");
    assert_eq!(outcome.entries[1].title, "Appendix");
    assert_eq!(outcome.entries[2].title, "Final word");
}

#[test]
fn multiline_parser_pairs_numbers_with_following_titles() {
    let parsers = OutlineParsers::new().unwrap();
    let outcome = parsers.parse_multiline("1\nIntroduction 5\n2\nMethods 9\n3\nResults 12");

    assert_eq!(outcome.entries.len(), 3);
    assert_eq!(outcome.entries[0].number, "1");
    assert_eq!(outcome.entries[0].title, "Introduction");
    assert_eq!(outcome.entries[0].page, PageRef::Exact(5));
}

#[test]
fn multiline_parser_pairs_titles_with_following_bare_pages() {
    let parsers = OutlineParsers::new().unwrap();
    let outcome = parsers.parse_multiline("1 Introduction\n5\n2 Methods\n9\n3 Results\n12");

    assert_eq!(outcome.entries.len(), 3);
    assert_eq!(outcome.entries[1].title, "Methods");
    assert_eq!(outcome.entries[1].page, PageRef::Exact(9));
}

#[test]
fn multiline_parser_terminates_on_malformed_input() {
    let parsers = OutlineParsers::new().unwrap();

    // No line ever matches the expected continuation; the cursor must still
    // advance past every starting line and finish.
    let malformed = (1..200)
        .map(|n| n.to_string())
        .collect::<Vec<String>>()
        .join("\n");
    let outcome = parsers.parse_multiline(&malformed);
    assert!(outcome.entries.is_empty());

    let prose = "lorem ipsum\ndolor sit amet\nconsectetur";
    let outcome = parsers.parse_multiline(prose);
    assert!(outcome.entries.is_empty());
}

#[test]
fn ladder_prefers_tabular_over_text_parsers() {
    let parsers = OutlineParsers::new().unwrap();
    let grid = TableGrid {
        rows: vec![
            vec!["1".into(), "General".into(), "5".into()],
            vec!["2".into(), "Summary".into(), "6".into()],
            vec!["3".into(), "Annex".into(), "7".into()],
        ],
    };

    let outcome = parsers
        .parse_best("unrelated prose text", std::slice::from_ref(&grid))
        .expect("tabular outcome");
    assert_eq!(outcome.entries.len(), 3);
    assert_eq!(outcome.entries[2].title, "Annex");
}

// --- orchestrator runs against mocked collaborators -----------------------

struct StaticLayout {
    parse: LayoutParse,
}

impl LayoutExtractor for StaticLayout {
    fn parse(&self, _document: &std::path::Path, _range: PageRange, _force_full: bool) -> Result<LayoutParse> {
        Ok(self.parse.clone())
    }
}

struct StaticRaw {
    text: String,
}

impl RawTextExtractor for StaticRaw {
    fn extract_pages(&self, _document: &std::path::Path, range: PageRange) -> Result<Vec<(u32, String)>> {
        Ok(self
            .text
            .split('\u{000C}')
            .enumerate()
            .map(|(index, chunk)| (range.start + index as u32, chunk.to_string()))
            .collect())
    }
}

struct CountingVision {
    text: String,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl VisionExtractor for CountingVision {
    fn extract(&self, _document: &std::path::Path, _range: PageRange, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(self.text.clone())
    }
}

fn layout_parse(pages: &[(&str, bool)]) -> LayoutParse {
    let per_page_text: Vec<(u32, String)> = pages
        .iter()
        .enumerate()
        .map(|(index, (text, _))| (index as u32 + 1, (*text).to_string()))
        .collect();
    let image_only_pages = pages.iter().map(|(_, image_only)| *image_only).collect();
    let text = per_page_text
        .iter()
        .map(|(_, text)| text.as_str())
        .collect::<Vec<&str>>()
        .join("\n");

    LayoutParse {
        text,
        per_page_text,
        tables: Vec::new(),
        image_only_pages,
    }
}

fn document(total_pages: u32) -> DocumentInput {
    DocumentInput {
        document_id: "report.pdf".to_string(),
        path: PathBuf::from("report.pdf"),
        total_pages,
        sample_pages: 5,
    }
}

fn orchestrator(vision_timeout: Duration) -> Orchestrator {
    Orchestrator::new(OrchestratorConfig {
        vision_timeout,
        ..OrchestratorConfig::default()
    })
    .unwrap()
}

#[test]
fn native_document_commits_via_layout_tier() {
    let layout = layout_parse(&[
        ("Annual report 2024", false),
        ("Table of contents\n1 General 5\n2 Summary 6\n2.1 Plots 7", false),
        ("1 General body text", false),
    ]);

    let collaborators = Collaborators {
        layout: Arc::new(StaticLayout { parse: layout }),
        vision: None,
        raw: Arc::new(StaticRaw {
            text: String::new(),
        }),
    };

    let outcome = orchestrator(Duration::from_secs(1)).extract(&document(10), &collaborators);
    match outcome {
        Outcome::Committed(record) => {
            assert!(!record.is_scanned);
            assert_eq!(record.parse_method, ParseMethod::LayoutText);
            assert_eq!(record.entries.len(), 3);
            assert_eq!(record.outline_page, Some(2));
            assert!(!record.low_confidence);
            assert!((record.confidence - 1.0).abs() < f64::EPSILON);
        }
        Outcome::Skipped { reason, .. } => panic!("unexpected skip: {reason}"),
    }
}

#[test]
fn layout_tier_ignores_tables_outside_the_outline_window() {
    // The classification sample carries a numeric table on page 1 that the
    // parser ladder would happily accept; the real outline sits on page 2.
    // Only grids from the located window may reach the parsers.
    let mut layout = layout_parse(&[
        ("Annual report 2024", false),
        ("Table of contents\n1 General 5\n2 Summary 6\n2.1 Plots 7", false),
        ("1 General body text", false),
    ]);
    layout.tables = vec![(1, TableGrid {
        rows: vec![
            vec!["Alpha item".into(), "narrative measure".into(), "3".into()],
            vec!["Beta item".into(), "second narrative".into(), "4".into()],
            vec!["Gamma item".into(), "third narrative".into(), "6".into()],
        ],
    })];

    let collaborators = Collaborators {
        layout: Arc::new(StaticLayout { parse: layout }),
        vision: None,
        raw: Arc::new(StaticRaw {
            text: String::new(),
        }),
    };

    let outcome = orchestrator(Duration::from_secs(1)).extract(&document(10), &collaborators);
    match outcome {
        Outcome::Committed(record) => {
            assert_eq!(record.parse_method, ParseMethod::LayoutText);
            assert_eq!(record.outline_page, Some(2));
            assert_eq!(record.entries[0].title, "General");
            assert_eq!(record.entries[0].page, PageRef::Exact(5));
        }
        Outcome::Skipped { reason, .. } => panic!("unexpected skip: {reason}"),
    }
}

#[test]
fn scanned_document_commits_via_vision_tier() {
    // Near-empty image-only pages classify as scanned; the raw text variant
    // carries the keyword so the estimate can aim the vision window.
    let layout = layout_parse(&[("scan artifacts", true), ("smudges", true)]);
    let calls = Arc::new(AtomicUsize::new(0));

    let collaborators = Collaborators {
        layout: Arc::new(StaticLayout { parse: layout }),
        vision: Some(Arc::new(CountingVision {
            text: "1 Intro 2\n2 Findings 3\n3 Annex 4".to_string(),
            delay: Duration::ZERO,
            calls: calls.clone(),
        })),
        raw: Arc::new(StaticRaw {
            text: "contents\nillegible".to_string(),
        }),
    };

    let outcome = orchestrator(Duration::from_secs(1)).extract(&document(5), &collaborators);
    match outcome {
        Outcome::Committed(record) => {
            assert!(record.is_scanned);
            assert_eq!(record.parse_method, ParseMethod::Vision);
            assert_eq!(record.entries.len(), 3);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
        Outcome::Skipped { reason, .. } => panic!("unexpected skip: {reason}"),
    }
}

#[test]
fn alternate_raw_variant_locates_the_outline_page() {
    // The layout variant of a scanned sample carries no keyword, but the raw
    // variant does on page 2, with numbered-line structure. The per-page
    // rerun must aim the vision window there; the flat-line estimate alone
    // would point at page 1.
    let layout = layout_parse(&[("smudge", true), ("speckle", true)]);
    let calls = Arc::new(AtomicUsize::new(0));

    let collaborators = Collaborators {
        layout: Arc::new(StaticLayout { parse: layout }),
        vision: Some(Arc::new(CountingVision {
            text: "1 Intro 2\n2 Findings 3\n3 Annex 4".to_string(),
            delay: Duration::ZERO,
            calls: calls.clone(),
        })),
        raw: Arc::new(StaticRaw {
            text: "illegible scrawl\u{000C}Contents\n1 Intro 2\n2 Findings 3\n3 Annex 4"
                .to_string(),
        }),
    };

    let outcome = orchestrator(Duration::from_secs(1)).extract(&document(5), &collaborators);
    match outcome {
        Outcome::Committed(record) => {
            assert_eq!(record.parse_method, ParseMethod::Vision);
            assert_eq!(record.outline_page, Some(2));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
        Outcome::Skipped { reason, .. } => panic!("unexpected skip: {reason}"),
    }
}

#[test]
fn vision_timeout_is_tier_failure_not_fatal() {
    let layout = layout_parse(&[("scan artifacts", true)]);
    let calls = Arc::new(AtomicUsize::new(0));

    let collaborators = Collaborators {
        layout: Arc::new(StaticLayout { parse: layout }),
        vision: Some(Arc::new(CountingVision {
            text: "1 Intro 2\n2 Findings 3\n3 Annex 4".to_string(),
            delay: Duration::from_millis(250),
            calls: calls.clone(),
        })),
        raw: Arc::new(StaticRaw {
            text: "contents\nillegible".to_string(),
        }),
    };

    let outcome =
        orchestrator(Duration::from_millis(25)).extract(&document(5), &collaborators);
    match outcome {
        Outcome::Skipped { reason, .. } => assert_eq!(reason, "insufficient entries"),
        Outcome::Committed(record) => {
            panic!("expected skip, committed via {:?}", record.parse_method)
        }
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn unlocatable_outline_falls_through_to_raw_tier() {
    // Scanned, no keyword in the layout sample, so the vision tier is
    // skipped even though a collaborator is wired; the raw variant still
    // parses cleanly.
    let layout = layout_parse(&[("scan artifacts", true)]);
    let calls = Arc::new(AtomicUsize::new(0));

    let collaborators = Collaborators {
        layout: Arc::new(StaticLayout { parse: layout }),
        vision: Some(Arc::new(CountingVision {
            text: String::new(),
            delay: Duration::ZERO,
            calls: calls.clone(),
        })),
        raw: Arc::new(StaticRaw {
            text: "1. Scope 2\n2. Findings 3\n3. Annex 4".to_string(),
        }),
    };

    let outcome = orchestrator(Duration::from_secs(1)).extract(&document(5), &collaborators);
    match outcome {
        Outcome::Committed(record) => {
            assert_eq!(record.parse_method, ParseMethod::RawText);
            assert_eq!(record.entries.len(), 3);
            assert_eq!(record.outline_page, None);
        }
        Outcome::Skipped { reason, .. } => panic!("unexpected skip: {reason}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn document_with_no_text_anywhere_is_skipped_with_reason() {
    let layout = layout_parse(&[("", true), ("", true)]);

    let collaborators = Collaborators {
        layout: Arc::new(StaticLayout { parse: layout }),
        vision: None,
        raw: Arc::new(StaticRaw {
            text: String::new(),
        }),
    };

    let outcome = orchestrator(Duration::from_secs(1)).extract(&document(5), &collaborators);
    match outcome {
        Outcome::Skipped {
            document_id,
            reason,
        } => {
            assert_eq!(document_id, "report.pdf");
            assert_eq!(reason, "no extractable content");
        }
        Outcome::Committed(_) => panic!("expected skip"),
    }
}

#[test]
fn sub_threshold_result_commits_as_low_confidence() {
    // Only one line parses on any tier, so every tier scores under the
    // native threshold; the best effort commits tagged low-confidence
    // instead of the document being discarded.
    let layout = layout_parse(&[(
        "Table of contents\n1 General 5\n2 Summary zz\n3 Annex ??",
        false,
    )]);

    let collaborators = Collaborators {
        layout: Arc::new(StaticLayout { parse: layout }),
        vision: None,
        raw: Arc::new(StaticRaw {
            text: "1 General 5\n2 Summary\n3 Annex".to_string(),
        }),
    };

    let outcome = orchestrator(Duration::from_secs(1)).extract(&document(10), &collaborators);
    match outcome {
        Outcome::Committed(record) => {
            assert!(record.low_confidence);
            assert!(record.confidence < 0.7);
        }
        Outcome::Skipped { reason, .. } => panic!("unexpected skip: {reason}"),
    }
}

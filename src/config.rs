//! Heuristic thresholds for the extraction ladder. Named here rather than
//! inlined so they can be tuned per corpus without touching control flow.

/// Pages sampled from the front of a document for classification and
/// outline-page location when the caller gives no override.
pub const CLASSIFY_SAMPLE_PAGES: u32 = 5;

/// A sampled page with fewer non-whitespace characters than this in its
/// layout text, while the extractor flags it image-only, votes "scanned".
pub const SCANNED_MIN_TEXT_CHARS: usize = 120;

/// Rough average used to turn a raw-text line offset into a page estimate
/// when no per-page text is available. Not derived from any corpus
/// measurement; a tunable default that does not transfer across very
/// differently formatted documents.
pub const ESTIMATED_LINES_PER_PAGE: usize = 50;

/// Neighbor pages probed around a raw-line page estimate before settling on
/// the estimate itself.
pub const LOCATE_PROBE_RADIUS: u32 = 1;

/// Maximum lines the multi-line parser looks ahead for a continuation before
/// giving up on the current starting line. Bounds the search so parsing is
/// O(lines) on any input.
pub const MULTILINE_LOOKAHEAD: usize = 3;

/// A parser result with fewer entries than this is treated as a parse
/// failure; a scored result with fewer is floored to zero confidence.
pub const MIN_ENTRY_COUNT: usize = 3;

/// Minimum fraction of candidate lines a parser must match for its result to
/// be accepted ahead of lower-priority parsers.
pub const MIN_PARSER_APPLICABILITY: f64 = 0.3;

/// Fraction of a column's cells that must parse as a page integer or range
/// before that column can claim the PAGE role. Role assignment is by
/// content, never by position; a trailing column of non-numeric noise must
/// not win by sitting last.
pub const PAGE_COLUMN_MIN_FRACTION: f64 = 0.7;

/// Fraction of a column's cells that must look like hierarchical labels
/// before that column can claim the NUMBER role.
pub const NUMBER_COLUMN_MIN_FRACTION: f64 = 0.5;

/// Commit threshold for scanned documents. Lower than the native threshold
/// because image-based extraction structurally produces more RANGE entries
/// (subsection page boundaries are harder to resolve from a picture), and a
/// stricter bar would systematically reject otherwise-correct results.
pub const SCANNED_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Commit threshold for native (machine-text) documents.
pub const NATIVE_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Pages handed to the vision collaborator starting at the located outline
/// page. Outlines frequently span two pages; a single-page window truncates
/// them.
pub const VISION_PAGE_WINDOW: u32 = 2;

/// Confidence deduction per hierarchy-order violation. Violations dampen
/// confidence but never remove entries.
pub const HIERARCHY_VIOLATION_PENALTY: f64 = 0.05;

/// Default budget for one vision invocation; typical latency is 15-30s per
/// call, so the budget leaves headroom without stalling a worker for long.
pub const DEFAULT_VISION_TIMEOUT_SECS: u64 = 60;

/// Instruction handed to the vision collaborator along with the page window.
pub const VISION_PROMPT: &str = "Transcribe the table of contents on these pages as plain text, \
     one entry per line: section number, title, then page number.";

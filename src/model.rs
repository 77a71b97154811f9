use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Page reference states for an outline entry: EXACT when a single page was
/// resolved, RANGE when only an inclusive window is trustworthy, UNKNOWN
/// when nothing was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Exact,
    Range,
    Unknown,
}

/// A page reference as persisted: `"7"`, `"13-14"`, or the `"0"` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRef {
    Exact(u32),
    Range { start: u32, end: u32 },
    Unknown,
}

impl PageRef {
    /// Parses a page token from a cell or line tail. Returns `None` for
    /// anything that is not a bare positive integer or an `a-b` range, so
    /// callers can distinguish "not a page at all" from the explicit
    /// unknown sentinel.
    pub fn parse(token: &str) -> Option<PageRef> {
        let cleaned = token.trim().replace('\u{2013}', "-");
        if cleaned.is_empty() {
            return None;
        }

        if let Ok(page) = cleaned.parse::<u32>() {
            return if page == 0 {
                Some(PageRef::Unknown)
            } else {
                Some(PageRef::Exact(page))
            };
        }

        let (left, right) = cleaned.split_once('-')?;
        let start = left.trim().parse::<u32>().ok()?;
        let end = right.trim().parse::<u32>().ok()?;
        if start == 0 || end == 0 {
            return None;
        }

        let (start, end) = if start <= end {
            (start, end)
        } else {
            (end, start)
        };

        if start == end {
            Some(PageRef::Exact(start))
        } else {
            Some(PageRef::Range { start, end })
        }
    }

    pub fn status(self) -> PageStatus {
        match self {
            PageRef::Exact(_) => PageStatus::Exact,
            PageRef::Range { .. } => PageStatus::Range,
            PageRef::Unknown => PageStatus::Unknown,
        }
    }

    /// Start page for ordering comparisons; `None` for the unknown sentinel.
    pub fn ordering_key(self) -> Option<u32> {
        match self {
            PageRef::Exact(page) => Some(page),
            PageRef::Range { start, .. } => Some(start),
            PageRef::Unknown => None,
        }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageRef::Exact(page) => write!(f, "{page}"),
            PageRef::Range { start, end } => write!(f, "{start}-{end}"),
            PageRef::Unknown => write!(f, "0"),
        }
    }
}

impl Serialize for PageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PageRef::parse(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid page reference: {raw}")))
    }
}

/// One row of an extracted table of contents. `number` and `title` are never
/// both empty for a committed entry; leader characters are stripped from the
/// title during parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub number: String,
    pub title: String,
    pub page: PageRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl OutlineEntry {
    pub fn new(number: impl Into<String>, title: impl Into<String>, page: PageRef) -> Self {
        OutlineEntry {
            number: number.into(),
            title: title.into(),
            page,
            category: None,
        }
    }

    pub fn status(&self) -> PageStatus {
        self.page.status()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMethod {
    Vision,
    LayoutText,
    RawText,
}

impl ParseMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ParseMethod::Vision => "vision",
            ParseMethod::LayoutText => "layout_text",
            ParseMethod::RawText => "raw_text",
        }
    }
}

/// One source document's committed extraction result. Immutable after the
/// orchestrator commits it; category attachment happens downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub is_scanned: bool,
    pub parse_method: ParseMethod,
    pub entries: Vec<OutlineEntry>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline_page: Option<u32>,
    #[serde(default)]
    pub low_confidence: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipRecord {
    pub document_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    pub documents_processed: usize,
    pub documents_skipped: usize,
    pub vision_documents: usize,
    pub layout_text_documents: usize,
    pub raw_text_documents: usize,
    pub low_confidence_documents: usize,
    pub exact_entries: usize,
    pub range_entries: usize,
    pub unknown_entries: usize,
    pub skips: Vec<SkipRecord>,
}

/// Per-group document records plus aggregate counters, built fresh per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub manifest_version: u32,
    pub generated_at: String,
    pub groups: BTreeMap<String, Vec<DocumentRecord>>,
    pub stats: CollectionStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub filename: String,
    pub group: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub document_count: usize,
    pub documents: Vec<DocumentEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub counts: CollectionStats,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use crate::config::{
    DEFAULT_VISION_TIMEOUT_SECS, MIN_ENTRY_COUNT, NATIVE_CONFIDENCE_THRESHOLD,
    SCANNED_CONFIDENCE_THRESHOLD, VISION_PAGE_WINDOW, VISION_PROMPT,
};
use crate::extract::backends::{
    LayoutExtractor, LayoutParse, PageRange, RawTextExtractor, TableGrid, VisionExtractor,
    call_with_timeout,
};
use crate::extract::classify::{Classification, classify, samples_from_layout};
use crate::extract::locate::OutlineLocator;
use crate::extract::parsers::{OutlineParsers, tables_from_markdown};
use crate::extract::validate::{ValidationReport, score};
use crate::model::{DocumentRecord, ParseMethod};
use crate::util::non_whitespace_char_count;

/// One document as handed to the orchestrator. `total_pages` of zero means
/// the page count could not be probed; bounds checks are then skipped.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub document_id: String,
    pub path: PathBuf,
    pub total_pages: u32,
    pub sample_pages: u32,
}

/// The external collaborators a run is wired with. The vision collaborator
/// is optional; without it the vision tier is reported unavailable.
pub struct Collaborators {
    pub layout: Arc<dyn LayoutExtractor>,
    pub vision: Option<Arc<dyn VisionExtractor>>,
    pub raw: Arc<dyn RawTextExtractor>,
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub scanned_threshold: f64,
    pub native_threshold: f64,
    pub vision_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            scanned_threshold: SCANNED_CONFIDENCE_THRESHOLD,
            native_threshold: NATIVE_CONFIDENCE_THRESHOLD,
            vision_timeout: Duration::from_secs(DEFAULT_VISION_TIMEOUT_SECS),
        }
    }
}

/// Terminal orchestrator outcome: every document yields exactly one of
/// these, never an error.
#[derive(Debug)]
pub enum Outcome {
    Committed(DocumentRecord),
    Skipped { document_id: String, reason: String },
}

/// The tier ladder's named states. Transitions only move rightward, so a
/// run is bounded by construction.
#[derive(Debug)]
enum State {
    Classify,
    Locate,
    TryVisionTier,
    TryLayoutTier,
    TryRawTier,
    Commit(TierResult),
    Skip(String),
}

#[derive(Debug)]
struct TierResult {
    method: ParseMethod,
    report: ValidationReport,
}

/// Per-document working set carried between states. Purely local; nothing
/// is visible to the assembler until commit or skip.
struct DocumentContext {
    classification: Classification,
    sample: LayoutParse,
    raw_pages: Vec<(u32, String)>,
    raw_sample: String,
    outline_page: Option<u32>,
    best: Option<TierResult>,
}

pub struct Orchestrator {
    parsers: OutlineParsers,
    locator: OutlineLocator,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        Ok(Orchestrator {
            parsers: OutlineParsers::new()?,
            locator: OutlineLocator::new()?,
            config,
        })
    }

    /// Runs the tier ladder for one document. Always terminates in a commit
    /// (possibly low-confidence) or a skip; collaborator failures and
    /// timeouts demote to the next tier instead of propagating.
    pub fn extract(&self, document: &DocumentInput, collaborators: &Collaborators) -> Outcome {
        let mut context = DocumentContext {
            classification: Classification {
                is_scanned: true,
                degraded: true,
            },
            sample: LayoutParse::default(),
            raw_pages: Vec::new(),
            raw_sample: String::new(),
            outline_page: None,
            best: None,
        };

        let mut state = State::Classify;
        loop {
            state = match state {
                State::Classify => self.run_classify(document, collaborators, &mut context),
                State::Locate => self.run_locate(&mut context),
                State::TryVisionTier => {
                    self.run_vision_tier(document, collaborators, &mut context)
                }
                State::TryLayoutTier => {
                    self.run_layout_tier(document, collaborators, &mut context)
                }
                State::TryRawTier => self.run_raw_tier(document, collaborators, &mut context),
                State::Commit(result) => {
                    return self.commit(document, &context, result);
                }
                State::Skip(reason) => {
                    return Outcome::Skipped {
                        document_id: document.document_id.clone(),
                        reason,
                    };
                }
            };
        }
    }

    fn sample_range(&self, document: &DocumentInput) -> PageRange {
        PageRange::new(1, document.sample_pages.max(1)).clamped_to(document.total_pages)
    }

    fn run_classify(
        &self,
        document: &DocumentInput,
        collaborators: &Collaborators,
        context: &mut DocumentContext,
    ) -> State {
        let range = self.sample_range(document);

        let sample = match collaborators.layout.parse(&document.path, range, false) {
            Ok(parse) => parse,
            Err(error) => {
                warn!(
                    document = %document.document_id,
                    error = %error,
                    "layout sample extraction failed"
                );
                LayoutParse::default()
            }
        };

        context.classification = classify(&samples_from_layout(&sample));
        context.sample = sample;

        // Scanned documents get a forced full reprocessing of the sample so
        // partial or cached OCR cannot truncate the outline text.
        if context.classification.is_scanned && !context.classification.degraded {
            if let Ok(parse) = collaborators.layout.parse(&document.path, range, true) {
                context.sample = parse;
            }
        }

        context.raw_pages = match collaborators.raw.extract_pages(&document.path, range) {
            Ok(pages) => pages,
            Err(error) => {
                debug!(
                    document = %document.document_id,
                    error = %error,
                    "raw sample extraction failed"
                );
                Vec::new()
            }
        };
        context.raw_sample = context
            .raw_pages
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<&str>>()
            .join("\n");

        if context.classification.degraded && non_whitespace_char_count(&context.raw_sample) == 0 {
            return State::Skip("no extractable content".to_string());
        }

        State::Locate
    }

    fn run_locate(&self, context: &mut DocumentContext) -> State {
        let alternate = if context.raw_pages.is_empty() {
            None
        } else {
            Some(context.raw_pages.as_slice())
        };
        let flat_text = if context.raw_sample.is_empty() {
            None
        } else {
            Some(context.raw_sample.as_str())
        };

        context.outline_page =
            self.locator
                .locate(&context.sample.per_page_text, alternate, flat_text);

        // NOT_FOUND narrows the ladder (no vision window to aim at) but
        // never aborts the document.
        State::TryVisionTier
    }

    fn run_vision_tier(
        &self,
        document: &DocumentInput,
        collaborators: &Collaborators,
        context: &mut DocumentContext,
    ) -> State {
        if !context.classification.is_scanned {
            return State::TryLayoutTier;
        }
        let Some(outline_page) = context.outline_page else {
            return State::TryLayoutTier;
        };
        let Some(vision) = collaborators.vision.clone() else {
            debug!(document = %document.document_id, "vision collaborator unavailable");
            return State::TryLayoutTier;
        };

        let range = PageRange::new(outline_page, outline_page + VISION_PAGE_WINDOW - 1)
            .clamped_to(document.total_pages);
        let path = document.path.clone();

        let transcription = call_with_timeout("vision extraction", self.config.vision_timeout, {
            move || vision.extract(&path, range, VISION_PROMPT)
        });

        let text = match transcription {
            Ok(text) => text,
            Err(error) => {
                warn!(
                    document = %document.document_id,
                    error = %error,
                    "vision tier failed"
                );
                return State::TryLayoutTier;
            }
        };

        let tables = tables_from_markdown(&text);
        match self.evaluate_tier(document, context, ParseMethod::Vision, &text, &tables) {
            TierVerdict::Commit(result) => State::Commit(result),
            TierVerdict::FallThrough => State::TryLayoutTier,
        }
    }

    fn run_layout_tier(
        &self,
        document: &DocumentInput,
        collaborators: &Collaborators,
        context: &mut DocumentContext,
    ) -> State {
        let parse = match self.window_parse(document, collaborators, context) {
            Some(parse) => parse,
            None => {
                return State::TryRawTier;
            }
        };

        let text = parse.text;
        let tables: Vec<TableGrid> = parse.tables.into_iter().map(|(_, grid)| grid).collect();
        match self.evaluate_tier(document, context, ParseMethod::LayoutText, &text, &tables) {
            TierVerdict::Commit(result) => State::Commit(result),
            TierVerdict::FallThrough => State::TryRawTier,
        }
    }

    /// Layout text for the located outline window, re-extracted when the
    /// window extends past the classification sample; otherwise the sample
    /// itself.
    fn window_parse(
        &self,
        document: &DocumentInput,
        collaborators: &Collaborators,
        context: &DocumentContext,
    ) -> Option<LayoutParse> {
        let sample_end = context
            .sample
            .per_page_text
            .last()
            .map(|(page, _)| *page)
            .unwrap_or(0);

        let window = context.outline_page.map(|page| {
            PageRange::new(page, page + VISION_PAGE_WINDOW - 1).clamped_to(document.total_pages)
        });

        match window {
            Some(range) if range.end > sample_end => {
                let force_full = context.classification.is_scanned;
                match collaborators
                    .layout
                    .parse(&document.path, range, force_full)
                {
                    Ok(parse) => Some(parse),
                    Err(error) => {
                        warn!(
                            document = %document.document_id,
                            error = %error,
                            "layout window extraction failed"
                        );
                        None
                    }
                }
            }
            Some(range) => {
                let per_page_text: Vec<(u32, String)> = context
                    .sample
                    .per_page_text
                    .iter()
                    .filter(|(page, _)| *page >= range.start && *page <= range.end)
                    .cloned()
                    .collect();
                let text = per_page_text
                    .iter()
                    .map(|(_, text)| text.as_str())
                    .collect::<Vec<&str>>()
                    .join("\n");

                // Grids from outside the window must not compete with the
                // located outline; a numeric table elsewhere in the sample
                // would otherwise win the parser ladder.
                let tables: Vec<(u32, TableGrid)> = context
                    .sample
                    .tables
                    .iter()
                    .filter(|(page, _)| *page >= range.start && *page <= range.end)
                    .cloned()
                    .collect();

                Some(LayoutParse {
                    text,
                    per_page_text,
                    tables,
                    image_only_pages: Vec::new(),
                })
            }
            None if context.sample.per_page_text.is_empty() => None,
            None => Some(context.sample.clone()),
        }
    }

    fn run_raw_tier(
        &self,
        document: &DocumentInput,
        collaborators: &Collaborators,
        context: &mut DocumentContext,
    ) -> State {
        let text = match context.outline_page {
            Some(page) => {
                let range = PageRange::new(page, page + VISION_PAGE_WINDOW - 1)
                    .clamped_to(document.total_pages);
                match collaborators.raw.extract_text(&document.path, range) {
                    Ok(text) => text,
                    Err(error) => {
                        warn!(
                            document = %document.document_id,
                            error = %error,
                            "raw window extraction failed"
                        );
                        context.raw_sample.clone()
                    }
                }
            }
            None => context.raw_sample.clone(),
        };

        if non_whitespace_char_count(&text) > 0 {
            if let TierVerdict::Commit(result) =
                self.evaluate_tier(document, context, ParseMethod::RawText, &text, &[])
            {
                return State::Commit(result);
            }
        }

        // Last tier: commit the best sub-threshold result rather than
        // discarding the document; downstream consumers filter on
        // confidence. Skip only when no tier produced entries at all.
        match context.best.take() {
            Some(best) => State::Commit(best),
            None => State::Skip("insufficient entries".to_string()),
        }
    }

    fn evaluate_tier(
        &self,
        document: &DocumentInput,
        context: &mut DocumentContext,
        method: ParseMethod,
        text: &str,
        tables: &[TableGrid],
    ) -> TierVerdict {
        let Some(outcome) = self.parsers.parse_best(text, tables) else {
            debug!(
                document = %document.document_id,
                method = method.as_str(),
                "tier produced no entries"
            );
            return TierVerdict::FallThrough;
        };

        let report = score(outcome.entries, document.total_pages);
        debug!(
            document = %document.document_id,
            method = method.as_str(),
            entries = report.entries.len(),
            confidence = report.confidence,
            "tier scored"
        );

        let result = TierResult { method, report };
        if result.report.confidence >= self.threshold(context)
            && result.report.entries.len() >= MIN_ENTRY_COUNT
        {
            return TierVerdict::Commit(result);
        }

        let replace = match &context.best {
            Some(best) => result.report.confidence > best.report.confidence,
            None => !result.report.entries.is_empty(),
        };
        if replace {
            context.best = Some(result);
        }

        TierVerdict::FallThrough
    }

    fn threshold(&self, context: &DocumentContext) -> f64 {
        if context.classification.is_scanned {
            self.config.scanned_threshold
        } else {
            self.config.native_threshold
        }
    }

    fn commit(
        &self,
        document: &DocumentInput,
        context: &DocumentContext,
        result: TierResult,
    ) -> Outcome {
        let low_confidence = result.report.confidence < self.threshold(context);

        Outcome::Committed(DocumentRecord {
            document_id: document.document_id.clone(),
            is_scanned: context.classification.is_scanned,
            parse_method: result.method,
            entries: result.report.entries,
            confidence: result.report.confidence,
            outline_page: context.outline_page,
            low_confidence,
        })
    }
}

enum TierVerdict {
    Commit(TierResult),
    FallThrough,
}

use std::path::Path;
use std::process::Command;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::warn;

/// Inclusive 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        let start = start.max(1);
        PageRange {
            start,
            end: end.max(start),
        }
    }

    pub fn clamped_to(self, total_pages: u32) -> Self {
        if total_pages == 0 {
            return self;
        }
        let start = self.start.min(total_pages);
        PageRange {
            start,
            end: self.end.min(total_pages).max(start),
        }
    }
}

/// Unlabeled table cells from a layout-aware extraction. Column roles are
/// inferred later by content, never by position.
#[derive(Debug, Clone, Default)]
pub struct TableGrid {
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct LayoutParse {
    pub text: String,
    /// `(page_number, text)` in document order.
    pub per_page_text: Vec<(u32, String)>,
    /// `(page_number, grid)` in document order, so callers can restrict
    /// grids to a page window.
    pub tables: Vec<(u32, TableGrid)>,
    /// Aligned with `per_page_text`: whether the page carried no usable text
    /// layer and was flagged image-only by the extractor.
    pub image_only_pages: Vec<bool>,
}

/// Layout-aware text/table extraction. `force_full` disables any partial or
/// cached OCR the implementation may hold; required for scanned-flagged
/// documents where stale partial text truncates outlines.
pub trait LayoutExtractor: Send + Sync {
    fn parse(&self, document: &Path, range: PageRange, force_full: bool) -> Result<LayoutParse>;
}

/// Image-based extraction over a page window. Long-running; always invoked
/// through [`call_with_timeout`].
pub trait VisionExtractor: Send + Sync {
    fn extract(&self, document: &Path, range: PageRange, prompt: &str) -> Result<String>;
}

/// Unstructured text extraction: lower fidelity than the layout extractor
/// but immune to table-layout corruption of clean dotted formats. Page
/// boundaries are preserved so the locator can scan this variant per page.
pub trait RawTextExtractor: Send + Sync {
    fn extract_pages(&self, document: &Path, range: PageRange) -> Result<Vec<(u32, String)>>;

    fn extract_text(&self, document: &Path, range: PageRange) -> Result<String> {
        let pages = self.extract_pages(document, range)?;
        Ok(pages
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<&str>>()
            .join("\n"))
    }
}

/// Runs `task` on a worker thread and gives up after `budget`. On timeout
/// the worker is left to finish in the background; its result is discarded.
pub fn call_with_timeout<T, F>(label: &str, budget: Duration, task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name(format!("timeout-{label}"))
        .spawn(move || {
            let _ = sender.send(task());
        })
        .with_context(|| format!("failed to spawn worker thread for {label}"))?;

    match receiver.recv_timeout(budget) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            bail!("{label} exceeded its {}s budget", budget.as_secs())
        }
        Err(RecvTimeoutError::Disconnected) => {
            bail!("{label} worker exited without producing a result")
        }
    }
}

pub fn command_available(program: &str) -> bool {
    Command::new(program).arg("--version").output().is_ok()
}

/// Total page count via `pdfinfo`. Returns 0 (bounds checks disabled) when
/// the tool is missing or the document cannot be inspected.
pub fn probe_page_count(document: &Path) -> u32 {
    let output = match Command::new("pdfinfo").arg(document).output() {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                document = %document.display(),
                stderr = %stderr.trim(),
                "pdfinfo returned non-zero exit status"
            );
            return 0;
        }
        Err(error) => {
            warn!(document = %document.display(), error = %error, "failed to execute pdfinfo");
            return 0;
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix("Pages:") {
            if let Ok(count) = rest.trim().parse::<u32>() {
                return count;
            }
        }
    }

    0
}

fn run_pdftotext(document: &Path, range: PageRange, layout: bool) -> Result<Vec<String>> {
    let mut command = Command::new("pdftotext");
    command.arg("-enc").arg("UTF-8");
    if layout {
        command.arg("-layout");
    } else {
        command.arg("-raw");
    }
    command
        .arg("-f")
        .arg(range.start.to_string())
        .arg("-l")
        .arg(range.end.to_string())
        .arg(document)
        .arg("-");

    let output = command
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", document.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            document.display(),
            stderr.trim()
        );
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .collect();

    while let Some(last_page) = pages.last() {
        if last_page.trim().is_empty() {
            pages.pop();
            continue;
        }
        break;
    }

    Ok(pages)
}

/// Poppler-backed layout extractor: `pdftotext -layout` per page window,
/// table grids reconstructed from multi-space column gaps.
pub struct PdftotextLayout;

impl LayoutExtractor for PdftotextLayout {
    fn parse(&self, document: &Path, range: PageRange, _force_full: bool) -> Result<LayoutParse> {
        // No cache to invalidate in this implementation; every parse is a
        // full reprocessing, so force_full is already satisfied.
        let pages = run_pdftotext(document, range, true)?;

        let per_page_text: Vec<(u32, String)> = pages
            .into_iter()
            .enumerate()
            .map(|(index, text)| (range.start + index as u32, text))
            .collect();

        let image_only_pages = per_page_text
            .iter()
            .map(|(_, text)| crate::util::non_whitespace_char_count(text) == 0)
            .collect();

        let mut tables = Vec::new();
        for (page, text) in &per_page_text {
            for grid in grids_from_layout_text(text) {
                tables.push((*page, grid));
            }
        }

        let text = per_page_text
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<&str>>()
            .join("\n");

        Ok(LayoutParse {
            text,
            per_page_text,
            tables,
            image_only_pages,
        })
    }
}

/// Splits `-layout` output into table grids: consecutive lines that break
/// into two or more cells on runs of 2+ spaces form one grid.
fn grids_from_layout_text(text: &str) -> Vec<TableGrid> {
    let mut grids = Vec::new();
    let mut current = Vec::<Vec<String>>::new();

    for line in text.lines() {
        let cells: Vec<String> = line
            .split("  ")
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        if cells.len() >= 2 {
            current.push(cells);
            continue;
        }

        if current.len() >= 2 {
            grids.push(TableGrid {
                rows: std::mem::take(&mut current),
            });
        } else {
            current.clear();
        }
    }

    if current.len() >= 2 {
        grids.push(TableGrid { rows: current });
    }

    grids
}

/// Poppler-backed raw extractor: `pdftotext -raw`, no layout analysis.
pub struct PdftotextRaw;

impl RawTextExtractor for PdftotextRaw {
    fn extract_pages(&self, document: &Path, range: PageRange) -> Result<Vec<(u32, String)>> {
        let pages = run_pdftotext(document, range, false)?;
        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(index, text)| (range.start + index as u32, text))
            .collect())
    }
}

/// Vision collaborator backed by an external command, invoked as
/// `<program> <document> <first-page> <last-page>` with the prompt in
/// `TOCBUILD_VISION_PROMPT`; stdout is the transcription.
pub struct CommandVisionExtractor {
    pub program: String,
}

impl VisionExtractor for CommandVisionExtractor {
    fn extract(&self, document: &Path, range: PageRange, prompt: &str) -> Result<String> {
        let output = Command::new(&self.program)
            .arg(document)
            .arg(range.start.to_string())
            .arg(range.end.to_string())
            .env("TOCBUILD_VISION_PROMPT", prompt)
            .output()
            .with_context(|| format!("failed to execute vision command {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "vision command {} returned non-zero exit status for {}: {}",
                self.program,
                document.display(),
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

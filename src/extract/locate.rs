use anyhow::{Context, Result};
use regex::Regex;

use crate::config::{ESTIMATED_LINES_PER_PAGE, LOCATE_PROBE_RADIUS};

/// Finds the page carrying the outline listing. Keyword matching is
/// whole-word so "contents" inside a longer word never fires; a keyword page
/// is only accepted once it also shows numbered-line structure, which is
/// what separates an actual listing from a stray prose mention.
pub struct OutlineLocator {
    keyword_re: Regex,
    line_start_re: Regex,
    line_end_re: Regex,
}

impl OutlineLocator {
    pub fn new() -> Result<Self> {
        let keyword_re = Regex::new(r"(?i)\b(?:table of contents|contents?|index)\b")
            .context("failed to compile outline keyword regex")?;
        let line_start_re = Regex::new(r"^\s*\d{1,5}\.?(?:\s|$)")
            .context("failed to compile structural line-start regex")?;
        let line_end_re = Regex::new(r"(?:^|\s)\d{1,5}\.?\s*$")
            .context("failed to compile structural line-end regex")?;

        Ok(OutlineLocator {
            keyword_re,
            line_start_re,
            line_end_re,
        })
    }

    /// Returns the outline page number, or `None` for NOT_FOUND. `pages` is
    /// the primary text variant; `alternate` a second variant of the same
    /// pages (layout vs raw); `flat_text` an unpaginated fallback used for
    /// the lines-per-page estimate.
    pub fn locate(
        &self,
        pages: &[(u32, String)],
        alternate: Option<&[(u32, String)]>,
        flat_text: Option<&str>,
    ) -> Option<u32> {
        if let Some(page) = self.scan_pages(pages) {
            return Some(page);
        }

        if let Some(alternate) = alternate {
            if let Some(page) = self.scan_pages(alternate) {
                return Some(page);
            }
        }

        self.estimate_from_flat_text(flat_text?, pages)
    }

    fn scan_pages(&self, pages: &[(u32, String)]) -> Option<u32> {
        pages
            .iter()
            .find(|(_, text)| self.keyword_re.is_match(text) && self.has_structure(text))
            .map(|(page, _)| *page)
    }

    fn has_structure(&self, text: &str) -> bool {
        text.lines()
            .any(|line| self.line_start_re.is_match(line) || self.line_end_re.is_match(line))
    }

    /// Turns the keyword's raw line offset into a page estimate, probes the
    /// estimate and its immediate neighbors for structural confirmation, and
    /// otherwise settles on the estimate clamped to the sampled range.
    fn estimate_from_flat_text(&self, flat_text: &str, pages: &[(u32, String)]) -> Option<u32> {
        let keyword_line = flat_text
            .lines()
            .position(|line| self.keyword_re.is_match(line))?;

        let estimate = (keyword_line / ESTIMATED_LINES_PER_PAGE) as u32 + 1;

        let (first_page, last_page) = match (pages.first(), pages.last()) {
            (Some((first, _)), Some((last, _))) => (*first, *last),
            _ => return Some(estimate),
        };
        let clamped = estimate.clamp(first_page, last_page);

        let probe_start = clamped.saturating_sub(LOCATE_PROBE_RADIUS).max(first_page);
        let probe_end = (clamped + LOCATE_PROBE_RADIUS).min(last_page);
        for probe in probe_start..=probe_end {
            let confirmed = pages
                .iter()
                .find(|(page, _)| *page == probe)
                .map(|(_, text)| self.has_structure(text))
                .unwrap_or(false);
            if confirmed {
                return Some(probe);
            }
        }

        Some(clamped)
    }
}

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::{MIN_ENTRY_COUNT, MIN_PARSER_APPLICABILITY, MULTILINE_LOOKAHEAD};
use crate::extract::backends::TableGrid;
use crate::extract::columns::ColumnClassifier;
use crate::model::{OutlineEntry, PageRef};

/// Raw entries from one parser attempt plus how much of the input it could
/// account for. `applicability` is matched candidate lines over total
/// candidate lines; the orchestrator accepts the first parser in priority
/// order that clears both the applicability and entry-count floors.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub entries: Vec<OutlineEntry>,
    pub matched_lines: usize,
    pub candidate_lines: usize,
}

impl ParseOutcome {
    pub fn applicability(&self) -> f64 {
        if self.candidate_lines == 0 {
            0.0
        } else {
            self.matched_lines as f64 / self.candidate_lines as f64
        }
    }

    pub fn accepted(&self) -> bool {
        self.entries.len() >= MIN_ENTRY_COUNT && self.applicability() >= MIN_PARSER_APPLICABILITY
    }
}

const NUMBER_PATTERN: &str = r"\d+(?:\.\d+)*\.?|[IVXLCDMivxlcdm]{1,6}\.?|[A-Za-z][.)]";
const PAGE_PATTERN: &str = r"\d{1,4}(?:\s*[-\u{2013}]\s*\d{1,4})?";
const LEADER_PATTERN: &str = r"(?:[.\u{00B7}]\s?){2,}|-{2,}";

pub struct OutlineParsers {
    classifier: ColumnClassifier,
    entry_line_re: Regex,
    number_only_re: Regex,
    number_title_re: Regex,
    title_page_re: Regex,
    bare_page_re: Regex,
    fused_cell_re: Regex,
    leader_tail_re: Regex,
}

impl OutlineParsers {
    pub fn new() -> Result<Self> {
        let entry_line_re = Regex::new(&format!(
            r"^\s*({NUMBER_PATTERN})\s+(.+?)(?:\s*(?:{LEADER_PATTERN})|\s+)\s*({PAGE_PATTERN})\s*$"
        ))
        .context("failed to compile outline entry line regex")?;
        let number_only_re = Regex::new(&format!(r"^\s*({NUMBER_PATTERN})\s*$"))
            .context("failed to compile number-only line regex")?;
        let number_title_re = Regex::new(&format!(r"^\s*({NUMBER_PATTERN})\s+(\D.*?)\s*$"))
            .context("failed to compile number-title line regex")?;
        let title_page_re = Regex::new(&format!(
            r"^\s*(.+?)(?:\s*(?:{LEADER_PATTERN})|\s+)\s*({PAGE_PATTERN})\s*$"
        ))
        .context("failed to compile title-page line regex")?;
        let bare_page_re = Regex::new(&format!(r"^\s*({PAGE_PATTERN})\s*$"))
            .context("failed to compile bare page line regex")?;
        let fused_cell_re = Regex::new(&format!(
            r"^(.*?)(?:\s*(?:{LEADER_PATTERN})|\s+)({PAGE_PATTERN})\s*$"
        ))
        .context("failed to compile fused title-page cell regex")?;
        let leader_tail_re = Regex::new(r"(?:\s*[.\u{00B7}-]){2,}\s*$")
            .context("failed to compile leader tail regex")?;

        Ok(OutlineParsers {
            classifier: ColumnClassifier::new()?,
            entry_line_re,
            number_only_re,
            number_title_re,
            title_page_re,
            bare_page_re,
            fused_cell_re,
            leader_tail_re,
        })
    }

    /// Tabular strategy: column roles are inferred by content, rows become
    /// entries. A missing PAGE column falls back to splitting a fused
    /// title+page cell on a leader run or trailing digits; if that fails the
    /// page stays unknown rather than borrowing digits from a wrong column.
    pub fn parse_table(&self, grid: &TableGrid) -> ParseOutcome {
        let mut outcome = ParseOutcome {
            candidate_lines: grid.rows.len(),
            ..ParseOutcome::default()
        };

        let roles = self.classifier.infer_roles(&grid.rows);
        if roles.number.is_none() && roles.title.is_none() {
            return outcome;
        }

        for row in &grid.rows {
            let number = roles
                .number
                .and_then(|column| row.get(column))
                .map(|cell| normalize_number(cell))
                .unwrap_or_default();

            let mut title = roles
                .title
                .and_then(|column| row.get(column))
                .map(|cell| cell.trim().to_string())
                .unwrap_or_default();

            let mut page = roles
                .page
                .and_then(|column| row.get(column))
                .and_then(|cell| PageRef::parse(cell))
                .unwrap_or(PageRef::Unknown);

            if roles.page.is_none() {
                if let Some((split_title, split_page)) = self.split_fused_cell(&title) {
                    title = split_title;
                    page = split_page;
                }
            }

            let title = self.strip_leaders(&title);
            if number.is_empty() && title.is_empty() {
                continue;
            }

            outcome.matched_lines += 1;
            outcome.entries.push(OutlineEntry::new(number, title, page));
        }

        outcome
    }

    /// Dotted-leader strategy over plain text lines of the shape
    /// `<number> <title> <leaders> <page>`; the leader run is optional so
    /// clean space-separated listings parse too.
    pub fn parse_dotted(&self, text: &str) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();

        for line in text.lines() {
            let line = line.trim_end();
            if line.trim().is_empty() {
                continue;
            }
            outcome.candidate_lines += 1;

            let Some(captures) = self.entry_line_re.captures(line) else {
                continue;
            };

            let number = normalize_number(captures.get(1).map_or("", |m| m.as_str()));
            let title = self.strip_leaders(captures.get(2).map_or("", |m| m.as_str()));
            let page = captures
                .get(3)
                .and_then(|m| PageRef::parse(m.as_str()))
                .unwrap_or(PageRef::Unknown);

            if number.is_empty() && title.is_empty() {
                continue;
            }

            outcome.matched_lines += 1;
            outcome.entries.push(OutlineEntry::new(number, title, page));
        }

        outcome
    }

    /// Multi-line strategy for outlines where the number sits alone on one
    /// line and title+page follow, or number+title are followed by a bare
    /// page line. The cursor advances unconditionally when no continuation
    /// is found within the lookahead bound, so parsing always terminates in
    /// one pass over the lines.
    pub fn parse_multiline(&self, text: &str) -> ParseOutcome {
        let lines: Vec<&str> = text.lines().collect();
        let mut outcome = ParseOutcome {
            candidate_lines: lines.iter().filter(|line| !line.trim().is_empty()).count(),
            ..ParseOutcome::default()
        };

        let mut cursor = 0usize;
        'scan: while cursor < lines.len() {
            let line = lines[cursor].trim_end();
            if line.trim().is_empty() {
                cursor += 1;
                continue;
            }

            if let Some(captures) = self.number_only_re.captures(line) {
                let number = normalize_number(captures.get(1).map_or("", |m| m.as_str()));

                for offset in 1..=MULTILINE_LOOKAHEAD {
                    let Some(candidate) = lines.get(cursor + offset) else {
                        break;
                    };
                    if self.number_only_re.is_match(candidate) {
                        break;
                    }
                    if let Some(continuation) = self.title_page_re.captures(candidate) {
                        let title =
                            self.strip_leaders(continuation.get(1).map_or("", |m| m.as_str()));
                        let page = continuation
                            .get(2)
                            .and_then(|m| PageRef::parse(m.as_str()))
                            .unwrap_or(PageRef::Unknown);

                        if !title.is_empty() {
                            outcome.matched_lines += 2;
                            outcome.entries.push(OutlineEntry::new(number, title, page));
                            cursor += offset + 1;
                            continue 'scan;
                        }
                    }
                }

                cursor += 1;
                continue;
            }

            if !self.entry_line_re.is_match(line) && !self.bare_page_re.is_match(line) {
                if let Some(captures) = self.number_title_re.captures(line) {
                    let number = normalize_number(captures.get(1).map_or("", |m| m.as_str()));
                    let title = self.strip_leaders(captures.get(2).map_or("", |m| m.as_str()));

                    for offset in 1..=MULTILINE_LOOKAHEAD {
                        let Some(candidate) = lines.get(cursor + offset) else {
                            break;
                        };
                        if let Some(page_line) = self.bare_page_re.captures(candidate) {
                            let page = page_line
                                .get(1)
                                .and_then(|m| PageRef::parse(m.as_str()))
                                .unwrap_or(PageRef::Unknown);

                            if !title.is_empty() {
                                outcome.matched_lines += 2;
                                outcome.entries.push(OutlineEntry::new(number, title, page));
                                cursor += offset + 1;
                                continue 'scan;
                            }
                        }
                    }
                }
            }

            cursor += 1;
        }

        outcome
    }

    /// Priority ladder for one block of text: tabular grids first, then the
    /// dotted-leader parser, then the multi-line parser. Returns the first
    /// accepted outcome, or the best-effort outcome with the most entries
    /// when nothing clears the floors.
    pub fn parse_best(&self, text: &str, tables: &[TableGrid]) -> Option<ParseOutcome> {
        let mut best: Option<ParseOutcome> = None;

        for grid in tables {
            let outcome = self.parse_table(grid);
            if outcome.accepted() {
                return Some(outcome);
            }
            best = prefer(best, outcome);
        }

        let dotted = self.parse_dotted(text);
        if dotted.accepted() {
            return Some(dotted);
        }
        best = prefer(best, dotted);

        let multiline = self.parse_multiline(text);
        if multiline.accepted() {
            return Some(multiline);
        }
        best = prefer(best, multiline);

        best.filter(|outcome| !outcome.entries.is_empty())
    }

    fn split_fused_cell(&self, cell: &str) -> Option<(String, PageRef)> {
        let captures = self.fused_cell_re.captures(cell.trim())?;
        let title = captures.get(1).map_or("", |m| m.as_str());
        let page = PageRef::parse(captures.get(2).map_or("", |m| m.as_str()))?;
        if title.trim().is_empty() {
            return None;
        }
        Some((title.trim().to_string(), page))
    }

    fn strip_leaders(&self, title: &str) -> String {
        self.leader_tail_re.replace(title.trim(), "").trim().to_string()
    }
}

/// Lifts pipe tables out of markdown (the vision collaborator's usual
/// output) into grids for the tabular parser. Separator rows are dropped.
pub fn tables_from_markdown(text: &str) -> Vec<TableGrid> {
    let mut grids = Vec::new();
    let mut current = Vec::<Vec<String>>::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 1 {
            let cells: Vec<String> = trimmed
                .trim_matches('|')
                .split('|')
                .map(|cell| cell.trim().to_string())
                .collect();

            let is_separator = cells
                .iter()
                .all(|cell| !cell.is_empty() && cell.chars().all(|ch| matches!(ch, '-' | ':')));
            if !is_separator {
                current.push(cells);
            }
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

fn normalize_number(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_suffix('.')
        .or_else(|| trimmed.strip_suffix(')'))
        .unwrap_or(trimmed)
        .to_string()
}

fn prefer(best: Option<ParseOutcome>, candidate: ParseOutcome) -> Option<ParseOutcome> {
    match best {
        None => Some(candidate),
        Some(current) => {
            if candidate.entries.len() > current.entries.len() {
                Some(candidate)
            } else {
                Some(current)
            }
        }
    }
}

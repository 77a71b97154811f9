use anyhow::{Context, Result};
use regex::Regex;

use crate::config::{NUMBER_COLUMN_MIN_FRACTION, PAGE_COLUMN_MIN_FRACTION};
use crate::model::PageRef;

/// Role assignment for an unlabeled table: at most one column each for
/// NUMBER and PAGE, one TITLE, the rest ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnRoles {
    pub number: Option<usize>,
    pub title: Option<usize>,
    pub page: Option<usize>,
}

pub struct ColumnClassifier {
    label_re: Regex,
}

impl ColumnClassifier {
    pub fn new() -> Result<Self> {
        let label_re = Regex::new(r"^(?:\d+(?:\.\d+)*\.?|[IVXLCDMivxlcdm]{1,6}\.?|[A-Za-z]\.?)$")
            .context("failed to compile hierarchical label regex")?;
        Ok(ColumnClassifier { label_re })
    }

    /// Assigns roles by cell content. The PAGE column is whichever column
    /// parses as integers/ranges for the highest fraction of rows, and must
    /// clear a minimum fraction before claiming the role; outline tables
    /// are sometimes mirrored, so assuming "last column = page" picks a
    /// repeated or noise column instead.
    pub fn infer_roles(&self, rows: &[Vec<String>]) -> ColumnRoles {
        let column_count = rows.iter().map(Vec::len).max().unwrap_or(0);
        if column_count < 2 || rows.is_empty() {
            return ColumnRoles::default();
        }

        let mut page_fractions = vec![0.0_f64; column_count];
        let mut label_fractions = vec![0.0_f64; column_count];
        let mut mean_lengths = vec![0.0_f64; column_count];

        for column in 0..column_count {
            let mut page_hits = 0usize;
            let mut label_hits = 0usize;
            let mut populated = 0usize;
            let mut total_len = 0usize;

            for row in rows {
                let Some(cell) = row.get(column) else {
                    continue;
                };
                let cell = cell.trim();
                if cell.is_empty() {
                    continue;
                }
                populated += 1;
                total_len += cell.chars().count();

                if matches!(
                    PageRef::parse(cell),
                    Some(PageRef::Exact(_) | PageRef::Range { .. })
                ) {
                    page_hits += 1;
                }
                if self.label_re.is_match(cell) {
                    label_hits += 1;
                }
            }

            if populated > 0 {
                page_fractions[column] = page_hits as f64 / rows.len() as f64;
                label_fractions[column] = label_hits as f64 / rows.len() as f64;
                mean_lengths[column] = total_len as f64 / populated as f64;
            }
        }

        let mut roles = ColumnRoles::default();

        // Ties go to the rightmost qualifying column, where classic layouts
        // put the page; an unqualified column never wins by position.
        let mut best_page = PAGE_COLUMN_MIN_FRACTION;
        for column in 0..column_count {
            if page_fractions[column] >= best_page {
                best_page = page_fractions[column];
                roles.page = Some(column);
            }
        }

        // Same boundary semantics as PAGE: a column exactly at the floor
        // qualifies, ties go rightmost.
        let mut best_label = NUMBER_COLUMN_MIN_FRACTION;
        for column in 0..column_count {
            if roles.page == Some(column) {
                continue;
            }
            if label_fractions[column] >= best_label {
                best_label = label_fractions[column];
                roles.number = Some(column);
            }
        }

        let mut best_len = 0.0_f64;
        for column in 0..column_count {
            if roles.page == Some(column) || roles.number == Some(column) {
                continue;
            }
            if mean_lengths[column] > best_len {
                best_len = mean_lengths[column];
                roles.title = Some(column);
            }
        }

        roles
    }
}

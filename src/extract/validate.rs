use crate::config::{HIERARCHY_VIOLATION_PENALTY, MIN_ENTRY_COUNT};
use crate::model::{OutlineEntry, PageRef, PageStatus};

/// Outcome of the three validation rules plus the scalar confidence.
/// Entries are repaired, never dropped: violations degrade an entry to
/// RANGE or UNKNOWN and the confidence formula prices that in.
#[derive(Debug)]
pub struct ValidationReport {
    pub entries: Vec<OutlineEntry>,
    pub confidence: f64,
    pub bounds_violations: usize,
    pub monotonicity_repairs: usize,
    pub hierarchy_violations: usize,
}

/// Applies the bounds, monotonicity, and hierarchy rules and scores the
/// result. Confidence = (EXACT + 0.5 * RANGE) / total, floored at zero below
/// the minimum entry count; RANGE is rewarded partially because a range is
/// the honest output when a true page cannot be determined.
pub fn score(mut entries: Vec<OutlineEntry>, total_pages: u32) -> ValidationReport {
    let bounds_violations = apply_bounds_rule(&mut entries, total_pages);
    let monotonicity_repairs = apply_monotonicity_rule(&mut entries, total_pages);
    let hierarchy_violations = count_hierarchy_violations(&entries);

    let confidence = if entries.len() < MIN_ENTRY_COUNT {
        0.0
    } else {
        let exact = entries
            .iter()
            .filter(|entry| entry.status() == PageStatus::Exact)
            .count();
        let range = entries
            .iter()
            .filter(|entry| entry.status() == PageStatus::Range)
            .count();

        let base = (exact as f64 + 0.5 * range as f64) / entries.len() as f64;
        let penalty = HIERARCHY_VIOLATION_PENALTY * hierarchy_violations as f64;
        (base - penalty).clamp(0.0, 1.0)
    };

    ValidationReport {
        entries,
        confidence,
        bounds_violations,
        monotonicity_repairs,
        hierarchy_violations,
    }
}

/// Pages outside `[1, total_pages]` cannot be trusted at all and are
/// demoted to the unknown sentinel; ranges are clipped to the document.
fn apply_bounds_rule(entries: &mut [OutlineEntry], total_pages: u32) -> usize {
    if total_pages == 0 {
        return 0;
    }

    let mut violations = 0usize;
    for entry in entries.iter_mut() {
        match entry.page {
            PageRef::Exact(page) if page > total_pages => {
                entry.page = PageRef::Unknown;
                violations += 1;
            }
            PageRef::Range { start, end: _ } if start > total_pages => {
                entry.page = PageRef::Unknown;
                violations += 1;
            }
            PageRef::Range { start, end } if end > total_pages => {
                entry.page = if start == total_pages {
                    PageRef::Exact(start)
                } else {
                    PageRef::Range {
                        start,
                        end: total_pages,
                    }
                };
                violations += 1;
            }
            _ => {}
        }
    }

    violations
}

/// Page order must be non-decreasing in document order. An offending entry
/// is widened to the `[previous_page, next_known_page]` range instead of
/// being discarded; out-of-order pages are common in scanned outlines and
/// should degrade gracefully.
fn apply_monotonicity_rule(entries: &mut Vec<OutlineEntry>, total_pages: u32) -> usize {
    let mut repairs = 0usize;
    let mut previous: Option<u32> = None;

    for index in 0..entries.len() {
        let Some(key) = entries[index].page.ordering_key() else {
            continue;
        };

        let Some(floor) = previous else {
            previous = Some(key);
            continue;
        };

        if key >= floor {
            previous = Some(key);
            continue;
        }

        let next_known = entries[index + 1..]
            .iter()
            .filter_map(|entry| entry.page.ordering_key())
            .find(|page| *page >= floor)
            .or_else(|| (total_pages >= floor).then_some(total_pages))
            .unwrap_or(floor);

        entries[index].page = if next_known == floor {
            PageRef::Exact(floor)
        } else {
            PageRef::Range {
                start: floor,
                end: next_known,
            }
        };
        repairs += 1;
        previous = Some(floor);
    }

    repairs
}

/// Entry numbers should be non-decreasing in depth-first outline order
/// ("2", "2.1", "2.2", "3"). Violations dent confidence without touching
/// the entries; labels that are not dotted-numeric are skipped.
fn count_hierarchy_violations(entries: &[OutlineEntry]) -> usize {
    let mut violations = 0usize;
    let mut previous: Option<Vec<u32>> = None;

    for entry in entries {
        let Some(key) = hierarchy_key(&entry.number) else {
            continue;
        };

        if let Some(ref prev) = previous {
            if key < *prev {
                violations += 1;
                continue;
            }
        }
        previous = Some(key);
    }

    violations
}

fn hierarchy_key(number: &str) -> Option<Vec<u32>> {
    if number.is_empty() {
        return None;
    }
    number
        .split('.')
        .map(|part| part.parse::<u32>().ok())
        .collect()
}

use crate::config::SCANNED_MIN_TEXT_CHARS;
use crate::extract::backends::LayoutParse;
use crate::util::non_whitespace_char_count;

/// Per-page signal sampled from the front of a document.
#[derive(Debug, Clone, Copy)]
pub struct PageSample {
    pub layout_chars: usize,
    pub image_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_scanned: bool,
    /// Set when no page yielded text of any kind; the orchestrator treats
    /// downstream emptiness as grounds to skip.
    pub degraded: bool,
}

pub fn samples_from_layout(parse: &LayoutParse) -> Vec<PageSample> {
    parse
        .per_page_text
        .iter()
        .zip(parse.image_only_pages.iter().copied().chain(std::iter::repeat(false)))
        .map(|((_, text), image_only)| PageSample {
            layout_chars: non_whitespace_char_count(text),
            image_only,
        })
        .collect()
}

/// One scanned/native flag per document. A page votes "scanned" when its
/// layout text is near-empty while the extractor flags it image-only; the
/// document takes the majority vote, with the first page's vote breaking
/// ties. An empty or fully text-less sample is assumed scanned and marked
/// degraded.
pub fn classify(samples: &[PageSample]) -> Classification {
    if samples.is_empty() {
        return Classification {
            is_scanned: true,
            degraded: true,
        };
    }

    let scanned_votes = samples.iter().filter(|sample| votes_scanned(sample)).count();
    let native_votes = samples.len() - scanned_votes;

    let is_scanned = if scanned_votes != native_votes {
        scanned_votes > native_votes
    } else {
        votes_scanned(&samples[0])
    };

    let degraded = samples.iter().all(|sample| sample.layout_chars == 0);

    Classification {
        is_scanned: is_scanned || degraded,
        degraded,
    }
}

fn votes_scanned(sample: &PageSample) -> bool {
    sample.layout_chars < SCANNED_MIN_TEXT_CHARS && sample.image_only
}

pub mod stable;

use chrono::NaiveDate;

use crate::core::{ArtworkCandidate, CatalogMatch};

pub use stable::Ranker;

/// Normalize a title for exact-match comparison: trademark symbols dropped,
/// whitespace collapsed, case folded.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !matches!(c, '™' | '®' | '©'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether two titles are equal after normalization.
pub fn titles_match(a: &str, b: &str) -> bool {
    let a = normalize_title(a);
    !a.is_empty() && a == normalize_title(b)
}

/// Anything the ranker can order.
pub trait Rankable {
    fn rank_title(&self) -> &str;

    /// Source priority; only consulted when ranking images.
    fn is_official(&self) -> bool {
        false
    }

    fn rank_score(&self) -> Option<f64>;

    fn rank_release_date(&self) -> Option<NaiveDate> {
        None
    }
}

impl Rankable for CatalogMatch {
    fn rank_title(&self) -> &str {
        &self.title
    }

    fn is_official(&self) -> bool {
        self.kind.is_official()
    }

    fn rank_score(&self) -> Option<f64> {
        self.score
    }

    fn rank_release_date(&self) -> Option<NaiveDate> {
        self.release_date
    }
}

impl Rankable for ArtworkCandidate {
    fn rank_title(&self) -> &str {
        &self.title
    }

    fn is_official(&self) -> bool {
        self.provider_kind.is_official()
    }

    fn rank_score(&self) -> Option<f64> {
        self.score
    }
}

/// Candidate with its exact-match flag and input position
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate<T> {
    pub candidate: T,
    /// Normalized title equals the query
    pub exact: bool,
    /// Position in the ranker's input
    pub input_index: usize,
}

impl<T> RankedCandidate<T> {
    pub fn new(candidate: T, exact: bool, input_index: usize) -> Self {
        Self {
            candidate,
            exact,
            input_index,
        }
    }

    pub fn into_inner(self) -> T {
        self.candidate
    }
}

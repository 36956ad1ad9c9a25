use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::ProviderKind;

/// Text metadata for a game. Every field is optional; a provider fills
/// whatever subset it knows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GameDescription {
    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub release_date: Option<NaiveDate>,

    #[serde(default)]
    pub genres: Vec<String>,

    #[serde(default)]
    pub developers: Vec<String>,

    #[serde(default)]
    pub publishers: Vec<String>,

    /// Store categories / tags
    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default)]
    pub age_rating: Option<String>,

    /// Normalized 0-100 rating
    #[serde(default)]
    pub rating: Option<f64>,

    #[serde(default)]
    pub platforms: Vec<String>,
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}

impl GameDescription {
    pub fn is_empty(&self) -> bool {
        blank(&self.summary)
            && self.release_date.is_none()
            && self.genres.is_empty()
            && self.developers.is_empty()
            && self.publishers.is_empty()
            && self.categories.is_empty()
            && blank(&self.age_rating)
            && self.rating.is_none()
            && self.platforms.is_empty()
    }

    /// Fill every empty field of `self` from `other`; non-empty fields stay.
    pub fn fill_from(&mut self, other: &GameDescription) {
        if blank(&self.summary) && !blank(&other.summary) {
            self.summary = other.summary.clone();
        }
        if self.release_date.is_none() {
            self.release_date = other.release_date;
        }
        if self.genres.is_empty() {
            self.genres = other.genres.clone();
        }
        if self.developers.is_empty() {
            self.developers = other.developers.clone();
        }
        if self.publishers.is_empty() {
            self.publishers = other.publishers.clone();
        }
        if self.categories.is_empty() {
            self.categories = other.categories.clone();
        }
        if blank(&self.age_rating) && !blank(&other.age_rating) {
            self.age_rating = other.age_rating.clone();
        }
        if self.rating.is_none() {
            self.rating = other.rating;
        }
        if self.platforms.is_empty() {
            self.platforms = other.platforms.clone();
        }
    }

    /// Merge provider answers field by field: the first non-empty value in
    /// provider-priority order wins, regardless of arrival order.
    pub fn merge<I>(descriptions: I) -> GameDescription
    where
        I: IntoIterator<Item = (ProviderKind, GameDescription)>,
    {
        let mut ordered: Vec<(ProviderKind, GameDescription)> = descriptions.into_iter().collect();
        ordered.sort_by_key(|(kind, _)| *kind);

        let mut merged = GameDescription::default();
        for (_, description) in &ordered {
            merged.fill_from(description);
        }
        merged
    }
}

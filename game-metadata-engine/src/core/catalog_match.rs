use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// The four catalog families the engine knows about.
///
/// Declaration order is the description merge priority: the official store
/// wins over curated metadata, which wins over the general catalog, which
/// wins over the art-only community catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Steam store
    OfficialStore,
    /// IGDB
    CuratedMetadata,
    /// RAWG
    General,
    /// SteamGridDB
    CommunityArtwork,
}

impl ProviderKind {
    pub const PRIORITY: [ProviderKind; 4] = [
        ProviderKind::OfficialStore,
        ProviderKind::CuratedMetadata,
        ProviderKind::General,
        ProviderKind::CommunityArtwork,
    ];

    /// Images from this catalog outrank community uploads.
    pub fn is_official(&self) -> bool {
        matches!(self, ProviderKind::OfficialStore)
    }
}

/// One candidate identification of a game from a catalog search.
///
/// Immutable once produced: `external_id` is what every later
/// description/artwork call for this catalog keys on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogMatch {
    /// Provider-qualified id, `"<source>:<external_id>"`
    pub id: String,

    /// Title as the catalog spells it
    pub title: String,

    /// Provider name (steam, steamgriddb, igdb, rawg)
    pub source: String,

    /// Catalog family of `source`
    pub kind: ProviderKind,

    /// Id inside the catalog
    pub external_id: String,

    /// Stable official-store id when the catalog knows it (Steam app id)
    #[serde(default)]
    pub platform_hint_id: Option<String>,

    /// Provider-native relevance or rating score
    #[serde(default)]
    pub score: Option<f64>,

    #[serde(default)]
    pub release_date: Option<NaiveDate>,
}

impl CatalogMatch {
    pub fn new(
        kind: ProviderKind,
        source: impl Into<String>,
        external_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let source = source.into();
        let external_id = external_id.into();
        Self {
            id: format!("{}:{}", source, external_id),
            title: title.into(),
            source,
            kind,
            external_id,
            platform_hint_id: None,
            score: None,
            release_date: None,
        }
    }

    pub fn with_platform_hint(mut self, hint: impl Into<String>) -> Self {
        self.platform_hint_id = Some(hint.into());
        self
    }

    pub fn with_score(mut self, score: Option<f64>) -> Self {
        self.score = score;
        self
    }

    pub fn with_release_date(mut self, date: Option<NaiveDate>) -> Self {
        self.release_date = date;
        self
    }

    /// Split a provider-qualified id into `(source, external_id)`.
    pub fn parse_id(id: &str) -> Result<(&str, &str)> {
        match id.split_once(':') {
            Some((source, external)) if !source.is_empty() && !external.is_empty() => {
                Ok((source, external))
            }
            _ => Err(EngineError::Validation(format!("Malformed match id: '{}'", id))),
        }
    }

    /// Get display name (for logging/UI)
    pub fn display_name(&self) -> String {
        match self.release_date {
            Some(date) => format!("{} ({}) [{}]", self.title, date.format("%Y"), self.source),
            None => format!("{} [{}]", self.title, self.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_creation() {
        let m = CatalogMatch::new(ProviderKind::OfficialStore, "steam", "220", "Half-Life 2");
        assert_eq!(m.id, "steam:220");
        assert_eq!(m.external_id, "220");
        assert!(m.platform_hint_id.is_none());
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(CatalogMatch::parse_id("steam:220").unwrap(), ("steam", "220"));
        assert_eq!(
            CatalogMatch::parse_id("steamgriddb:game/42").unwrap(),
            ("steamgriddb", "game/42")
        );
        assert!(CatalogMatch::parse_id("steam").is_err());
        assert!(CatalogMatch::parse_id(":220").is_err());
        assert!(CatalogMatch::parse_id("steam:").is_err());
    }

    #[test]
    fn test_priority_order_matches_declaration() {
        let mut kinds = vec![
            ProviderKind::CommunityArtwork,
            ProviderKind::General,
            ProviderKind::OfficialStore,
            ProviderKind::CuratedMetadata,
        ];
        kinds.sort();
        assert_eq!(kinds, ProviderKind::PRIORITY.to_vec());
    }

    #[test]
    fn test_display_name() {
        let m = CatalogMatch::new(ProviderKind::General, "rawg", "13537", "Half-Life 2")
            .with_release_date(NaiveDate::from_ymd_opt(2004, 11, 16));
        assert_eq!(m.display_name(), "Half-Life 2 (2004) [rawg]");
    }
}

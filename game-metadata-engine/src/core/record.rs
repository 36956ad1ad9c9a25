use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{AssetKind, GameArtwork, GameDescription};

/// A library entry as the record store hands it out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameRecord {
    pub id: String,

    /// Locally-known title
    pub title: String,

    /// Stable official-store identifier (Steam app id) once known
    #[serde(default)]
    pub platform_id: Option<String>,

    #[serde(default)]
    pub description: GameDescription,

    #[serde(default)]
    pub artwork: GameArtwork,

    /// Set when the user chose to skip automatic matching for this game
    #[serde(default)]
    pub metadata_ignored: bool,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl GameRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            platform_id: None,
            description: GameDescription::default(),
            artwork: GameArtwork::default(),
            metadata_ignored: false,
            updated_at: None,
        }
    }

    pub fn with_platform_id(mut self, platform_id: impl Into<String>) -> Self {
        self.platform_id = Some(platform_id.into());
        self
    }

    pub fn has_boxart(&self) -> bool {
        self.artwork.get(AssetKind::BoxArt).is_some()
    }

    pub fn has_banner(&self) -> bool {
        self.artwork.get(AssetKind::Banner).is_some()
    }

    /// Stable platform id, if one is set and non-blank.
    pub fn stable_platform_id(&self) -> Option<&str> {
        self.platform_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}

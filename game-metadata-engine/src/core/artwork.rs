use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::ProviderKind;

/// The artwork slots a game record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    BoxArt,
    Banner,
    Logo,
    Hero,
    Icon,
}

impl AssetKind {
    pub const ALL: [AssetKind; 5] = [
        AssetKind::BoxArt,
        AssetKind::Banner,
        AssetKind::Logo,
        AssetKind::Hero,
        AssetKind::Icon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::BoxArt => "boxart",
            AssetKind::Banner => "banner",
            AssetKind::Logo => "logo",
            AssetKind::Hero => "hero",
            AssetKind::Icon => "icon",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known pixel size of an asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetHint {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl AssetHint {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
        }
    }
}

/// Artwork URLs for a game.
///
/// An artwork object with every URL absent means "no artwork", never an
/// error; adapters hand one back when a lookup fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GameArtwork {
    #[serde(default)]
    pub box_art_url: Option<String>,

    #[serde(default)]
    pub banner_url: Option<String>,

    #[serde(default)]
    pub logo_url: Option<String>,

    #[serde(default)]
    pub hero_url: Option<String>,

    #[serde(default)]
    pub icon_url: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hints: BTreeMap<AssetKind, AssetHint>,
}

impl GameArtwork {
    /// Artwork with no assets; what a failed lookup returns.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: AssetKind) -> Option<&str> {
        let slot = match kind {
            AssetKind::BoxArt => &self.box_art_url,
            AssetKind::Banner => &self.banner_url,
            AssetKind::Logo => &self.logo_url,
            AssetKind::Hero => &self.hero_url,
            AssetKind::Icon => &self.icon_url,
        };
        slot.as_deref().filter(|url| !url.trim().is_empty())
    }

    fn slot_mut(&mut self, kind: AssetKind) -> &mut Option<String> {
        match kind {
            AssetKind::BoxArt => &mut self.box_art_url,
            AssetKind::Banner => &mut self.banner_url,
            AssetKind::Logo => &mut self.logo_url,
            AssetKind::Hero => &mut self.hero_url,
            AssetKind::Icon => &mut self.icon_url,
        }
    }

    pub fn set(&mut self, kind: AssetKind, url: impl Into<String>, hint: Option<AssetHint>) {
        *self.slot_mut(kind) = Some(url.into());
        match hint {
            Some(hint) => {
                self.hints.insert(kind, hint);
            }
            None => {
                self.hints.remove(&kind);
            }
        }
    }

    pub fn clear(&mut self, kind: AssetKind) {
        *self.slot_mut(kind) = None;
        self.hints.remove(&kind);
    }

    /// Replace only the URL, keeping any size hint (used when a remote URL
    /// is rewritten to its cached copy).
    pub fn rewrite(&mut self, kind: AssetKind, url: impl Into<String>) {
        *self.slot_mut(kind) = Some(url.into());
    }

    pub fn is_empty(&self) -> bool {
        AssetKind::ALL.iter().all(|kind| self.get(*kind).is_none())
    }

    /// Present assets as `(kind, url)` pairs.
    pub fn assets(&self) -> Vec<(AssetKind, &str)> {
        AssetKind::ALL
            .iter()
            .filter_map(|kind| self.get(*kind).map(|url| (*kind, url)))
            .collect()
    }

    /// Fill every empty slot from `other`.
    pub fn fill_from(&mut self, other: &GameArtwork) {
        for kind in AssetKind::ALL {
            if self.get(kind).is_none() {
                if let Some(url) = other.get(kind) {
                    self.set(kind, url, other.hints.get(&kind).copied());
                }
            }
        }
    }

    /// Slots whose URL differs between `self` and `previous`.
    pub fn changed_kinds(&self, previous: &GameArtwork) -> Vec<AssetKind> {
        AssetKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind) != previous.get(*kind))
            .collect()
    }
}

/// One image offer for a single slot, as shown in the missing-artwork dialog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtworkCandidate {
    pub url: String,
    pub kind: AssetKind,
    /// Provider name
    pub source: String,
    pub provider_kind: ProviderKind,
    /// Title of the catalog entry the image belongs to
    pub title: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub hint: Option<AssetHint>,
}

impl ArtworkCandidate {
    pub fn new(
        kind: AssetKind,
        url: impl Into<String>,
        source: impl Into<String>,
        provider_kind: ProviderKind,
        title: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            kind,
            source: source.into(),
            provider_kind,
            title: title.into(),
            score: None,
            hint: None,
        }
    }

    pub fn with_score(mut self, score: Option<f64>) -> Self {
        self.score = score;
        self
    }

    pub fn with_hint(mut self, hint: Option<AssetHint>) -> Self {
        self.hint = hint;
        self
    }

    /// One candidate per present slot of `artwork`.
    pub fn from_artwork(
        artwork: &GameArtwork,
        source: &str,
        provider_kind: ProviderKind,
        title: &str,
    ) -> Vec<ArtworkCandidate> {
        artwork
            .assets()
            .into_iter()
            .map(|(kind, url)| {
                ArtworkCandidate::new(kind, url, source, provider_kind, title)
                    .with_hint(artwork.hints.get(&kind).copied())
            })
            .collect()
    }
}

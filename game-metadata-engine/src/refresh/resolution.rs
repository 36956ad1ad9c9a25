use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{CatalogMatch, MissingBoxartGame, UnmatchedGame};

/// The user's answer to the unmatched-games dialog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedResolution {
    /// Game id to the match the user picked
    #[serde(default)]
    pub chosen: BTreeMap<String, CatalogMatch>,
    /// Games the user chose to skip; marked so later runs leave them alone
    #[serde(default)]
    pub ignored: BTreeSet<String>,
}

impl UnmatchedResolution {
    pub fn is_empty(&self) -> bool {
        self.chosen.is_empty() && self.ignored.is_empty()
    }
}

/// Game id to the box-art URL the user picked.
pub type ArtworkResolution = BTreeMap<String, String>;

/// Presentation layer that answers the two pause states.
#[async_trait]
pub trait ResolutionUi: Send + Sync {
    async fn present_unmatched(&self, games: &[UnmatchedGame]) -> UnmatchedResolution;

    async fn present_missing_artwork(&self, games: &[MissingBoxartGame]) -> ArtworkResolution;
}

pub mod aliases;
pub mod http;
pub mod igdb;
pub mod rawg;
pub mod steam;
pub mod steamgriddb;

use async_trait::async_trait;

use crate::core::{ArtworkCandidate, CatalogMatch, GameArtwork, GameDescription, ProviderKind};
use crate::error::CatalogError;

pub use aliases::{TitleAlias, TitleAliases};
pub use igdb::IgdbProvider;
pub use rawg::RawgProvider;
pub use steam::SteamProvider;
pub use steamgriddb::SteamGridDbProvider;

/// One external catalog (Steam, SteamGridDB, IGDB, RAWG).
///
/// Only `search` reports errors. Description and artwork lookups swallow
/// their own failures: `get_description` returns `None` when the catalog
/// never has text metadata, and `get_artwork` on an artwork-capable catalog
/// returns an empty [`GameArtwork`] rather than `None` when a lookup fails.
#[async_trait]
pub trait GameProvider: Send + Sync {
    /// Get provider name
    fn name(&self) -> &str;

    /// Catalog family, used for merge priority and image ranking
    fn kind(&self) -> ProviderKind;

    /// Search by title. Empty vec when nothing matched.
    async fn search(
        &self,
        title: &str,
        platform_hint: Option<&str>,
    ) -> Result<Vec<CatalogMatch>, CatalogError>;

    async fn get_description(&self, catalog_match: &CatalogMatch) -> Option<GameDescription>;

    async fn get_artwork(
        &self,
        catalog_match: &CatalogMatch,
        platform_hint: Option<&str>,
    ) -> Option<GameArtwork>;

    /// Every image this catalog offers for the match, one per present slot
    /// unless the catalog can list alternatives.
    async fn artwork_candidates(
        &self,
        catalog_match: &CatalogMatch,
        platform_hint: Option<&str>,
    ) -> Vec<ArtworkCandidate> {
        match self.get_artwork(catalog_match, platform_hint).await {
            Some(artwork) => {
                ArtworkCandidate::from_artwork(&artwork, self.name(), self.kind(), &catalog_match.title)
            }
            None => Vec::new(),
        }
    }

    /// Build a match straight from a stable official-store id, skipping the
    /// title search. `None` when this catalog cannot key on that id.
    async fn lookup_match(&self, _platform_id: &str, _title: &str) -> Option<CatalogMatch> {
        None
    }

    /// Check if provider is available (credentials present)
    fn is_available(&self) -> bool {
        true
    }

    /// Drop anything memoized from earlier lookups.
    fn clear_cache(&self) {}
}

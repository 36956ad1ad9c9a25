use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::ProviderTimeouts;
use crate::core::{
    ArtworkCandidate, AssetHint, AssetKind, CatalogMatch, GameArtwork, GameDescription, ProviderKind,
};
use crate::error::CatalogError;
use crate::providers::{http, GameProvider};

const PROVIDER_NAME: &str = "steamgriddb";
const API_BASE: &str = "https://www.steamgriddb.com/api/v2";
const BOXART_DIMENSIONS: &str = "600x900";

/// SteamGridDB provider (community artwork catalog). Art only, no text
/// metadata.
pub struct SteamGridDbProvider {
    client: Client,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SgdbGame {
    id: u64,
    name: String,
    /// Unix timestamp
    #[serde(default)]
    release_date: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct SgdbAsset {
    url: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    nsfw: bool,
    #[serde(default)]
    humor: bool,
    #[serde(default)]
    epilepsy: bool,
}

impl SgdbAsset {
    fn is_safe(&self) -> bool {
        !(self.nsfw || self.humor || self.epilepsy) && !self.url.trim().is_empty()
    }

    fn hint(&self) -> Option<AssetHint> {
        match (self.width, self.height) {
            (None, None) => None,
            (width, height) => Some(AssetHint { width, height }),
        }
    }
}

/// Assets for one category, or the error that category hit.
type Category = Result<Vec<SgdbAsset>, CatalogError>;

fn safe_assets(category: Category, label: &str, title: &str) -> Vec<SgdbAsset> {
    match category {
        Ok(assets) => assets.into_iter().filter(SgdbAsset::is_safe).collect(),
        Err(e) => {
            tracing::warn!("SteamGridDB {} lookup failed for {}: {}", label, title, e);
            Vec::new()
        }
    }
}

/// Highest score wins; the first of equal scores is kept.
fn best(assets: &[SgdbAsset]) -> Option<&SgdbAsset> {
    assets
        .iter()
        .fold(None, |best: Option<&SgdbAsset>, asset| match best {
            Some(current) if current.score >= asset.score => Some(current),
            _ => Some(asset),
        })
}

/// Combine the three category lookups. Each category stands alone: an error
/// in one leaves the others untouched.
fn assemble_artwork(grids: Category, heroes: Category, logos: Category, title: &str) -> GameArtwork {
    let grids = safe_assets(grids, "grid", title);
    let heroes = safe_assets(heroes, "hero", title);
    let logos = safe_assets(logos, "logo", title);

    let mut artwork = GameArtwork::none();
    if let Some(grid) = best(&grids) {
        artwork.set(AssetKind::BoxArt, &grid.url, grid.hint());
    }
    if let Some(hero) = best(&heroes) {
        artwork.set(AssetKind::Banner, &hero.url, hero.hint());
        artwork.set(AssetKind::Hero, &hero.url, hero.hint());
    }
    if let Some(logo) = best(&logos) {
        artwork.set(AssetKind::Logo, &logo.url, logo.hint());
    }
    artwork
}

fn candidates_for(kind: AssetKind, assets: &[SgdbAsset], title: &str) -> Vec<ArtworkCandidate> {
    assets
        .iter()
        .map(|asset| {
            ArtworkCandidate::new(kind, &asset.url, PROVIDER_NAME, ProviderKind::CommunityArtwork, title)
                .with_score(Some(asset.score as f64))
                .with_hint(asset.hint())
        })
        .collect()
}

/// `game/<id>` or `steam/<appid>`, digits only after the slash.
fn valid_external_id(id: &str) -> bool {
    match id.split_once('/') {
        Some(("game" | "steam", rest)) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()),
        _ => false,
    }
}

fn steam_hint(hint: Option<&str>) -> Option<String> {
    hint.map(str::trim)
        .filter(|h| !h.is_empty() && h.chars().all(|c| c.is_ascii_digit()))
        .map(|h| format!("steam/{}", h))
}

impl SteamGridDbProvider {
    pub fn new(api_key: Option<String>, timeouts: &ProviderTimeouts) -> Result<Self, CatalogError> {
        Ok(Self {
            client: http::build_client(PROVIDER_NAME, timeouts.community())?,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    fn api_key(&self) -> Result<&str, CatalogError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| CatalogError::MissingCredentials {
                provider: PROVIDER_NAME.to_string(),
            })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CatalogError> {
        let key = self.api_key()?;
        let request = self
            .client
            .get(format!("{}{}", API_BASE, path))
            .bearer_auth(key);

        let envelope: Envelope<T> = http::get_json(PROVIDER_NAME, request).await?;
        match envelope.data {
            Some(data) if envelope.success => Ok(data),
            _ => Err(CatalogError::parse(PROVIDER_NAME, format!("unsuccessful response for {}", path))),
        }
    }

    /// External id to use for asset endpoints.
    fn asset_key(catalog_match: &CatalogMatch, platform_hint: Option<&str>) -> Option<String> {
        if catalog_match.source == PROVIDER_NAME && valid_external_id(&catalog_match.external_id) {
            return Some(catalog_match.external_id.clone());
        }
        steam_hint(platform_hint).or_else(|| steam_hint(catalog_match.platform_hint_id.as_deref()))
    }

    async fn fetch_categories(&self, key: &str) -> (Category, Category, Category) {
        let grids_path = format!("/grids/{}?dimensions={}", key, BOXART_DIMENSIONS);
        let heroes_path = format!("/heroes/{}", key);
        let logos_path = format!("/logos/{}", key);

        tokio::join!(
            self.get::<Vec<SgdbAsset>>(&grids_path),
            self.get::<Vec<SgdbAsset>>(&heroes_path),
            self.get::<Vec<SgdbAsset>>(&logos_path),
        )
    }
}

#[async_trait]
impl GameProvider for SteamGridDbProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::CommunityArtwork
    }

    async fn search(
        &self,
        title: &str,
        platform_hint: Option<&str>,
    ) -> Result<Vec<CatalogMatch>, CatalogError> {
        if self.api_key.is_none() {
            tracing::debug!("SteamGridDB: no API key, skipping search for '{}'", title);
            return Ok(Vec::new());
        }
        let title = title.trim();
        if title.is_empty() {
            return Ok(Vec::new());
        }

        let path = format!("/search/autocomplete/{}", urlencoding::encode(title));
        let games: Vec<SgdbGame> = self.get(&path).await?;

        let hint = platform_hint.map(str::trim).filter(|h| !h.is_empty());
        Ok(games
            .into_iter()
            .map(|game| {
                let m = CatalogMatch::new(
                    ProviderKind::CommunityArtwork,
                    PROVIDER_NAME,
                    format!("game/{}", game.id),
                    game.name,
                )
                .with_release_date(
                    game.release_date
                        .and_then(|ts| DateTime::from_timestamp(ts, 0))
                        .map(|dt| dt.date_naive()),
                );
                match hint {
                    Some(hint) => m.with_platform_hint(hint),
                    None => m,
                }
            })
            .collect())
    }

    async fn get_description(&self, _catalog_match: &CatalogMatch) -> Option<GameDescription> {
        None
    }

    async fn get_artwork(
        &self,
        catalog_match: &CatalogMatch,
        platform_hint: Option<&str>,
    ) -> Option<GameArtwork> {
        if self.api_key.is_none() {
            return Some(GameArtwork::none());
        }
        let Some(key) = Self::asset_key(catalog_match, platform_hint) else {
            tracing::debug!("SteamGridDB: no usable id for {}", catalog_match.title);
            return Some(GameArtwork::none());
        };

        let (grids, heroes, logos) = self.fetch_categories(&key).await;
        Some(assemble_artwork(grids, heroes, logos, &catalog_match.title))
    }

    async fn artwork_candidates(
        &self,
        catalog_match: &CatalogMatch,
        platform_hint: Option<&str>,
    ) -> Vec<ArtworkCandidate> {
        if self.api_key.is_none() {
            return Vec::new();
        }
        let Some(key) = Self::asset_key(catalog_match, platform_hint) else {
            return Vec::new();
        };

        let (grids, heroes, logos) = self.fetch_categories(&key).await;
        let title = catalog_match.title.as_str();

        let mut candidates = candidates_for(AssetKind::BoxArt, &safe_assets(grids, "grid", title), title);
        let heroes = safe_assets(heroes, "hero", title);
        candidates.extend(candidates_for(AssetKind::Banner, &heroes, title));
        candidates.extend(candidates_for(AssetKind::Hero, &heroes, title));
        candidates.extend(candidates_for(AssetKind::Logo, &safe_assets(logos, "logo", title), title));
        candidates
    }

    async fn lookup_match(&self, platform_id: &str, title: &str) -> Option<CatalogMatch> {
        let key = steam_hint(Some(platform_id))?;
        if self.api_key.is_none() {
            return None;
        }
        Some(
            CatalogMatch::new(ProviderKind::CommunityArtwork, PROVIDER_NAME, key, title)
                .with_platform_hint(platform_id.trim()),
        )
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;

use crate::config::ProviderTimeouts;
use crate::core::{AssetKind, CatalogMatch, GameArtwork, GameDescription, ProviderKind};
use crate::error::CatalogError;
use crate::providers::{http, GameProvider};

const PROVIDER_NAME: &str = "rawg";
const API_BASE: &str = "https://api.rawg.io/api";
const PAGE_SIZE: usize = 20;

/// RAWG provider (general catalog). Text metadata plus one background
/// image, used as banner and hero.
pub struct RawgProvider {
    client: Client,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<RawgGame>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawgGame {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    released: Option<String>,
    #[serde(default)]
    background_image: Option<String>,
    /// 0-5 user rating
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    metacritic: Option<u32>,
    #[serde(default)]
    description_raw: Option<String>,
    #[serde(default)]
    genres: Vec<Named>,
    #[serde(default)]
    developers: Vec<Named>,
    #[serde(default)]
    publishers: Vec<Named>,
    #[serde(default)]
    tags: Vec<Named>,
    #[serde(default)]
    platforms: Option<Vec<PlatformEntry>>,
    #[serde(default)]
    esrb_rating: Option<Named>,
}

#[derive(Debug, Clone, Deserialize)]
struct Named {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PlatformEntry {
    platform: Named,
}

fn names(items: &[Named]) -> Vec<String> {
    items
        .iter()
        .map(|n| n.name.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

impl RawgGame {
    fn release_date(&self) -> Option<NaiveDate> {
        self.released
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    }

    /// 0-100; metacritic when present, else the user rating scaled up.
    fn score(&self) -> Option<f64> {
        self.metacritic
            .map(f64::from)
            .or_else(|| self.rating.filter(|r| *r > 0.0).map(|r| r * 20.0))
    }

    fn to_match(&self) -> CatalogMatch {
        CatalogMatch::new(ProviderKind::General, PROVIDER_NAME, self.id.to_string(), &self.name)
            .with_score(self.score())
            .with_release_date(self.release_date())
    }

    fn to_description(&self) -> GameDescription {
        GameDescription {
            summary: self.description_raw.clone().filter(|s| !s.trim().is_empty()),
            release_date: self.release_date(),
            genres: names(&self.genres),
            developers: names(&self.developers),
            publishers: names(&self.publishers),
            categories: names(&self.tags),
            age_rating: self.esrb_rating.as_ref().map(|r| r.name.clone()),
            rating: self.score(),
            platforms: self
                .platforms
                .iter()
                .flatten()
                .map(|p| p.platform.name.clone())
                .collect(),
        }
    }

    fn to_artwork(&self) -> GameArtwork {
        let mut artwork = GameArtwork::none();
        if let Some(url) = self.background_image.as_deref().filter(|u| !u.trim().is_empty()) {
            artwork.set(AssetKind::Banner, url, None);
            artwork.set(AssetKind::Hero, url, None);
        }
        artwork
    }
}

impl RawgProvider {
    pub fn new(api_key: Option<String>, timeouts: &ProviderTimeouts) -> Result<Self, CatalogError> {
        Ok(Self {
            client: http::build_client(PROVIDER_NAME, timeouts.general())?,
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

    async fn game(&self, id: &str) -> Result<RawgGame, CatalogError> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(CatalogError::InvalidId {
                provider: PROVIDER_NAME.to_string(),
                id: id.to_string(),
            });
        }
        let key = self.api_key()?;
        let request = self
            .client
            .get(format!("{}/games/{}?key={}", API_BASE, id, urlencoding::encode(key)));
        http::get_json(PROVIDER_NAME, request).await
    }
}

#[async_trait]
impl GameProvider for RawgProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::General
    }

    async fn search(
        &self,
        title: &str,
        _platform_hint: Option<&str>,
    ) -> Result<Vec<CatalogMatch>, CatalogError> {
        let Ok(key) = self.api_key() else {
            tracing::debug!("RAWG: no API key, skipping search for '{}'", title);
            return Ok(Vec::new());
        };
        let title = title.trim();
        if title.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/games?key={}&search={}&page_size={}",
            API_BASE,
            urlencoding::encode(key),
            urlencoding::encode(title),
            PAGE_SIZE
        );
        let page: SearchPage = http::get_json(PROVIDER_NAME, self.client.get(url)).await?;

        Ok(page.results.iter().map(RawgGame::to_match).collect())
    }

    async fn get_description(&self, catalog_match: &CatalogMatch) -> Option<GameDescription> {
        match self.game(&catalog_match.external_id).await {
            Ok(game) => Some(game.to_description()),
            Err(e) => {
                tracing::warn!("RAWG description failed for {}: {}", catalog_match.title, e);
                Some(GameDescription::default())
            }
        }
    }

    async fn get_artwork(
        &self,
        catalog_match: &CatalogMatch,
        _platform_hint: Option<&str>,
    ) -> Option<GameArtwork> {
        match self.game(&catalog_match.external_id).await {
            Ok(game) => Some(game.to_artwork()),
            Err(e) => {
                tracing::warn!("RAWG artwork failed for {}: {}", catalog_match.title, e);
                Some(GameArtwork::none())
            }
        }
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL_JSON: &str = r#"{
        "id": 13537,
        "slug": "half-life-2",
        "name": "Half-Life 2",
        "released": "2004-11-16",
        "background_image": "https://media.rawg.io/media/games/b8c/bg.jpg",
        "rating": 4.48,
        "metacritic": 96,
        "description_raw": "Gordon Freeman became the most popular nerd in the world.",
        "genres": [{"id": 2, "name": "Shooter"}],
        "developers": [{"id": 1, "name": "Valve Software"}],
        "publishers": [{"id": 1, "name": "Valve"}],
        "tags": [{"id": 31, "name": "Singleplayer"}],
        "platforms": [{"platform": {"id": 4, "name": "PC"}}],
        "esrb_rating": {"id": 4, "name": "Mature"}
    }"#;

    #[test]
    fn test_detail_to_description() {
        let game: RawgGame = serde_json::from_str(DETAIL_JSON).unwrap();
        let description = game.to_description();

        assert_eq!(description.rating, Some(96.0));
        assert_eq!(description.categories, vec!["Singleplayer".to_string()]);
        assert_eq!(description.platforms, vec!["PC".to_string()]);
        assert_eq!(description.age_rating.as_deref(), Some("Mature"));
        assert_eq!(description.release_date, NaiveDate::from_ymd_opt(2004, 11, 16));
    }

    #[test]
    fn test_background_becomes_banner_and_hero() {
        let game: RawgGame = serde_json::from_str(DETAIL_JSON).unwrap();
        let artwork = game.to_artwork();

        assert!(artwork.box_art_url.is_none());
        assert_eq!(
            artwork.banner_url.as_deref(),
            Some("https://media.rawg.io/media/games/b8c/bg.jpg")
        );
        assert_eq!(artwork.banner_url, artwork.hero_url);
    }

    #[test]
    fn test_search_page_to_matches() {
        let page: SearchPage = serde_json::from_str(
            r#"{"count": 2, "results": [
                {"id": 13537, "name": "Half-Life 2", "released": "2004-11-16", "rating": 4.48, "metacritic": null, "platforms": null},
                {"id": 1, "name": "Half-Life 2: Lost Coast", "released": null}
            ]}"#,
        )
        .unwrap();
        let matches: Vec<CatalogMatch> = page.results.iter().map(RawgGame::to_match).collect();

        assert_eq!(matches[0].id, "rawg:13537");
        assert!((matches[0].score.unwrap() - 89.6).abs() < 1e-9);
        assert!(matches[1].score.is_none());
        assert!(matches[1].release_date.is_none());
    }

    #[tokio::test]
    async fn test_without_key() {
        let provider = RawgProvider::new(Some("  ".into()), &ProviderTimeouts::default()).unwrap();
        assert!(!provider.is_available());
        assert!(provider.search("Half-Life 2", None).await.unwrap().is_empty());

        let m = CatalogMatch::new(ProviderKind::General, PROVIDER_NAME, "13537", "Half-Life 2");
        assert_eq!(provider.get_artwork(&m, None).await, Some(GameArtwork::none()));
    }

    #[tokio::test]
    #[ignore] // Requires network access and RAWG_API_KEY
    async fn test_rawg_search() {
        let provider =
            RawgProvider::new(std::env::var("RAWG_API_KEY").ok(), &ProviderTimeouts::default()).unwrap();
        let results = provider.search("Half-Life 2", None).await.unwrap();
        assert!(results.iter().any(|m| m.title == "Half-Life 2"));
    }
}

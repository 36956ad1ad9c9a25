use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use serde::Deserialize;

use crate::config::ProviderTimeouts;
use crate::core::{AssetHint, AssetKind, CatalogMatch, GameArtwork, GameDescription, ProviderKind};
use crate::error::CatalogError;
use crate::providers::{http, GameProvider};

const PROVIDER_NAME: &str = "igdb";
const GAMES_URL: &str = "https://api.igdb.com/v4/games";
const IMAGE_BASE: &str = "https://images.igdb.com/igdb/image/upload";
const FIELDS: &str = "fields name,summary,first_release_date,total_rating,genres.name,\
platforms.name,involved_companies.company.name,involved_companies.developer,\
involved_companies.publisher,age_ratings.category,age_ratings.rating,cover.image_id,\
artworks.image_id,external_games.category,external_games.uid;";
const SEARCH_LIMIT: usize = 20;
/// `external_games.category` value for Steam
const STEAM_CATEGORY: i64 = 1;

/// IGDB provider (curated metadata catalog).
pub struct IgdbProvider {
    client: Client,
    credentials: Option<(String, String)>,
    games: Mutex<HashMap<String, IgdbGame>>,
}

#[derive(Debug, Clone, Deserialize)]
struct IgdbGame {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    first_release_date: Option<i64>,
    #[serde(default)]
    total_rating: Option<f64>,
    #[serde(default)]
    genres: Vec<Named>,
    #[serde(default)]
    platforms: Vec<Named>,
    #[serde(default)]
    involved_companies: Vec<InvolvedCompany>,
    #[serde(default)]
    age_ratings: Vec<AgeRating>,
    #[serde(default)]
    cover: Option<Image>,
    #[serde(default)]
    artworks: Vec<Image>,
    #[serde(default)]
    external_games: Vec<ExternalGame>,
}

#[derive(Debug, Clone, Deserialize)]
struct Named {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct InvolvedCompany {
    company: Option<Named>,
    #[serde(default)]
    developer: bool,
    #[serde(default)]
    publisher: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct AgeRating {
    #[serde(default)]
    category: i64,
    #[serde(default)]
    rating: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct Image {
    image_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ExternalGame {
    #[serde(default)]
    category: Option<i64>,
    #[serde(default)]
    uid: Option<String>,
}

fn age_rating_label(rating: &AgeRating) -> Option<String> {
    let label = match (rating.category, rating.rating) {
        (2, 1) => "PEGI 3",
        (2, 2) => "PEGI 7",
        (2, 3) => "PEGI 12",
        (2, 4) => "PEGI 16",
        (2, 5) => "PEGI 18",
        (1, 7) => "ESRB EC",
        (1, 8) => "ESRB E",
        (1, 9) => "ESRB E10+",
        (1, 10) => "ESRB T",
        (1, 11) => "ESRB M",
        (1, 12) => "ESRB AO",
        _ => return None,
    };
    Some(label.to_string())
}

fn image_url(size: &str, image_id: &str) -> String {
    format!("{}/t_{}/{}.jpg", IMAGE_BASE, size, image_id)
}

/// Apicalypse string literal.
fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

impl IgdbGame {
    fn release_date(&self) -> Option<NaiveDate> {
        self.first_release_date
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.date_naive())
    }

    fn steam_app_id(&self) -> Option<&str> {
        self.external_games
            .iter()
            .filter(|e| e.category == Some(STEAM_CATEGORY))
            .find_map(|e| e.uid.as_deref())
            .filter(|uid| !uid.is_empty())
    }

    fn to_match(&self) -> CatalogMatch {
        let m = CatalogMatch::new(
            ProviderKind::CuratedMetadata,
            PROVIDER_NAME,
            self.id.to_string(),
            &self.name,
        )
        .with_score(self.total_rating)
        .with_release_date(self.release_date());

        match self.steam_app_id() {
            Some(appid) => m.with_platform_hint(appid),
            None => m,
        }
    }

    fn companies(&self, pick: impl Fn(&InvolvedCompany) -> bool) -> Vec<String> {
        self.involved_companies
            .iter()
            .filter(|c| pick(c))
            .filter_map(|c| c.company.as_ref().map(|n| n.name.clone()))
            .collect()
    }

    fn to_description(&self) -> GameDescription {
        GameDescription {
            summary: self.summary.clone().filter(|s| !s.trim().is_empty()),
            release_date: self.release_date(),
            genres: self.genres.iter().map(|g| g.name.clone()).collect(),
            developers: self.companies(|c| c.developer),
            publishers: self.companies(|c| c.publisher),
            categories: Vec::new(),
            age_rating: self.age_ratings.iter().find_map(age_rating_label),
            rating: self.total_rating,
            platforms: self.platforms.iter().map(|p| p.name.clone()).collect(),
        }
    }

    fn to_artwork(&self) -> GameArtwork {
        let mut artwork = GameArtwork::none();
        if let Some(cover) = &self.cover {
            artwork.set(
                AssetKind::BoxArt,
                image_url("cover_big_2x", &cover.image_id),
                Some(AssetHint::new(528, 748)),
            );
        }
        if let Some(art) = self.artworks.first() {
            let url = image_url("1080p", &art.image_id);
            artwork.set(AssetKind::Banner, &url, Some(AssetHint::new(1920, 1080)));
            artwork.set(AssetKind::Hero, url, Some(AssetHint::new(1920, 1080)));
        }
        artwork
    }
}

impl IgdbProvider {
    pub fn new(
        client_id: Option<String>,
        access_token: Option<String>,
        timeouts: &ProviderTimeouts,
    ) -> Result<Self, CatalogError> {
        let credentials = match (client_id, access_token) {
            (Some(id), Some(token)) if !id.trim().is_empty() && !token.trim().is_empty() => {
                Some((id, token))
            }
            _ => None,
        };

        Ok(Self {
            client: http::build_client(PROVIDER_NAME, timeouts.curated())?,
            credentials,
            games: Mutex::new(HashMap::new()),
        })
    }

    async fn query(&self, body: String) -> Result<Vec<IgdbGame>, CatalogError> {
        let (client_id, token) = self
            .credentials
            .as_ref()
            .ok_or_else(|| CatalogError::MissingCredentials {
                provider: PROVIDER_NAME.to_string(),
            })?;

        let request = self
            .client
            .post(GAMES_URL)
            .header("Client-ID", client_id)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .body(body);

        let games: Vec<IgdbGame> = http::get_json(PROVIDER_NAME, request).await?;

        if let Ok(mut cache) = self.games.lock() {
            for game in &games {
                cache.insert(game.id.to_string(), game.clone());
            }
        }
        Ok(games)
    }

    async fn game(&self, id: &str) -> Result<Option<IgdbGame>, CatalogError> {
        if let Some(game) = self.games.lock().ok().and_then(|cache| cache.get(id).cloned()) {
            return Ok(Some(game));
        }
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(CatalogError::InvalidId {
                provider: PROVIDER_NAME.to_string(),
                id: id.to_string(),
            });
        }

        let games = self.query(format!("{} where id = {};", FIELDS, id)).await?;
        Ok(games.into_iter().next())
    }
}

#[async_trait]
impl GameProvider for IgdbProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::CuratedMetadata
    }

    async fn search(
        &self,
        title: &str,
        _platform_hint: Option<&str>,
    ) -> Result<Vec<CatalogMatch>, CatalogError> {
        if self.credentials.is_none() {
            tracing::debug!("IGDB: no credentials, skipping search for '{}'", title);
            return Ok(Vec::new());
        }
        let title = title.trim();
        if title.is_empty() {
            return Ok(Vec::new());
        }

        let body = format!("search {}; {} limit {};", quote(title), FIELDS, SEARCH_LIMIT);
        let games = self.query(body).await?;
        Ok(games.iter().map(IgdbGame::to_match).collect())
    }

    async fn get_description(&self, catalog_match: &CatalogMatch) -> Option<GameDescription> {
        match self.game(&catalog_match.external_id).await {
            Ok(Some(game)) => Some(game.to_description()),
            Ok(None) => Some(GameDescription::default()),
            Err(e) => {
                tracing::warn!("IGDB description failed for {}: {}", catalog_match.title, e);
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
            Ok(Some(game)) => Some(game.to_artwork()),
            Ok(None) => Some(GameArtwork::none()),
            Err(e) => {
                tracing::warn!("IGDB artwork failed for {}: {}", catalog_match.title, e);
                Some(GameArtwork::none())
            }
        }
    }

    async fn lookup_match(&self, platform_id: &str, _title: &str) -> Option<CatalogMatch> {
        let platform_id = platform_id.trim();
        if self.credentials.is_none() || platform_id.is_empty() {
            return None;
        }

        let body = format!(
            "{} where external_games.category = {} & external_games.uid = {}; limit 1;",
            FIELDS,
            STEAM_CATEGORY,
            quote(platform_id)
        );
        match self.query(body).await {
            Ok(games) => games.first().map(IgdbGame::to_match),
            Err(e) => {
                tracing::debug!("IGDB lookup of steam app {} failed: {}", platform_id, e);
                None
            }
        }
    }

    fn is_available(&self) -> bool {
        self.credentials.is_some()
    }

    fn clear_cache(&self) {
        if let Ok(mut games) = self.games.lock() {
            games.clear();
        }
    }
}

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Deserializer};

use crate::config::{EngineConfig, ProviderTimeouts};
use crate::core::{AssetHint, AssetKind, CatalogMatch, GameArtwork, GameDescription, ProviderKind};
use crate::dispatch::StoreDispatcher;
use crate::error::CatalogError;
use crate::providers::aliases::TitleAliases;
use crate::providers::{http, GameProvider};

const PROVIDER_NAME: &str = "steam";
const SEARCH_URL: &str = "https://steamcommunity.com/actions/SearchApps";
const DETAILS_URL: &str = "https://store.steampowered.com/api/appdetails";
const CDN_BASE: &str = "https://shared.cloudflare.steamstatic.com/store_item_assets/steam/apps";

/// Steam store provider (official store catalog).
///
/// Every store API call goes through the shared [`StoreDispatcher`]. CDN
/// asset checks do not: they hit a different host with no rate limit.
pub struct SteamProvider {
    client: Client,
    dispatcher: StoreDispatcher,
    aliases: TitleAliases,
    max_candidates: usize,
    artwork_check: Duration,
    cache: Mutex<AppCache>,
}

/// Details and search icons seen during the current run, by app id.
#[derive(Default)]
struct AppCache {
    details: HashMap<String, SteamAppDetails>,
    icons: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SteamApp {
    #[serde(deserialize_with = "app_id")]
    appid: String,
    name: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Deserialize)]
struct AppDetailsData {
    success: bool,
    #[serde(default)]
    data: Option<SteamAppDetails>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct SteamAppDetails {
    #[serde(default)]
    name: String,
    #[serde(default)]
    steam_appid: u64,
    #[serde(default)]
    short_description: String,
    #[serde(default)]
    developers: Vec<String>,
    #[serde(default)]
    publishers: Vec<String>,
    #[serde(default)]
    genres: Vec<SteamLabel>,
    #[serde(default)]
    categories: Vec<SteamLabel>,
    #[serde(default)]
    platforms: SteamPlatforms,
    #[serde(default)]
    release_date: SteamReleaseDate,
    #[serde(default)]
    metacritic: Option<SteamMetacritic>,
    /// Number or numeric string depending on the app
    #[serde(default)]
    required_age: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct SteamLabel {
    description: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct SteamPlatforms {
    #[serde(default)]
    windows: bool,
    #[serde(default)]
    mac: bool,
    #[serde(default)]
    linux: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct SteamReleaseDate {
    #[serde(default)]
    date: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SteamMetacritic {
    score: i32,
}

/// SearchApps sends app ids as strings, appdetails as numbers.
fn app_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(u64),
        Text(String),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Number(n) => n.to_string(),
        Id::Text(s) => s,
    })
}

fn is_app_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_digit())
}

/// Store dates come as "16 Nov, 2004", "Nov 16, 2004" or just a year.
fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    for format in ["%d %b, %Y", "%b %d, %Y", "%d %B, %Y", "%B %d, %Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    raw.parse::<i32>()
        .ok()
        .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
}

fn required_age(value: &serde_json::Value) -> Option<u32> {
    let age = match value {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as u32),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (age > 0).then_some(age)
}

impl SteamAppDetails {
    fn to_match(&self, appid: &str, fallback_title: &str) -> CatalogMatch {
        let title = if self.name.trim().is_empty() {
            fallback_title
        } else {
            &self.name
        };

        CatalogMatch::new(ProviderKind::OfficialStore, PROVIDER_NAME, appid, title)
            .with_platform_hint(appid)
            .with_score(self.metacritic.as_ref().map(|m| f64::from(m.score)))
            .with_release_date(parse_release_date(&self.release_date.date))
    }

    fn to_description(&self) -> GameDescription {
        let mut platforms = Vec::new();
        if self.platforms.windows {
            platforms.push("Windows".to_string());
        }
        if self.platforms.mac {
            platforms.push("Mac".to_string());
        }
        if self.platforms.linux {
            platforms.push("Linux".to_string());
        }

        let summary = self.short_description.trim();

        GameDescription {
            summary: (!summary.is_empty()).then(|| summary.to_string()),
            release_date: parse_release_date(&self.release_date.date),
            genres: self.genres.iter().map(|g| g.description.clone()).collect(),
            developers: self.developers.clone(),
            publishers: self.publishers.clone(),
            categories: self.categories.iter().map(|c| c.description.clone()).collect(),
            age_rating: required_age(&self.required_age).map(|age| format!("{}+", age)),
            rating: self.metacritic.as_ref().map(|m| f64::from(m.score)),
            platforms,
        }
    }
}

fn search_hit_to_match(app: &SteamApp) -> CatalogMatch {
    CatalogMatch::new(ProviderKind::OfficialStore, PROVIDER_NAME, &app.appid, &app.name)
        .with_platform_hint(&app.appid)
}

/// Turn search hits into candidates, fetching details one app at a time.
///
/// A throttled fetch stops the loop; candidates gathered so far are kept.
/// Any other failure keeps the bare search hit.
async fn collect_candidates<F, Fut>(
    apps: &[SteamApp],
    inter_fetch_delay: Duration,
    mut fetch: F,
) -> Vec<CatalogMatch>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Option<SteamAppDetails>, CatalogError>>,
{
    let mut candidates = Vec::with_capacity(apps.len());

    for (i, app) in apps.iter().enumerate() {
        if i > 0 && !inter_fetch_delay.is_zero() {
            tokio::time::sleep(inter_fetch_delay).await;
        }

        match fetch(app.appid.clone()).await {
            Ok(Some(details)) => candidates.push(details.to_match(&app.appid, &app.name)),
            Ok(None) => candidates.push(search_hit_to_match(app)),
            Err(e) if e.is_throttled() => {
                tracing::warn!(
                    "Steam throttled details for {} ({}); keeping {} of {} candidates",
                    app.name,
                    app.appid,
                    candidates.len(),
                    apps.len()
                );
                break;
            }
            Err(e) => {
                tracing::warn!("Failed to fetch details for {}: {}", app.name, e);
                candidates.push(search_hit_to_match(app));
            }
        }
    }

    candidates
}

impl SteamProvider {
    pub fn new(
        dispatcher: StoreDispatcher,
        timeouts: &ProviderTimeouts,
        max_candidates: usize,
    ) -> Result<Self, CatalogError> {
        Ok(Self {
            client: http::build_client(PROVIDER_NAME, timeouts.store())?,
            dispatcher,
            aliases: TitleAliases::builtin(),
            max_candidates,
            artwork_check: timeouts.artwork_check(),
            cache: Mutex::new(AppCache::default()),
        })
    }

    pub fn from_config(dispatcher: StoreDispatcher, config: &EngineConfig) -> Result<Self, CatalogError> {
        Self::new(dispatcher, &config.timeouts, config.matching.max_store_candidates)
    }

    pub fn with_aliases(mut self, aliases: TitleAliases) -> Self {
        self.aliases = aliases;
        self
    }

    async fn search_apps(&self, query: &str) -> Result<Vec<SteamApp>, CatalogError> {
        let url = format!("{}/{}", SEARCH_URL, urlencoding::encode(query));
        let label = format!("search:{}", query);

        self.dispatcher
            .run(&label, || http::get_json::<Vec<SteamApp>>(PROVIDER_NAME, self.client.get(&url)))
            .await
    }

    fn cached_details(&self, appid: &str) -> Option<SteamAppDetails> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.details.get(appid).cloned())
    }

    /// `Ok(None)` when the store has no data for the app.
    async fn fetch_details(&self, appid: &str) -> Result<Option<SteamAppDetails>, CatalogError> {
        if let Some(details) = self.cached_details(appid) {
            return Ok(Some(details));
        }

        let url = format!("{}?appids={}", DETAILS_URL, appid);
        let label = format!("details:{}", appid);

        let mut response: HashMap<String, AppDetailsData> = self
            .dispatcher
            .run(&label, || http::get_json(PROVIDER_NAME, self.client.get(&url)))
            .await?;

        let details = match response.remove(appid) {
            Some(AppDetailsData {
                success: true,
                data: Some(details),
            }) => details,
            _ => {
                tracing::debug!("Steam has no details for app {}", appid);
                return Ok(None);
            }
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.details.insert(appid.to_string(), details.clone());
        }
        Ok(Some(details))
    }

    fn remember_icons(&self, apps: &[SteamApp]) {
        if let Ok(mut cache) = self.cache.lock() {
            for app in apps.iter().filter(|a| !a.icon.trim().is_empty()) {
                cache.icons.insert(app.appid.clone(), app.icon.clone());
            }
        }
    }

    fn cached_icon(&self, appid: &str) -> Option<String> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.icons.get(appid).cloned())
    }

    /// CDN URL candidates for an app, with their known sizes.
    fn cdn_assets(appid: &str) -> [(AssetKind, String, Option<AssetHint>); 4] {
        [
            (
                AssetKind::BoxArt,
                format!("{}/{}/library_600x900.jpg", CDN_BASE, appid),
                Some(AssetHint::new(600, 900)),
            ),
            (
                AssetKind::Banner,
                format!("{}/{}/header.jpg", CDN_BASE, appid),
                Some(AssetHint::new(460, 215)),
            ),
            (
                AssetKind::Hero,
                format!("{}/{}/library_hero.jpg", CDN_BASE, appid),
                Some(AssetHint::new(3840, 1240)),
            ),
            (AssetKind::Logo, format!("{}/{}/logo.png", CDN_BASE, appid), None),
        ]
    }
}

#[async_trait]
impl GameProvider for SteamProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.details.clear();
            cache.icons.clear();
        }
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OfficialStore
    }

    async fn search(
        &self,
        title: &str,
        _platform_hint: Option<&str>,
    ) -> Result<Vec<CatalogMatch>, CatalogError> {
        let query = self.aliases.resolve(title).trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        if query != title.trim() {
            tracing::debug!("Steam alias: '{}' -> '{}'", title, query);
        }

        let mut apps = self.search_apps(query).await?;
        apps.truncate(self.max_candidates);
        self.remember_icons(&apps);

        let delay = self.dispatcher.policy().inter_fetch_delay();
        let candidates = collect_candidates(&apps, delay, |appid| async move {
            self.fetch_details(&appid).await
        })
        .await;

        tracing::debug!("Steam: {} candidates for '{}'", candidates.len(), query);
        Ok(candidates)
    }

    async fn get_description(&self, catalog_match: &CatalogMatch) -> Option<GameDescription> {
        let appid = catalog_match.external_id.as_str();
        if !is_app_id(appid) {
            tracing::debug!("Steam: '{}' is not an app id", appid);
            return Some(GameDescription::default());
        }

        match self.fetch_details(appid).await {
            Ok(Some(details)) => Some(details.to_description()),
            Ok(None) => Some(GameDescription::default()),
            Err(e) => {
                tracing::warn!("Steam description failed for {}: {}", catalog_match.title, e);
                Some(GameDescription::default())
            }
        }
    }

    async fn get_artwork(
        &self,
        catalog_match: &CatalogMatch,
        platform_hint: Option<&str>,
    ) -> Option<GameArtwork> {
        let appid = platform_hint
            .filter(|id| is_app_id(id))
            .or_else(|| Some(catalog_match.external_id.as_str()).filter(|id| is_app_id(id)));

        let Some(appid) = appid else {
            return Some(GameArtwork::none());
        };

        let assets = Self::cdn_assets(appid);
        let checks = assets
            .iter()
            .map(|(_, url, _)| http::asset_exists(&self.client, url, self.artwork_check));
        let present = futures::future::join_all(checks).await;

        let mut artwork = GameArtwork::none();
        for ((kind, url, hint), exists) in assets.into_iter().zip(present) {
            if exists {
                artwork.set(kind, url, hint);
            }
        }
        if let Some(icon) = self.cached_icon(appid) {
            artwork.set(AssetKind::Icon, icon, None);
        }

        tracing::debug!(
            "Steam artwork for {}: {} assets",
            catalog_match.title,
            artwork.assets().len()
        );
        Some(artwork)
    }

    async fn lookup_match(&self, platform_id: &str, title: &str) -> Option<CatalogMatch> {
        if !is_app_id(platform_id) {
            return None;
        }

        match self.fetch_details(platform_id).await {
            Ok(Some(details)) => Some(details.to_match(platform_id, title)),
            Ok(None) => Some(
                CatalogMatch::new(ProviderKind::OfficialStore, PROVIDER_NAME, platform_id, title)
                    .with_platform_hint(platform_id),
            ),
            Err(e) => {
                tracing::warn!("Steam lookup of app {} failed: {}", platform_id, e);
                Some(
                    CatalogMatch::new(ProviderKind::OfficialStore, PROVIDER_NAME, platform_id, title)
                        .with_platform_hint(platform_id),
                )
            }
        }
    }
}

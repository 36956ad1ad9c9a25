//! Engine configuration.
//!
//! Loaded from a YAML file, then overridden from the environment:
//!
//! ```yaml
//! providers:
//!   steamgriddb_api_key: "..."
//!   igdb_client_id: "..."
//!   igdb_access_token: "..."
//!   rawg_api_key: "..."
//! dispatcher:
//!   min_interval_ms: 2000
//! timeouts:
//!   artwork_check_ms: 5000
//! storage:
//!   db_path: "games.db"
//!   cache_dir: "artwork-cache"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Complete engine configuration; every section has defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub providers: ProviderCredentials,
    pub dispatcher: DispatchPolicy,
    pub timeouts: ProviderTimeouts,
    pub matching: MatchingConfig,
    pub storage: StorageConfig,
}

/// API credentials. A catalog without credentials is simply not queried
/// (the official store needs none).
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderCredentials {
    pub steamgriddb_api_key: Option<String>,
    pub igdb_client_id: Option<String>,
    pub igdb_access_token: Option<String>,
    pub rawg_api_key: Option<String>,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn mask(value: &Option<String>) -> &'static str {
            if value.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }
        f.debug_struct("ProviderCredentials")
            .field("steamgriddb_api_key", &mask(&self.steamgriddb_api_key))
            .field("igdb_client_id", &mask(&self.igdb_client_id))
            .field("igdb_access_token", &mask(&self.igdb_access_token))
            .field("rawg_api_key", &mask(&self.rawg_api_key))
            .finish()
    }
}

/// The store tolerates no faster than one call every two seconds.
pub const MIN_STORE_INTERVAL_MS: u64 = 2000;

/// Spacing and retry policy of the official-store dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchPolicy {
    /// Minimum gap between the starts of two store calls
    pub min_interval_ms: u64,
    /// Pause between consecutive detail fetches of one search
    pub inter_fetch_delay_ms: u64,
    /// Total attempts for a transient failure (1 = no retry)
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            min_interval_ms: MIN_STORE_INTERVAL_MS,
            inter_fetch_delay_ms: 250,
            max_attempts: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8000,
        }
    }
}

impl DispatchPolicy {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn inter_fetch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_fetch_delay_ms)
    }

    /// Backoff before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// capped at `retry_max_delay_ms`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let max = Duration::from_millis(self.retry_max_delay_ms);
        Duration::from_millis(self.retry_base_delay_ms)
            .checked_mul(1u32 << exponent)
            .unwrap_or(max)
            .min(max)
    }
}

/// Per-provider request timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderTimeouts {
    pub store_ms: u64,
    pub community_ms: u64,
    pub curated_ms: u64,
    pub general_ms: u64,
    /// Existence check of a single artwork URL; past it the asset is absent
    pub artwork_check_ms: u64,
    pub image_download_ms: u64,
}

impl Default for ProviderTimeouts {
    fn default() -> Self {
        Self {
            store_ms: 10_000,
            community_ms: 15_000,
            curated_ms: 15_000,
            general_ms: 15_000,
            artwork_check_ms: 5_000,
            image_download_ms: 30_000,
        }
    }
}

impl ProviderTimeouts {
    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }

    pub fn community(&self) -> Duration {
        Duration::from_millis(self.community_ms)
    }

    pub fn curated(&self) -> Duration {
        Duration::from_millis(self.curated_ms)
    }

    pub fn general(&self) -> Duration {
        Duration::from_millis(self.general_ms)
    }

    pub fn artwork_check(&self) -> Duration {
        Duration::from_millis(self.artwork_check_ms)
    }

    pub fn image_download(&self) -> Duration {
        Duration::from_millis(self.image_download_ms)
    }
}

impl fmt::Display for ProviderTimeouts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "store={}ms, community={}ms, curated={}ms, general={}ms, artwork_check={}ms",
            self.store_ms, self.community_ms, self.curated_ms, self.general_ms, self.artwork_check_ms
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Store search candidates whose details get fetched
    pub max_store_candidates: usize,
    /// Candidates surfaced per unmatched game
    pub top_candidates: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_store_candidates: 20,
            top_candidates: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub cache_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "games.db".to_string(),
            cache_dir: PathBuf::from("artwork-cache"),
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl EngineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Load a YAML config file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `STEAMGRIDDB_API_KEY`, `IGDB_CLIENT_ID`,
    /// `IGDB_ACCESS_TOKEN`, `RAWG_API_KEY`, `GME_DB_PATH`, `GME_CACHE_DIR`.
    pub fn apply_env(&mut self) {
        if let Some(key) = env_value("STEAMGRIDDB_API_KEY") {
            self.providers.steamgriddb_api_key = Some(key);
        }
        if let Some(id) = env_value("IGDB_CLIENT_ID") {
            self.providers.igdb_client_id = Some(id);
        }
        if let Some(token) = env_value("IGDB_ACCESS_TOKEN") {
            self.providers.igdb_access_token = Some(token);
        }
        if let Some(key) = env_value("RAWG_API_KEY") {
            self.providers.rawg_api_key = Some(key);
        }
        if let Some(path) = env_value("GME_DB_PATH") {
            self.storage.db_path = path;
        }
        if let Some(dir) = env_value("GME_CACHE_DIR") {
            self.storage.cache_dir = PathBuf::from(dir);
        }
    }

    /// Reject values that would break the dispatcher or matching.
    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.min_interval_ms < MIN_STORE_INTERVAL_MS {
            return Err(EngineError::Config(format!(
                "dispatcher.min_interval_ms must be at least {}",
                MIN_STORE_INTERVAL_MS
            )));
        }
        if self.dispatcher.max_attempts == 0 {
            return Err(EngineError::Config(
                "dispatcher.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.matching.max_store_candidates == 0 {
            return Err(EngineError::Config(
                "matching.max_store_candidates must be at least 1".to_string(),
            ));
        }
        if self.providers.igdb_client_id.is_some() != self.providers.igdb_access_token.is_some() {
            return Err(EngineError::Config(
                "IGDB needs both igdb_client_id and igdb_access_token".to_string(),
            ));
        }
        Ok(())
    }
}

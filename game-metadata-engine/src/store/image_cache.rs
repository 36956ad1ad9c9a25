use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::core::{AssetKind, GameArtwork};
use crate::error::{CatalogError, EngineError, Result};
use crate::providers::http;
use crate::store::ImageCache;

const CACHE_NAME: &str = "image-cache";
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "ico"];

/// Unique suffixes for temp files
static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_suffix() -> String {
    let counter = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{}.{}", counter, timestamp)
}

/// Game ids become directory names.
fn validate_game_id(game_id: &str) -> Result<()> {
    if game_id.trim().is_empty()
        || game_id.contains("..")
        || game_id.contains('/')
        || game_id.contains('\\')
    {
        return Err(EngineError::Validation(format!("Invalid game id for image cache: '{}'", game_id)));
    }
    Ok(())
}

fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next().unwrap_or(content_type).trim();
    match mime {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/x-icon" | "image/vnd.microsoft.icon" => Some("ico"),
        _ => None,
    }
}

fn extension_from_url(url: &str) -> Option<String> {
    let last = url.rsplit('/').next()?;
    let last = last.split(['?', '#']).next().unwrap_or(last);
    let (_, ext) = last.rsplit_once('.')?;
    let ext = ext.to_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Downloads artwork into `<root>/<game_id>/<kind>.<ext>` and hands back
/// `file://` URLs.
pub struct FsImageCache {
    client: Client,
    root: PathBuf,
    url_prefix: String,
}

impl FsImageCache {
    pub fn new(root: impl Into<PathBuf>, download_timeout: Duration) -> Result<Self> {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()
                .map_err(|e| EngineError::persistence(format!("Failed to resolve cache dir: {}", e)))?
                .join(root)
        };
        let url_prefix = format!("file://{}/", root.display());

        Ok(Self {
            client: http::build_client(CACHE_NAME, download_timeout)?,
            root,
            url_prefix,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn game_dir(&self, game_id: &str) -> PathBuf {
        self.root.join(game_id)
    }

    fn file_url(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    async fn download(&self, url: &str) -> std::result::Result<(Vec<u8>, String), CatalogError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::from_reqwest(CACHE_NAME, e))?;
        let response = http::check_status(CACHE_NAME, response)?;

        let extension = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(extension_from_content_type)
            .map(str::to_string)
            .or_else(|| extension_from_url(url))
            .unwrap_or_else(|| "jpg".to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CatalogError::from_reqwest(CACHE_NAME, e))?;

        Ok((bytes.to_vec(), extension))
    }

    /// Write one asset atomically and drop copies of the same kind with a
    /// different extension. Returns the file URL.
    async fn store(&self, game_id: &str, kind: AssetKind, bytes: &[u8], extension: &str) -> Result<String> {
        let dir = self.game_dir(game_id);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            EngineError::persistence(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let path = dir.join(format!("{}.{}", kind.as_str(), extension));
        let tmp_path = dir.join(format!("{}.{}.tmp.{}", kind.as_str(), extension, temp_suffix()));

        if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(EngineError::persistence(format!(
                "Failed to write {}: {}",
                tmp_path.display(),
                e
            )));
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(EngineError::persistence(format!(
                "Failed to rename into {}: {}",
                path.display(),
                e
            )));
        }

        for other in IMAGE_EXTENSIONS.iter().filter(|ext| **ext != extension) {
            let stale = dir.join(format!("{}.{}", kind.as_str(), other));
            let _ = tokio::fs::remove_file(&stale).await;
        }

        Ok(Self::file_url(&path))
    }
}

#[async_trait]
impl ImageCache for FsImageCache {
    async fn cache_images(&self, artwork: &GameArtwork, game_id: &str) -> Result<GameArtwork> {
        validate_game_id(game_id)?;

        let mut cached = artwork.clone();
        for (kind, url) in artwork.assets() {
            if self.owns(url) || !(url.starts_with("http://") || url.starts_with("https://")) {
                continue;
            }

            match self.download(url).await {
                Ok((bytes, extension)) => {
                    let local = self.store(game_id, kind, &bytes, &extension).await?;
                    tracing::debug!("Cached {} for {}: {}", kind, game_id, local);
                    cached.rewrite(kind, local);
                }
                Err(e) => {
                    tracing::warn!("Failed to cache {} for {} ({}), keeping remote URL", kind, game_id, e);
                }
            }
        }
        Ok(cached)
    }

    async fn delete_cached_image(&self, game_id: &str, kind: AssetKind) {
        if validate_game_id(game_id).is_err() {
            return;
        }

        let dir = self.game_dir(game_id);
        for ext in IMAGE_EXTENSIONS {
            let path = dir.join(format!("{}.{}", kind.as_str(), ext));
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!("Removed cached {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove cached {}: {}", path.display(), e),
            }
        }
    }

    fn owns(&self, url: &str) -> bool {
        url.starts_with(&self.url_prefix)
    }
}

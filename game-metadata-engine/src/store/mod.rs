pub mod image_cache;
pub mod sqlite;

use async_trait::async_trait;

use crate::core::{AssetKind, GameArtwork, GameRecord};
use crate::error::Result;
use crate::refresh::RefreshState;

pub use image_cache::FsImageCache;
pub use sqlite::SqliteRecordStore;

/// The local game library.
#[async_trait]
pub trait GameRecordStore: Send + Sync {
    /// Every record, in library order
    async fn get_all(&self) -> Result<Vec<GameRecord>>;

    async fn get(&self, id: &str) -> Result<Option<GameRecord>> {
        Ok(self.get_all().await?.into_iter().find(|r| r.id == id))
    }

    /// Persist `record`. When `previous` is given and asset URLs changed,
    /// stale cached images are evicted.
    async fn save(&self, record: &GameRecord, previous: Option<&GameRecord>) -> Result<()>;

    /// Fired when a refresh run completes
    async fn reload(&self) -> Result<()> {
        Ok(())
    }
}

/// Local copies of remote artwork.
#[async_trait]
pub trait ImageCache: Send + Sync {
    /// Download every remote URL in `artwork` and return the artwork with
    /// those URLs rewritten to local ones. A failed download keeps the
    /// remote URL; a local write failure is an error.
    async fn cache_images(&self, artwork: &GameArtwork, game_id: &str) -> Result<GameArtwork>;

    /// Best-effort; never fails.
    async fn delete_cached_image(&self, game_id: &str, kind: AssetKind);

    /// Whether `url` points into this cache.
    fn owns(&self, _url: &str) -> bool {
        false
    }
}

/// Where refresh state is checkpointed between games.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load_checkpoint(&self) -> Result<Option<RefreshState>>;

    async fn save_checkpoint(&self, state: &RefreshState) -> Result<()>;

    async fn clear_checkpoint(&self) -> Result<()>;
}

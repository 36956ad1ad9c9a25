//! # Game Metadata Engine
//!
//! Resolves descriptions and artwork for a local game library:
//! - Four catalogs (Steam store, SteamGridDB, IGDB, RAWG)
//! - Rate-limited, retrying dispatcher in front of the Steam store
//! - Deterministic ranking (exact title, official art, score, release date)
//! - Resumable library refresh with unmatched / missing-artwork pauses
//! - SQLite library and checkpoint, filesystem image cache
//! - Multiple interfaces: Rust library, HTTP API, CLI
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use game_metadata_engine::{EngineConfig, MetadataEngine, RefreshRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = MetadataEngine::open(EngineConfig::from_env()).await?;
//!
//!     let response = engine.refresh_metadata(RefreshRequest::missing()).await;
//!     println!("Refresh: {}", response.display());
//!
//!     for candidate in engine.search("half life 2", None).await?.iter().take(3) {
//!         println!("{}", candidate.display_name());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod providers;
pub mod ranking;
pub mod refresh;
pub mod store;

// Re-export primary types
pub use config::EngineConfig;
pub use core::{
    ArtworkCandidate, AssetKind, CatalogMatch, GameArtwork, GameDescription, GameRecord,
    MissingBoxartGame, ProviderKind, RefreshOutcome, RefreshRequest, RefreshResponse,
    UnmatchedGame,
};
pub use dispatch::StoreDispatcher;
pub use engine::MetadataEngine;
pub use error::{CatalogError, EngineError, Result};
pub use providers::GameProvider;
pub use ranking::Ranker;
pub use refresh::{
    ArtworkResolution, CancelSignal, RefreshPhase, RefreshState, ResolutionUi,
    UnmatchedResolution, REFRESH_PROGRESS_TOPIC,
};
pub use store::{GameRecordStore, ImageCache};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}

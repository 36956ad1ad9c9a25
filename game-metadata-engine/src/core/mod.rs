pub mod artwork;
pub mod catalog_match;
pub mod description;
pub mod record;
pub mod refresh_result;

pub use artwork::{ArtworkCandidate, AssetHint, AssetKind, GameArtwork};
pub use catalog_match::{CatalogMatch, ProviderKind};
pub use description::GameDescription;
pub use record::GameRecord;
pub use refresh_result::{
    MissingBoxartGame, RefreshOutcome, RefreshRequest, RefreshResponse, UnmatchedGame,
};

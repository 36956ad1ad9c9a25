//! In-memory catalogs, library, checkpoint store and UI for driving the
//! refresh pipeline without network access.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use game_metadata_engine::core::{
    AssetKind, CatalogMatch, GameArtwork, GameDescription, GameRecord, MissingBoxartGame,
    ProviderKind, UnmatchedGame,
};
use game_metadata_engine::error::{CatalogError, EngineError, Result};
use game_metadata_engine::providers::GameProvider;
use game_metadata_engine::refresh::{
    ArtworkResolution, RefreshState, ResolutionUi, UnmatchedResolution,
};
use game_metadata_engine::store::{CheckpointStore, GameRecordStore};
use game_metadata_engine::MetadataEngine;

/// One title a fake catalog knows.
#[derive(Clone)]
pub struct FakeEntry {
    pub catalog_match: CatalogMatch,
    pub description: Option<GameDescription>,
    pub artwork: GameArtwork,
}

/// A catalog that answers every search with its whole contents and lets
/// the ranker sort it out.
pub struct FakeProvider {
    name: &'static str,
    kind: ProviderKind,
    entries: Vec<FakeEntry>,
    fail_search: bool,
    delay: Option<Duration>,
    searched: Mutex<Vec<String>>,
    lookups: AtomicUsize,
}

impl FakeProvider {
    pub fn new(name: &'static str, kind: ProviderKind) -> Self {
        Self {
            name,
            kind,
            entries: Vec::new(),
            fail_search: false,
            delay: None,
            searched: Mutex::new(Vec::new()),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn steam() -> Self {
        Self::new("steam", ProviderKind::OfficialStore)
    }

    pub fn steamgriddb() -> Self {
        Self::new("steamgriddb", ProviderKind::CommunityArtwork)
    }

    /// A catalog whose searches always fail with a transport error
    pub fn failing(name: &'static str, kind: ProviderKind) -> Self {
        let mut provider = Self::new(name, kind);
        provider.fail_search = true;
        provider
    }

    /// Every search sleeps `delay` first
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Title with box art and banner.
    pub fn with_game(self, id: &str, title: &str) -> Self {
        let artwork = full_artwork(self.name, id);
        self.with_entry(id, title, artwork, None)
    }

    /// Title the catalog knows but has no images for.
    pub fn with_bare_game(self, id: &str, title: &str) -> Self {
        self.with_entry(id, title, GameArtwork::none(), None)
    }

    pub fn with_entry(
        mut self,
        id: &str,
        title: &str,
        artwork: GameArtwork,
        platform_hint: Option<&str>,
    ) -> Self {
        let mut catalog_match = CatalogMatch::new(self.kind, self.name, id, title);
        if let Some(hint) = platform_hint {
            catalog_match = catalog_match.with_platform_hint(hint);
        }
        let description = GameDescription {
            summary: Some(format!("{} from {}", title, self.name)),
            ..Default::default()
        };
        self.entries.push(FakeEntry {
            catalog_match,
            description: Some(description),
            artwork,
        });
        self
    }

    pub fn searched(&self) -> Vec<String> {
        self.searched.lock().unwrap().clone()
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn entry(&self, catalog_match: &CatalogMatch) -> Option<&FakeEntry> {
        self.entries
            .iter()
            .find(|e| e.catalog_match.external_id == catalog_match.external_id)
    }
}

pub fn full_artwork(source: &str, id: &str) -> GameArtwork {
    let mut artwork = GameArtwork::none();
    artwork.set(AssetKind::BoxArt, format!("https://{}.test/{}/box.jpg", source, id), None);
    artwork.set(AssetKind::Banner, format!("https://{}.test/{}/banner.jpg", source, id), None);
    artwork
}

#[async_trait]
impl GameProvider for FakeProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn search(
        &self,
        title: &str,
        _platform_hint: Option<&str>,
    ) -> std::result::Result<Vec<CatalogMatch>, CatalogError> {
        self.searched.lock().unwrap().push(title.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_search {
            return Err(CatalogError::transport(self.name, "connection refused"));
        }
        Ok(self.entries.iter().map(|e| e.catalog_match.clone()).collect())
    }

    async fn get_description(&self, catalog_match: &CatalogMatch) -> Option<GameDescription> {
        self.entry(catalog_match).and_then(|e| e.description.clone())
    }

    async fn get_artwork(
        &self,
        catalog_match: &CatalogMatch,
        _platform_hint: Option<&str>,
    ) -> Option<GameArtwork> {
        Some(
            self.entry(catalog_match)
                .map(|e| e.artwork.clone())
                .unwrap_or_else(GameArtwork::none),
        )
    }

    async fn lookup_match(&self, platform_id: &str, _title: &str) -> Option<CatalogMatch> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.entries
            .iter()
            .find(|e| e.catalog_match.platform_hint_id.as_deref() == Some(platform_id))
            .map(|e| e.catalog_match.clone())
    }
}

/// Library and checkpoint in memory, with injectable save failures.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<GameRecord>>,
    checkpoint: Mutex<Option<RefreshState>>,
    fail_saves_for: Mutex<HashSet<String>>,
    saves: Mutex<Vec<String>>,
    reloads: AtomicUsize,
}

impl MemoryStore {
    pub fn with_records(records: Vec<GameRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    pub fn fail_saves_for(&self, game_id: &str) {
        self.fail_saves_for.lock().unwrap().insert(game_id.to_string());
    }

    pub fn heal(&self) {
        self.fail_saves_for.lock().unwrap().clear();
    }

    pub fn record(&self, id: &str) -> GameRecord {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .unwrap()
    }

    /// Game ids in save order
    pub fn saves(&self) -> Vec<String> {
        self.saves.lock().unwrap().clone()
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn checkpoint(&self) -> Option<RefreshState> {
        self.checkpoint.lock().unwrap().clone()
    }
}

#[async_trait]
impl GameRecordStore for MemoryStore {
    async fn get_all(&self) -> Result<Vec<GameRecord>> {
        Ok(self.records.lock().unwrap().clone())
    }

    async fn save(&self, record: &GameRecord, _previous: Option<&GameRecord>) -> Result<()> {
        if self.fail_saves_for.lock().unwrap().contains(&record.id) {
            return Err(EngineError::persistence(format!("disk full while saving {}", record.id)));
        }

        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        self.saves.lock().unwrap().push(record.id.clone());
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn load_checkpoint(&self) -> Result<Option<RefreshState>> {
        Ok(self.checkpoint.lock().unwrap().clone())
    }

    async fn save_checkpoint(&self, state: &RefreshState) -> Result<()> {
        *self.checkpoint.lock().unwrap() = Some(state.clone());
        Ok(())
    }

    async fn clear_checkpoint(&self) -> Result<()> {
        *self.checkpoint.lock().unwrap() = None;
        Ok(())
    }
}

/// Answers dialogs from fixed tables and counts how often it was asked.
#[derive(Default)]
pub struct ScriptedUi {
    /// Game id to the candidate id to pick
    pub picks: BTreeMap<String, String>,
    pub ignore: Vec<String>,
    pub boxart: BTreeMap<String, String>,
    pub unmatched_dialogs: AtomicUsize,
    pub artwork_dialogs: AtomicUsize,
}

#[async_trait]
impl ResolutionUi for ScriptedUi {
    async fn present_unmatched(&self, games: &[UnmatchedGame]) -> UnmatchedResolution {
        self.unmatched_dialogs.fetch_add(1, Ordering::SeqCst);

        let mut resolution = UnmatchedResolution::default();
        for game in games {
            if self.ignore.contains(&game.game_id) {
                resolution.ignored.insert(game.game_id.clone());
                continue;
            }
            let pick = self.picks.get(&game.game_id).and_then(|wanted| {
                game.candidate_matches.iter().find(|m| &m.id == wanted)
            });
            if let Some(pick) = pick {
                resolution.chosen.insert(game.game_id.clone(), pick.clone());
            }
        }
        resolution
    }

    async fn present_missing_artwork(&self, games: &[MissingBoxartGame]) -> ArtworkResolution {
        self.artwork_dialogs.fetch_add(1, Ordering::SeqCst);

        games
            .iter()
            .filter_map(|g| {
                self.boxart
                    .get(&g.game_id)
                    .map(|url| (g.game_id.clone(), url.clone()))
            })
            .collect()
    }
}

pub fn library(games: &[(&str, &str)]) -> Vec<GameRecord> {
    games.iter().map(|(id, title)| GameRecord::new(*id, *title)).collect()
}

/// Engine over fake catalogs with `store` as library and checkpoint store.
pub fn engine(providers: Vec<Arc<dyn GameProvider>>, store: Arc<MemoryStore>) -> MetadataEngine {
    MetadataEngine::from_parts(providers, store.clone(), None, Some(store), 5)
}

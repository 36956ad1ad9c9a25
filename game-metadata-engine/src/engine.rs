use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::EngineConfig;
use crate::core::{ArtworkCandidate, CatalogMatch, RefreshOutcome, RefreshRequest, RefreshResponse};
use crate::dispatch::StoreDispatcher;
use crate::error::{EngineError, Result};
use crate::providers::{
    GameProvider, IgdbProvider, RawgProvider, SteamGridDbProvider, SteamProvider,
};
use crate::ranking::RankedCandidate;
use crate::refresh::{
    ArtworkResolution, CancelSignal, GameResolver, ProgressEvent, RefreshOrchestrator,
    RefreshState, ResolutionUi, UnmatchedResolution,
};
use crate::store::{CheckpointStore, FsImageCache, GameRecordStore, ImageCache, SqliteRecordStore};

/// Main entry point: catalogs, ranking and library refresh behind one
/// object.
pub struct MetadataEngine {
    resolver: Arc<GameResolver>,
    orchestrator: RefreshOrchestrator,
    store: Arc<dyn GameRecordStore>,
    dispatcher: Option<StoreDispatcher>,
}

/// Instantiate every catalog the config has credentials for.
///
/// Must run inside a tokio runtime: the store dispatcher spawns its runner.
fn build_providers(
    config: &EngineConfig,
    dispatcher: &StoreDispatcher,
) -> Result<Vec<Arc<dyn GameProvider>>> {
    let credentials = &config.providers;
    let candidates: Vec<Arc<dyn GameProvider>> = vec![
        Arc::new(SteamProvider::from_config(dispatcher.clone(), config)?),
        Arc::new(IgdbProvider::new(
            credentials.igdb_client_id.clone(),
            credentials.igdb_access_token.clone(),
            &config.timeouts,
        )?),
        Arc::new(RawgProvider::new(
            credentials.rawg_api_key.clone(),
            &config.timeouts,
        )?),
        Arc::new(SteamGridDbProvider::new(
            credentials.steamgriddb_api_key.clone(),
            &config.timeouts,
        )?),
    ];

    let providers: Vec<Arc<dyn GameProvider>> = candidates
        .into_iter()
        .filter(|provider| {
            let available = provider.is_available();
            if !available {
                tracing::info!("Provider {} disabled: no credentials", provider.name());
            }
            available
        })
        .collect();

    tracing::info!(
        "Catalogs enabled: {}",
        providers.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
    );
    Ok(providers)
}

impl MetadataEngine {
    /// Open the SQLite library and filesystem image cache named by `config`.
    pub async fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let cache: Arc<dyn ImageCache> = Arc::new(FsImageCache::new(
            config.storage.cache_dir.clone(),
            config.timeouts.image_download(),
        )?);
        let store = Arc::new(
            SqliteRecordStore::new(&config.storage.db_path)
                .await?
                .with_image_cache(cache.clone()),
        );

        Self::new(&config, store.clone(), Some(cache), Some(store))
    }

    /// Build the engine over caller-provided storage.
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn GameRecordStore>,
        image_cache: Option<Arc<dyn ImageCache>>,
        checkpoints: Option<Arc<dyn CheckpointStore>>,
    ) -> Result<Self> {
        config.validate()?;

        let dispatcher = StoreDispatcher::spawn(config.dispatcher);
        let providers = build_providers(config, &dispatcher)?;

        let mut engine = Self::from_parts(
            providers,
            store,
            image_cache,
            checkpoints,
            config.matching.top_candidates,
        );
        engine.dispatcher = Some(dispatcher);
        Ok(engine)
    }

    /// Assemble from ready-made providers.
    pub fn from_parts(
        providers: Vec<Arc<dyn GameProvider>>,
        store: Arc<dyn GameRecordStore>,
        image_cache: Option<Arc<dyn ImageCache>>,
        checkpoints: Option<Arc<dyn CheckpointStore>>,
        top_candidates: usize,
    ) -> Self {
        let resolver = Arc::new(GameResolver::new(providers, top_candidates));

        let mut orchestrator = RefreshOrchestrator::new(resolver.clone(), store.clone());
        if let Some(cache) = image_cache {
            orchestrator = orchestrator.with_image_cache(cache);
        }
        if let Some(checkpoints) = checkpoints {
            orchestrator = orchestrator.with_checkpoints(checkpoints);
        }

        Self {
            resolver,
            orchestrator,
            store,
            dispatcher: None,
        }
    }

    /// Names of the catalogs queried, in registration order
    pub fn provider_names(&self) -> Vec<String> {
        self.resolver
            .providers()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn store(&self) -> &Arc<dyn GameRecordStore> {
        &self.store
    }

    /// Run one refresh pass. Progress goes to [`Self::subscribe_progress`].
    pub async fn refresh_metadata(&self, request: RefreshRequest) -> RefreshResponse {
        self.orchestrator.refresh(request, None).await
    }

    pub async fn refresh_with_cancel(
        &self,
        request: RefreshRequest,
        cancel: &CancelSignal,
    ) -> RefreshResponse {
        self.orchestrator.refresh(request, Some(cancel)).await
    }

    /// Refresh and answer every pause through `ui` until done.
    pub async fn run_interactive(
        &self,
        request: RefreshRequest,
        ui: &dyn ResolutionUi,
        cancel: Option<&CancelSignal>,
    ) -> RefreshResponse {
        self.orchestrator.run_interactive(request, ui, cancel).await
    }

    /// Ranked candidates from every catalog for a free-text title.
    pub async fn search(&self, title: &str, platform_hint: Option<&str>) -> Result<Vec<CatalogMatch>> {
        let title = title.trim();
        if title.is_empty() {
            return Err(EngineError::Validation("Search title cannot be empty".to_string()));
        }

        let ranked = self.resolver.search_all(title, platform_hint).await;
        tracing::debug!("Search '{}': {} candidates", title, ranked.len());
        Ok(ranked.into_iter().map(RankedCandidate::into_inner).collect())
    }

    pub async fn apply_unmatched_resolution(
        &self,
        resolution: UnmatchedResolution,
    ) -> Result<RefreshOutcome> {
        self.orchestrator.apply_unmatched_resolution(resolution).await
    }

    pub async fn apply_artwork_resolution(&self, choices: ArtworkResolution) -> Result<RefreshOutcome> {
        self.orchestrator.apply_artwork_resolution(choices).await
    }

    /// Image offers for one library game, best first.
    pub async fn artwork_candidates(&self, game_id: &str) -> Result<Vec<ArtworkCandidate>> {
        let record = self
            .store
            .get(game_id)
            .await?
            .ok_or_else(|| EngineError::Validation(format!("Unknown game id: {}", game_id)))?;
        Ok(self.resolver.artwork_candidates(&record).await)
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.orchestrator.progress().subscribe()
    }

    /// Current run state, restored from the checkpoint on first call.
    pub async fn status(&self) -> Result<RefreshState> {
        self.orchestrator.restore().await
    }

    /// Stop the store dispatcher. Later store lookups fail as transport errors.
    pub async fn shutdown(&self) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.shutdown().await;
        }
    }
}

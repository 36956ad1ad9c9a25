use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::core::{
    AssetKind, CatalogMatch, GameRecord, MissingBoxartGame, RefreshOutcome, RefreshRequest,
    RefreshResponse, UnmatchedGame,
};
use crate::error::{EngineError, Result};
use crate::refresh::cancel::CancelSignal;
use crate::refresh::progress::{ProgressBus, RefreshProgress};
use crate::refresh::resolution::{ArtworkResolution, ResolutionUi, UnmatchedResolution};
use crate::refresh::resolver::{GameResolver, MatchOutcome};
use crate::refresh::state::{RefreshEvent, RefreshMode, RefreshPhase, RefreshState};
use crate::store::{CheckpointStore, GameRecordStore, ImageCache};

enum GameOutcome {
    Updated { missing: Option<MissingBoxartGame> },
    Unmatched(UnmatchedGame),
}

fn missing_entry(record: &GameRecord) -> MissingBoxartGame {
    MissingBoxartGame {
        game_id: record.id.clone(),
        title: record.title.clone(),
        platform_hint_id: record.stable_platform_id().map(str::to_string),
    }
}

/// Drives library refresh runs through the pause/resume state machine.
///
/// One run at a time; a second `refresh` while one is active fails fast.
/// State is checkpointed after every game.
pub struct RefreshOrchestrator {
    resolver: Arc<GameResolver>,
    store: Arc<dyn GameRecordStore>,
    image_cache: Option<Arc<dyn ImageCache>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    progress: ProgressBus,
    state: Mutex<RefreshState>,
    run_lock: Mutex<()>,
}

impl RefreshOrchestrator {
    pub fn new(resolver: Arc<GameResolver>, store: Arc<dyn GameRecordStore>) -> Self {
        Self {
            resolver,
            store,
            image_cache: None,
            checkpoints: None,
            progress: ProgressBus::new(),
            state: Mutex::new(RefreshState::default()),
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_image_cache(mut self, cache: Arc<dyn ImageCache>) -> Self {
        self.image_cache = Some(cache);
        self
    }

    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    pub fn with_progress(mut self, progress: ProgressBus) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &ProgressBus {
        &self.progress
    }

    /// Snapshot of the current run state
    pub async fn state(&self) -> RefreshState {
        self.state.lock().await.clone()
    }

    /// Load the checkpointed state, if any, when nothing has run yet.
    pub async fn restore(&self) -> Result<RefreshState> {
        let mut state = self.state.lock().await;
        if state.phase == RefreshPhase::Idle {
            if let Some(checkpoints) = &self.checkpoints {
                if let Some(saved) = checkpoints.load_checkpoint().await? {
                    tracing::info!(
                        "Restored refresh checkpoint: {} at index {}",
                        saved.phase,
                        saved.continuation_index
                    );
                    *state = saved;
                }
            }
        }
        Ok(state.clone())
    }

    /// Run one refresh pass from `request.continue_from_index`.
    ///
    /// Never errors: failures come back in the response's `error` field.
    pub async fn refresh(
        &self,
        request: RefreshRequest,
        cancel: Option<&CancelSignal>,
    ) -> RefreshResponse {
        let Ok(_run) = self.run_lock.try_lock() else {
            tracing::warn!("Refresh requested while another run is active");
            return RefreshResponse::failed(
                0,
                request.continue_from_index,
                "A refresh is already running",
            );
        };
        self.resolver.clear_caches();

        let records = match self.store.get_all().await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Failed to load game library: {}", e);
                return RefreshResponse::failed(0, request.continue_from_index, e.to_string());
            }
        };

        let mode = RefreshMode::from_all_games(request.all_games);
        let start = request.continue_from_index.min(records.len());

        let state = match self.begin(mode, start, &records).await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!("Failed to start refresh: {}", e);
                return RefreshResponse::failed(0, start, e.to_string());
            }
        };

        self.run_pass(state, &records, cancel).await
    }

    /// Enter `Running`, resuming a paused or failed run when `start > 0`.
    async fn begin(
        &self,
        mode: RefreshMode,
        start: usize,
        records: &[GameRecord],
    ) -> Result<RefreshState> {
        let mut state = self.state.lock().await.clone();

        if start > 0 && state.phase == RefreshPhase::Idle {
            if let Some(checkpoints) = &self.checkpoints {
                if let Some(saved) = checkpoints.load_checkpoint().await? {
                    state = saved;
                }
            }
        }

        // Left over from a process that died mid-run
        if state.phase == RefreshPhase::Running {
            state.phase = RefreshPhase::Failed {
                error: "interrupted".to_string(),
            };
        }

        if start > 0 && state.phase.is_resumable() {
            tracing::info!("Resuming refresh at index {} ({})", start, state.phase);
            state.apply(RefreshEvent::Resume)?;
            state.mode = mode;
            state.continuation_index = start;
            // Unmatched games were answered or skipped before resuming
            state.unmatched_games.clear();
            state.missing_boxart_games.retain(|game| {
                records
                    .iter()
                    .find(|r| r.id == game.game_id)
                    .is_some_and(|r| !r.has_boxart() && !r.metadata_ignored)
            });
        } else {
            tracing::info!("Starting refresh ({:?}) at index {}", mode, start);
            state.start(mode, start)?;
        }

        self.commit(&state).await?;
        Ok(state)
    }

    async fn run_pass(
        &self,
        mut state: RefreshState,
        records: &[GameRecord],
        cancel: Option<&CancelSignal>,
    ) -> RefreshResponse {
        let start = state.continuation_index;
        let eligible: Vec<usize> = (start..records.len())
            .filter(|&index| state.mode.includes(&records[index]))
            .collect();
        let total = eligible.len();

        if total == 0 {
            self.progress.emit(RefreshProgress::nothing_to_do());
        }

        let mut count = 0;
        for (n, &index) in eligible.iter().enumerate() {
            let record = &records[index];
            state.continuation_index = index;

            if cancel.is_some_and(CancelSignal::is_cancelled) {
                return self.abort(state, count, EngineError::Cancelled).await;
            }

            self.progress
                .emit(RefreshProgress::game(n + 1, total, index, &record.title));

            let result = match cancel {
                Some(cancel) => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(EngineError::Cancelled),
                    result = self.process_game(record) => result,
                },
                None => self.process_game(record).await,
            };

            match result {
                Ok(GameOutcome::Unmatched(game)) => state.unmatched_games.push(game),
                Ok(GameOutcome::Updated { missing }) => {
                    if let Some(missing) = missing {
                        state.add_missing(missing);
                    }
                }
                Err(e) => return self.abort(state, count, e).await,
            }

            count += 1;
            state.processed += 1;
            state.continuation_index = index + 1;

            if let Err(e) = self.commit(&state).await {
                return self.abort(state, count, e).await;
            }
        }

        state.continuation_index = records.len();
        self.finish(state, count).await
    }

    async fn finish(&self, state: RefreshState, count: usize) -> RefreshResponse {
        let unmatched = state.unmatched_games.len();
        let missing = state.missing_boxart_games.len();
        let cont = state.continuation_index;

        if unmatched == 0 && missing == 0 {
            if let Err(e) = self.complete().await {
                return self.abort(state, count, e).await;
            }
        }

        let mut finished = state.clone();
        if let Err(e) = finished.apply(RefreshEvent::PassFinished {
            unmatched,
            missing_artwork: missing,
        }) {
            return self.abort(state, count, e).await;
        }

        let response = match finished.phase {
            RefreshPhase::PausedForUnmatched => {
                tracing::info!("Refresh paused: {} unmatched games", unmatched);
                RefreshResponse::paused_for_unmatched(count, cont, finished.unmatched_games.clone())
            }
            RefreshPhase::PausedForArtwork => {
                tracing::info!("Refresh paused: {} games missing box art", missing);
                RefreshResponse::paused_for_artwork(count, cont, finished.missing_boxart_games.clone())
            }
            _ => {
                tracing::info!("Refresh completed: {} games processed", finished.processed);
                RefreshResponse::completed(count, cont)
            }
        };

        let committed = if finished.phase == RefreshPhase::Completed {
            *self.state.lock().await = finished;
            Ok(())
        } else {
            self.commit(&finished).await
        };

        match committed {
            Ok(()) => response,
            Err(e) => self.abort(state, count, e).await,
        }
    }

    /// Reload the library and drop the checkpoint.
    async fn complete(&self) -> Result<()> {
        self.store.reload().await?;
        if let Some(checkpoints) = &self.checkpoints {
            checkpoints.clear_checkpoint().await?;
        }
        Ok(())
    }

    async fn abort(&self, mut state: RefreshState, count: usize, error: EngineError) -> RefreshResponse {
        match &error {
            EngineError::Cancelled => {
                tracing::info!("Refresh cancelled at index {}", state.continuation_index)
            }
            e => tracing::error!("Refresh failed at index {}: {}", state.continuation_index, e),
        }

        let message = error.to_string();
        if let Err(e) = state.apply(RefreshEvent::Abort {
            error: message.clone(),
        }) {
            tracing::error!("Cannot record refresh failure: {}", e);
        }
        if let Err(e) = self.commit(&state).await {
            tracing::error!("Failed to checkpoint aborted refresh: {}", e);
            *self.state.lock().await = state.clone();
        }

        RefreshResponse::failed(count, state.continuation_index, message)
    }

    /// Checkpoint `state`, then make it current.
    async fn commit(&self, state: &RefreshState) -> Result<()> {
        if let Some(checkpoints) = &self.checkpoints {
            checkpoints.save_checkpoint(state).await?;
        }
        *self.state.lock().await = state.clone();
        Ok(())
    }

    async fn process_game(&self, record: &GameRecord) -> Result<GameOutcome> {
        match self.resolver.resolve(record).await {
            MatchOutcome::Unmatched(candidates) => {
                tracing::info!(
                    "No confident match for '{}' ({} candidates)",
                    record.title,
                    candidates.len()
                );
                Ok(GameOutcome::Unmatched(UnmatchedGame {
                    game_id: record.id.clone(),
                    title: record.title.clone(),
                    candidate_matches: candidates,
                }))
            }
            MatchOutcome::Matched(matches) => {
                let updated = self.enrich_and_save(record, &matches).await?;
                let missing = (!updated.has_boxart()).then(|| missing_entry(&updated));
                if missing.is_some() {
                    tracing::debug!("'{}' matched but has no box art", record.title);
                }
                Ok(GameOutcome::Updated { missing })
            }
        }
    }

    /// Fetch, merge over the existing record, cache images, save.
    async fn enrich_and_save(&self, record: &GameRecord, matches: &[CatalogMatch]) -> Result<GameRecord> {
        let enrichment = self.resolver.fetch(record, matches).await;

        let mut updated = record.clone();

        let mut description = enrichment.description;
        description.fill_from(&record.description);
        updated.description = description;

        let mut artwork = enrichment.artwork;
        artwork.fill_from(&record.artwork);
        if let Some(cache) = &self.image_cache {
            artwork = cache.cache_images(&artwork, &record.id).await?;
        }
        updated.artwork = artwork;

        if updated.stable_platform_id().is_none() {
            updated.platform_id = enrichment.platform_id;
        }
        updated.updated_at = Some(Utc::now());

        self.store.save(&updated, Some(record)).await.map_err(|e| {
            tracing::error!("Failed to save '{}': {}", record.title, e);
            e
        })?;
        Ok(updated)
    }

    /// Apply the user's answers to the unmatched dialog.
    ///
    /// Chosen matches are fetched and saved; games that still lack box art
    /// join the missing-artwork list. Ignored games are flagged so later
    /// runs skip them. On a save error the games handled so far are still
    /// checkpointed.
    pub async fn apply_unmatched_resolution(
        &self,
        resolution: UnmatchedResolution,
    ) -> Result<RefreshOutcome> {
        for (game_id, chosen) in &resolution.chosen {
            let (source, external_id) = CatalogMatch::parse_id(&chosen.id)?;
            if source != chosen.source || external_id != chosen.external_id {
                return Err(EngineError::Validation(format!(
                    "Match {} for {} does not agree with its source and external id",
                    chosen.id, game_id
                )));
            }
        }

        let _run = self.run_lock.lock().await;
        let mut state = self.restore().await?;

        let applied = self.resolve_unmatched(resolution, &mut state).await;
        if applied.is_ok()
            && state.phase == RefreshPhase::PausedForUnmatched
            && state.unmatched_games.is_empty()
        {
            state.apply(RefreshEvent::UnmatchedResolved)?;
        }

        // Games saved before a failure stay resolved.
        if let Err(e) = self.commit(&state).await {
            if applied.is_ok() {
                return Err(e);
            }
            tracing::error!("Failed to checkpoint partial resolution: {}", e);
        }
        applied?;
        Ok(state.to_outcome())
    }

    async fn resolve_unmatched(
        &self,
        resolution: UnmatchedResolution,
        state: &mut RefreshState,
    ) -> Result<()> {
        for (game_id, chosen) in resolution.chosen {
            let Some(record) = self.store.get(&game_id).await? else {
                tracing::warn!("Resolution for unknown game {}", game_id);
                state.remove_unmatched(&game_id);
                continue;
            };

            tracing::info!("'{}' resolved to {}", record.title, chosen.display_name());
            let matches = self.resolver.expand_choice(chosen, &record.title).await;
            let updated = self.enrich_and_save(&record, &matches).await?;

            state.remove_unmatched(&game_id);
            if !updated.has_boxart() {
                state.add_missing(missing_entry(&updated));
            }
        }

        for game_id in resolution.ignored {
            if let Some(record) = self.store.get(&game_id).await? {
                let mut ignored = record.clone();
                ignored.metadata_ignored = true;
                self.store.save(&ignored, Some(&record)).await?;
                tracing::info!("'{}' will be skipped by future refreshes", record.title);
            }
            state.remove_unmatched(&game_id);
        }

        Ok(())
    }

    /// Apply user-chosen box art URLs.
    ///
    /// Every URL is checked before anything is saved.
    pub async fn apply_artwork_resolution(&self, choices: ArtworkResolution) -> Result<RefreshOutcome> {
        if let Some((game_id, _)) = choices.iter().find(|(_, url)| url.trim().is_empty()) {
            return Err(EngineError::Validation(format!("Empty box art URL for {}", game_id)));
        }

        let _run = self.run_lock.lock().await;
        let mut state = self.restore().await?;

        for (game_id, url) in choices {
            let Some(record) = self.store.get(&game_id).await? else {
                tracing::warn!("Artwork choice for unknown game {}", game_id);
                state.remove_missing(&game_id);
                continue;
            };

            let mut updated = record.clone();
            updated.artwork.set(AssetKind::BoxArt, url.trim(), None);
            if let Some(cache) = &self.image_cache {
                updated.artwork = cache.cache_images(&updated.artwork, &updated.id).await?;
            }
            updated.updated_at = Some(Utc::now());
            self.store.save(&updated, Some(&record)).await?;

            tracing::info!("Box art set for '{}'", record.title);
            state.remove_missing(&game_id);
        }

        self.commit(&state).await?;
        Ok(state.to_outcome())
    }

    /// Run to completion, answering each pause through `ui` and resuming.
    ///
    /// Unmatched games are presented first; unanswered ones are dropped on
    /// resume. Stops when the run completes, fails, or the artwork dialog
    /// resolves nothing.
    pub async fn run_interactive(
        &self,
        request: RefreshRequest,
        ui: &dyn ResolutionUi,
        cancel: Option<&CancelSignal>,
    ) -> RefreshResponse {
        let mut response = self.refresh(request, cancel).await;
        let mut total_count = response.count;

        while response.error.is_none() && response.needs_input() {
            let applied = match response.unmatched_games.as_deref() {
                Some(unmatched) if !unmatched.is_empty() => {
                    let resolution = ui.present_unmatched(unmatched).await;
                    self.apply_unmatched_resolution(resolution).await
                }
                _ => {
                    let missing = response.missing_boxart_games.clone().unwrap_or_default();
                    let choices = ui.present_missing_artwork(&missing).await;
                    if choices.is_empty() {
                        break;
                    }
                    self.apply_artwork_resolution(choices).await
                }
            };

            if let Err(e) = applied {
                return RefreshResponse::failed(total_count, response.continuation_index, e.to_string());
            }

            response = self
                .refresh(request.resume_at(response.continuation_index), cancel)
                .await;
            total_count += response.count;
        }

        response.count = total_count;
        response
    }
}

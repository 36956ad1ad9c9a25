mod common;

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use common::{engine, full_artwork, library, FakeProvider, MemoryStore, ScriptedUi};
use game_metadata_engine::core::{AssetKind, GameRecord, ProviderKind, RefreshRequest};
use game_metadata_engine::error::EngineError;
use game_metadata_engine::providers::GameProvider;
use game_metadata_engine::refresh::{
    CancelSignal, ProgressEvent, RefreshPhase, RefreshProgress, UnmatchedResolution,
    REFRESH_PROGRESS_TOPIC,
};

fn drain(receiver: &mut broadcast::Receiver<ProgressEvent>) -> Vec<RefreshProgress> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        assert_eq!(event.topic, REFRESH_PROGRESS_TOPIC);
        events.push(event.payload);
    }
    events
}

#[tokio::test]
async fn test_missing_boxart_pause_then_resume_past_fixed_game() {
    let steam = Arc::new(
        FakeProvider::steam()
            .with_bare_game("100", "Gris")
            .with_game("200", "Celeste"),
    );
    let store = Arc::new(MemoryStore::with_records(library(&[
        ("g0", "Gris"),
        ("g1", "Celeste"),
    ])));
    let engine = engine(vec![steam.clone() as Arc<dyn GameProvider>], store.clone());

    let response = engine.refresh_metadata(RefreshRequest::missing()).await;
    assert!(!response.success);
    assert!(response.error.is_none());
    assert!(response.unmatched_games.is_none());
    assert_eq!(response.count, 2);
    let missing = response.missing_boxart_games.clone().unwrap();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].game_id, "g0");
    assert_eq!(missing[0].platform_hint_id.as_deref(), Some("100"));
    assert!(store.record("g1").has_boxart());
    assert_eq!(engine.status().await.unwrap().phase, RefreshPhase::PausedForArtwork);

    // Fix G through the missing-artwork dialog
    let mut choices = BTreeMap::new();
    choices.insert("g0".to_string(), "https://art.test/gris.png".to_string());
    let outcome = engine.apply_artwork_resolution(choices).await.unwrap();
    assert!(outcome.missing_boxart_games.is_empty());
    assert_eq!(
        store.record("g0").artwork.get(AssetKind::BoxArt),
        Some("https://art.test/gris.png")
    );

    let resumed = engine
        .refresh_metadata(RefreshRequest::missing().resume_at(1))
        .await;
    assert!(resumed.success, "{}", resumed.display());
    assert_eq!(resumed.count, 0);

    // G was not searched again
    assert_eq!(steam.searched(), vec!["Gris", "Celeste"]);
    assert_eq!(engine.status().await.unwrap().phase, RefreshPhase::Completed);
    assert_eq!(store.reload_count(), 1);
    assert!(store.checkpoint().is_none());
}

#[tokio::test]
async fn test_persistence_failure_aborts_and_resume_finishes_the_rest() {
    let steam = Arc::new(
        FakeProvider::steam()
            .with_game("1", "Braid")
            .with_game("2", "Celeste")
            .with_game("3", "Fez")
            .with_game("4", "Limbo"),
    );
    let store = Arc::new(MemoryStore::with_records(library(&[
        ("g0", "Braid"),
        ("g1", "Celeste"),
        ("g2", "Fez"),
        ("g3", "Limbo"),
    ])));
    store.fail_saves_for("g2");

    let first = engine(vec![steam.clone() as Arc<dyn GameProvider>], store.clone());
    let mut progress = first.subscribe_progress();

    let failed = first.refresh_metadata(RefreshRequest::missing()).await;
    assert!(!failed.success);
    assert!(failed.error.as_deref().unwrap().contains("disk full"));
    assert_eq!(failed.count, 2);
    assert_eq!(failed.continuation_index, 2);
    assert_eq!(store.saves(), vec!["g0", "g1"]);

    let first_events = drain(&mut progress);
    assert_eq!(
        first_events.iter().map(|p| p.current).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(first_events.iter().all(|p| p.total == 4));

    let checkpoint = store.checkpoint().unwrap();
    assert!(matches!(checkpoint.phase, RefreshPhase::Failed { .. }));
    assert_eq!(checkpoint.continuation_index, 2);

    // A new engine picks the run up from the checkpoint
    store.heal();
    let second = engine(vec![steam.clone() as Arc<dyn GameProvider>], store.clone());
    let mut progress = second.subscribe_progress();

    let resumed = second
        .refresh_metadata(RefreshRequest::missing().resume_at(failed.continuation_index))
        .await;
    assert!(resumed.success, "{}", resumed.display());
    assert_eq!(resumed.count, 2);
    assert_eq!(failed.count + resumed.count, 4);

    let resumed_events = drain(&mut progress);
    assert_eq!(
        resumed_events.iter().map(|p| p.library_index).collect::<Vec<_>>(),
        vec![Some(2), Some(3)]
    );
    assert_eq!(resumed_events.last().map(|p| (p.current, p.total)), Some((2, 2)));
    assert_eq!(store.saves(), vec!["g0", "g1", "g2", "g3"]);
}

#[tokio::test]
async fn test_unmatched_pause_takes_precedence_over_missing_artwork() {
    let steam = Arc::new(
        FakeProvider::steam()
            .with_game("1", "Celeste")
            .with_bare_game("2", "Gris"),
    );
    let store = Arc::new(MemoryStore::with_records(library(&[
        ("g0", "Celeste"),
        ("g1", "Gris"),
        ("g2", "Portl"),
    ])));
    let engine = engine(vec![steam.clone() as Arc<dyn GameProvider>], store.clone());

    let response = engine.refresh_metadata(RefreshRequest::missing()).await;
    assert!(!response.success);
    assert!(response.missing_boxart_games.is_none());
    let unmatched = response.unmatched_games.unwrap();
    assert_eq!(unmatched.len(), 1);
    assert_eq!(unmatched[0].game_id, "g2");
    assert_eq!(unmatched[0].candidate_matches.len(), 2);

    let state = engine.status().await.unwrap();
    assert_eq!(state.phase, RefreshPhase::PausedForUnmatched);
    assert_eq!(state.missing_boxart_games.len(), 1);

    let mut resolution = UnmatchedResolution::default();
    resolution.ignored.insert("g2".to_string());
    let outcome = engine.apply_unmatched_resolution(resolution).await.unwrap();
    assert!(outcome.unmatched_games.is_empty());
    assert_eq!(outcome.missing_boxart_games[0].game_id, "g1");
    assert!(store.record("g2").metadata_ignored);
    assert_eq!(engine.status().await.unwrap().phase, RefreshPhase::PausedForArtwork);

    // Resuming reports the artwork pause
    let resumed = engine
        .refresh_metadata(RefreshRequest::missing().resume_at(response.continuation_index))
        .await;
    assert_eq!(resumed.missing_boxart_games.unwrap()[0].game_id, "g1");

    // Ignored games are skipped by later runs
    let mut progress = engine.subscribe_progress();
    engine.refresh_metadata(RefreshRequest::all()).await;
    let titles: Vec<_> = drain(&mut progress)
        .into_iter()
        .filter_map(|p| p.game_title)
        .collect();
    assert_eq!(titles, vec!["Celeste", "Gris"]);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ends_at_total() {
    let steam = Arc::new(
        FakeProvider::steam()
            .with_game("1", "Braid")
            .with_game("2", "Celeste")
            .with_game("3", "Fez"),
    );
    let store = Arc::new(MemoryStore::with_records(library(&[
        ("g0", "Braid"),
        ("g1", "Celeste"),
        ("g2", "Fez"),
    ])));
    let engine = engine(vec![steam as Arc<dyn GameProvider>], store);
    let mut progress = engine.subscribe_progress();

    let response = engine.refresh_metadata(RefreshRequest::all()).await;
    assert!(response.success);
    assert_eq!(response.count, 3);

    let events = drain(&mut progress);
    assert_eq!(events.len(), 3);
    assert!(events.windows(2).all(|w| w[0].current < w[1].current));
    let last = events.last().unwrap();
    assert_eq!(last.current, last.total);
    assert_eq!(last.game_title.as_deref(), Some("Fez"));
}

#[tokio::test]
async fn test_missing_mode_skips_complete_games() {
    let steam = Arc::new(FakeProvider::steam().with_game("1", "Braid").with_game("2", "Fez"));
    let mut complete = GameRecord::new("g0", "Braid");
    complete.artwork = full_artwork("local", "g0");
    let store = Arc::new(MemoryStore::with_records(vec![
        complete,
        GameRecord::new("g1", "Fez"),
    ]));
    let engine = engine(vec![steam.clone() as Arc<dyn GameProvider>], store);

    let response = engine.refresh_metadata(RefreshRequest::missing()).await;
    assert!(response.success);
    assert_eq!(response.count, 1);
    assert_eq!(steam.searched(), vec!["Fez"]);
}

#[tokio::test]
async fn test_cancelled_run_fails_and_can_resume() {
    let steam = Arc::new(FakeProvider::steam().with_game("1", "Braid"));
    let store = Arc::new(MemoryStore::with_records(library(&[("g0", "Braid")])));
    let engine = engine(vec![steam.clone() as Arc<dyn GameProvider>], store.clone());

    let cancel = CancelSignal::new();
    cancel.cancel();
    let response = engine
        .refresh_with_cancel(RefreshRequest::missing(), &cancel)
        .await;
    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("Refresh cancelled"));
    assert_eq!(response.count, 0);
    assert!(steam.searched().is_empty());

    let state = engine.status().await.unwrap();
    assert!(state.phase.is_resumable());

    let resumed = engine.refresh_metadata(RefreshRequest::missing()).await;
    assert!(resumed.success);
    assert_eq!(resumed.count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_refresh_while_running_fails_fast() {
    let steam = Arc::new(
        FakeProvider::steam()
            .with_game("1", "Braid")
            .with_delay(Duration::from_secs(5)),
    );
    let store = Arc::new(MemoryStore::with_records(library(&[("g0", "Braid")])));
    let engine = engine(vec![steam as Arc<dyn GameProvider>], store);

    let (first, second) = tokio::join!(
        engine.refresh_metadata(RefreshRequest::all()),
        engine.refresh_metadata(RefreshRequest::all())
    );
    assert!(first.success);
    assert_eq!(second.error.as_deref(), Some("A refresh is already running"));
}

#[tokio::test]
async fn test_stable_platform_id_skips_search() {
    let steam = Arc::new(FakeProvider::steam().with_entry(
        "620",
        "Portal 2",
        full_artwork("steam", "620"),
        Some("620"),
    ));
    let store = Arc::new(MemoryStore::with_records(vec![
        GameRecord::new("g0", "Portal Two (GOTY)").with_platform_id("620"),
    ]));
    let engine = engine(vec![steam.clone() as Arc<dyn GameProvider>], store.clone());

    let response = engine.refresh_metadata(RefreshRequest::all()).await;
    assert!(response.success, "{}", response.display());
    assert!(steam.searched().is_empty());
    assert_eq!(steam.lookup_count(), 1);

    let record = store.record("g0");
    assert!(record.has_boxart());
    assert_eq!(record.title, "Portal Two (GOTY)");
    assert_eq!(record.platform_id.as_deref(), Some("620"));
}

#[tokio::test]
async fn test_failing_catalog_is_swallowed() {
    let steam = Arc::new(FakeProvider::steam().with_bare_game("1", "Celeste"));
    let sgdb = Arc::new(FakeProvider::failing(
        "steamgriddb",
        ProviderKind::CommunityArtwork,
    ));
    let store = Arc::new(MemoryStore::with_records(library(&[("g0", "Celeste")])));
    let engine = engine(
        vec![
            steam as Arc<dyn GameProvider>,
            sgdb.clone() as Arc<dyn GameProvider>,
        ],
        store.clone(),
    );

    let response = engine.refresh_metadata(RefreshRequest::missing()).await;
    assert!(response.error.is_none());
    assert_eq!(sgdb.searched(), vec!["Celeste"]);
    assert_eq!(response.missing_boxart_games.unwrap()[0].game_id, "g0");

    // Description still merged from the working catalog
    let record = store.record("g0");
    assert_eq!(record.description.summary.as_deref(), Some("Celeste from steam"));
    assert!(record.artwork.is_empty());
}

#[tokio::test]
async fn test_official_artwork_wins_over_community() {
    let steam = Arc::new(FakeProvider::steam().with_game("1", "Celeste"));
    let sgdb = Arc::new(FakeProvider::steamgriddb().with_game("77", "Celeste"));
    let store = Arc::new(MemoryStore::with_records(library(&[("g0", "Celeste")])));
    let engine = engine(
        vec![
            sgdb as Arc<dyn GameProvider>,
            steam as Arc<dyn GameProvider>,
        ],
        store.clone(),
    );

    let candidates = engine.artwork_candidates("g0").await.unwrap();
    assert_eq!(candidates.len(), 4);
    assert_eq!(candidates[0].source, "steam");
    assert_eq!(candidates[1].source, "steam");

    let response = engine.refresh_metadata(RefreshRequest::missing()).await;
    assert!(response.success);
    assert_eq!(
        store.record("g0").artwork.get(AssetKind::BoxArt),
        Some("https://steam.test/1/box.jpg")
    );
}

#[tokio::test]
async fn test_search_ranks_exact_title_first() {
    let steam = Arc::new(
        FakeProvider::steam()
            .with_game("1", "Half-Life 2: Episode One")
            .with_game("2", "Half-Life 2"),
    );
    let rawg = Arc::new(FakeProvider::failing("rawg", ProviderKind::General));
    let store = Arc::new(MemoryStore::default());
    let engine = engine(
        vec![steam as Arc<dyn GameProvider>, rawg as Arc<dyn GameProvider>],
        store,
    );

    let results = engine.search("half-life 2", None).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, "steam:2");
}

#[tokio::test]
async fn test_interactive_run_resolves_both_pauses() {
    let steam = Arc::new(
        FakeProvider::steam()
            .with_game("1", "Portal")
            .with_bare_game("2", "Gris"),
    );
    let store = Arc::new(MemoryStore::with_records(library(&[
        ("g0", "Portl"),
        ("g1", "Gris"),
    ])));
    let engine = engine(vec![steam as Arc<dyn GameProvider>], store.clone());

    let mut ui = ScriptedUi::default();
    ui.picks.insert("g0".into(), "steam:1".into());
    ui.boxart.insert("g1".into(), "https://art.test/gris.png".into());

    let response = engine
        .run_interactive(RefreshRequest::missing(), &ui, None)
        .await;
    assert!(response.success, "{}", response.display());
    assert_eq!(response.count, 2);
    assert_eq!(ui.unmatched_dialogs.load(Ordering::SeqCst), 1);
    assert_eq!(ui.artwork_dialogs.load(Ordering::SeqCst), 1);

    let portal = store.record("g0");
    assert_eq!(portal.title, "Portl");
    assert_eq!(portal.artwork.get(AssetKind::BoxArt), Some("https://steam.test/1/box.jpg"));
    assert_eq!(portal.description.summary.as_deref(), Some("Portal from steam"));
    assert_eq!(
        store.record("g1").artwork.get(AssetKind::BoxArt),
        Some("https://art.test/gris.png")
    );
    assert_eq!(engine.status().await.unwrap().phase, RefreshPhase::Completed);
}

#[tokio::test]
async fn test_interactive_run_stops_when_artwork_left_unanswered() {
    let steam = Arc::new(FakeProvider::steam().with_bare_game("2", "Gris"));
    let store = Arc::new(MemoryStore::with_records(library(&[("g0", "Gris")])));
    let engine = engine(vec![steam as Arc<dyn GameProvider>], store);

    let ui = ScriptedUi::default();
    let response = engine
        .run_interactive(RefreshRequest::missing(), &ui, None)
        .await;
    assert!(!response.success);
    assert!(response.needs_input());
    assert_eq!(ui.artwork_dialogs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_blank_artwork_choice_rejects_whole_resolution() {
    let steam = Arc::new(
        FakeProvider::steam()
            .with_bare_game("100", "Gris")
            .with_bare_game("200", "Limbo"),
    );
    let store = Arc::new(MemoryStore::with_records(library(&[
        ("g0", "Gris"),
        ("g1", "Limbo"),
    ])));
    let engine = engine(vec![steam as Arc<dyn GameProvider>], store.clone());

    let response = engine.refresh_metadata(RefreshRequest::missing()).await;
    assert_eq!(response.missing_boxart_games.map(|m| m.len()), Some(2));
    let saves_before = store.saves();
    let checkpoint_before = store.checkpoint().unwrap();

    let mut choices = BTreeMap::new();
    choices.insert("g0".to_string(), "https://art.test/gris.png".to_string());
    choices.insert("g1".to_string(), "   ".to_string());
    let result = engine.apply_artwork_resolution(choices).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    assert!(!store.record("g0").has_boxart());
    assert_eq!(store.saves(), saves_before);
    let checkpoint = store.checkpoint().unwrap();
    assert_eq!(checkpoint.missing_boxart_games, checkpoint_before.missing_boxart_games);
    assert_eq!(checkpoint.phase, RefreshPhase::PausedForArtwork);
}

#[tokio::test]
async fn test_save_failure_keeps_games_resolved_before_it() {
    let steam = Arc::new(
        FakeProvider::steam()
            .with_game("1", "Celeste")
            .with_game("2", "Gris"),
    );
    let store = Arc::new(MemoryStore::with_records(library(&[
        ("g0", "Portl"),
        ("g1", "Hollow Knight"),
    ])));
    let engine = engine(vec![steam as Arc<dyn GameProvider>], store.clone());

    let response = engine.refresh_metadata(RefreshRequest::missing()).await;
    let unmatched = response.unmatched_games.unwrap();
    assert_eq!(unmatched.len(), 2);

    let mut resolution = UnmatchedResolution::default();
    for game in &unmatched {
        resolution
            .chosen
            .insert(game.game_id.clone(), game.candidate_matches[0].clone());
    }
    store.fail_saves_for("g1");

    let result = engine.apply_unmatched_resolution(resolution).await;
    assert!(matches!(result, Err(EngineError::Persistence(_))));
    assert_eq!(store.saves(), vec!["g0"]);

    let checkpoint = store.checkpoint().unwrap();
    let still_unmatched: Vec<_> = checkpoint
        .unmatched_games
        .iter()
        .map(|g| g.game_id.as_str())
        .collect();
    assert_eq!(still_unmatched, vec!["g1"]);
    assert_eq!(checkpoint.phase, RefreshPhase::PausedForUnmatched);

    let status = engine.status().await.unwrap();
    assert_eq!(status.unmatched_games.len(), 1);
}

#[tokio::test]
async fn test_chosen_match_with_malformed_id_is_rejected() {
    let steam = Arc::new(FakeProvider::steam().with_game("1", "Celeste"));
    let store = Arc::new(MemoryStore::with_records(library(&[("g0", "Portl")])));
    let engine = engine(vec![steam as Arc<dyn GameProvider>], store.clone());

    let response = engine.refresh_metadata(RefreshRequest::missing()).await;
    let candidate = response.unmatched_games.unwrap()[0].candidate_matches[0].clone();

    let mut malformed = candidate.clone();
    malformed.id = "bogus".to_string();
    let mut resolution = UnmatchedResolution::default();
    resolution.chosen.insert("g0".to_string(), malformed);
    let result = engine.apply_unmatched_resolution(resolution).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    // Well formed, but naming another catalog
    let mut mismatched = candidate;
    mismatched.id = format!("rawg:{}", mismatched.external_id);
    let mut resolution = UnmatchedResolution::default();
    resolution.chosen.insert("g0".to_string(), mismatched);
    let result = engine.apply_unmatched_resolution(resolution).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    assert!(store.saves().is_empty());
    assert_eq!(store.checkpoint().unwrap().unmatched_games.len(), 1);
}

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use game_metadata_engine::core::{MissingBoxartGame, UnmatchedGame};
use game_metadata_engine::ranking::normalize_title;
use game_metadata_engine::refresh::{ArtworkResolution, RefreshMode, ResolutionUi, UnmatchedResolution};
use game_metadata_engine::store::{FsImageCache, SqliteRecordStore};
use game_metadata_engine::{
    CancelSignal, EngineConfig, GameRecord, GameRecordStore, ImageCache, MetadataEngine,
    RefreshRequest, RefreshResponse,
};

#[derive(Parser)]
#[command(name = "game-metadata-cli")]
#[command(about = "Game metadata & artwork engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database path (overrides config and GME_DB_PATH)
    #[arg(short, long)]
    db: Option<String>,

    /// Image cache directory (overrides config and GME_CACHE_DIR)
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh library metadata
    Refresh {
        /// Refresh every game, not only those missing box art or banner
        #[arg(short, long)]
        all: bool,

        /// Library index to start from
        #[arg(long, default_value = "0")]
        from: usize,

        /// Answer unmatched / missing-artwork pauses on the terminal
        #[arg(short, long)]
        interactive: bool,
    },

    /// Resume a paused or failed refresh from its checkpoint
    Resume {
        #[arg(short, long)]
        interactive: bool,
    },

    /// Search every catalog for a title
    Search {
        title: String,

        /// Steam app id hint
        #[arg(long)]
        app_id: Option<String>,

        /// Maximum results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Add a game to the library
    Add {
        title: String,

        /// Record id (defaults to a slug of the title)
        #[arg(long)]
        id: Option<String>,

        /// Known Steam app id
        #[arg(long)]
        app_id: Option<String>,
    },

    /// List library games
    List,

    /// Show the refresh checkpoint
    Status,

    /// Resolve an unmatched game with a search result id (e.g. steam:620)
    Choose { game_id: String, match_id: String },

    /// Stop matching a game automatically
    Ignore { game_id: String },

    /// Set a game's box art URL
    SetBoxart { game_id: String, url: String },

    /// List artwork offers for a game
    Artwork {
        game_id: String,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

/// Reads pause answers from stdin.
struct TerminalUi {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl TerminalUi {
    fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    async fn prompt(&self, question: &str) -> String {
        let mut stdout = tokio::io::stdout();
        let _ = stdout.write_all(question.as_bytes()).await;
        let _ = stdout.flush().await;

        let mut lines = self.lines.lock().await;
        match lines.next_line().await {
            Ok(Some(line)) => line.trim().to_string(),
            _ => String::new(),
        }
    }
}

#[async_trait]
impl ResolutionUi for TerminalUi {
    async fn present_unmatched(&self, games: &[UnmatchedGame]) -> UnmatchedResolution {
        let mut resolution = UnmatchedResolution::default();

        for game in games {
            println!("\n❓ No confident match for '{}' ({})", game.title, game.game_id);
            for (i, candidate) in game.candidate_matches.iter().enumerate() {
                println!("   {}. {}", i + 1, candidate.display_name());
            }

            let answer = self
                .prompt("   Pick a number, 'i' to ignore, Enter to skip: ")
                .await;
            if answer.eq_ignore_ascii_case("i") {
                resolution.ignored.insert(game.game_id.clone());
            } else if let Some(candidate) = answer
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|n| game.candidate_matches.get(n))
            {
                resolution.chosen.insert(game.game_id.clone(), candidate.clone());
            }
        }
        resolution
    }

    async fn present_missing_artwork(&self, games: &[MissingBoxartGame]) -> ArtworkResolution {
        let mut choices = BTreeMap::new();

        for game in games {
            println!("\n🖼  '{}' ({}) has no box art", game.title, game.game_id);
            let url = self.prompt("   Box art URL (Enter to skip): ").await;
            if !url.is_empty() {
                choices.insert(game.game_id.clone(), url);
            }
        }
        choices
    }
}

fn slug(title: &str) -> String {
    normalize_title(title).replace(' ', "-")
}

fn print_response(response: &RefreshResponse) {
    if response.success {
        println!("\n✅ Refresh completed: {} games processed", response.count);
        return;
    }
    if let Some(error) = &response.error {
        println!("\n❌ Refresh failed after {} games: {}", response.count, error);
        println!("   Resume with: game-metadata-cli resume");
        return;
    }
    if let Some(unmatched) = &response.unmatched_games {
        println!("\n⏸  {} games need a match:", unmatched.len());
        for game in unmatched {
            println!("   {} ({})", game.title, game.game_id);
            for candidate in &game.candidate_matches {
                println!("      {}", candidate.display_name());
            }
        }
        println!("   Use 'choose <game-id> <match-id>' or 'ignore <game-id>', then 'resume'");
    }
    if let Some(missing) = &response.missing_boxart_games {
        println!("\n⏸  {} games are missing box art:", missing.len());
        for game in missing {
            println!("   {} ({})", game.title, game.game_id);
        }
        println!("   Use 'set-boxart <game-id> <url>', then 'resume'");
    }
}

async fn run_refresh(
    engine: &MetadataEngine,
    request: RefreshRequest,
    interactive: bool,
) -> RefreshResponse {
    let mut progress = engine.subscribe_progress();
    let printer = tokio::spawn(async move {
        while let Ok(event) = progress.recv().await {
            println!("[{}/{}] {}", event.payload.current, event.payload.total, event.payload.message);
        }
    });

    let cancel = CancelSignal::new();
    let on_ctrl_c = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n🛑 Cancelling after the current game...");
            on_ctrl_c.cancel();
        }
    });

    let response = if interactive {
        engine.run_interactive(request, &TerminalUi::new(), Some(&cancel)).await
    } else {
        engine.refresh_with_cancel(request, &cancel).await
    };

    watcher.abort();
    printer.abort();
    response
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "game_metadata_engine=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path).await?,
        None => EngineConfig::default(),
    };
    config.apply_env();
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }
    if let Some(dir) = cli.cache_dir {
        config.storage.cache_dir = dir;
    }

    let cache: Arc<dyn ImageCache> = Arc::new(FsImageCache::new(
        config.storage.cache_dir.clone(),
        config.timeouts.image_download(),
    )?);
    let store = Arc::new(
        SqliteRecordStore::new(&config.storage.db_path)
            .await?
            .with_image_cache(cache.clone()),
    );
    let engine = MetadataEngine::new(&config, store.clone(), Some(cache), Some(store.clone()))?;

    match cli.command {
        Commands::Refresh { all, from, interactive } => {
            let request = RefreshRequest {
                all_games: all,
                continue_from_index: from,
            };
            let response = run_refresh(&engine, request, interactive).await;
            print_response(&response);
        }

        Commands::Resume { interactive } => {
            let state = engine.status().await?;
            if !state.phase.is_resumable() {
                println!("Nothing to resume (refresh is {})", state.phase);
            } else {
                println!("▶️  Resuming at index {} ({})", state.continuation_index, state.phase);
                let request = RefreshRequest {
                    all_games: state.mode == RefreshMode::All,
                    continue_from_index: state.continuation_index,
                };
                let response = run_refresh(&engine, request, interactive).await;
                print_response(&response);
            }
        }

        Commands::Search { title, app_id, limit } => {
            println!("🔍 Searching for: {}", title);
            let results = engine.search(&title, app_id.as_deref()).await?;
            if results.is_empty() {
                println!("   No results");
            }
            for (i, candidate) in results.iter().take(limit).enumerate() {
                println!("   {}. [{}] {}", i + 1, candidate.id, candidate.display_name());
            }
        }

        Commands::Add { title, id, app_id } => {
            let id = id.unwrap_or_else(|| slug(&title));
            let mut record = GameRecord::new(&id, &title);
            if let Some(app_id) = app_id {
                record = record.with_platform_id(app_id);
            }
            store.insert(&record).await?;
            println!("➕ Added '{}' as {}", title, id);
        }

        Commands::List => {
            let records = store.get_all().await?;
            println!("📚 {} games", records.len());
            for (i, record) in records.iter().enumerate() {
                let flag = if record.metadata_ignored {
                    "ignored"
                } else if record.has_boxart() && record.has_banner() {
                    "complete"
                } else {
                    "missing art"
                };
                println!("   {:>3}. {} ({}) [{}]", i, record.title, record.id, flag);
            }
        }

        Commands::Status => {
            let state = engine.status().await?;
            println!("📊 Refresh: {}", state.phase);
            println!("   Mode: {:?}", state.mode);
            println!("   Next index: {}", state.continuation_index);
            println!("   Processed: {}", state.processed);
            println!("   Unmatched: {}", state.unmatched_games.len());
            println!("   Missing box art: {}", state.missing_boxart_games.len());
        }

        Commands::Choose { game_id, match_id } => {
            let state = engine.status().await?;
            let candidate = state
                .unmatched_games
                .iter()
                .find(|g| g.game_id == game_id)
                .and_then(|g| g.candidate_matches.iter().find(|m| m.id == match_id))
                .cloned();

            let candidate = match candidate {
                Some(candidate) => candidate,
                None => {
                    let record = store
                        .get(&game_id)
                        .await?
                        .ok_or_else(|| anyhow::anyhow!("Unknown game id: {}", game_id))?;
                    engine
                        .search(&record.title, None)
                        .await?
                        .into_iter()
                        .find(|m| m.id == match_id)
                        .ok_or_else(|| anyhow::anyhow!("No search result with id {}", match_id))?
                }
            };

            let mut resolution = UnmatchedResolution::default();
            resolution.chosen.insert(game_id, candidate);
            let outcome = engine.apply_unmatched_resolution(resolution).await?;
            println!(
                "✅ Applied: {} unmatched, {} missing box art remain",
                outcome.unmatched_games.len(),
                outcome.missing_boxart_games.len()
            );
        }

        Commands::Ignore { game_id } => {
            let mut resolution = UnmatchedResolution::default();
            resolution.ignored.insert(game_id.clone());
            engine.apply_unmatched_resolution(resolution).await?;
            println!("🙈 {} will be skipped by future refreshes", game_id);
        }

        Commands::SetBoxart { game_id, url } => {
            let mut choices = ArtworkResolution::new();
            choices.insert(game_id.clone(), url);
            let outcome = engine.apply_artwork_resolution(choices).await?;
            println!(
                "✅ Box art set for {} ({} games still missing box art)",
                game_id,
                outcome.missing_boxart_games.len()
            );
        }

        Commands::Artwork { game_id, limit } => {
            let candidates = engine.artwork_candidates(&game_id).await?;
            if candidates.is_empty() {
                println!("   No artwork found");
            }
            for candidate in candidates.iter().take(limit) {
                println!(
                    "   {:<7} {:<12} {}",
                    candidate.kind.as_str(),
                    candidate.source,
                    candidate.url
                );
            }
        }
    }

    engine.shutdown().await;
    Ok(())
}

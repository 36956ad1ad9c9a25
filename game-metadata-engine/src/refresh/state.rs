use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{GameRecord, MissingBoxartGame, RefreshOutcome, UnmatchedGame};
use crate::error::{EngineError, Result};

/// Which games a refresh run visits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Every game
    All,
    /// Only games missing box art or banner
    #[default]
    Missing,
}

impl RefreshMode {
    pub fn from_all_games(all_games: bool) -> Self {
        if all_games {
            RefreshMode::All
        } else {
            RefreshMode::Missing
        }
    }

    /// Whether a run in this mode visits `record`. Ignored games are never
    /// visited.
    pub fn includes(&self, record: &GameRecord) -> bool {
        if record.metadata_ignored {
            return false;
        }
        match self {
            RefreshMode::All => true,
            RefreshMode::Missing => !(record.has_boxart() && record.has_banner()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RefreshPhase {
    #[default]
    Idle,
    Running,
    PausedForUnmatched,
    PausedForArtwork,
    Completed,
    Failed { error: String },
}

impl RefreshPhase {
    pub fn is_paused(&self) -> bool {
        matches!(
            self,
            RefreshPhase::PausedForUnmatched | RefreshPhase::PausedForArtwork
        )
    }

    /// Paused or failed: a later call may pick the run up again.
    pub fn is_resumable(&self) -> bool {
        self.is_paused() || matches!(self, RefreshPhase::Failed { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            RefreshPhase::Idle => "idle",
            RefreshPhase::Running => "running",
            RefreshPhase::PausedForUnmatched => "paused_for_unmatched",
            RefreshPhase::PausedForArtwork => "paused_for_artwork",
            RefreshPhase::Completed => "completed",
            RefreshPhase::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for RefreshPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshPhase::Failed { error } => write!(f, "failed: {}", error),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshEvent {
    /// Begin a new run from the requested index
    Start,
    /// Continue a paused or failed run
    Resume,
    /// The pass reached the end of the library
    PassFinished { unmatched: usize, missing_artwork: usize },
    /// The user answered the unmatched dialog
    UnmatchedResolved,
    /// Cancellation or persistence failure
    Abort { error: String },
}

impl RefreshEvent {
    fn name(&self) -> &'static str {
        match self {
            RefreshEvent::Start => "start",
            RefreshEvent::Resume => "resume",
            RefreshEvent::PassFinished { .. } => "pass_finished",
            RefreshEvent::UnmatchedResolved => "unmatched_resolved",
            RefreshEvent::Abort { .. } => "abort",
        }
    }
}

/// The refresh state machine.
///
/// ```text
/// Idle ─Start─> Running ─PassFinished─> PausedForUnmatched | PausedForArtwork | Completed
/// PausedForUnmatched ─UnmatchedResolved─> PausedForArtwork
/// Paused* | Failed ─Resume─> Running
/// Running ─Abort─> Failed
/// ```
///
/// Unmatched games take precedence over missing artwork; artwork is
/// resolved second.
pub fn transition(from: &RefreshPhase, event: RefreshEvent) -> Result<RefreshPhase> {
    use RefreshPhase::*;

    let next = match (from, &event) {
        (Running, RefreshEvent::Start) => None,
        (_, RefreshEvent::Start) => Some(Running),
        (PausedForUnmatched | PausedForArtwork | Failed { .. }, RefreshEvent::Resume) => Some(Running),
        (Running, RefreshEvent::PassFinished { unmatched, missing_artwork }) => {
            Some(if *unmatched > 0 {
                PausedForUnmatched
            } else if *missing_artwork > 0 {
                PausedForArtwork
            } else {
                Completed
            })
        }
        (PausedForUnmatched, RefreshEvent::UnmatchedResolved) => Some(PausedForArtwork),
        (Running, RefreshEvent::Abort { error }) => Some(Failed {
            error: error.clone(),
        }),
        _ => None,
    };

    next.ok_or_else(|| EngineError::InvalidTransition {
        from: from.name().to_string(),
        event: event.name().to_string(),
    })
}

/// Serializable snapshot of a refresh run, checkpointed after every game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshState {
    #[serde(flatten)]
    pub phase: RefreshPhase,
    #[serde(default)]
    pub mode: RefreshMode,
    /// Next library index to process
    #[serde(default)]
    pub continuation_index: usize,
    /// Games processed across every invocation of this run
    #[serde(default)]
    pub processed: usize,
    #[serde(default)]
    pub unmatched_games: Vec<UnmatchedGame>,
    #[serde(default)]
    pub missing_boxart_games: Vec<MissingBoxartGame>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RefreshState {
    pub fn apply(&mut self, event: RefreshEvent) -> Result<()> {
        let next = transition(&self.phase, event)?;
        tracing::debug!("Refresh state: {} -> {}", self.phase.name(), next.name());
        self.phase = next;
        self.updated_at = Some(Utc::now());
        Ok(())
    }

    /// Start a fresh run at `index`, dropping any previous lists.
    pub fn start(&mut self, mode: RefreshMode, index: usize) -> Result<()> {
        self.apply(RefreshEvent::Start)?;
        self.mode = mode;
        self.continuation_index = index;
        self.processed = 0;
        self.unmatched_games.clear();
        self.missing_boxart_games.clear();
        Ok(())
    }

    pub fn remove_unmatched(&mut self, game_id: &str) {
        self.unmatched_games.retain(|g| g.game_id != game_id);
    }

    pub fn remove_missing(&mut self, game_id: &str) {
        self.missing_boxart_games.retain(|g| g.game_id != game_id);
    }

    pub fn add_missing(&mut self, game: MissingBoxartGame) {
        if !self.missing_boxart_games.iter().any(|g| g.game_id == game.game_id) {
            self.missing_boxart_games.push(game);
        }
    }

    pub fn to_outcome(&self) -> RefreshOutcome {
        RefreshOutcome {
            total_processed: self.processed,
            unmatched_games: self.unmatched_games.clone(),
            missing_boxart_games: self.missing_boxart_games.clone(),
            continuation_index: self.continuation_index,
        }
    }
}

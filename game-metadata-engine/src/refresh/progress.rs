use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Fixed topic progress records are published on.
pub const REFRESH_PROGRESS_TOPIC: &str = "refresh-metadata-progress";

/// Broadcast channel capacity
const BROADCAST_CAPACITY: usize = 256;

/// One progress record, emitted before each game is processed.
///
/// `current` counts games of the current invocation (1-based) and reaches
/// `total` on the last record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshProgress {
    pub current: usize,
    pub total: usize,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_title: Option<String>,
    /// Library position of the game
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_index: Option<usize>,
}

impl RefreshProgress {
    pub fn game(current: usize, total: usize, library_index: usize, title: &str) -> Self {
        Self {
            current,
            total,
            message: format!("Refreshing {} ({}/{})", title, current, total),
            game_title: Some(title.to_string()),
            library_index: Some(library_index),
        }
    }

    /// Record for a run with nothing to do.
    pub fn nothing_to_do() -> Self {
        Self {
            current: 0,
            total: 0,
            message: "No games to refresh".to_string(),
            game_title: None,
            library_index: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub topic: &'static str,
    pub payload: RefreshProgress,
}

/// Out-of-band progress channel. Emitting with no subscribers is not an
/// error.
#[derive(Debug, Clone)]
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, progress: RefreshProgress) {
        tracing::debug!("{}: {}", REFRESH_PROGRESS_TOPIC, progress.message);
        let _ = self.sender.send(ProgressEvent {
            topic: REFRESH_PROGRESS_TOPIC,
            payload: progress,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

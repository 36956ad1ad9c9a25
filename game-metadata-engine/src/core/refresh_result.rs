use serde::{Deserialize, Serialize};

use crate::core::CatalogMatch;

/// A game no catalog could confidently identify.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnmatchedGame {
    pub game_id: String,
    pub title: String,
    /// Best-ranked candidates, for the user to pick from
    #[serde(default)]
    pub candidate_matches: Vec<CatalogMatch>,
}

/// A matched game that still has no box art.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MissingBoxartGame {
    pub game_id: String,
    pub title: String,
    #[serde(default)]
    pub platform_hint_id: Option<String>,
}

/// Result of one refresh pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RefreshOutcome {
    pub total_processed: usize,
    #[serde(default)]
    pub unmatched_games: Vec<UnmatchedGame>,
    #[serde(default)]
    pub missing_boxart_games: Vec<MissingBoxartGame>,
    /// Library index to pass back as `continue_from_index` on resume
    pub continuation_index: usize,
}

/// Arguments of `refresh_metadata`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshRequest {
    /// `true` refreshes every game; `false` only games missing box art or banner
    #[serde(default)]
    pub all_games: bool,
    #[serde(default)]
    pub continue_from_index: usize,
}

impl RefreshRequest {
    pub fn all() -> Self {
        Self {
            all_games: true,
            continue_from_index: 0,
        }
    }

    pub fn missing() -> Self {
        Self {
            all_games: false,
            continue_from_index: 0,
        }
    }

    pub fn resume_at(mut self, index: usize) -> Self {
        self.continue_from_index = index;
        self
    }
}

/// What `refresh_metadata` returns. Progress goes out on the event channel,
/// not here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RefreshResponse {
    pub success: bool,
    /// Games processed by this invocation
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmatched_games: Option<Vec<UnmatchedGame>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_boxart_games: Option<Vec<MissingBoxartGame>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub continuation_index: usize,
}

impl RefreshResponse {
    pub fn completed(count: usize, continuation_index: usize) -> Self {
        Self {
            success: true,
            count,
            continuation_index,
            ..Default::default()
        }
    }

    pub fn failed(count: usize, continuation_index: usize, error: impl Into<String>) -> Self {
        Self {
            success: false,
            count,
            error: Some(error.into()),
            continuation_index,
            ..Default::default()
        }
    }

    pub fn paused_for_unmatched(
        count: usize,
        continuation_index: usize,
        unmatched: Vec<UnmatchedGame>,
    ) -> Self {
        Self {
            success: false,
            count,
            unmatched_games: Some(unmatched),
            continuation_index,
            ..Default::default()
        }
    }

    pub fn paused_for_artwork(
        count: usize,
        continuation_index: usize,
        missing: Vec<MissingBoxartGame>,
    ) -> Self {
        Self {
            success: false,
            count,
            missing_boxart_games: Some(missing),
            continuation_index,
            ..Default::default()
        }
    }

    /// Waiting on the user rather than failed.
    pub fn needs_input(&self) -> bool {
        self.error.is_none()
            && (self.unmatched_games.as_ref().is_some_and(|u| !u.is_empty())
                || self.missing_boxart_games.as_ref().is_some_and(|m| !m.is_empty()))
    }

    /// Get display string for logging
    pub fn display(&self) -> String {
        if let Some(error) = &self.error {
            return format!("failed after {} games: {}", self.count, error);
        }
        if let Some(unmatched) = &self.unmatched_games {
            return format!("{} processed, {} unmatched", self.count, unmatched.len());
        }
        if let Some(missing) = &self.missing_boxart_games {
            return format!("{} processed, {} missing box art", self.count, missing.len());
        }
        format!("{} processed, completed", self.count)
    }
}

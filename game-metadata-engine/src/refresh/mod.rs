//! Library refresh: per-game resolution, pause/resume state machine,
//! progress events and cancellation.

pub mod cancel;
pub mod orchestrator;
pub mod progress;
pub mod resolution;
pub mod resolver;
pub mod state;

pub use cancel::CancelSignal;
pub use orchestrator::RefreshOrchestrator;
pub use progress::{ProgressBus, ProgressEvent, RefreshProgress, REFRESH_PROGRESS_TOPIC};
pub use resolution::{ArtworkResolution, ResolutionUi, UnmatchedResolution};
pub use resolver::{Enrichment, GameResolver, MatchOutcome};
pub use state::{transition, RefreshEvent, RefreshMode, RefreshPhase, RefreshState};

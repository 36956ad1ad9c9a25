//! Rate-limited dispatcher for the official store.
//!
//! All store traffic goes through one FIFO queue drained by a single runner
//! task: one call in flight at a time, and consecutive calls start at least
//! `min_interval` apart.

mod handle;
mod messages;
mod runner;

pub use handle::StoreDispatcher;
pub use messages::DispatchSlot;

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::messages::{DispatchMessage, DispatchSlot};

/// Single consumer of the store queue.
///
/// Grants slots strictly in arrival order. Each grant waits until
/// `min_interval` has passed since the previous grant (measured from the
/// previous dispatch, however long that call took) and then until the
/// previous slot has been released.
pub(super) async fn run(mut receiver: mpsc::Receiver<DispatchMessage>, min_interval: Duration) {
    let mut last_dispatch: Option<Instant> = None;
    let mut dispatched: u64 = 0;

    tracing::debug!("Store dispatcher started (min interval {:?})", min_interval);

    while let Some(message) = receiver.recv().await {
        match message {
            DispatchMessage::Acquire { label, reply } => {
                if reply.is_closed() {
                    tracing::debug!("Store call '{}' abandoned before dispatch", label);
                    continue;
                }

                if let Some(last) = last_dispatch {
                    tokio::time::sleep_until(last + min_interval).await;
                }

                let (done_tx, done_rx) = oneshot::channel();
                let started = Instant::now();
                if reply.send(DispatchSlot::new(label.clone(), done_tx)).is_err() {
                    tracing::debug!("Store call '{}' abandoned before dispatch", label);
                    continue;
                }

                last_dispatch = Some(started);
                dispatched += 1;
                tracing::trace!("Store call #{} '{}' dispatched", dispatched, label);

                // Resolves when the slot is dropped.
                let _ = done_rx.await;
            }
            DispatchMessage::Shutdown => {
                tracing::info!("Store dispatcher stopping after {} calls", dispatched);
                break;
            }
        }
    }
}

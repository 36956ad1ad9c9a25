use std::future::Future;

use tokio::sync::{mpsc, oneshot};

use super::messages::{DispatchMessage, DispatchSlot};
use super::runner;
use crate::config::DispatchPolicy;
use crate::error::CatalogError;

const QUEUE_CAPACITY: usize = 1024;
const DISPATCHER_NAME: &str = "store-dispatcher";

/// Process-wide gate in front of the official store.
///
/// Cloning shares the same queue; create one per process with
/// [`StoreDispatcher::spawn`] and hand clones to whoever talks to the store.
#[derive(Clone)]
pub struct StoreDispatcher {
    sender: mpsc::Sender<DispatchMessage>,
    policy: DispatchPolicy,
}

impl StoreDispatcher {
    /// Start the runner task. Must be called inside a tokio runtime.
    pub fn spawn(policy: DispatchPolicy) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(runner::run(receiver, policy.min_interval()));
        Self { sender, policy }
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Wait in the FIFO queue for the next slot.
    pub async fn acquire(&self, label: &str) -> Result<DispatchSlot, CatalogError> {
        let (reply, granted) = oneshot::channel();
        self.sender
            .send(DispatchMessage::Acquire {
                label: label.to_string(),
                reply,
            })
            .await
            .map_err(|_| CatalogError::transport(DISPATCHER_NAME, "dispatcher stopped"))?;

        granted
            .await
            .map_err(|_| CatalogError::transport(DISPATCHER_NAME, "dispatcher stopped"))
    }

    /// Run one store call through the queue.
    ///
    /// Transient failures are retried with exponential backoff, each retry
    /// queueing again like a fresh call. A 403 returns immediately.
    pub async fn run<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T, CatalogError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        let mut attempt = 1u32;
        loop {
            let slot = self.acquire(label).await?;
            let result = call().await;
            drop(slot);

            match result {
                Err(err) if err.is_throttled() => {
                    tracing::warn!("Store call '{}' throttled, not retrying", label);
                    return Err(err);
                }
                Err(err) if err.is_transient() && attempt < self.policy.max_attempts => {
                    let backoff = self.policy.backoff_delay(attempt);
                    tracing::warn!(
                        "Store call '{}' attempt {} failed ({}), retrying in {:?}",
                        label,
                        attempt,
                        err,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Stop the runner; queued callers get a transport error.
    pub async fn shutdown(&self) {
        tracing::info!("Sending shutdown signal to store dispatcher");
        if let Err(e) = self.sender.send(DispatchMessage::Shutdown).await {
            tracing::warn!("Failed to send shutdown signal: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}

use tokio::sync::oneshot;

/// Dispatcher runner message types
pub(super) enum DispatchMessage {
    /// Queue for the next store call slot
    Acquire {
        label: String,
        reply: oneshot::Sender<DispatchSlot>,
    },

    /// Stop the runner after the current call
    Shutdown,
}

/// Permission to make exactly one official-store call.
///
/// The runner grants the next slot only after this one is dropped, so at
/// most one store call is ever in flight. Dropping it (including when the
/// holding future is cancelled) ends the call.
pub struct DispatchSlot {
    label: String,
    done: Option<oneshot::Sender<()>>,
}

impl DispatchSlot {
    pub(super) fn new(label: String, done: oneshot::Sender<()>) -> Self {
        Self {
            label,
            done: Some(done),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for DispatchSlot {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

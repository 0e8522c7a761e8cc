//! One-shot close flag shared between a feed handle and its tasks.

use tokio::sync::watch;

/// Creates a linked trigger/signal pair.
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), ShutdownSignal(rx))
}

/// Owning side: flips the flag.
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

impl ShutdownTrigger {
    /// Sets the flag. Returns `true` only for the call that actually closed it.
    pub fn trigger(&self) -> bool {
        !self.0.send_replace(true)
    }
}

/// Observing side: can be checked or awaited from any task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    pub fn is_closed(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the flag is set or the trigger is dropped.
    pub async fn closed(&mut self) {
        let _ = self.0.wait_for(|closed| *closed).await;
    }
}

use std::sync::Arc;

use tokio::sync::watch;

/// The cancellation signal for a run.
///
/// Every worker of a run holds a [ShutdownListener] created from the same handle. Signalling is
/// idempotent and the signal is level triggered, so a listener that checks late still sees it.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: Arc::new(watch::channel(false).0),
        }
    }

    /// Request shutdown.
    ///
    /// Returns `true` for the one call that raised the signal and `false` for every later call.
    pub fn shutdown(&self) -> bool {
        let raised = self.sender.send_if_modified(|requested| {
            if *requested {
                false
            } else {
                *requested = true;
                true
            }
        });

        if !raised {
            log::trace!("Shutdown was already requested");
        }

        raised
    }

    pub fn new_listener(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ShutdownListener {
    receiver: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Point in time check if shutdown has been requested. If this returns true then no new work
    /// should be started.
    pub fn should_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until shutdown is requested. It is safe to race this with another future, which is how
    /// a pacing delay is cut short when a run is stopped.
    pub async fn wait_for_shutdown(&mut self) {
        // An error means every handle was dropped, nobody can request shutdown any more so there
        // is nothing left to wait for.
        if self.receiver.wait_for(|requested| *requested).await.is_err() {
            log::trace!("Shutdown handle dropped while waiting");
        }
    }
}

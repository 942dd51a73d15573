use std::sync::atomic::{AtomicBool, Ordering};
use std::{borrow::BorrowMut, sync::Arc};

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::{Receiver, Sender};
use tokio::sync::Mutex;

/// Forced shutdown for a run.
///
/// This is the cancellation path used for Ctrl-C and for thresholds that are configured to abort
/// the run. Reaching the end of the run schedule is not a forced shutdown; workers notice the
/// deadline themselves and let in-flight iterations finish.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: tokio::sync::broadcast::channel(1).0,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown(&self) {
        // Set before sending so that listeners created after this point still observe it.
        self.triggered.store(true, Ordering::SeqCst);
        if let Err(e) = self.sender.send(()) {
            // Will fail if nobody is listening for a shutdown signal, in which case the log message
            // can be ignored.
            log::debug!("Failed to send shutdown signal: {e:?}");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe(), self.triggered.clone())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Arc<Mutex<Receiver<()>>>,
    triggered: Arc<AtomicBool>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<()>, triggered: Arc<AtomicBool>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
            triggered,
        }
    }

    /// Point in time check if the shutdown signal has been received. If this returns true then work
    /// should be stopped so that the run can shut down.
    pub fn should_shutdown(&mut self) -> bool {
        if self.triggered.load(Ordering::SeqCst) {
            return true;
        }

        match self.receiver.try_lock() {
            Ok(mut guard) => match guard.try_recv() {
                Ok(_) => true,
                Err(TryRecvError::Closed) => true,
                // If the receiver is empty or lagged then we should not shutdown.
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    /// Wait for the shutdown signal to be received. It is safe to race this with another future
    /// so that the shutdown signal can be used to cancel other work in progress.
    pub async fn wait_for_shutdown(&mut self) {
        if self.triggered.load(Ordering::SeqCst) {
            return;
        }

        let mut receiver = self.receiver.borrow_mut().lock().await;
        loop {
            match receiver.recv().await {
                Ok(()) | Err(RecvError::Closed) => return,
                Err(RecvError::Lagged(_)) => continue,
            }
        }
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "Execution cancelled by shutdown signal".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_created_after_shutdown_still_sees_it() {
        let handle = ShutdownHandle::new();
        handle.shutdown();

        let mut listener = handle.new_listener();
        assert!(listener.should_shutdown());
        assert!(handle.is_shutdown());
    }

    #[test]
    fn listener_does_not_shutdown_without_signal() {
        let handle = ShutdownHandle::new();
        let mut listener = handle.new_listener();
        assert!(!listener.should_shutdown());
    }

    #[tokio::test]
    async fn wait_returns_once_signalled() {
        let handle = ShutdownHandle::new();
        let mut listener = handle.new_listener();

        let waiter = tokio::spawn(async move { listener.wait_for_shutdown().await });
        handle.shutdown();

        tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
            .await
            .expect("listener did not observe shutdown")
            .unwrap();
    }
}

//! Shutdown coordination.
//!
//! One stop signal fans out to the accept loop and anything else holding a
//! receiver. The signal latches: later triggers are ignored, so a second
//! Ctrl+C never makes a receiver observe a lagged channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Latching stop signal. Clones share the same state.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the signal. Returns false when it had already fired.
    pub fn trigger(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.tx.send(());
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_one_signal() {
        let shutdown = Shutdown::new();
        let mut accept_loop = shutdown.subscribe();
        let mut other = shutdown.clone().subscribe();

        assert!(!shutdown.is_triggered());
        assert!(shutdown.trigger());

        assert!(accept_loop.recv().await.is_ok());
        assert!(other.recv().await.is_ok());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn repeated_trigger_does_not_lag_receivers() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();

        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());
        assert!(!shutdown.clone().trigger());

        assert!(rx.recv().await.is_ok());
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }
}

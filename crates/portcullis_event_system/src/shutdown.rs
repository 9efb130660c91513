//! Shutdown coordination for graceful proxy shutdown.
//!
//! The accept loop stops taking new connections once shutdown is initiated;
//! negotiations already in flight are allowed to finish before the process
//! exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// Shared shutdown state for coordinating graceful shutdown across components.
#[derive(Debug, Clone)]
pub struct ShutdownState {
    /// Flag indicating shutdown has been initiated - no new connections are accepted
    shutdown_initiated: Arc<AtomicBool>,
    /// Flag indicating in-flight negotiations have drained
    shutdown_complete: Arc<AtomicBool>,
    /// Wakes tasks parked in [`ShutdownState::wait_initiated`]
    initiated: Arc<Notify>,
}

impl ShutdownState {
    /// Creates a new shutdown state with both flags set to false.
    pub fn new() -> Self {
        Self {
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            shutdown_complete: Arc::new(AtomicBool::new(false)),
            initiated: Arc::new(Notify::new()),
        }
    }

    /// Returns true if shutdown has been initiated.
    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    /// Returns true if shutdown is complete and final cleanup can begin.
    pub fn is_shutdown_complete(&self) -> bool {
        self.shutdown_complete.load(Ordering::Acquire)
    }

    /// Initiates shutdown - stops the accept loop.
    pub fn initiate_shutdown(&self) {
        if !self.shutdown_initiated.swap(true, Ordering::AcqRel) {
            info!("🛑 Shutdown initiated - no new connections will be accepted");
        }
        self.initiated.notify_waiters();
    }

    /// Marks shutdown as complete - all in-flight negotiations have finished.
    pub fn complete_shutdown(&self) {
        self.shutdown_complete.store(true, Ordering::Release);
        info!("✅ All negotiations drained - ready for final cleanup");
    }

    /// Resolves once [`ShutdownState::initiate_shutdown`] has been called.
    pub async fn wait_initiated(&self) {
        loop {
            let notified = self.initiated.notified();
            if self.is_shutdown_initiated() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_initiated_wakes_all_clones() {
        let state = ShutdownState::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let state = state.clone();
                tokio::spawn(async move { state.wait_initiated().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!state.is_shutdown_initiated());
        state.initiate_shutdown();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        }

        // Already initiated: returns immediately
        tokio::time::timeout(Duration::from_millis(50), state.wait_initiated()).await.unwrap();
        assert!(!state.is_shutdown_complete());
        state.complete_shutdown();
        assert!(state.is_shutdown_complete());
    }
}

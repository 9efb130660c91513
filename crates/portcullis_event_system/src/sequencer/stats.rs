/// Statistics tracking for the sequencer
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the sequencer counters.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerStats {
    /// Events passed to `dispatch`
    pub events_dispatched: u64,
    /// Listener invocations started
    pub listeners_invoked: u64,
    /// Listeners that returned an error or panicked
    pub listener_failures: u64,
    /// Listeners that exceeded the per-listener timeout
    pub listener_timeouts: u64,
    /// Dispatches stopped by a veto
    pub vetoes: u64,
}

#[derive(Debug, Default)]
pub(super) struct StatsCounters {
    pub(super) events_dispatched: AtomicU64,
    pub(super) listeners_invoked: AtomicU64,
    pub(super) listener_failures: AtomicU64,
    pub(super) listener_timeouts: AtomicU64,
    pub(super) vetoes: AtomicU64,
}

impl StatsCounters {
    pub(super) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn snapshot(&self) -> SequencerStats {
        SequencerStats {
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            listeners_invoked: self.listeners_invoked.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
            listener_timeouts: self.listener_timeouts.load(Ordering::Relaxed),
            vetoes: self.vetoes.load(Ordering::Relaxed),
        }
    }
}

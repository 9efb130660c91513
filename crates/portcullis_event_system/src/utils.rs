//! # Utility Functions
//!
//! Small helpers shared by the proxy crates.
//!
//! ## Key Functions
//!
//! - [`current_timestamp()`] - Consistent timestamp generation
//! - [`create_event_sequencer()`] - Freezes a registry into a shareable sequencer

use crate::sequencer::{EventSequencer, ListenerRegistry};
use std::sync::Arc;

/// Returns the current Unix timestamp in seconds.
///
/// A clock set before the Unix epoch yields `0` rather than failing.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

/// Freezes `registry` and wraps the resulting sequencer for sharing across
/// connection tasks.
pub fn create_event_sequencer(registry: ListenerRegistry) -> Arc<EventSequencer> {
    Arc::new(registry.freeze())
}

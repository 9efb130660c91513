/// Event sequencer - ordered, vetoable listener dispatch
mod dispatch;
mod registry;
mod stats;
mod tests;

pub use dispatch::{DispatchOutcome, EventSequencer};
pub use registry::{ListenerRegistry, SequencerConfig};
pub use stats::SequencerStats;

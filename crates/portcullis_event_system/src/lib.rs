//! # Portcullis Event System
//!
//! The identity data model and the ordered listener pipeline of the Portcullis
//! proxy. Every inbound login becomes a [`ProfileRequestEvent`] that registered
//! listeners may inspect, rewrite or veto before the connection adopts its
//! final [`GameProfile`].
//!
//! ## Core Features
//!
//! - **Ordered dispatch**: Listeners run one at a time in ascending priority
//! - **Async listeners**: Each listener may suspend; the next waits for it
//! - **Fault isolation**: Failing, panicking or slow listeners are rolled back
//! - **Vetoes**: Any listener may refuse the connection with a reason
//! - **Lock-free reads**: The registry is frozen before the first dispatch
//!
//! ## Quick Start Example
//!
//! ```rust,no_run
//! use portcullis_event_system::*;
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = ListenerRegistry::new();
//!     registry.register_fn("no_guests", -10, |event: &mut ProfileRequestEvent| {
//!         if event.username().starts_with("Guest") {
//!             return Err(ListenerError::veto("Guests are not allowed"));
//!         }
//!         Ok(())
//!     })?;
//!     let sequencer = create_event_sequencer(registry);
//!
//!     let conn = InboundConnection::new(next_connection_id(), ConnectionEndpoint::new("127.0.0.1:5000".parse()?));
//!     let profile = Arc::new(GameProfile::new(Uuid::new_v4(), "Alex", Vec::new())?);
//!
//!     match sequencer.dispatch(ProfileRequestEvent::new(&conn, profile, false)).await {
//!         DispatchOutcome::Completed(event) => println!("adopting {}", event.effective_profile()),
//!         DispatchOutcome::Vetoed { reason, .. } => println!("refused: {}", reason),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Map
//!
//! - [`types`] - [`GameProfile`] and [`ProfileProperty`]
//! - [`connection`] - [`InboundConnection`] and its negotiation state
//! - [`events`] - The [`Event`] trait and [`ProfileRequestEvent`]
//! - [`listener`] - The [`Listener`] contract
//! - [`sequencer`] - [`ListenerRegistry`] and [`EventSequencer`]
//! - [`shutdown`] - Graceful shutdown coordination

pub mod connection;
pub mod events;
pub mod listener;
pub mod sequencer;
pub mod shutdown;
pub mod types;
pub mod utils;

pub use connection::{
    next_connection_id, ConnectionEndpoint, ConnectionError, ConnectionId, InboundConnection, NegotiationState,
};
pub use events::{Event, EventError, OverridePolicy, ProfileRequestEvent};
pub use listener::{FnListener, Listener, ListenerError};
pub use sequencer::{DispatchOutcome, EventSequencer, ListenerRegistry, SequencerConfig, SequencerStats};
pub use shutdown::ShutdownState;
pub use types::{GameProfile, ProfileError, ProfileProperty};
pub use utils::{create_event_sequencer, current_timestamp};

// External dependencies that listener implementations commonly need
pub use async_trait::async_trait;

//! # Inbound Connections
//!
//! An [`InboundConnection`] is a client that has opened a transport but has not
//! yet been handed off to a backend. It owns the negotiation state, the
//! set-once profile slot, and the lifetime signal the pipeline races against.
//!
//! State and closure live in one `watch` channel so that a single lock guards
//! "is it closed?" together with "may it move to the next state?". Once the
//! connection is closed nothing can change its state or profile.

use crate::types::GameProfile;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Process-unique identifier of an inbound connection.
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh connection id.
pub fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

// ============================================================================
// Negotiation State
// ============================================================================

/// Where a connection is in the login pipeline.
///
/// ```text
/// Start -> Verifying -> AwaitingListeners -> Finalized
///              |                |
///              +---> Aborted <--+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    Start,
    Verifying,
    AwaitingListeners,
    Finalized,
    Aborted,
}

impl NegotiationState {
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, NegotiationState::Finalized | NegotiationState::Aborted)
    }

    /// Returns true if `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: NegotiationState) -> bool {
        use NegotiationState::*;
        matches!(
            (self, next),
            (Start, Verifying)
                | (Verifying, AwaitingListeners)
                | (Verifying, Aborted)
                | (AwaitingListeners, Finalized)
                | (AwaitingListeners, Aborted)
        )
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NegotiationState::Start => "start",
            NegotiationState::Verifying => "verifying",
            NegotiationState::AwaitingListeners => "awaiting_listeners",
            NegotiationState::Finalized => "finalized",
            NegotiationState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Errors raised by state or profile updates on a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection is closed")]
    Closed,
    #[error("Illegal negotiation transition from {from} to {to}")]
    IllegalTransition {
        from: NegotiationState,
        to: NegotiationState,
    },
    #[error("A profile has already been assigned to this connection")]
    ProfileAlreadyAssigned,
}

// ============================================================================
// Endpoint
// ============================================================================

/// Transport-level description of where a connection came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEndpoint {
    /// Remote socket address of the client
    pub remote_addr: SocketAddr,
    /// Host name the client used to reach the proxy, if it sent one
    pub virtual_host: Option<String>,
    /// Protocol version the client announced
    pub protocol_version: i32,
}

impl ConnectionEndpoint {
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            virtual_host: None,
            protocol_version: -1,
        }
    }

    pub fn with_virtual_host(mut self, host: impl Into<String>) -> Self {
        self.virtual_host = Some(host.into());
        self
    }

    pub fn with_protocol_version(mut self, version: i32) -> Self {
        self.protocol_version = version;
        self
    }
}

// ============================================================================
// Inbound Connection
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Lifecycle {
    state: NegotiationState,
    closed: bool,
}

/// A client connection that is negotiating its identity.
///
/// Shared as `Arc<InboundConnection>`; events hold only a `Weak` reference.
pub struct InboundConnection {
    id: ConnectionId,
    endpoint: ConnectionEndpoint,
    connected_at: u64,
    lifecycle: watch::Sender<Lifecycle>,
    profile: OnceCell<Arc<GameProfile>>,
}

impl InboundConnection {
    /// Creates a connection in the [`NegotiationState::Start`] state.
    pub fn new(id: ConnectionId, endpoint: ConnectionEndpoint) -> Arc<Self> {
        let (lifecycle, _) = watch::channel(Lifecycle {
            state: NegotiationState::Start,
            closed: false,
        });
        Arc::new(Self {
            id,
            endpoint,
            connected_at: crate::utils::current_timestamp(),
            lifecycle,
            profile: OnceCell::new(),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn endpoint(&self) -> &ConnectionEndpoint {
        &self.endpoint
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.endpoint.remote_addr
    }

    /// Unix timestamp (seconds) at which the connection was accepted.
    pub fn connected_at(&self) -> u64 {
        self.connected_at
    }

    pub fn state(&self) -> NegotiationState {
        self.lifecycle.borrow().state
    }

    /// The profile adopted at finalization, if any.
    pub fn profile(&self) -> Option<Arc<GameProfile>> {
        self.profile.get().cloned()
    }

    /// Moves the negotiation to `next`.
    ///
    /// Fails if the connection is closed or the edge is not part of the state
    /// machine. [`NegotiationState::Finalized`] can only be reached through
    /// [`InboundConnection::finalize`].
    pub fn transition(&self, next: NegotiationState) -> Result<(), ConnectionError> {
        if next == NegotiationState::Finalized {
            let from = self.state();
            return Err(ConnectionError::IllegalTransition { from, to: next });
        }
        self.apply(next, || Ok(()))
    }

    /// Assigns the profile and enters [`NegotiationState::Finalized`] as one step.
    pub fn finalize(&self, profile: Arc<GameProfile>) -> Result<(), ConnectionError> {
        self.apply(NegotiationState::Finalized, || {
            self.profile
                .set(profile)
                .map_err(|_| ConnectionError::ProfileAlreadyAssigned)
        })
    }

    fn apply<F>(&self, next: NegotiationState, commit: F) -> Result<(), ConnectionError>
    where
        F: FnOnce() -> Result<(), ConnectionError>,
    {
        let mut result = Ok(());
        self.lifecycle.send_if_modified(|lifecycle| {
            if lifecycle.closed {
                result = Err(ConnectionError::Closed);
                return false;
            }
            if !lifecycle.state.can_transition_to(next) {
                result = Err(ConnectionError::IllegalTransition {
                    from: lifecycle.state,
                    to: next,
                });
                return false;
            }
            if let Err(e) = commit() {
                result = Err(e);
                return false;
            }
            lifecycle.state = next;
            true
        });
        result
    }

    /// Marks the connection closed. Idempotent.
    pub fn close(&self) {
        self.lifecycle.send_if_modified(|lifecycle| {
            if lifecycle.closed {
                false
            } else {
                lifecycle.closed = true;
                true
            }
        });
    }

    /// Resolves once [`InboundConnection::close`] has been called.
    pub async fn closed(&self) {
        let mut rx = self.lifecycle.subscribe();
        // The sender lives as long as `self`, so this cannot observe a dropped channel.
        let _ = rx.wait_for(|lifecycle| lifecycle.closed).await;
    }

    pub fn is_active(&self) -> bool {
        !self.lifecycle.borrow().closed
    }
}

impl fmt::Debug for InboundConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifecycle = *self.lifecycle.borrow();
        f.debug_struct("InboundConnection")
            .field("id", &self.id)
            .field("remote_addr", &self.endpoint.remote_addr)
            .field("state", &lifecycle.state)
            .field("closed", &lifecycle.closed)
            .field("profile", &self.profile.get().map(|p| p.name().to_string()))
            .finish()
    }
}

impl fmt::Display for InboundConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.profile.get() {
            Some(profile) => write!(f, "[connection #{} {} ({})]", self.id, profile.name(), self.endpoint.remote_addr),
            None => write!(f, "[connection #{} ({})]", self.id, self.endpoint.remote_addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn connection() -> Arc<InboundConnection> {
        InboundConnection::new(next_connection_id(), ConnectionEndpoint::new("127.0.0.1:25565".parse().unwrap()))
    }

    fn profile(name: &str) -> Arc<GameProfile> {
        Arc::new(GameProfile::new(Uuid::new_v4(), name, Vec::new()).unwrap())
    }

    #[test]
    fn test_happy_path_transitions() {
        let conn = connection();
        assert_eq!(conn.state(), NegotiationState::Start);
        conn.transition(NegotiationState::Verifying).unwrap();
        conn.transition(NegotiationState::AwaitingListeners).unwrap();

        let steve = profile("Steve");
        conn.finalize(steve.clone()).unwrap();
        assert_eq!(conn.state(), NegotiationState::Finalized);
        assert!(Arc::ptr_eq(&conn.profile().unwrap(), &steve));
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let conn = connection();
        conn.transition(NegotiationState::Verifying).unwrap();
        conn.transition(NegotiationState::Aborted).unwrap();

        for next in [
            NegotiationState::Start,
            NegotiationState::Verifying,
            NegotiationState::AwaitingListeners,
            NegotiationState::Aborted,
        ] {
            assert!(matches!(
                conn.transition(next),
                Err(ConnectionError::IllegalTransition { from: NegotiationState::Aborted, .. })
            ));
        }
        assert!(conn.finalize(profile("Steve")).is_err());
        assert!(conn.profile().is_none());
    }

    #[test]
    fn test_finalize_requires_awaiting_listeners() {
        let conn = connection();
        conn.transition(NegotiationState::Verifying).unwrap();
        assert!(conn.finalize(profile("Alex")).is_err());
        assert!(conn.profile().is_none());
        assert!(conn.transition(NegotiationState::Finalized).is_err());
    }

    #[test]
    fn test_closed_connection_is_frozen() {
        let conn = connection();
        conn.transition(NegotiationState::Verifying).unwrap();
        conn.close();

        assert!(!conn.is_active());
        assert_eq!(conn.transition(NegotiationState::AwaitingListeners), Err(ConnectionError::Closed));
        assert_eq!(conn.state(), NegotiationState::Verifying);
    }

    #[tokio::test]
    async fn test_closed_resolves_after_close() {
        let conn = connection();
        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.closed().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        conn.close();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("closed() should resolve")
            .unwrap();

        // Already closed: resolves immediately
        tokio::time::timeout(Duration::from_millis(100), conn.closed()).await.unwrap();
    }
}

//! # Profile Negotiation
//!
//! [`ProfileNegotiator`] drives one connection through the login pipeline:
//!
//! ```text
//! Start ──verify──▶ Verifying ──ok──▶ AwaitingListeners ──completed──▶ Finalized
//!                       │                     │
//!                       └──error──▶ Aborted ◀─┴──veto / dispatch timeout
//! ```
//!
//! The whole pipeline races the connection's `closed()` signal. If the client
//! goes away first, the pipeline future is dropped where it stands and the
//! outcome is [`NegotiationOutcome::Cancelled`]; nothing touches the
//! connection after that.

use crate::auth::{IdentityVerifier, VerificationRequest};
use async_trait::async_trait;
use portcullis_event_system::{
    ConnectionError, ConnectionId, DispatchOutcome, EventSequencer, GameProfile, InboundConnection,
    NegotiationState, OverridePolicy, ProfileRequestEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reason given to clients whose listeners did not finish in time.
pub const DISPATCH_TIMEOUT_REASON: &str = "Timed out while resolving your profile";

/// Receives connections whose profile has been finalized.
#[async_trait]
pub trait ConnectionHandoff: Send + Sync + 'static {
    async fn negotiation_complete(&self, connection: &Arc<InboundConnection>, profile: Arc<GameProfile>);
}

/// Tells a client why its login was refused.
#[async_trait]
pub trait DisconnectNotifier: Send + Sync + 'static {
    async fn disconnect(&self, connection: &Arc<InboundConnection>, reason: &str);
}

/// How a negotiation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationOutcome {
    /// The connection adopted this profile.
    Finalized(Arc<GameProfile>),
    /// The login was refused with this reason.
    Aborted(String),
    /// The client disconnected before the pipeline finished.
    Cancelled,
}

impl NegotiationOutcome {
    pub fn is_finalized(&self) -> bool {
        matches!(self, NegotiationOutcome::Finalized(_))
    }
}

/// Misuse of the negotiation state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    #[error("Connection {connection} cannot move from {from} to {to}")]
    IllegalTransition {
        connection: ConnectionId,
        from: NegotiationState,
        to: NegotiationState,
    },
    #[error("Connection {0} already has a profile")]
    ProfileAlreadyAssigned(ConnectionId),
}

/// What the client presented at login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginCredentials {
    pub username: String,
    /// Session hash proving an online-mode join
    pub server_id: Option<String>,
}

impl LoginCredentials {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            server_id: None,
        }
    }

    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NegotiatorConfig {
    pub online_mode: bool,
    pub dispatch_timeout: Duration,
    pub override_policy: OverridePolicy,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            online_mode: true,
            dispatch_timeout: Duration::from_secs(10),
            override_policy: OverridePolicy::LastWriterWins,
        }
    }
}

/// Sequences verification and listener dispatch for each inbound connection.
pub struct ProfileNegotiator {
    verifier: Arc<dyn IdentityVerifier>,
    sequencer: Arc<EventSequencer>,
    handoff: Arc<dyn ConnectionHandoff>,
    notifier: Arc<dyn DisconnectNotifier>,
    config: NegotiatorConfig,
}

impl ProfileNegotiator {
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        sequencer: Arc<EventSequencer>,
        handoff: Arc<dyn ConnectionHandoff>,
        notifier: Arc<dyn DisconnectNotifier>,
        config: NegotiatorConfig,
    ) -> Self {
        Self {
            verifier,
            sequencer,
            handoff,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &NegotiatorConfig {
        &self.config
    }

    pub fn sequencer(&self) -> &Arc<EventSequencer> {
        &self.sequencer
    }

    /// Resolves the profile of `connection` and reports the outcome to the
    /// handoff or disconnect collaborator.
    ///
    /// The connection must be in [`NegotiationState::Start`].
    pub async fn negotiate(
        &self,
        connection: Arc<InboundConnection>,
        credentials: LoginCredentials,
    ) -> Result<NegotiationOutcome, NegotiationError> {
        let outcome = tokio::select! {
            biased;
            _ = connection.closed() => Ok(NegotiationOutcome::Cancelled),
            outcome = self.run(&connection, &credentials) => outcome,
        }?;

        match &outcome {
            NegotiationOutcome::Finalized(profile) => {
                info!("✅ {} logged in as {} ({})", connection, profile.name(), profile.id());
                self.handoff.negotiation_complete(&connection, profile.clone()).await;
            }
            NegotiationOutcome::Aborted(reason) => {
                info!("🚫 {} refused: {}", connection, reason);
                self.notifier.disconnect(&connection, reason).await;
            }
            NegotiationOutcome::Cancelled => {
                debug!("🔌 {} disconnected during negotiation", connection);
            }
        }

        Ok(outcome)
    }

    async fn run(
        &self,
        connection: &Arc<InboundConnection>,
        credentials: &LoginCredentials,
    ) -> Result<NegotiationOutcome, NegotiationError> {
        if let Some(outcome) = self.advance(connection, NegotiationState::Verifying)? {
            return Ok(outcome);
        }

        let request = VerificationRequest {
            username: credentials.username.clone(),
            online_mode: self.config.online_mode,
            server_id: credentials.server_id.clone(),
            remote_ip: Some(connection.remote_addr().ip()),
        };

        let original = match self.verifier.verify(&request).await {
            Ok(profile) => Arc::new(profile),
            Err(e) => {
                debug!("❌ Verification failed for {}: {}", connection, e);
                return self.abort(connection, e.disconnect_reason());
            }
        };

        if let Some(outcome) = self.advance(connection, NegotiationState::AwaitingListeners)? {
            return Ok(outcome);
        }

        let event = ProfileRequestEvent::new(connection, original, self.config.online_mode)
            .with_override_policy(self.config.override_policy);

        let dispatched = tokio::time::timeout(self.config.dispatch_timeout, self.sequencer.dispatch(event)).await;

        match dispatched {
            Err(_) => {
                warn!(
                    "⏱️ Profile dispatch for {} exceeded {:?}",
                    connection, self.config.dispatch_timeout
                );
                self.abort(connection, DISPATCH_TIMEOUT_REASON)
            }
            Ok(DispatchOutcome::Vetoed { reason, listener, .. }) => {
                debug!("⛔ {} vetoed by '{}'", connection, listener);
                self.abort(connection, &reason)
            }
            Ok(DispatchOutcome::Completed(event)) => {
                let profile = event.into_effective_profile();
                match connection.finalize(profile.clone()) {
                    Ok(()) => Ok(NegotiationOutcome::Finalized(profile)),
                    Err(e) => self.map_connection_error(connection, e),
                }
            }
        }
    }

    /// Returns the final outcome if the transition ended the negotiation.
    fn advance(
        &self,
        connection: &InboundConnection,
        next: NegotiationState,
    ) -> Result<Option<NegotiationOutcome>, NegotiationError> {
        match connection.transition(next) {
            Ok(()) => Ok(None),
            Err(e) => self.map_connection_error(connection, e).map(Some),
        }
    }

    fn abort(&self, connection: &InboundConnection, reason: &str) -> Result<NegotiationOutcome, NegotiationError> {
        match connection.transition(NegotiationState::Aborted) {
            Ok(()) => Ok(NegotiationOutcome::Aborted(reason.to_string())),
            Err(e) => self.map_connection_error(connection, e),
        }
    }

    /// A closed connection cancels the negotiation; anything else is misuse.
    fn map_connection_error(
        &self,
        connection: &InboundConnection,
        error: ConnectionError,
    ) -> Result<NegotiationOutcome, NegotiationError> {
        match error {
            ConnectionError::Closed => Ok(NegotiationOutcome::Cancelled),
            ConnectionError::IllegalTransition { from, to } => Err(NegotiationError::IllegalTransition {
                connection: connection.id(),
                from,
                to,
            }),
            ConnectionError::ProfileAlreadyAssigned => Err(NegotiationError::ProfileAlreadyAssigned(connection.id())),
        }
    }
}

impl std::fmt::Debug for ProfileNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileNegotiator")
            .field("config", &self.config)
            .field("sequencer", &self.sequencer)
            .finish()
    }
}

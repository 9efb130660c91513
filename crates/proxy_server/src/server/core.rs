//! Core proxy server implementation.
//!
//! This module contains the main `ProxyServer` struct: it owns the connection
//! manager and the profile negotiator and runs the accept loop that feeds
//! them.

use crate::{
    config::ProxyConfig,
    connection::ConnectionManager,
    error::ServerError,
    negotiator::{NegotiatorConfig, ProfileNegotiator},
    server::handlers::{handle_connection, ConnectionLimits},
    auth::IdentityVerifier,
};
use portcullis_event_system::{EventSequencer, ShutdownState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// How often the drain loop checks for unfinished negotiations.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// First pause after a failed `accept`, doubled per consecutive failure.
const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause before the next `accept` after `consecutive_errors` failures in a row.
fn accept_backoff(consecutive_errors: u32) -> Duration {
    let factor = 1u32.checked_shl(consecutive_errors.saturating_sub(1)).unwrap_or(u32::MAX);
    ACCEPT_BACKOFF_BASE.saturating_mul(factor).min(ACCEPT_BACKOFF_MAX)
}

/// The core proxy server structure.
///
/// `ProxyServer` accepts WebSocket clients, hands each login to the
/// [`ProfileNegotiator`] and keeps the connection registered until the
/// client leaves.
///
/// # Architecture
///
/// * **Connection Manager**: Live connections, their senders and claimed identities
/// * **Negotiator**: Verification and listener dispatch for each login
/// * **Event Sequencer**: Frozen listener pipeline shared by every negotiation
pub struct ProxyServer {
    /// Proxy configuration settings
    config: ProxyConfig,

    /// Manager for client connections and messaging
    connection_manager: Arc<ConnectionManager>,

    negotiator: Arc<ProfileNegotiator>,
}

impl ProxyServer {
    /// Creates a new proxy server.
    ///
    /// The connection manager doubles as the negotiator's handoff and
    /// disconnect collaborator.
    pub fn new(config: ProxyConfig, sequencer: Arc<EventSequencer>, verifier: Arc<dyn IdentityVerifier>) -> Self {
        let connection_manager = Arc::new(ConnectionManager::new());
        let negotiator_config = NegotiatorConfig {
            online_mode: config.auth.online_mode,
            dispatch_timeout: config.events.dispatch_timeout(),
            override_policy: config.events.override_policy,
        };
        let negotiator = Arc::new(ProfileNegotiator::new(
            verifier,
            sequencer,
            connection_manager.clone(),
            connection_manager.clone(),
            negotiator_config,
        ));

        Self {
            config,
            connection_manager,
            negotiator,
        }
    }

    /// Binds the configured address and serves until shutdown is initiated.
    ///
    /// # Startup Sequence
    ///
    /// 1. Bind the TCP listener
    /// 2. Accept connections until `shutdown_state` is initiated
    /// 3. Wait for in-flight negotiations to finish
    /// 4. Mark shutdown complete
    pub async fn start_with_shutdown_state(&self, shutdown_state: ShutdownState) -> Result<(), ServerError> {
        info!("🚀 Starting proxy on {}", self.config.bind_address);
        info!(
            "🔐 Mode: {}",
            if self.config.auth.online_mode { "online" } else { "offline" }
        );

        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| ServerError::Network(format!("Failed to bind {}: {}", self.config.bind_address, e)))?;

        self.serve(listener, shutdown_state).await
    }

    /// Runs the accept loop on an already bound listener.
    pub async fn serve(&self, listener: TcpListener, shutdown_state: ShutdownState) -> Result<(), ServerError> {
        if let Ok(addr) = listener.local_addr() {
            info!("🌐 Listening on {}", addr);
        }

        let limits = ConnectionLimits {
            login_timeout: Duration::from_secs(self.config.connection_timeout),
            max_message_size: self.config.security.max_message_size,
        };

        // Held from accept until the connection task ends, so handshakes count too
        let slots = Arc::new(Semaphore::new(self.config.max_connections.min(Semaphore::MAX_PERMITS)));
        let mut consecutive_errors = 0u32;

        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown_state.wait_initiated() => {
                    info!("🛑 Accept loop stopping - shutdown initiated");
                    break;
                }
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => {
                    consecutive_errors = 0;
                    let Ok(slot) = slots.clone().try_acquire_owned() else {
                        warn!("⛔ Refusing {}: connection limit of {} reached", addr, self.config.max_connections);
                        drop(stream);
                        continue;
                    };

                    trace!("Accepted TCP connection from {}", addr);
                    let connection_manager = self.connection_manager.clone();
                    let negotiator = self.negotiator.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, connection_manager, negotiator, limits).await {
                            debug!("Connection from {} ended: {}", addr, e);
                        }
                        drop(slot);
                    });
                }
                Err(e) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    let pause = accept_backoff(consecutive_errors);
                    error!("Failed to accept connection: {} (retrying in {:?})", e, pause);
                    tokio::select! {
                        biased;
                        _ = shutdown_state.wait_initiated() => break,
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
            }
        }

        let drain_limit = limits
            .login_timeout
            .saturating_add(self.config.events.dispatch_timeout())
            .saturating_add(self.config.auth.verify_timeout());
        self.drain(drain_limit).await;
        shutdown_state.complete_shutdown();
        info!("Proxy stopped");
        Ok(())
    }

    /// Waits up to `limit` for negotiations that are still running.
    async fn drain(&self, limit: Duration) {
        let deadline = Instant::now().checked_add(limit);
        loop {
            let pending = self.connection_manager.negotiating_count();
            if pending == 0 {
                return;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!("⏱️ Giving up on {} unfinished negotiation(s)", pending);
                return;
            }
            debug!("🧹 Waiting for {} negotiation(s) to finish", pending);
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn connection_manager(&self) -> Arc<ConnectionManager> {
        self.connection_manager.clone()
    }

    pub fn negotiator(&self) -> Arc<ProfileNegotiator> {
        self.negotiator.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_backoff_grows_and_caps() {
        assert_eq!(accept_backoff(1), Duration::from_millis(10));
        assert_eq!(accept_backoff(2), Duration::from_millis(20));
        assert_eq!(accept_backoff(4), Duration::from_millis(80));
        assert_eq!(accept_backoff(8), ACCEPT_BACKOFF_MAX);
        assert_eq!(accept_backoff(40), ACCEPT_BACKOFF_MAX);
        assert_eq!(accept_backoff(u32::MAX), ACCEPT_BACKOFF_MAX);
        // Every failure pauses, even the first
        assert!(accept_backoff(0) > Duration::ZERO);
    }
}

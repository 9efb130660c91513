//! # Proxy Server
//!
//! The login front end of the Portcullis proxy. Clients connect over
//! WebSocket and send one login message; the proxy verifies the claimed
//! identity, lets the registered listeners inspect or rewrite the resulting
//! profile, and either confirms the login or closes the connection with a
//! reason.
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Identity Verifier** ([`auth`]) - Offline UUID derivation or a session-authority check
//! * **Profile Negotiator** ([`negotiator`]) - Per-connection state machine driving the pipeline
//! * **Connection Manager** - Live connections, WebSocket senders and claimed identities
//! * **Built-in Listeners** ([`listeners`]) - Ban lists and forced profile properties
//!
//! ### Login Flow
//!
//! 1. Client sends `{"type":"login","username":...}` as its first text frame
//! 2. The negotiator verifies the identity against the configured mode
//! 3. A `ProfileRequestEvent` runs through every listener in priority order
//! 4. The effective profile is adopted and `login_success` is sent back
//! 5. Vetoes, verifier failures and timeouts close the socket with a reason
//!
//! A client that disconnects mid-pipeline cancels its negotiation; the
//! connection state is left where it was.
//!
//! ## Error Handling
//!
//! The front end uses [`ServerError`] for network and internal failures.
//! Refused logins are not errors: they end as
//! [`NegotiationOutcome::Aborted`](negotiator::NegotiationOutcome::Aborted).

pub use config::{ProxyConfig, DEFAULT_SESSION_SERVER};
pub use error::ServerError;
pub use negotiator::{
    ConnectionHandoff, DisconnectNotifier, LoginCredentials, NegotiationError, NegotiationOutcome,
    NegotiatorConfig, ProfileNegotiator, DISPATCH_TIMEOUT_REASON,
};
pub use server::ProxyServer;
pub use utils::{build_verifier, create_proxy, create_proxy_with_config};

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod listeners;
pub mod messaging;
pub mod negotiator;
pub mod server;
pub mod utils;

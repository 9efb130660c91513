//! Proxy configuration types and defaults.
//!
//! This module contains the runtime configuration of the proxy and the default
//! values used when the application layer does not override them.

use portcullis_event_system::{OverridePolicy, ProfileProperty, SequencerConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default session authority used for online-mode verification.
pub const DEFAULT_SESSION_SERVER: &str = "https://sessionserver.mojang.com";

/// Configuration structure for the proxy.
///
/// Contains the network settings of the login front end plus the settings of
/// each stage of the profile pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// The socket address to bind the proxy to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Seconds a client has to complete the handshake and send its login
    pub connection_timeout: u64,

    /// Identity verification settings
    pub auth: AuthConfig,

    /// Listener dispatch settings
    pub events: EventsConfig,

    /// Ban lists
    pub security: SecurityConfig,

    /// Forced profile properties keyed by username
    pub profiles: HashMap<String, ProfileOverride>,
}

/// How inbound identities are verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Verify every login against the session authority
    pub online_mode: bool,

    /// Base URL of the session authority
    pub session_server_url: String,

    /// Hard bound for a single verification, in milliseconds
    pub verify_timeout_ms: u64,

    /// Send the client's IP to the session authority so it can refuse logins
    /// relayed through another proxy
    pub prevent_proxy_connections: bool,
}

/// Listener dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Bound for the whole profile-request dispatch, in milliseconds
    pub dispatch_timeout_ms: u64,

    /// Bound for a single listener in milliseconds (0 disables it)
    pub listener_timeout_ms: u64,

    /// Which listener's override wins when several set one
    pub override_policy: OverridePolicy,
}

/// Ban lists enforced by the built-in ban listener.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Usernames refused at login (case-insensitive)
    pub banned_names: Vec<String>,

    /// Banned IP addresses
    pub banned_ips: Vec<IpAddr>,

    /// Maximum accepted size of the login message in bytes
    pub max_message_size: usize,
}

/// Properties forced onto one player's profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOverride {
    #[serde(default)]
    pub properties: Vec<ProfileProperty>,
}

impl AuthConfig {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }
}

impl EventsConfig {
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn listener_timeout(&self) -> Option<Duration> {
        (self.listener_timeout_ms > 0).then(|| Duration::from_millis(self.listener_timeout_ms))
    }

    pub fn sequencer_config(&self) -> SequencerConfig {
        SequencerConfig {
            listener_timeout: self.listener_timeout(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 25577),
            max_connections: 1000,
            connection_timeout: 30,
            auth: AuthConfig::default(),
            events: EventsConfig::default(),
            security: SecurityConfig {
                max_message_size: 16 * 1024,
                ..SecurityConfig::default()
            },
            profiles: HashMap::new(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            online_mode: true,
            session_server_url: DEFAULT_SESSION_SERVER.to_string(),
            verify_timeout_ms: 5_000,
            prevent_proxy_connections: false,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_ms: 10_000,
            listener_timeout_ms: 0,
            override_policy: OverridePolicy::LastWriterWins,
        }
    }
}

//! Refuses logins from banned usernames or addresses.

use async_trait::async_trait;
use portcullis_event_system::{Listener, ListenerError, ProfileRequestEvent};
use std::collections::HashSet;
use std::net::IpAddr;
use tracing::info;

pub const BANNED_REASON: &str = "You are banned from this proxy";

#[derive(Debug, Clone, Default)]
pub struct BanListListener {
    /// Lowercased
    names: HashSet<String>,
    ips: HashSet<IpAddr>,
}

impl BanListListener {
    pub fn new(names: &[String], ips: &[IpAddr]) -> Self {
        Self {
            names: names.iter().map(|name| name.to_ascii_lowercase()).collect(),
            ips: ips.iter().copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.ips.is_empty()
    }

    pub fn is_banned(&self, username: &str, ip: Option<IpAddr>) -> bool {
        self.names.contains(&username.to_ascii_lowercase()) || ip.is_some_and(|ip| self.ips.contains(&ip))
    }
}

#[async_trait]
impl Listener<ProfileRequestEvent> for BanListListener {
    async fn on_event(&self, event: &mut ProfileRequestEvent) -> Result<(), ListenerError> {
        let ip = event.connection().map(|connection| connection.remote_addr().ip());
        if self.is_banned(event.username(), ip) {
            info!("🔨 Refusing banned login '{}' from {:?}", event.username(), ip);
            return Err(ListenerError::veto(BANNED_REASON));
        }
        Ok(())
    }
}

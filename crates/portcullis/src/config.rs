//! Configuration management for the Portcullis proxy.
//!
//! This module handles loading, validation, and conversion of proxy configuration
//! from TOML files and command-line arguments.

use portcullis_event_system::OverridePolicy;
use proxy_server::config::{AuthConfig, EventsConfig, ProfileOverride, SecurityConfig};
use proxy_server::{ProxyConfig, DEFAULT_SESSION_SERVER};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Largest accepted `server.connection_timeout` in seconds.
pub const MAX_CONNECTION_TIMEOUT_SECS: u64 = 3_600;

/// Largest accepted millisecond timeout for verification and dispatch.
pub const MAX_TIMEOUT_MS: u64 = 3_600_000;

/// Application configuration loaded from TOML file.
///
/// This is the main configuration structure that encompasses all proxy settings
/// including networking, identity verification, listener dispatch and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Network settings
    pub server: ServerSettings,
    /// Identity verification settings
    #[serde(default)]
    pub authentication: AuthenticationSettings,
    /// Listener dispatch settings
    #[serde(default)]
    pub events: EventSettings,
    /// Ban lists and message limits
    #[serde(default)]
    pub security: SecuritySettings,
    /// Forced profile properties keyed by username
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverride>,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Proxy network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the proxy to (e.g., "0.0.0.0:25577")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Seconds a client has for the handshake and its login message
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
}

/// Identity verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationSettings {
    /// Verify logins against the session server
    #[serde(default = "default_online_mode")]
    pub online_mode: bool,
    #[serde(default = "default_session_server_url")]
    pub session_server_url: String,
    /// Hard bound for one verification in milliseconds
    #[serde(default = "default_verify_timeout_ms")]
    pub verify_timeout_ms: u64,
    /// Forward client IPs so the session server can refuse relayed logins
    #[serde(default)]
    pub prevent_proxy_connections: bool,
}

/// Listener dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    /// Bound for the whole listener pipeline of one login in milliseconds
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
    /// Bound for a single listener in milliseconds (0 to disable)
    #[serde(default)]
    pub listener_timeout_ms: u64,
    /// `last_writer_wins` or `first_writer_wins`
    #[serde(default)]
    pub override_policy: OverridePolicy,
}

/// Ban lists and message limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySettings {
    /// Usernames refused at login (case-insensitive)
    #[serde(default)]
    pub banned_names: Vec<String>,
    /// IP addresses refused at login
    #[serde(default)]
    pub banned_ips: Vec<String>,
    /// Largest accepted login message in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Logging system configuration.
///
/// Controls log output format, levels, and destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
    /// Optional file path for log output (None means stdout only)
    pub file_path: Option<String>,
}

/// Default for connection_timeout
pub fn default_connection_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    1000
}

fn default_online_mode() -> bool {
    true
}

fn default_session_server_url() -> String {
    DEFAULT_SESSION_SERVER.to_string()
}

fn default_verify_timeout_ms() -> u64 {
    5_000
}

fn default_dispatch_timeout_ms() -> u64 {
    10_000
}

fn default_max_message_size() -> usize {
    16 * 1024
}

impl Default for AuthenticationSettings {
    fn default() -> Self {
        Self {
            online_mode: default_online_mode(),
            session_server_url: default_session_server_url(),
            verify_timeout_ms: default_verify_timeout_ms(),
            prevent_proxy_connections: false,
        }
    }
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            listener_timeout_ms: 0,
            override_policy: OverridePolicy::default(),
        }
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            banned_names: Vec::new(),
            banned_ips: Vec::new(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:25577".to_string(),
                max_connections: default_max_connections(),
                connection_timeout: default_connection_timeout(),
            },
            authentication: AuthenticationSettings::default(),
            events: EventSettings::default(),
            security: SecuritySettings::default(),
            profiles: HashMap::new(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
                file_path: None,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the specified path
    /// and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Create default config file
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("📝 Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration to the runtime proxy configuration.
    pub fn to_proxy_config(&self) -> Result<ProxyConfig, Box<dyn std::error::Error>> {
        let banned_ips = self
            .security
            .banned_ips
            .iter()
            .map(|ip| ip.parse::<IpAddr>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProxyConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            connection_timeout: self.server.connection_timeout,
            auth: AuthConfig {
                online_mode: self.authentication.online_mode,
                session_server_url: self.authentication.session_server_url.clone(),
                verify_timeout_ms: self.authentication.verify_timeout_ms,
                prevent_proxy_connections: self.authentication.prevent_proxy_connections,
            },
            events: EventsConfig {
                dispatch_timeout_ms: self.events.dispatch_timeout_ms,
                listener_timeout_ms: self.events.listener_timeout_ms,
                override_policy: self.events.override_policy,
            },
            security: SecurityConfig {
                banned_names: self.security.banned_names.clone(),
                banned_ips,
                max_message_size: self.security.max_message_size,
            },
            profiles: self.profiles.clone(),
        })
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        // Validate bind address
        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", &self.server.bind_address));
        }

        if self.server.max_connections == 0 {
            return Err("server.max_connections must be greater than 0".to_string());
        }
        if self.server.connection_timeout == 0 {
            return Err("server.connection_timeout must be greater than 0".to_string());
        }
        if self.server.connection_timeout > MAX_CONNECTION_TIMEOUT_SECS {
            return Err(format!(
                "server.connection_timeout must be at most {MAX_CONNECTION_TIMEOUT_SECS} seconds"
            ));
        }

        if self.authentication.online_mode {
            let url = &self.authentication.session_server_url;
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("Invalid session server URL: {url}"));
            }
        }
        if self.authentication.verify_timeout_ms == 0 {
            return Err("authentication.verify_timeout_ms must be greater than 0".to_string());
        }

        if self.events.dispatch_timeout_ms == 0 {
            return Err("events.dispatch_timeout_ms must be greater than 0".to_string());
        }

        for (name, value) in [
            ("authentication.verify_timeout_ms", self.authentication.verify_timeout_ms),
            ("events.dispatch_timeout_ms", self.events.dispatch_timeout_ms),
            ("events.listener_timeout_ms", self.events.listener_timeout_ms),
        ] {
            if value > MAX_TIMEOUT_MS {
                return Err(format!("{name} must be at most {MAX_TIMEOUT_MS}ms"));
            }
        }

        if let Some(ip) = self.security.banned_ips.iter().find(|ip| ip.parse::<IpAddr>().is_err()) {
            return Err(format!("Invalid banned IP address: {ip}"));
        }
        if self.security.max_message_size == 0 {
            return Err("security.max_message_size must be greater than 0".to_string());
        }

        for (username, entry) in &self.profiles {
            if let Some(property) = entry.properties.iter().find(|property| property.name.is_empty()) {
                return Err(format!(
                    "Profile override for '{username}' has a property with an empty name (value: {})",
                    property.value
                ));
            }
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }

    /// How long shutdown waits for in-flight negotiations before giving up.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.server.connection_timeout)
            .saturating_add(Duration::from_millis(self.events.dispatch_timeout_ms))
            .saturating_add(Duration::from_millis(self.authentication.verify_timeout_ms))
            .saturating_add(Duration::from_secs(1))
    }
}

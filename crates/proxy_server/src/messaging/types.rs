//! Message type definitions for client-proxy communication.
//!
//! Messages are JSON text frames tagged by `type`.
//!
//! Login request:
//! ```json
//! {
//!   "type": "login",
//!   "username": "Alex",
//!   "server_id": "4ed1f46bbe04bc756bcb17c0c7ce3e4632f06a48",
//!   "virtual_host": "play.example.net",
//!   "protocol_version": 767
//! }
//! ```
//!
//! Successful login:
//! ```json
//! {
//!   "type": "login_success",
//!   "profile": { "id": "069a79f444e94726a5befca90e38aaf5", "name": "Alex", "properties": [] }
//! }
//! ```
//!
//! A refused login gets a close frame whose reason is the disconnect text.

use crate::error::ServerError;
use crate::negotiator::LoginCredentials;
use portcullis_event_system::GameProfile;
use serde::{Deserialize, Serialize};

/// A message sent from a client to the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Login {
        username: String,
        /// Session hash for online-mode verification
        #[serde(default)]
        server_id: Option<String>,
        /// Host name the client connected to
        #[serde(default)]
        virtual_host: Option<String>,
        #[serde(default)]
        protocol_version: Option<i32>,
    },
}

impl ClientMessage {
    /// The credentials carried by a login message.
    pub fn credentials(&self) -> LoginCredentials {
        match self {
            ClientMessage::Login { username, server_id, .. } => LoginCredentials {
                username: username.clone(),
                server_id: server_id.clone(),
            },
        }
    }
}

/// A message sent from the proxy to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    LoginSuccess { profile: GameProfile },
}

/// Parses a client text frame, refusing frames larger than `max_size` bytes.
pub fn parse_client_message(text: &str, max_size: usize) -> Result<ClientMessage, ServerError> {
    if text.len() > max_size {
        return Err(ServerError::Network(format!(
            "Message of {} bytes exceeds the {} byte limit",
            text.len(),
            max_size
        )));
    }
    serde_json::from_str(text).map_err(|e| ServerError::Network(format!("Invalid message format: {}", e)))
}

//! Connection manager for tracking and managing client connections.
//!
//! This module provides the central registry of live connections. It is also
//! the proxy's [`ConnectionHandoff`] and [`DisconnectNotifier`]: finalized
//! profiles are claimed here and refused logins are closed from here.

use crate::error::ServerError;
use crate::messaging::ServerMessage;
use crate::negotiator::{ConnectionHandoff, DisconnectNotifier};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::sink::SinkExt;
use futures_util::stream::SplitSink;
use portcullis_event_system::{ConnectionId, GameProfile, InboundConnection};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Write half of a client's WebSocket, shared between tasks.
pub type WsSender = Arc<Mutex<SplitSink<WebSocketStream<TcpStream>, Message>>>;

/// Reason sent when a second login for the same profile is refused.
pub const ALREADY_CONNECTED_REASON: &str = "You are already connected to this proxy!";

/// Largest close frame reason, in bytes, that fits a 125 byte control frame.
pub const MAX_CLOSE_REASON_BYTES: usize = 123;

/// Cuts `reason` to at most [`MAX_CLOSE_REASON_BYTES`] on a character boundary.
pub fn truncate_close_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON_BYTES {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON_BYTES;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

/// Policy close frame carrying `reason`, shortened to fit the frame.
pub(crate) fn close_message(reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::Policy,
        reason: truncate_close_reason(reason).to_string().into(),
    }))
}

/// A finalized profile collided with one that is already logged in.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityConflict {
    #[error("Profile {0} is already connected")]
    IdInUse(Uuid),
    #[error("Player '{0}' is already connected")]
    NameInUse(String),
}

/// Which connection holds which identity.
#[derive(Debug, Default)]
struct IdentityTable {
    by_id: HashMap<Uuid, ConnectionId>,
    /// Lowercased names
    by_name: HashMap<String, ConnectionId>,
}

/// Central manager for all client connections.
///
/// # Architecture
///
/// * Uses `DashMap` for lock-free connection and sender lookup
/// * Keeps claimed identities behind one `RwLock` so the id and name checks
///   happen together
#[derive(Debug, Default)]
pub struct ConnectionManager {
    /// Map of connection ID to connection state
    connections: DashMap<ConnectionId, Arc<InboundConnection>>,
    ws_senders: DashMap<ConnectionId, WsSender>,
    identities: RwLock<IdentityTable>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `connection`.
    pub fn add_connection(&self, connection: Arc<InboundConnection>) -> ConnectionId {
        let connection_id = connection.id();
        info!("🔗 Connection {} from {}", connection_id, connection.remote_addr());
        self.connections.insert(connection_id, connection);
        connection_id
    }

    /// Register the WebSocket sender for a connection
    pub fn register_ws_sender(&self, connection_id: ConnectionId, ws_sender: WsSender) {
        self.ws_senders.insert(connection_id, ws_sender);
    }

    /// Remove the WebSocket sender for a connection
    pub fn remove_ws_sender(&self, connection_id: ConnectionId) {
        self.ws_senders.remove(&connection_id);
    }

    pub fn get_connection(&self, connection_id: ConnectionId) -> Option<Arc<InboundConnection>> {
        self.connections.get(&connection_id).map(|entry| entry.value().clone())
    }

    /// Live connections, negotiating or logged in.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Connections whose negotiation has not reached a terminal state.
    pub fn negotiating_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|entry| !entry.value().state().is_terminal())
            .count()
    }

    /// Connections holding a claimed profile.
    pub async fn player_count(&self) -> usize {
        self.identities.read().await.by_id.len()
    }

    pub async fn find_by_name(&self, name: &str) -> Option<ConnectionId> {
        self.identities
            .read()
            .await
            .by_name
            .get(&name.to_ascii_lowercase())
            .copied()
    }

    pub async fn find_by_profile_id(&self, id: Uuid) -> Option<ConnectionId> {
        self.identities.read().await.by_id.get(&id).copied()
    }

    /// Records `profile` as logged in on `connection_id`.
    ///
    /// Fails if another connection already holds the same id or the same name
    /// (case-insensitive).
    pub async fn claim_identity(&self, connection_id: ConnectionId, profile: &GameProfile) -> Result<(), IdentityConflict> {
        let name = profile.name().to_ascii_lowercase();
        let mut identities = self.identities.write().await;

        if identities.by_id.get(&profile.id()).is_some_and(|holder| *holder != connection_id) {
            return Err(IdentityConflict::IdInUse(profile.id()));
        }
        if identities.by_name.get(&name).is_some_and(|holder| *holder != connection_id) {
            return Err(IdentityConflict::NameInUse(profile.name().to_string()));
        }

        identities.by_id.insert(profile.id(), connection_id);
        identities.by_name.insert(name, connection_id);
        Ok(())
    }

    async fn release_identity(&self, connection_id: ConnectionId) {
        let mut identities = self.identities.write().await;
        identities.by_id.retain(|_, holder| *holder != connection_id);
        identities.by_name.retain(|_, holder| *holder != connection_id);
    }

    /// Removes a connection from the manager and marks it closed.
    pub async fn remove_connection(&self, connection_id: ConnectionId) {
        if let Some((_, connection)) = self.connections.remove(&connection_id) {
            connection.close();
            info!(
                "❌ Connection {} from {} disconnected",
                connection_id,
                connection.remote_addr()
            );
        }
        self.release_identity(connection_id).await;
    }

    /// Sends a server message to a specific connection.
    pub async fn send_to_connection(&self, connection_id: ConnectionId, message: &ServerMessage) -> Result<(), ServerError> {
        let text = serde_json::to_string(message).map_err(|e| ServerError::Internal(e.to_string()))?;
        let ws_sender = self
            .ws_senders
            .get(&connection_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServerError::Network(format!("Connection {} has no sender", connection_id)))?;

        let mut ws_sender = ws_sender.lock().await;
        ws_sender
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ServerError::Network(format!("Failed to send to connection {}: {}", connection_id, e)))
    }

    /// Kick (disconnect) a connection by ID, sending a close frame
    pub async fn kick_connection(&self, connection_id: ConnectionId, reason: Option<String>) {
        let ws_sender = self.ws_senders.get(&connection_id).map(|entry| entry.value().clone());
        if let Some(ws_sender) = ws_sender {
            let mut ws_sender = ws_sender.lock().await;
            let close_msg = close_message(reason.as_deref().unwrap_or("Kicked by proxy"));
            if let Err(e) = ws_sender.send(close_msg).await {
                debug!("Close frame to connection {} not delivered: {}", connection_id, e);
            }
        }
        self.remove_connection(connection_id).await;
        self.remove_ws_sender(connection_id);
    }
}

#[async_trait]
impl ConnectionHandoff for ConnectionManager {
    async fn negotiation_complete(&self, connection: &Arc<InboundConnection>, profile: Arc<GameProfile>) {
        if let Err(conflict) = self.claim_identity(connection.id(), &profile).await {
            warn!("👥 Refusing {}: {}", connection, conflict);
            self.kick_connection(connection.id(), Some(ALREADY_CONNECTED_REASON.to_string()))
                .await;
            return;
        }

        let message = ServerMessage::LoginSuccess {
            profile: GameProfile::clone(&profile),
        };
        if let Err(e) = self.send_to_connection(connection.id(), &message).await {
            error!("Failed to confirm login for {}: {}", connection, e);
            self.remove_connection(connection.id()).await;
        }
    }
}

#[async_trait]
impl DisconnectNotifier for ConnectionManager {
    async fn disconnect(&self, connection: &Arc<InboundConnection>, reason: &str) {
        self.kick_connection(connection.id(), Some(reason.to_string())).await;
    }
}

//! Connection handling logic for WebSocket clients.
//!
//! This module manages one client from handshake to cleanup: it reads the
//! login message, runs the negotiator, and keeps reading frames so a client
//! that disconnects mid-negotiation cancels it.

use crate::{
    connection::{close_message, ConnectionManager, WsSender},
    error::ServerError,
    messaging::{parse_client_message, ClientMessage},
    negotiator::ProfileNegotiator,
};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use portcullis_event_system::{next_connection_id, ConnectionEndpoint, InboundConnection};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, trace};

/// Reason sent when the first frame is not a usable login message.
pub const INVALID_LOGIN_REASON: &str = "Invalid login message";

/// Per-connection limits taken from the proxy configuration.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    /// Time allowed for the WebSocket handshake and again for the login message
    pub login_timeout: Duration,
    pub max_message_size: usize,
}

type WsReceiver = SplitStream<WebSocketStream<TcpStream>>;

/// Handles a single client connection from establishment to cleanup.
///
/// # Connection Flow
///
/// 1. Perform WebSocket handshake
/// 2. Read the login message
/// 3. Register the connection with the connection manager
/// 4. Run the negotiator while watching for the client going away
/// 5. Keep the session open until either side closes it
/// 6. Clean up
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    connection_manager: Arc<ConnectionManager>,
    negotiator: Arc<ProfileNegotiator>,
    limits: ConnectionLimits,
) -> Result<(), ServerError> {
    // Perform WebSocket handshake
    let ws_stream = tokio::time::timeout(limits.login_timeout, accept_async(stream))
        .await
        .map_err(|_| ServerError::Network(format!("WebSocket handshake with {addr} timed out")))?
        .map_err(|e| ServerError::Network(format!("WebSocket handshake failed: {e}")))?;

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let ws_sender: WsSender = Arc::new(tokio::sync::Mutex::new(ws_sender));

    let login = match tokio::time::timeout(
        limits.login_timeout,
        read_login(&mut ws_receiver, &ws_sender, limits.max_message_size),
    )
    .await
    {
        Ok(Ok(login)) => login,
        Ok(Err(e)) => {
            close_with_reason(&ws_sender, INVALID_LOGIN_REASON).await;
            return Err(e);
        }
        Err(_) => {
            close_with_reason(&ws_sender, "Timeout").await;
            return Err(ServerError::Network(format!("{addr} did not send a login in time")));
        }
    };

    let ClientMessage::Login {
        virtual_host,
        protocol_version,
        ..
    } = &login;
    let mut endpoint = ConnectionEndpoint::new(addr);
    if let Some(host) = virtual_host {
        endpoint = endpoint.with_virtual_host(host.clone());
    }
    if let Some(version) = protocol_version {
        endpoint = endpoint.with_protocol_version(*version);
    }

    let connection = InboundConnection::new(next_connection_id(), endpoint);
    let connection_id = connection_manager.add_connection(connection.clone());
    connection_manager.register_ws_sender(connection_id, ws_sender.clone());

    let negotiation = async {
        match negotiator.negotiate(connection.clone(), login.credentials()).await {
            Ok(outcome) => trace!("Negotiation for connection {} ended: {:?}", connection_id, outcome),
            Err(e) => {
                error!("Negotiation for connection {} failed: {}", connection_id, e);
                connection_manager
                    .kick_connection(connection_id, Some("Internal proxy error".to_string()))
                    .await;
            }
        }
    };

    // Incoming frames: only used to notice the client leaving
    let watch_client = async {
        loop {
            tokio::select! {
                _ = connection.closed() => break,
                frame = ws_receiver.next() => match frame {
                    Some(Ok(Message::Ping(data))) => {
                        let mut ws_sender = ws_sender.lock().await;
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("🔌 Client {} requested close", connection_id);
                        connection.close();
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error for connection {}: {}", connection_id, e);
                        connection.close();
                        break;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    };

    tokio::join!(negotiation, watch_client);

    connection_manager.remove_connection(connection_id).await;
    connection_manager.remove_ws_sender(connection_id);
    Ok(())
}

/// Waits for the first text frame and parses it as a login.
async fn read_login(
    ws_receiver: &mut WsReceiver,
    ws_sender: &WsSender,
    max_message_size: usize,
) -> Result<ClientMessage, ServerError> {
    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => return parse_client_message(text.as_str(), max_message_size),
            Ok(Message::Ping(data)) => {
                let mut ws_sender = ws_sender.lock().await;
                let _ = ws_sender.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {
                return Err(ServerError::Network("Expected a text login frame".to_string()));
            }
            Err(e) => return Err(ServerError::Network(format!("WebSocket error before login: {e}"))),
        }
    }
    Err(ServerError::Network("Client closed before logging in".to_string()))
}

async fn close_with_reason(ws_sender: &WsSender, reason: &str) {
    let mut ws_sender = ws_sender.lock().await;
    let _ = ws_sender.send(close_message(reason)).await;
}

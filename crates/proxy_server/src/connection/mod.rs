//! Connection management for client connections.
//!
//! This module tracks live connections, keeps their WebSocket senders, and
//! enforces that a profile is logged in at most once.

pub mod manager;

pub use manager::{
    truncate_close_reason, ConnectionManager, IdentityConflict, WsSender, ALREADY_CONNECTED_REASON,
    MAX_CLOSE_REASON_BYTES,
};
pub(crate) use manager::close_message;

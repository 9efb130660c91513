//! Core proxy implementation and connection handling.
//!
//! This module contains the proxy server structure, the accept loop, and the
//! per-connection login handler.

pub mod core;
pub mod handlers;

pub use core::ProxyServer;
pub use handlers::{handle_connection, ConnectionLimits};

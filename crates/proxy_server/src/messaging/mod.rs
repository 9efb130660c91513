//! Message handling for the login front end.
//!
//! This module parses the client's login message and defines the replies the
//! proxy sends back.

pub mod types;

pub use types::{parse_client_message, ClientMessage, ServerMessage};

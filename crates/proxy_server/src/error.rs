//! Error types for the proxy front end.
//!
//! Pipeline errors live next to the stage that raises them
//! ([`VerificationError`](crate::auth::VerificationError),
//! [`NegotiationError`](crate::negotiator::NegotiationError)); this module
//! covers the transport and server plumbing around them.

/// Enumeration of possible server errors.
///
/// Categorizes errors into network-related and internal server errors
/// to help with debugging and error handling.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures or connection issues
    #[error("Network error: {0}")]
    Network(String),

    /// Internal server errors including listener registration and negotiation problems
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<portcullis_event_system::EventError> for ServerError {
    fn from(error: portcullis_event_system::EventError) -> Self {
        ServerError::Internal(error.to_string())
    }
}

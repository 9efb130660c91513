//! Identity verification.
//!
//! Turns a login attempt into a [`GameProfile`](portcullis_event_system::GameProfile)
//! before any listener sees it. Offline mode derives the id locally; online
//! mode asks the session authority and gives up after a hard timeout.

pub mod offline;
pub mod online;
pub mod session;
pub mod verifier;

pub use offline::{offline_profile, offline_uuid};
pub use online::verify_online;
pub use session::{HasJoinedRequest, HttpSessionAuthority, SessionAuthority};
pub use verifier::{
    validate_username, DefaultVerifier, IdentityVerifier, VerificationError, VerificationRequest,
};

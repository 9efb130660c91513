//! # Event Types and Contracts
//!
//! This module defines what can travel through the [`EventSequencer`](crate::EventSequencer):
//! the [`Event`] trait, the [`ProfileRequestEvent`] raised for every verified
//! login, and the errors raised while wiring listeners together.
//!
//! ## Design Principles
//!
//! - **Owned state**: Listeners receive `&mut E` and the sequencer owns the value
//! - **Snapshots**: Events are `Clone` so a failed listener can be rolled back
//! - **Commit hook**: Events decide what "a listener finished" means for them

use crate::connection::InboundConnection;
use crate::types::GameProfile;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::warn;

// ============================================================================
// Core Event Trait
// ============================================================================

/// Core trait that all dispatchable events implement.
///
/// `Clone` is required because the sequencer snapshots the event before each
/// listener and restores the snapshot if the listener fails.
pub trait Event: Send + Sync + Clone + fmt::Debug + 'static {
    /// Stable name used in logs and registry diagnostics.
    fn event_type() -> &'static str;

    /// Called by the sequencer after a listener completed successfully.
    fn commit(&mut self) {}
}

// ============================================================================
// Override Policy
// ============================================================================

/// How competing profile overrides from several listeners are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverridePolicy {
    /// Each listener may replace the override set by earlier ones.
    #[default]
    LastWriterWins,
    /// The first listener to complete with an override set fixes it.
    FirstWriterWins,
}

// ============================================================================
// Profile Request Event
// ============================================================================

/// Raised once per connection after its identity has been verified, giving
/// listeners the chance to replace the profile the connection will use.
///
/// `username`, `original_profile` and `online_mode` are fixed at construction.
/// Only the override slot changes during dispatch.
///
/// # Examples
///
/// ```rust
/// use portcullis_event_system::*;
/// use std::sync::Arc;
/// use uuid::Uuid;
///
/// let conn = InboundConnection::new(1, ConnectionEndpoint::new("127.0.0.1:1".parse().unwrap()));
/// let original = Arc::new(GameProfile::new(Uuid::new_v4(), "Alex", Vec::new())?);
/// let mut event = ProfileRequestEvent::new(&conn, original.clone(), true);
///
/// assert!(Arc::ptr_eq(event.effective_profile(), &original));
///
/// let skinned = original.add_property(ProfileProperty::unsigned("textures", "e30="));
/// event.set_game_profile(skinned);
/// assert_eq!(event.effective_profile().properties().len(), 1);
///
/// event.clear_game_profile();
/// assert!(Arc::ptr_eq(event.effective_profile(), &original));
/// # Ok::<(), ProfileError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ProfileRequestEvent {
    username: String,
    connection: Weak<InboundConnection>,
    original_profile: Arc<GameProfile>,
    online_mode: bool,
    game_profile: Option<Arc<GameProfile>>,
    policy: OverridePolicy,
    sealed: bool,
}

impl ProfileRequestEvent {
    /// Creates the event for `connection`; the username is taken from the profile.
    pub fn new(connection: &Arc<InboundConnection>, original_profile: Arc<GameProfile>, online_mode: bool) -> Self {
        Self {
            username: original_profile.name().to_string(),
            connection: Arc::downgrade(connection),
            original_profile,
            online_mode,
            game_profile: None,
            policy: OverridePolicy::default(),
            sealed: false,
        }
    }

    pub fn with_override_policy(mut self, policy: OverridePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The connection this request belongs to, if it is still alive.
    pub fn connection(&self) -> Option<Arc<InboundConnection>> {
        self.connection.upgrade()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn original_profile(&self) -> &Arc<GameProfile> {
        &self.original_profile
    }

    pub fn is_online_mode(&self) -> bool {
        self.online_mode
    }

    pub fn override_policy(&self) -> OverridePolicy {
        self.policy
    }

    /// The override if one is set, otherwise the original profile.
    pub fn effective_profile(&self) -> &Arc<GameProfile> {
        self.game_profile.as_ref().unwrap_or(&self.original_profile)
    }

    pub fn override_profile(&self) -> Option<&Arc<GameProfile>> {
        self.game_profile.as_ref()
    }

    /// Replaces the profile the connection will use.
    ///
    /// Returns `false` if the override is already fixed by
    /// [`OverridePolicy::FirstWriterWins`]; the call is then ignored.
    pub fn set_game_profile(&mut self, profile: impl Into<Arc<GameProfile>>) -> bool {
        if self.sealed {
            warn!(
                "🔒 Ignoring profile override for '{}': already fixed by an earlier listener",
                self.username
            );
            return false;
        }
        self.game_profile = Some(profile.into());
        true
    }

    /// Drops the override so the original profile is used again.
    pub fn clear_game_profile(&mut self) -> bool {
        if self.sealed {
            warn!(
                "🔒 Ignoring profile reset for '{}': already fixed by an earlier listener",
                self.username
            );
            return false;
        }
        self.game_profile = None;
        true
    }

    /// Consumes the event, yielding the profile to adopt.
    pub fn into_effective_profile(self) -> Arc<GameProfile> {
        self.game_profile.unwrap_or(self.original_profile)
    }
}

impl Event for ProfileRequestEvent {
    fn event_type() -> &'static str {
        "profile_request"
    }

    fn commit(&mut self) {
        if self.policy == OverridePolicy::FirstWriterWins && self.game_profile.is_some() {
            self.sealed = true;
        }
    }
}

impl fmt::Display for ProfileRequestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProfileRequestEvent{{username={}, gameProfile={}}}",
            self.username,
            self.effective_profile()
        )
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while building the listener registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// A listener with the same name is already registered for the event type
    #[error("Listener '{listener}' is already registered for '{event_type}'")]
    DuplicateListener {
        event_type: &'static str,
        listener: String,
    },
    /// Listener names are used in logs and veto reports and must not be blank
    #[error("Listener name must not be empty")]
    EmptyListenerName,
}

//! Listener contract for the event sequencer.
//!
//! Listeners are `async` and receive the event mutably. Most code implements
//! [`Listener`] directly; small synchronous hooks can be registered as closures
//! through [`FnListener`].

use crate::events::Event;
use async_trait::async_trait;
use std::marker::PhantomData;

/// What a listener can report back besides success.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    /// Stop dispatch and refuse the connection with this reason.
    #[error("Vetoed: {0}")]
    Veto(String),
    /// The listener could not do its work; its changes are discarded.
    #[error("Listener failed: {0}")]
    Failed(String),
}

impl ListenerError {
    pub fn veto(reason: impl Into<String>) -> Self {
        Self::Veto(reason.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Handler invoked by the sequencer for events of type `E`.
///
/// # Examples
///
/// ```rust
/// use portcullis_event_system::*;
/// use async_trait::async_trait;
///
/// struct RequireOnlineMode;
///
/// #[async_trait]
/// impl Listener<ProfileRequestEvent> for RequireOnlineMode {
///     async fn on_event(&self, event: &mut ProfileRequestEvent) -> Result<(), ListenerError> {
///         if !event.is_online_mode() {
///             return Err(ListenerError::veto("This server requires a premium account"));
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Listener<E: Event>: Send + Sync + 'static {
    async fn on_event(&self, event: &mut E) -> Result<(), ListenerError>;
}

/// Adapts a synchronous closure into a [`Listener`].
pub struct FnListener<E, F> {
    handler: F,
    _phantom: PhantomData<fn(&mut E)>,
}

impl<E, F> FnListener<E, F>
where
    E: Event,
    F: Fn(&mut E) -> Result<(), ListenerError> + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<E, F> Listener<E> for FnListener<E, F>
where
    E: Event,
    F: Fn(&mut E) -> Result<(), ListenerError> + Send + Sync + 'static,
{
    async fn on_event(&self, event: &mut E) -> Result<(), ListenerError> {
        (self.handler)(event)
    }
}

impl<E, F> std::fmt::Debug for FnListener<E, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnListener")
            .field("event", &std::any::type_name::<E>())
            .finish()
    }
}

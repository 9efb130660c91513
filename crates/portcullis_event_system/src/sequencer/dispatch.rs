/// Dispatch engine over a frozen listener table
use super::registry::{ListenerList, RegisteredListener, SequencerConfig};
use super::stats::{SequencerStats, StatsCounters};
use crate::events::Event;
use crate::listener::ListenerError;
use futures::FutureExt;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Result of running an event through every listener.
#[derive(Debug)]
pub enum DispatchOutcome<E> {
    /// All listeners ran (failed ones rolled back); carries the final event.
    Completed(E),
    /// A listener vetoed; later listeners were not invoked.
    Vetoed {
        event: E,
        reason: String,
        listener: String,
    },
}

impl<E> DispatchOutcome<E> {
    pub fn is_vetoed(&self) -> bool {
        matches!(self, DispatchOutcome::Vetoed { .. })
    }

    pub fn event(&self) -> &E {
        match self {
            DispatchOutcome::Completed(event) => event,
            DispatchOutcome::Vetoed { event, .. } => event,
        }
    }

    pub fn into_event(self) -> E {
        match self {
            DispatchOutcome::Completed(event) => event,
            DispatchOutcome::Vetoed { event, .. } => event,
        }
    }
}

/// Why a single listener invocation did not succeed.
enum ListenerFault {
    Veto(String),
    Failed(String),
    Panicked(String),
    TimedOut(Duration),
}

/// Immutable, lock-free dispatcher produced by
/// [`ListenerRegistry::freeze`](super::ListenerRegistry::freeze).
///
/// Share it behind an `Arc`; any number of negotiations may dispatch at once.
/// Within one dispatch, listeners run one at a time in priority order and each
/// sees the event exactly as the previous one left it.
///
/// # Failure handling
///
/// Before a listener runs, the event is cloned. If the listener returns
/// [`ListenerError::Failed`], panics, or exceeds the configured per-listener
/// timeout, the clone is restored and dispatch moves on. A
/// [`ListenerError::Veto`] stops dispatch at once and is reported as
/// [`DispatchOutcome::Vetoed`].
pub struct EventSequencer {
    listeners: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    config: SequencerConfig,
    stats: StatsCounters,
}

impl EventSequencer {
    pub(super) fn from_parts(listeners: HashMap<TypeId, Box<dyn Any + Send + Sync>>, config: SequencerConfig) -> Self {
        Self {
            listeners,
            config,
            stats: StatsCounters::default(),
        }
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn listener_count<E: Event>(&self) -> usize {
        self.list::<E>().map_or(0, |list| list.len())
    }

    pub fn stats(&self) -> SequencerStats {
        self.stats.snapshot()
    }

    /// Runs `event` through every listener registered for `E`.
    pub async fn dispatch<E: Event>(&self, mut event: E) -> DispatchOutcome<E> {
        StatsCounters::bump(&self.stats.events_dispatched);

        let Some(list) = self.list::<E>() else {
            trace!("📭 No listeners for '{}'", E::event_type());
            return DispatchOutcome::Completed(event);
        };

        debug!("📤 Dispatching '{}' to {} listener(s)", E::event_type(), list.len());

        for registered in list.iter() {
            let snapshot = event.clone();
            StatsCounters::bump(&self.stats.listeners_invoked);

            match self.invoke(registered, &mut event).await {
                Ok(()) => event.commit(),
                Err(ListenerFault::Veto(reason)) => {
                    StatsCounters::bump(&self.stats.vetoes);
                    info!(
                        "⛔ Listener '{}' vetoed '{}': {}",
                        registered.name,
                        E::event_type(),
                        reason
                    );
                    return DispatchOutcome::Vetoed {
                        event,
                        reason,
                        listener: registered.name.to_string(),
                    };
                }
                Err(fault) => {
                    event = snapshot;
                    self.report_fault::<E>(registered, fault);
                }
            }
        }

        DispatchOutcome::Completed(event)
    }

    async fn invoke<E: Event>(&self, registered: &RegisteredListener<E>, event: &mut E) -> Result<(), ListenerFault> {
        let call = AssertUnwindSafe(registered.listener.on_event(event)).catch_unwind();

        let result = match self.config.listener_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => return Err(ListenerFault::TimedOut(limit)),
            },
            None => call.await,
        };

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(ListenerError::Veto(reason))) => Err(ListenerFault::Veto(reason)),
            Ok(Err(ListenerError::Failed(message))) => Err(ListenerFault::Failed(message)),
            Err(panic) => Err(ListenerFault::Panicked(panic_message(panic.as_ref()))),
        }
    }

    fn report_fault<E: Event>(&self, registered: &RegisteredListener<E>, fault: ListenerFault) {
        match fault {
            ListenerFault::Failed(message) => {
                StatsCounters::bump(&self.stats.listener_failures);
                warn!(
                    "❌ Listener '{}' failed on '{}', changes discarded: {}",
                    registered.name,
                    E::event_type(),
                    message
                );
            }
            ListenerFault::Panicked(message) => {
                StatsCounters::bump(&self.stats.listener_failures);
                error!(
                    "💥 Listener '{}' panicked on '{}', changes discarded: {}",
                    registered.name,
                    E::event_type(),
                    message
                );
            }
            ListenerFault::TimedOut(limit) => {
                StatsCounters::bump(&self.stats.listener_timeouts);
                warn!(
                    "⏱️ Listener '{}' exceeded {:?} on '{}', changes discarded",
                    registered.name,
                    limit,
                    E::event_type()
                );
            }
            ListenerFault::Veto(_) => {}
        }
    }

    fn list<E: Event>(&self) -> Option<&ListenerList<E>> {
        self.listeners
            .get(&TypeId::of::<E>())
            .and_then(|list| list.downcast_ref::<ListenerList<E>>())
    }
}

impl std::fmt::Debug for EventSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSequencer")
            .field("event_types", &self.listeners.len())
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

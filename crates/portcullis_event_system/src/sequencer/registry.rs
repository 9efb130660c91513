/// Listener registration, populated at startup and frozen before dispatch
use super::dispatch::EventSequencer;
use crate::events::{Event, EventError};
use crate::listener::{FnListener, Listener, ListenerError};
use compact_str::CompactString;
use smallvec::SmallVec;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Tuning for dispatch behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencerConfig {
    /// Upper bound for a single listener; exceeding it counts as a failure.
    pub listener_timeout: Option<Duration>,
}

pub(super) struct RegisteredListener<E: Event> {
    pub(super) name: CompactString,
    pub(super) priority: i32,
    pub(super) listener: Arc<dyn Listener<E>>,
}

/// Most event types have a handful of listeners; keep them inline.
pub(super) type ListenerList<E> = SmallVec<[RegisteredListener<E>; 4]>;

/// Mutable builder of the listener table.
///
/// Owned by the application root while plugins and built-ins register, then
/// turned into an immutable [`EventSequencer`] with [`ListenerRegistry::freeze`].
/// Nothing can be registered once frozen.
///
/// Listeners for one event type run in ascending priority; equal priorities
/// keep registration order.
pub struct ListenerRegistry {
    listeners: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    config: SequencerConfig,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::with_config(SequencerConfig::default())
    }

    pub fn with_config(config: SequencerConfig) -> Self {
        Self {
            listeners: HashMap::new(),
            config,
        }
    }

    /// Registers `listener` for events of type `E`.
    pub fn register<E, L>(&mut self, name: &str, priority: i32, listener: L) -> Result<(), EventError>
    where
        E: Event,
        L: Listener<E>,
    {
        self.register_shared(name, priority, Arc::new(listener))
    }

    /// Registers an already shared listener, e.g. one that also serves other event types.
    pub fn register_shared<E: Event>(
        &mut self,
        name: &str,
        priority: i32,
        listener: Arc<dyn Listener<E>>,
    ) -> Result<(), EventError> {
        if name.trim().is_empty() {
            return Err(EventError::EmptyListenerName);
        }

        let list = self.list_mut::<E>();
        if list.iter().any(|registered| registered.name == name) {
            return Err(EventError::DuplicateListener {
                event_type: E::event_type(),
                listener: name.to_string(),
            });
        }

        // After every listener with priority <= ours, so ties keep registration order
        let position = list.partition_point(|registered| registered.priority <= priority);
        list.insert(
            position,
            RegisteredListener {
                name: CompactString::new(name),
                priority,
                listener,
            },
        );

        info!(
            "📝 Registered listener '{}' for '{}' at priority {}",
            name,
            E::event_type(),
            priority
        );
        Ok(())
    }

    /// Registers a synchronous closure as a listener.
    pub fn register_fn<E, F>(&mut self, name: &str, priority: i32, handler: F) -> Result<(), EventError>
    where
        E: Event,
        F: Fn(&mut E) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.register(name, priority, FnListener::new(handler))
    }

    pub fn listener_count<E: Event>(&self) -> usize {
        self.list::<E>().map_or(0, |list| list.len())
    }

    /// Listener names for `E` in dispatch order.
    pub fn listener_names<E: Event>(&self) -> Vec<String> {
        self.list::<E>()
            .map(|list| list.iter().map(|registered| registered.name.to_string()).collect())
            .unwrap_or_default()
    }

    /// Number of event types with at least one listener.
    pub fn event_type_count(&self) -> usize {
        self.listeners.len()
    }

    /// Consumes the registry and produces the read-only dispatcher.
    pub fn freeze(self) -> EventSequencer {
        info!(
            "🔒 Listener registry frozen ({} event type(s))",
            self.listeners.len()
        );
        EventSequencer::from_parts(self.listeners, self.config)
    }

    fn list<E: Event>(&self) -> Option<&ListenerList<E>> {
        self.listeners
            .get(&TypeId::of::<E>())
            .and_then(|list| list.downcast_ref::<ListenerList<E>>())
    }

    fn list_mut<E: Event>(&mut self) -> &mut ListenerList<E> {
        let entry = self
            .listeners
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(ListenerList::<E>::new()));
        match entry.downcast_mut::<ListenerList<E>>() {
            Some(list) => list,
            None => unreachable!("listener table entry keyed by TypeId of a different type"),
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("event_types", &self.listeners.len())
            .field("config", &self.config)
            .finish()
    }
}

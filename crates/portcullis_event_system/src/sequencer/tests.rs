//! Tests for ordered dispatch, rollback and veto handling

#[cfg(test)]
mod tests {
    use crate::connection::{ConnectionEndpoint, InboundConnection};
    use crate::events::{Event, EventError, OverridePolicy, ProfileRequestEvent};
    use crate::listener::{Listener, ListenerError};
    use crate::sequencer::{DispatchOutcome, ListenerRegistry, SequencerConfig};
    use crate::types::{GameProfile, ProfileProperty};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    #[derive(Debug, Clone, Default)]
    struct TraceEvent {
        visited: Vec<&'static str>,
        value: u32,
    }

    impl Event for TraceEvent {
        fn event_type() -> &'static str {
            "trace"
        }
    }

    /// Suspends before touching the event.
    struct SlowTagger {
        tag: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl Listener<TraceEvent> for SlowTagger {
        async fn on_event(&self, event: &mut TraceEvent) -> Result<(), ListenerError> {
            tokio::time::sleep(self.delay).await;
            event.visited.push(self.tag);
            event.value += 1;
            Ok(())
        }
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl Listener<TraceEvent> for Counting {
        async fn on_event(&self, event: &mut TraceEvent) -> Result<(), ListenerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            event.visited.push("counting");
            Ok(())
        }
    }

    fn tagger(tag: &'static str) -> impl Fn(&mut TraceEvent) -> Result<(), ListenerError> + Send + Sync + 'static {
        move |event: &mut TraceEvent| {
            event.visited.push(tag);
            Ok(())
        }
    }

    fn profile_event(policy: OverridePolicy) -> (Arc<InboundConnection>, Arc<GameProfile>, ProfileRequestEvent) {
        let conn = InboundConnection::new(1, ConnectionEndpoint::new("127.0.0.1:40000".parse().unwrap()));
        let original = Arc::new(
            GameProfile::new(
                Uuid::new_v4(),
                "Alex",
                vec![ProfileProperty::new("textures", "skin", Some("sig".into()))],
            )
            .unwrap(),
        );
        let event = ProfileRequestEvent::new(&conn, original.clone(), true).with_override_policy(policy);
        (conn, original, event)
    }

    #[tokio::test]
    async fn test_priority_order_with_stable_ties() {
        let mut registry = ListenerRegistry::new();
        registry.register_fn("late", 10, tagger("late")).unwrap();
        registry.register_fn("first_tie", 0, tagger("first_tie")).unwrap();
        registry.register_fn("early", -5, tagger("early")).unwrap();
        registry.register_fn("second_tie", 0, tagger("second_tie")).unwrap();

        assert_eq!(
            registry.listener_names::<TraceEvent>(),
            vec!["early", "first_tie", "second_tie", "late"]
        );

        let sequencer = registry.freeze();
        let outcome = sequencer.dispatch(TraceEvent::default()).await;
        assert!(!outcome.is_vetoed());
        assert_eq!(outcome.into_event().visited, vec!["early", "first_tie", "second_tie", "late"]);
    }

    #[tokio::test]
    async fn test_suspending_listener_completes_before_next_runs() {
        let mut registry = ListenerRegistry::new();
        registry
            .register("slow", 0, SlowTagger { tag: "slow", delay: Duration::from_millis(30) })
            .unwrap();
        registry
            .register_fn("observer", 1, |event: &mut TraceEvent| {
                if event.visited != ["slow"] || event.value != 1 {
                    return Err(ListenerError::failed("ran before the slow listener finished"));
                }
                event.visited.push("observer");
                Ok(())
            })
            .unwrap();

        let sequencer = registry.freeze();
        let event = sequencer.dispatch(TraceEvent::default()).await.into_event();
        assert_eq!(event.visited, vec!["slow", "observer"]);
        assert_eq!(sequencer.stats().listener_failures, 0);
    }

    #[tokio::test]
    async fn test_no_listeners_returns_event_untouched() {
        let sequencer = ListenerRegistry::new().freeze();
        let event = TraceEvent { visited: vec!["seed"], value: 3 };

        match sequencer.dispatch(event).await {
            DispatchOutcome::Completed(event) => {
                assert_eq!(event.visited, vec!["seed"]);
                assert_eq!(event.value, 3);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(sequencer.listener_count::<TraceEvent>(), 0);
    }

    #[tokio::test]
    async fn test_failed_listener_is_rolled_back_and_dispatch_continues() {
        let mut registry = ListenerRegistry::new();
        registry.register_fn("before", 0, tagger("before")).unwrap();
        registry
            .register_fn("broken", 1, |event: &mut TraceEvent| {
                event.visited.push("broken");
                event.value = 42;
                Err(ListenerError::failed("database unavailable"))
            })
            .unwrap();
        registry.register_fn("after", 2, tagger("after")).unwrap();

        let sequencer = registry.freeze();
        let event = sequencer.dispatch(TraceEvent::default()).await.into_event();

        assert_eq!(event.visited, vec!["before", "after"]);
        assert_eq!(event.value, 0);

        let stats = sequencer.stats();
        assert_eq!(stats.listeners_invoked, 3);
        assert_eq!(stats.listener_failures, 1);
    }

    #[tokio::test]
    async fn test_panicking_listener_is_isolated() {
        let mut registry = ListenerRegistry::new();
        registry
            .register_fn("panics", 0, |event: &mut TraceEvent| {
                event.value = 99;
                if event.value == 99 {
                    panic!("listener bug");
                }
                Ok(())
            })
            .unwrap();
        registry.register_fn("after", 1, tagger("after")).unwrap();

        let sequencer = registry.freeze();
        let event = sequencer.dispatch(TraceEvent::default()).await.into_event();

        assert_eq!(event.value, 0);
        assert_eq!(event.visited, vec!["after"]);
        assert_eq!(sequencer.stats().listener_failures, 1);
    }

    #[tokio::test]
    async fn test_listener_timeout_is_rolled_back() {
        let mut registry = ListenerRegistry::with_config(SequencerConfig {
            listener_timeout: Some(Duration::from_millis(20)),
        });

        struct Hangs;

        #[async_trait]
        impl Listener<TraceEvent> for Hangs {
            async fn on_event(&self, event: &mut TraceEvent) -> Result<(), ListenerError> {
                event.visited.push("hangs");
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        }

        registry.register("hangs", 0, Hangs).unwrap();
        registry.register_fn("after", 1, tagger("after")).unwrap();

        let sequencer = registry.freeze();
        let started = std::time::Instant::now();
        let event = sequencer.dispatch(TraceEvent::default()).await.into_event();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(event.visited, vec!["after"]);
        assert_eq!(sequencer.stats().listener_timeouts, 1);
    }

    #[tokio::test]
    async fn test_veto_stops_dispatch() {
        let later = Arc::new(AtomicUsize::new(0));
        let mut registry = ListenerRegistry::new();
        registry.register_fn("first", 0, tagger("first")).unwrap();
        registry
            .register_fn("gatekeeper", 1, |_event: &mut TraceEvent| Err(ListenerError::veto("banned")))
            .unwrap();
        registry.register("later", 2, Counting(later.clone())).unwrap();

        let sequencer = registry.freeze();
        match sequencer.dispatch(TraceEvent::default()).await {
            DispatchOutcome::Vetoed { event, reason, listener } => {
                assert_eq!(reason, "banned");
                assert_eq!(listener, "gatekeeper");
                assert_eq!(event.visited, vec!["first"]);
            }
            other => panic!("expected veto, got {:?}", other),
        }

        assert_eq!(later.load(Ordering::SeqCst), 0);
        let stats = sequencer.stats();
        assert_eq!(stats.vetoes, 1);
        assert_eq!(stats.listeners_invoked, 2);
    }

    #[tokio::test]
    async fn test_last_writer_wins_by_default() {
        let (_conn, original, event) = profile_event(OverridePolicy::LastWriterWins);
        let mut registry = ListenerRegistry::new();
        registry
            .register_fn("a", 0, |event: &mut ProfileRequestEvent| {
                let renamed = event.original_profile().with_name("FromA").map_err(|e| ListenerError::failed(e.to_string()))?;
                event.set_game_profile(renamed);
                Ok(())
            })
            .unwrap();
        registry
            .register_fn("b", 1, |event: &mut ProfileRequestEvent| {
                let renamed = event.original_profile().with_name("FromB").map_err(|e| ListenerError::failed(e.to_string()))?;
                event.set_game_profile(renamed);
                Ok(())
            })
            .unwrap();

        let sequencer = registry.freeze();
        let adopted = sequencer.dispatch(event).await.into_event().into_effective_profile();
        assert_eq!(adopted.name(), "FromB");
        assert_eq!(adopted.id(), original.id());
    }

    #[tokio::test]
    async fn test_first_writer_wins_keeps_first_override() {
        let (_conn, _original, event) = profile_event(OverridePolicy::FirstWriterWins);
        let mut registry = ListenerRegistry::new();
        for (name, priority) in [("FromA", 0), ("FromB", 1)] {
            registry
                .register_fn(name, priority, move |event: &mut ProfileRequestEvent| {
                    let renamed = event.original_profile().with_name(name).map_err(|e| ListenerError::failed(e.to_string()))?;
                    event.set_game_profile(renamed);
                    Ok(())
                })
                .unwrap();
        }

        let sequencer = registry.freeze();
        let adopted = sequencer.dispatch(event).await.into_event().into_effective_profile();
        assert_eq!(adopted.name(), "FromA");
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_change_override() {
        let (_conn, original, event) = profile_event(OverridePolicy::LastWriterWins);
        let mut registry = ListenerRegistry::new();
        registry
            .register_fn("sets", 0, |event: &mut ProfileRequestEvent| {
                let custom = event
                    .original_profile()
                    .with_properties(vec![ProfileProperty::unsigned("textures", "custom")]);
                event.set_game_profile(custom);
                Ok(())
            })
            .unwrap();
        registry
            .register_fn("clears_then_fails", 1, |event: &mut ProfileRequestEvent| {
                event.clear_game_profile();
                Err(ListenerError::failed("lookup failed"))
            })
            .unwrap();

        let sequencer = registry.freeze();
        let adopted = sequencer.dispatch(event).await.into_event().into_effective_profile();
        assert!(!Arc::ptr_eq(&adopted, &original));
        assert_eq!(adopted.properties()[0].value, "custom");
    }

    #[test]
    fn test_registration_errors() {
        let mut registry = ListenerRegistry::new();
        registry.register_fn("dup", 0, tagger("a")).unwrap();

        let duplicate = registry.register_fn("dup", 5, tagger("b"));
        assert_eq!(
            duplicate,
            Err(EventError::DuplicateListener {
                event_type: "trace",
                listener: "dup".to_string(),
            })
        );
        assert_eq!(registry.register_fn("  ", 0, tagger("c")), Err(EventError::EmptyListenerName));
        assert_eq!(registry.listener_count::<TraceEvent>(), 1);
        assert_eq!(registry.event_type_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatches_share_frozen_registry() {
        let mut registry = ListenerRegistry::new();
        registry
            .register("slow", 0, SlowTagger { tag: "slow", delay: Duration::from_millis(5) })
            .unwrap();
        registry.register_fn("tail", 1, tagger("tail")).unwrap();
        let sequencer = Arc::new(registry.freeze());

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let sequencer = sequencer.clone();
                tokio::spawn(async move { sequencer.dispatch(TraceEvent::default()).await.into_event() })
            })
            .collect();

        for task in tasks {
            let event = task.await.unwrap();
            assert_eq!(event.visited, vec!["slow", "tail"]);
        }
        assert_eq!(sequencer.stats().events_dispatched, 32);
        assert_eq!(sequencer.stats().listeners_invoked, 64);
    }
}

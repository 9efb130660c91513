//! Forces configured properties (typically `textures`) onto chosen players.

use crate::config::ProfileOverride;
use async_trait::async_trait;
use portcullis_event_system::{GameProfile, Listener, ListenerError, ProfileProperty, ProfileRequestEvent};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ProfilePropertyListener {
    /// Keyed by lowercased username
    overrides: HashMap<String, Vec<ProfileProperty>>,
}

impl ProfilePropertyListener {
    pub fn from_overrides(overrides: &HashMap<String, ProfileOverride>) -> Self {
        Self {
            overrides: overrides
                .iter()
                .filter(|(_, entry)| !entry.properties.is_empty())
                .map(|(name, entry)| (name.to_ascii_lowercase(), entry.properties.clone()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

#[async_trait]
impl Listener<ProfileRequestEvent> for ProfilePropertyListener {
    async fn on_event(&self, event: &mut ProfileRequestEvent) -> Result<(), ListenerError> {
        let Some(properties) = self.overrides.get(&event.username().to_ascii_lowercase()) else {
            return Ok(());
        };

        let profile = properties
            .iter()
            .cloned()
            .fold(GameProfile::clone(event.effective_profile()), |profile, property| {
                profile.replace_property(property)
            });

        debug!(
            "🎨 Forcing {} propert{} onto '{}'",
            properties.len(),
            if properties.len() == 1 { "y" } else { "ies" },
            event.username()
        );
        event.set_game_profile(profile);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portcullis_event_system::{ConnectionEndpoint, GameProfile, InboundConnection};
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_replaces_textures_and_keeps_identity() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "Alex".to_string(),
            ProfileOverride {
                properties: vec![ProfileProperty::unsigned("textures", "forced")],
            },
        );
        let listener = ProfilePropertyListener::from_overrides(&overrides);

        let conn = InboundConnection::new(3, ConnectionEndpoint::new("127.0.0.1:9".parse().unwrap()));
        let original = Arc::new(
            GameProfile::new(
                Uuid::new_v4(),
                "alex",
                vec![
                    ProfileProperty::new("textures", "real", Some("sig".into())),
                    ProfileProperty::unsigned("cape", "c"),
                ],
            )
            .unwrap(),
        );
        let mut event = ProfileRequestEvent::new(&conn, original.clone(), true);
        listener.on_event(&mut event).await.unwrap();

        let effective = event.effective_profile();
        assert_eq!(effective.id(), original.id());
        assert_eq!(effective.properties().len(), 2);
        assert_eq!(effective.property("textures").unwrap().value, "forced");
        assert!(!effective.property("textures").unwrap().is_signed());
        assert_eq!(effective.property("cape").unwrap().value, "c");
    }

    #[tokio::test]
    async fn test_ignores_other_players() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "Alex".to_string(),
            ProfileOverride {
                properties: vec![ProfileProperty::unsigned("textures", "forced")],
            },
        );
        let listener = ProfilePropertyListener::from_overrides(&overrides);

        let conn = InboundConnection::new(4, ConnectionEndpoint::new("127.0.0.1:9".parse().unwrap()));
        let original = Arc::new(GameProfile::new(Uuid::new_v4(), "Steve", Vec::new()).unwrap());
        let mut event = ProfileRequestEvent::new(&conn, original.clone(), false);
        listener.on_event(&mut event).await.unwrap();

        assert!(event.override_profile().is_none());
    }
}

//! # Core Type Definitions
//!
//! The identity value types shared by every stage of the login pipeline.
//!
//! ## Key Types
//!
//! - [`GameProfile`] - The resolved identity a connection is known by downstream
//! - [`ProfileProperty`] - A signed key/value attribute attached to a profile
//!
//! ## Wire Format
//!
//! Profiles serialize in the same JSON shape the session authority returns:
//! the id is written as 32 undashed hex digits and properties keep their order.
//!
//! ```json
//! {
//!   "id": "069a79f444e94726a5befca90e38aaf5",
//!   "name": "Notch",
//!   "properties": [
//!     { "name": "textures", "value": "ewogIC...", "signature": "jFx..." }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Profile Properties
// ============================================================================

/// A single signed attribute of a [`GameProfile`], e.g. skin texture data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileProperty {
    /// Property key (e.g. `"textures"`)
    pub name: String,
    /// Property payload, usually base64 encoded
    pub value: String,
    /// Signature from the session authority, if the property is signed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ProfileProperty {
    /// Creates a property with an optional signature.
    pub fn new(name: impl Into<String>, value: impl Into<String>, signature: Option<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            signature,
        }
    }

    /// Creates an unsigned property.
    pub fn unsigned(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value, None)
    }

    /// Returns true if the property carries a signature.
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

// ============================================================================
// Game Profile
// ============================================================================

/// Errors raised when building a [`GameProfile`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    /// Profiles must always carry a display name
    #[error("Profile name must not be empty")]
    EmptyName,
}

/// Immutable identity of a connection: unique id, display name and ordered
/// signed properties.
///
/// Two profiles compare equal iff their ids are equal; names and properties
/// do not take part in equality or hashing.
///
/// The `with_*` and `add_*` helpers return new values and never touch the
/// receiver.
///
/// # Examples
///
/// ```rust
/// use portcullis_event_system::{GameProfile, ProfileProperty};
/// use uuid::Uuid;
///
/// let id = Uuid::new_v4();
/// let profile = GameProfile::new(id, "Alex", Vec::new())?;
/// let skinned = profile.add_property(ProfileProperty::unsigned("textures", "e30="));
///
/// assert_eq!(profile, skinned);
/// assert!(profile.properties().is_empty());
/// assert_eq!(skinned.properties().len(), 1);
/// # Ok::<(), portcullis_event_system::ProfileError>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "WireProfile", into = "WireProfile")]
pub struct GameProfile {
    id: Uuid,
    name: String,
    properties: Vec<ProfileProperty>,
}

impl GameProfile {
    /// Creates a profile, rejecting an empty name.
    pub fn new(id: Uuid, name: impl Into<String>, properties: Vec<ProfileProperty>) -> Result<Self, ProfileError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ProfileError::EmptyName);
        }
        Ok(Self { id, name, properties })
    }

    /// The stable unique id of this profile.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Properties in wire order.
    pub fn properties(&self) -> &[ProfileProperty] {
        &self.properties
    }

    /// Finds the first property with the given name.
    pub fn property(&self, name: &str) -> Option<&ProfileProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Returns a copy of this profile with a different id.
    pub fn with_id(&self, id: Uuid) -> Self {
        Self { id, ..self.clone() }
    }

    /// Returns a copy of this profile with a different name.
    pub fn with_name(&self, name: impl Into<String>) -> Result<Self, ProfileError> {
        Self::new(self.id, name, self.properties.clone())
    }

    /// Returns a copy of this profile with the given properties replacing the current ones.
    pub fn with_properties(&self, properties: Vec<ProfileProperty>) -> Self {
        Self {
            properties,
            ..self.clone()
        }
    }

    /// Returns a copy of this profile with one more property appended.
    pub fn add_property(&self, property: ProfileProperty) -> Self {
        self.add_properties(std::iter::once(property))
    }

    /// Returns a copy of this profile with the given properties appended in order.
    pub fn add_properties(&self, properties: impl IntoIterator<Item = ProfileProperty>) -> Self {
        let mut merged = self.properties.clone();
        merged.extend(properties);
        self.with_properties(merged)
    }

    /// Returns a copy where every property named like `property` is replaced by it.
    ///
    /// The replacement takes the position of the first matching property; if
    /// none matches, it is appended.
    pub fn replace_property(&self, property: ProfileProperty) -> Self {
        let mut replaced = Vec::with_capacity(self.properties.len() + 1);
        let mut inserted = false;
        for existing in &self.properties {
            if existing.name == property.name {
                if !inserted {
                    replaced.push(property.clone());
                    inserted = true;
                }
            } else {
                replaced.push(existing.clone());
            }
        }
        if !inserted {
            replaced.push(property);
        }
        self.with_properties(replaced)
    }
}

impl PartialEq for GameProfile {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for GameProfile {}

impl std::hash::Hash for GameProfile {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for GameProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GameProfile{{id={}, name={}, properties={}}}",
            self.id,
            self.name,
            self.properties.len()
        )
    }
}

/// Serde representation matching the session authority's JSON.
#[derive(Serialize, Deserialize)]
struct WireProfile {
    #[serde(with = "undashed_uuid")]
    id: Uuid,
    name: String,
    #[serde(default)]
    properties: Vec<ProfileProperty>,
}

impl TryFrom<WireProfile> for GameProfile {
    type Error = ProfileError;

    fn try_from(wire: WireProfile) -> Result<Self, Self::Error> {
        GameProfile::new(wire.id, wire.name, wire.properties)
    }
}

impl From<GameProfile> for WireProfile {
    fn from(profile: GameProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.name,
            properties: profile.properties,
        }
    }
}

/// Undashed UUID encoding; both undashed and dashed forms are accepted on input.
mod undashed_uuid {
    use serde::{Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(id: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.simple().to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Uuid::parse_str(&raw).map_err(serde::de::Error::custom)
    }
}

//! Offline-mode identity derivation.
//!
//! The id is a name-based version 3 UUID over `"OfflinePlayer:" + username`,
//! hashed without a namespace. Other proxies and servers derive offline ids the
//! same way, so a player keeps one id across all of them.

use super::verifier::{validate_username, VerificationError};
use md5::{Digest, Md5};
use portcullis_event_system::GameProfile;
use uuid::{Builder, Uuid};

const OFFLINE_PREFIX: &str = "OfflinePlayer:";

/// Deterministic offline id for `username`. Case-sensitive.
pub fn offline_uuid(username: &str) -> Uuid {
    let digest = Md5::digest(format!("{OFFLINE_PREFIX}{username}").as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    Builder::from_md5_bytes(bytes).into_uuid()
}

/// Builds the offline profile for `username`: derived id, no properties.
pub fn offline_profile(username: &str) -> Result<GameProfile, VerificationError> {
    validate_username(username)?;
    GameProfile::new(offline_uuid(username), username, Vec::new())
        .map_err(|e| VerificationError::Invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_offline_ids() {
        assert_eq!(
            offline_uuid("Notch").to_string(),
            "b50ad385-829d-3141-a216-7e7d7539ba7f"
        );
        assert_eq!(
            offline_uuid("Steve").to_string(),
            "5627dd98-e6be-3c21-b8a8-e92344183641"
        );
    }

    #[test]
    fn test_derivation_is_deterministic_and_versioned() {
        let first = offline_uuid("Alex");
        let second = offline_uuid("Alex");
        assert_eq!(first, second);
        assert_eq!(first.get_version_num(), 3);
        assert_eq!(first.get_variant(), uuid::Variant::RFC4122);
        assert_ne!(first, offline_uuid("alex"));
    }

    #[test]
    fn test_offline_profile_shape() {
        let profile = offline_profile("Steve").unwrap();
        assert_eq!(profile.name(), "Steve");
        assert_eq!(profile.id(), offline_uuid("Steve"));
        assert!(profile.properties().is_empty());

        assert!(matches!(offline_profile("not valid!"), Err(VerificationError::Invalid(_))));
    }
}

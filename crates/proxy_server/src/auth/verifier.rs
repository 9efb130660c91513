//! The [`IdentityVerifier`] contract and its standard implementation.

use super::offline::offline_profile;
use super::online::verify_online;
use super::session::{HasJoinedRequest, SessionAuthority};
use async_trait::async_trait;
use portcullis_event_system::GameProfile;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Longest username accepted in either mode.
pub const MAX_USERNAME_LENGTH: usize = 16;

/// Why a login could not be turned into a profile.
///
/// Verification errors end the negotiation before any listener runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// The session authority has no record of this login
    #[error("No session found for '{0}'")]
    NotFound(String),
    /// The hard verification timeout elapsed
    #[error("Verification timed out after {0:?}")]
    Timeout(Duration),
    /// The session authority could not be reached or answered with an error
    #[error("Session authority unreachable: {0}")]
    Unreachable(String),
    /// Malformed username, missing credentials or an unusable authority response
    #[error("Invalid login: {0}")]
    Invalid(String),
}

impl VerificationError {
    /// Text shown to the client when this error ends its login.
    pub fn disconnect_reason(&self) -> &'static str {
        match self {
            VerificationError::NotFound(_) => "Failed to verify username!",
            VerificationError::Timeout(_) => "Timeout",
            VerificationError::Unreachable(_) => "Unable to authenticate you with the session server",
            VerificationError::Invalid(_) => "Invalid username or session",
        }
    }
}

/// Input of a single verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub username: String,
    pub online_mode: bool,
    /// Credential material proving the client joined with the authority
    pub server_id: Option<String>,
    pub remote_ip: Option<IpAddr>,
}

impl VerificationRequest {
    pub fn offline(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            online_mode: false,
            server_id: None,
            remote_ip: None,
        }
    }

    pub fn online(username: impl Into<String>, server_id: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            online_mode: true,
            server_id: Some(server_id.into()),
            remote_ip: None,
        }
    }

    pub fn with_remote_ip(mut self, ip: IpAddr) -> Self {
        self.remote_ip = Some(ip);
        self
    }
}

/// Resolves a login attempt into the profile the connection starts with.
#[async_trait]
pub trait IdentityVerifier: Send + Sync + 'static {
    async fn verify(&self, request: &VerificationRequest) -> Result<GameProfile, VerificationError>;
}

/// Checks the username shape shared by both modes: 1 to 16 of `[A-Za-z0-9_]`.
pub fn validate_username(username: &str) -> Result<(), VerificationError> {
    if username.is_empty() || username.len() > MAX_USERNAME_LENGTH {
        return Err(VerificationError::Invalid(format!(
            "username must be 1 to {} characters",
            MAX_USERNAME_LENGTH
        )));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(VerificationError::Invalid(format!(
            "username '{}' contains illegal characters",
            username
        )));
    }
    Ok(())
}

/// Offline derivation or session-authority lookup, picked per request.
pub struct DefaultVerifier {
    authority: Arc<dyn SessionAuthority>,
    timeout: Duration,
    prevent_proxy_connections: bool,
}

impl DefaultVerifier {
    pub fn new(authority: Arc<dyn SessionAuthority>, timeout: Duration) -> Self {
        Self {
            authority,
            timeout,
            prevent_proxy_connections: false,
        }
    }

    /// Forward the client's IP so the authority can refuse relayed logins.
    pub fn with_prevent_proxy_connections(mut self, enabled: bool) -> Self {
        self.prevent_proxy_connections = enabled;
        self
    }
}

#[async_trait]
impl IdentityVerifier for DefaultVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<GameProfile, VerificationError> {
        validate_username(&request.username)?;

        if !request.online_mode {
            debug!("🔑 Deriving offline identity for '{}'", request.username);
            return offline_profile(&request.username);
        }

        let server_id = request
            .server_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| VerificationError::Invalid("missing server id".to_string()))?;

        let lookup = HasJoinedRequest {
            username: request.username.clone(),
            server_id: server_id.to_string(),
            ip: if self.prevent_proxy_connections { request.remote_ip } else { None },
        };

        verify_online(self.authority.as_ref(), &lookup, self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::offline_uuid;
    use std::sync::Mutex;

    /// Records every lookup and answers with a fixed result.
    struct RecordingAuthority {
        seen: Mutex<Vec<HasJoinedRequest>>,
        answer: Result<GameProfile, VerificationError>,
    }

    #[async_trait]
    impl SessionAuthority for RecordingAuthority {
        async fn has_joined(&self, request: &HasJoinedRequest) -> Result<GameProfile, VerificationError> {
            self.seen.lock().unwrap().push(request.clone());
            self.answer.clone()
        }
    }

    fn authority(answer: Result<GameProfile, VerificationError>) -> Arc<RecordingAuthority> {
        Arc::new(RecordingAuthority {
            seen: Mutex::new(Vec::new()),
            answer,
        })
    }

    #[test]
    fn test_username_validation() {
        assert!(validate_username("Steve").is_ok());
        assert!(validate_username("a_B_9").is_ok());
        assert!(validate_username("abcdefghijklmnop").is_ok());

        for bad in ["", "abcdefghijklmnopq", "bad name", "dash-name", "ünicode"] {
            assert!(
                matches!(validate_username(bad), Err(VerificationError::Invalid(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_disconnect_reasons() {
        assert_eq!(
            VerificationError::NotFound("x".into()).disconnect_reason(),
            "Failed to verify username!"
        );
        assert_eq!(VerificationError::Timeout(Duration::from_secs(1)).disconnect_reason(), "Timeout");
        assert_eq!(
            VerificationError::Unreachable("x".into()).disconnect_reason(),
            "Unable to authenticate you with the session server"
        );
        assert_eq!(
            VerificationError::Invalid("x".into()).disconnect_reason(),
            "Invalid username or session"
        );
    }

    #[tokio::test]
    async fn test_offline_mode_never_contacts_authority() {
        let authority = authority(Err(VerificationError::Unreachable("down".into())));
        let verifier = DefaultVerifier::new(authority.clone(), Duration::from_secs(1));

        let profile = verifier.verify(&VerificationRequest::offline("Steve")).await.unwrap();
        assert_eq!(profile.id(), offline_uuid("Steve"));
        assert!(authority.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_online_mode_requires_server_id() {
        let verifier = DefaultVerifier::new(authority(Err(VerificationError::NotFound("x".into()))), Duration::from_secs(1));
        let mut request = VerificationRequest::online("Alex", "");
        assert!(matches!(verifier.verify(&request).await, Err(VerificationError::Invalid(_))));

        request.server_id = None;
        assert!(matches!(verifier.verify(&request).await, Err(VerificationError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_ip_forwarded_only_when_preventing_proxies() {
        let alex = GameProfile::new(uuid::Uuid::new_v4(), "Alex", Vec::new()).unwrap();
        let ip: IpAddr = "203.0.113.9".parse().unwrap();
        let request = VerificationRequest::online("Alex", "hash").with_remote_ip(ip);

        let plain_authority = authority(Ok(alex.clone()));
        DefaultVerifier::new(plain_authority.clone(), Duration::from_secs(1))
            .verify(&request)
            .await
            .unwrap();
        assert_eq!(plain_authority.seen.lock().unwrap()[0].ip, None);

        let strict_authority = authority(Ok(alex));
        DefaultVerifier::new(strict_authority.clone(), Duration::from_secs(1))
            .with_prevent_proxy_connections(true)
            .verify(&request)
            .await
            .unwrap();
        let seen = strict_authority.seen.lock().unwrap();
        assert_eq!(seen[0].ip, Some(ip));
        assert_eq!(seen[0].server_id, "hash");
    }
}

//! Online-mode verification: one bounded session-authority lookup.

use super::session::{HasJoinedRequest, SessionAuthority};
use super::verifier::VerificationError;
use portcullis_event_system::GameProfile;
use std::time::Duration;
use tracing::{debug, warn};

/// Asks `authority` whether the client joined, failing with
/// [`VerificationError::Timeout`] once `timeout` elapses.
///
/// There is exactly one attempt. A slow authority costs the client its login,
/// never a second round trip.
pub async fn verify_online(
    authority: &dyn SessionAuthority,
    request: &HasJoinedRequest,
    timeout: Duration,
) -> Result<GameProfile, VerificationError> {
    debug!("🌐 Verifying '{}' with the session authority", request.username);

    match tokio::time::timeout(timeout, authority.has_joined(request)).await {
        Ok(Ok(profile)) => {
            debug!("✅ Session authority confirmed '{}' as {}", request.username, profile.id());
            Ok(profile)
        }
        Ok(Err(e)) => {
            warn!("❌ Verification of '{}' failed: {}", request.username, e);
            Err(e)
        }
        Err(_) => {
            warn!("⏱️ Verification of '{}' timed out after {:?}", request.username, timeout);
            Err(VerificationError::Timeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowAuthority {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SessionAuthority for SlowAuthority {
        async fn has_joined(&self, _request: &HasJoinedRequest) -> Result<GameProfile, VerificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(10)).await;
            Err(VerificationError::NotFound("never".into()))
        }
    }

    #[tokio::test]
    async fn test_timeout_is_hard_and_not_retried() {
        let authority = SlowAuthority { calls: AtomicUsize::new(0) };
        let request = HasJoinedRequest {
            username: "Alex".into(),
            server_id: "hash".into(),
            ip: None,
        };

        let started = std::time::Instant::now();
        let result = verify_online(&authority, &request, Duration::from_millis(30)).await;

        assert_eq!(result, Err(VerificationError::Timeout(Duration::from_millis(30))));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
    }
}

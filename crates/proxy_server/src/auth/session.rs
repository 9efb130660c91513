//! Session authority client.
//!
//! The authority answers one question: did `username` join with `serverId`?
//! [`HttpSessionAuthority`] asks it over HTTP:
//!
//! ```text
//! GET {base}/session/minecraft/hasJoined?username=Alex&serverId=<hash>[&ip=<addr>]
//! ```
//!
//! | response | result |
//! |---|---|
//! | 200 with a profile | the profile |
//! | 204 or 404 | `NotFound` |
//! | any other status | `Unreachable` |
//! | 200 with a bad body or another player's name | `Invalid` |

use super::verifier::VerificationError;
use async_trait::async_trait;
use portcullis_event_system::GameProfile;
use reqwest::{Client, StatusCode};
use std::net::IpAddr;
use std::time::Duration;
use tracing::trace;

/// Parameters of a `hasJoined` lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasJoinedRequest {
    pub username: String,
    pub server_id: String,
    /// Only sent when proxy connections are being prevented
    pub ip: Option<IpAddr>,
}

/// Remote authority that confirms a client's session.
#[async_trait]
pub trait SessionAuthority: Send + Sync + 'static {
    async fn has_joined(&self, request: &HasJoinedRequest) -> Result<GameProfile, VerificationError>;
}

/// HTTP/JSON session authority client.
#[derive(Debug, Clone)]
pub struct HttpSessionAuthority {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpSessionAuthority {
    /// Creates a client for the authority at `base_url`.
    ///
    /// `request_timeout` bounds the HTTP exchange itself; callers still apply
    /// their own verification timeout on top.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout.min(Duration::from_secs(2)))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/session/minecraft/hasJoined", self.base_url)
    }
}

#[async_trait]
impl SessionAuthority for HttpSessionAuthority {
    async fn has_joined(&self, request: &HasJoinedRequest) -> Result<GameProfile, VerificationError> {
        let mut query = vec![
            ("username", request.username.clone()),
            ("serverId", request.server_id.clone()),
        ];
        if let Some(ip) = request.ip {
            query.push(("ip", ip.to_string()));
        }

        let response = self
            .client
            .get(self.endpoint())
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VerificationError::Timeout(self.request_timeout)
                } else {
                    VerificationError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        trace!("🌐 hasJoined for '{}' answered {}", request.username, status);

        match status {
            StatusCode::OK => {}
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => {
                return Err(VerificationError::NotFound(request.username.clone()));
            }
            other => {
                return Err(VerificationError::Unreachable(format!(
                    "session server answered {}",
                    other
                )));
            }
        }

        let profile: GameProfile = response
            .json()
            .await
            .map_err(|e| VerificationError::Invalid(format!("unreadable profile: {}", e)))?;

        if !profile.name().eq_ignore_ascii_case(&request.username) {
            return Err(VerificationError::Invalid(format!(
                "session server returned '{}' for '{}'",
                profile.name(),
                request.username
            )));
        }

        Ok(profile)
    }
}

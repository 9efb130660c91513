//! Factory functions for assembling a proxy from its configuration.

use crate::{
    auth::{DefaultVerifier, HttpSessionAuthority, IdentityVerifier},
    config::{AuthConfig, ProxyConfig},
    error::ServerError,
    listeners::register_builtin_listeners,
    server::ProxyServer,
};
use portcullis_event_system::{create_event_sequencer, ListenerRegistry};
use std::sync::Arc;

/// Builds the verifier described by `auth`, backed by the HTTP session authority.
pub fn build_verifier(auth: &AuthConfig) -> Result<Arc<dyn IdentityVerifier>, ServerError> {
    let authority = HttpSessionAuthority::new(auth.session_server_url.clone(), auth.verify_timeout())
        .map_err(|e| ServerError::Internal(format!("Failed to build session client: {e}")))?;

    Ok(Arc::new(
        DefaultVerifier::new(Arc::new(authority), auth.verify_timeout())
            .with_prevent_proxy_connections(auth.prevent_proxy_connections),
    ))
}

/// Creates a proxy with the built-in listeners plus whatever is already in `registry`.
///
/// The registry is frozen here; nothing can be registered afterwards.
///
/// # Example
///
/// ```rust,no_run
/// use portcullis_event_system::ListenerRegistry;
/// use proxy_server::{create_proxy, ProxyConfig};
///
/// let config = ProxyConfig::default();
/// let registry = ListenerRegistry::with_config(config.events.sequencer_config());
/// let proxy = create_proxy(config, registry).unwrap();
/// ```
pub fn create_proxy(config: ProxyConfig, mut registry: ListenerRegistry) -> Result<ProxyServer, ServerError> {
    register_builtin_listeners(&mut registry, &config)?;
    let verifier = build_verifier(&config.auth)?;
    let sequencer = create_event_sequencer(registry);
    Ok(ProxyServer::new(config, sequencer, verifier))
}

/// Creates a proxy with only the built-in listeners.
pub fn create_proxy_with_config(config: ProxyConfig) -> Result<ProxyServer, ServerError> {
    let registry = ListenerRegistry::with_config(config.events.sequencer_config());
    create_proxy(config, registry)
}

//! Listeners the proxy registers for itself before freezing the registry.

pub mod ban_list;
pub mod profile_properties;

pub use ban_list::{BanListListener, BANNED_REASON};
pub use profile_properties::ProfilePropertyListener;

use crate::config::ProxyConfig;
use portcullis_event_system::{EventError, ListenerRegistry, ProfileRequestEvent};

/// Priority of the ban check; runs before everything registered at the default priority.
pub const BAN_LIST_PRIORITY: i32 = -100;
/// Priority of the forced-property listener.
pub const PROFILE_PROPERTIES_PRIORITY: i32 = 0;

/// Registers the built-in listeners configured in `config`.
pub fn register_builtin_listeners(registry: &mut ListenerRegistry, config: &ProxyConfig) -> Result<(), EventError> {
    let bans = BanListListener::new(&config.security.banned_names, &config.security.banned_ips);
    if !bans.is_empty() {
        registry.register::<ProfileRequestEvent, _>("ban_list", BAN_LIST_PRIORITY, bans)?;
    }

    let properties = ProfilePropertyListener::from_overrides(&config.profiles);
    if !properties.is_empty() {
        registry.register::<ProfileRequestEvent, _>("profile_properties", PROFILE_PROPERTIES_PRIORITY, properties)?;
    }

    Ok(())
}

//! Built-in plugins.
pub mod access_log;
pub mod auth;

pub use access_log::AccessLogPlugin;
pub use auth::BearerAuthPlugin;

use crate::core::plugin::PluginRegistry;

/// Register every built-in plugin under its configuration name.
pub fn register_builtin(registry: &mut PluginRegistry) -> &mut PluginRegistry {
    registry
        .register(auth::NAME, BearerAuthPlugin::boxed)
        .register(access_log::NAME, AccessLogPlugin::boxed)
}

//! Server information plugin and provider.
//!
//! # Example
//!
//! ```
//! use meridian_system::server::Server;
//! use meridian_core::{ServerInfo, ServerInfoPlugin};
//!
//! let mut server = Server::new();
//! server.add_plugins(ServerInfoPlugin::named("weather"));
//! server.finish();
//!
//! let info = server.get_provider::<ServerInfo>().unwrap();
//! assert_eq!(info.name, "weather");
//! assert!(!info.version.is_empty());
//! ```

use meridian_system::plugin::Plugin;
use meridian_system::provider::Provider;
use meridian_system::server::Server;

/// Server runtime information.
///
/// Read-only provider, available to every flow through its dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Name the server announces to clients.
    pub name: String,
    /// Framework version string.
    pub version: &'static str,
    /// Whether running in debug mode.
    pub debug: bool,
}

impl Provider for ServerInfo {}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "meridian".to_string(),
            version: env!("CARGO_PKG_VERSION"),
            debug: cfg!(debug_assertions),
        }
    }
}

/// Plugin that provides server metadata.
///
/// # Providers
///
/// | Provider | Description |
/// |----------|-------------|
/// | [`ServerInfo`] | Server name, version and build mode |
///
/// # Dependencies
///
/// None. This is a foundational plugin with no dependencies.
#[derive(Debug, Clone, Default)]
pub struct ServerInfoPlugin {
    name: Option<String>,
}

impl ServerInfoPlugin {
    /// Announces the server under `name`.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

impl Plugin for ServerInfoPlugin {
    fn build(&self, server: &mut Server) {
        let mut info = ServerInfo::default();
        if let Some(name) = &self.name {
            info.name.clone_from(name);
        }
        tracing::debug!(name = %info.name, version = info.version, "server info registered");
        server.insert_provider(info);
    }
}

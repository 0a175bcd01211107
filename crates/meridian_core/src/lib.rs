//! Core infrastructure plugins for Meridian.
//!
//! - [`ServerInfoPlugin`] - Server metadata
//! - [`TracingPlugin`] - Logging via the `tracing` crate
//! - [`DefaultPlugins`] - Bundle of both
//!
//! # Example
//!
//! ```no_run
//! use meridian_system::server::Server;
//! use meridian_system::plugin::PluginGroup;
//! use meridian_core::DefaultPlugins;
//!
//! Server::new()
//!     .add_plugins(DefaultPlugins.build())
//!     .run();
//! ```
//!
//! # Architecture
//!
//! This crate is part of Layer 1 infrastructure, next to `meridian_system`.
//! The flow engine (`meridian_flow`) and the tool flows (`meridian_tools`)
//! build on it but do not require it.

mod server_info;
mod tracing_plugin;

pub use server_info::{ServerInfo, ServerInfoPlugin};
pub use tracing_plugin::{TracingConfig, TracingFormat, TracingPlugin, UnknownFormat};

use meridian_system::plugin::{PluginGroup, PluginGroupBuilder};

/// Default plugins for most Meridian servers.
///
/// Includes:
/// - [`ServerInfoPlugin`] - Server metadata
/// - [`TracingPlugin`] - Logging and observability
///
/// # Customization
///
/// ```ignore
/// Server::new()
///     .add_plugins(DefaultPlugins.build().disable::<TracingPlugin>())
///     .run();
/// ```
pub struct DefaultPlugins;

impl PluginGroup for DefaultPlugins {
    fn build(self) -> PluginGroupBuilder {
        PluginGroupBuilder::new()
            .add(ServerInfoPlugin::default())
            .add(TracingPlugin::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_system::server::Server;

    #[test]
    fn default_plugins_builds() {
        let builder = DefaultPlugins.build();
        assert_eq!(builder.len(), 2);
        assert!(builder.contains::<TracingPlugin>());
    }

    #[test]
    fn disabled_tracing_leaves_server_info() {
        let mut server = Server::new();
        server.add_plugins(DefaultPlugins.build().disable::<TracingPlugin>());
        server.finish();

        assert!(server.contains_provider::<ServerInfo>());
        assert!(!server.contains_provider::<TracingConfig>());
    }
}

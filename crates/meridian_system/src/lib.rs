//! The foundational runtime for Meridian (Layer 1).
//!
//! `meridian_system` provides the primitives every Meridian server is built from:
//!
//! - [`api`] - API trait for build-time capability registration
//! - [`plugin`] - Plugin trait for extensible functionality
//! - [`provider`] - Provider container (token → shared instance)
//! - [`resource`] - Type-keyed storage for build-time and per-call state
//! - [`server`] - Server runtime for plugin orchestration
//!
//! # Architecture
//!
//! - **Layer 1** (`meridian_system`): plugins, APIs, providers (this crate)
//! - **Layer 2** (`meridian_flow`): staged flow engine and hook composition
//! - **Layer 3** (`meridian_tools`, plugins): concrete flows and operations
//!
//! # Example
//!
//! ```
//! use meridian_system::plugin::Plugin;
//! use meridian_system::provider::Provider;
//! use meridian_system::server::Server;
//!
//! #[derive(Default)]
//! struct MyConfig { max_calls: usize }
//! impl Provider for MyConfig {}
//!
//! struct MyPlugin;
//!
//! impl Plugin for MyPlugin {
//!     fn build(&self, server: &mut Server) {
//!         server.insert_provider(MyConfig::default());
//!     }
//! }
//!
//! Server::new()
//!     .add_plugins(MyPlugin)
//!     .run();
//! ```

/// API trait for capability registration.
pub mod api;

/// Plugin trait for extensible functionality.
pub mod plugin;

/// Provider container for shared, read-mostly services.
pub mod provider;

/// Type-keyed resource storage.
pub mod resource;

/// Server runtime for plugin orchestration.
pub mod server;

/// Boxed, sendable future used at every async seam of the runtime.
pub type BoxFuture<'a, T> = core::pin::Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::BoxFuture;
    pub use crate::api::*;
    pub use crate::plugin::*;
    pub use crate::provider::*;
    pub use crate::resource::*;
    pub use crate::server::*;
}

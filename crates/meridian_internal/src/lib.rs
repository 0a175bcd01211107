//! # Meridian Internal Library
//!
//! Re-exports the core Meridian crates for convenience.

/// Layer 1: plugin runtime, providers and APIs.
pub use meridian_system;

/// Layer 1: server info and tracing plugins.
pub use meridian_core;

/// Layer 2: staged flow engine.
pub use meridian_flow;

/// Layer 3: tool registry and tool flows.
pub use meridian_tools;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use meridian_core::{DefaultPlugins, ServerInfoPlugin, TracingPlugin};
    pub use meridian_flow::prelude::*;
    pub use meridian_system::prelude::*;
    pub use meridian_tools::prelude::*;
}

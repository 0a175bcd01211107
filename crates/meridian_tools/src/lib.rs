//! Tools for Meridian servers.
//!
//! This crate provides the tool registry and the two flows that expose it:
//! `tools:call-tool` runs one tool through a staged pipeline (parse, lookup,
//! authorization, admission, validation, execution, rendering) and
//! `tools:list-tools` lists what a caller may see.
//!
//! # Quick Start
//!
//! ```ignore
//! use meridian_tools::prelude::*;
//!
//! #[derive(Deserialize, JsonSchema)]
//! struct AddInput { a: i64, b: i64 }
//!
//! #[derive(Serialize, JsonSchema)]
//! struct AddOutput { sum: i64 }
//!
//! impl Plugin for CalculatorPlugin {
//!     fn build(&self, server: &mut Server) {
//!         server
//!             .get_resource_mut::<ToolRegistry>()
//!             .expect("ToolsPlugin must be added first")
//!             .register(FnTool::typed("add", "Adds two numbers.", |i: AddInput, _| async move {
//!                 Ok(AddOutput { sum: i.a + i.b })
//!             }))
//!             .expect("add is a valid tool");
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`Tool`] - trait for executable tools with JSON schemas
//! - [`FnTool`] - closure-backed tools, typed or raw
//! - [`ToolRegistry`] - stores tools with compiled schemas
//! - [`ToolsPlugin`] - manages the registry lifecycle
//! - [`CallToolFlow`] / [`ListToolsFlow`] - the tool flows
//! - [`ToolFlowsPlugin`] - declares the flows
//! - [`AuthConfig`] / [`AuthInfo`] - authorization policy and caller identity
//! - [`Renderer`] - optional UI rendering of results

pub mod auth;
pub mod error;
pub mod flows;
pub mod plugin;
pub mod registry;
pub mod render;
pub mod schema;
pub mod tool;

pub use auth::{AuthConfig, AuthInfo, AuthMode, AuthorizationFallback, SessionInfo};
pub use error::{RenderError, ToolError, ToolRegistrationError};
pub use flows::{CallToolFlow, ListToolsFlow};
pub use plugin::ToolFlowsPlugin;
pub use registry::{ToolEntry, ToolRegistry, ToolsPlugin};
pub use render::{RenderConfig, Renderer, ResultRenderer, TemplateRenderer};
pub use tool::{FnTool, Tool, ToolCallContext, ToolDefinition};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::auth::{AuthConfig, AuthInfo, AuthMode, AuthorizationFallback, SessionInfo};
    pub use crate::error::ToolError;
    pub use crate::flows::{CallToolFlow, CallToolResult, ListToolsFlow};
    pub use crate::plugin::ToolFlowsPlugin;
    pub use crate::registry::{ToolRegistry, ToolsPlugin};
    pub use crate::render::{RenderConfig, Renderer, TemplateRenderer};
    pub use crate::tool::{FnTool, Tool, ToolCallContext, ToolDefinition};
}

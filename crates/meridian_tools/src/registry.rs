//! Tool registry and plugin.
//!
//! The [`ToolRegistry`] stores registered tools with their compiled schemas.
//! The [`ToolsPlugin`] manages the registry lifecycle using the two-phase
//! initialization pattern (mutable resource during `build()`, frozen into a
//! provider in `ready()`).
//!
//! # Usage
//!
//! ```ignore
//! use meridian_tools::{ToolsPlugin, ToolRegistry};
//!
//! // 1. Add ToolsPlugin to the server
//! server.add_plugins(ToolsPlugin);
//!
//! // 2. Register tools in your plugin's build()
//! impl Plugin for WeatherPlugin {
//!     fn dependencies(&self) -> Vec<PluginId> {
//!         vec![PluginId::of::<ToolsPlugin>()]
//!     }
//!
//!     fn build(&self, server: &mut Server) {
//!         let registry = server.get_resource_mut::<ToolRegistry>()
//!             .expect("ToolsPlugin must be added first");
//!         registry.register(weather_tool()).expect("weather tool is valid");
//!     }
//! }
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use meridian_system::plugin::Plugin;
use meridian_system::provider::Provider;
use meridian_system::server::Server;
use serde_json::Value;

use crate::error::ToolRegistrationError;
use crate::schema::SchemaValidator;
use crate::tool::{Tool, ToolDefinition};

/// A registered tool with its compiled schemas.
pub struct ToolEntry {
    definition: ToolDefinition,
    tool: Arc<dyn Tool>,
    input: SchemaValidator,
    output: Option<SchemaValidator>,
}

impl ToolEntry {
    fn compile(tool: Arc<dyn Tool>) -> Result<Self, ToolRegistrationError> {
        let definition = tool.definition();
        let invalid = |which: &'static str| {
            let tool = definition.name.clone();
            move |reason| ToolRegistrationError::InvalidSchema {
                tool,
                which,
                reason,
            }
        };

        let input = SchemaValidator::compile(&definition.input_schema).map_err(invalid("input"))?;
        let output = definition
            .output_schema
            .as_ref()
            .map(SchemaValidator::compile)
            .transpose()
            .map_err(invalid("output"))?;

        Ok(Self {
            definition,
            tool,
            input,
            output,
        })
    }

    /// Returns the definition captured at registration.
    #[must_use]
    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Returns the owning app, if any.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.definition.owner.as_deref()
    }

    /// Returns true for tools hidden from listings.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.definition.hidden
    }

    /// Returns the tool.
    #[must_use]
    pub fn tool(&self) -> &Arc<dyn Tool> {
        &self.tool
    }

    /// Validates call arguments against the input schema.
    ///
    /// # Errors
    ///
    /// Returns the schema violations.
    pub fn validate_input(&self, args: &Value) -> Result<(), String> {
        self.input.validate(args)
    }

    /// Validates a result against the output schema. Tools without an output
    /// schema accept anything.
    ///
    /// # Errors
    ///
    /// Returns the schema violations.
    pub fn validate_output(&self, output: &Value) -> Result<(), String> {
        self.output
            .as_ref()
            .map_or(Ok(()), |validator| validator.validate(output))
    }
}

impl core::fmt::Debug for ToolEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ToolEntry")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

/// Registry of available tools.
///
/// Stores tools by name in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<ToolEntry>>,
}

impl core::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl Provider for ToolRegistry {}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: IndexMap::new(),
        }
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// - [`ToolRegistrationError::DuplicateTool`] if the name is taken
    /// - [`ToolRegistrationError::InvalidSchema`] if a schema does not compile
    pub fn register(&mut self, tool: impl Tool) -> Result<(), ToolRegistrationError> {
        self.register_arc(Arc::new(tool))
    }

    /// Registers a shared tool.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolRegistrationError> {
        let entry = ToolEntry::compile(tool)?;
        let name = entry.definition.name.clone();
        if self.tools.contains_key(&name) {
            return Err(ToolRegistrationError::DuplicateTool(name));
        }
        tracing::debug!(tool = %name, hidden = entry.is_hidden(), "tool registered");
        self.tools.insert(name, Arc::new(entry));
        Ok(())
    }

    /// Resolves a tool by name, hidden tools included.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Arc<ToolEntry>> {
        self.tools.get(name).cloned()
    }

    /// Iterates tools that appear in listings, in registration order.
    pub fn visible(&self) -> impl Iterator<Item = &Arc<ToolEntry>> {
        self.tools.values().filter(|entry| !entry.is_hidden())
    }

    /// Returns the definitions of visible tools.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.visible()
            .map(|entry| entry.definition.clone())
            .collect()
    }

    /// Returns whether a tool with the given name is registered.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Returns the names of all registered tools.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Plugin that provides the [`ToolRegistry`].
///
/// During build the registry is a mutable resource; in `ready()` it is moved
/// into the provider container, where flows resolve it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToolsPlugin;

impl Plugin for ToolsPlugin {
    fn build(&self, server: &mut Server) {
        server.insert_resource(ToolRegistry::new());
    }

    fn ready(&self, server: &mut Server) {
        let registry = server
            .remove_resource::<ToolRegistry>()
            .expect("ToolRegistry should exist from build phase");
        tracing::info!(tools = registry.len(), "tool registry ready");
        server.insert_provider(registry);
    }
}

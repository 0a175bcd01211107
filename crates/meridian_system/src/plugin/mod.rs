//! Plugin system for composing a server.
//!
//! Plugins are how a Meridian server is assembled. Tool registries, flow
//! declarations, auth configuration and logging all arrive through plugins;
//! the [`Server`] itself only orders and drives them.
//!
//! # Example
//!
//! ```
//! use meridian_system::plugin::{Plugin, PluginId};
//! use meridian_system::provider::Provider;
//! use meridian_system::server::Server;
//!
//! # struct LoggingPlugin;
//! # impl Plugin for LoggingPlugin {
//! #     fn build(&self, _server: &mut Server) {}
//! # }
//! struct Limits { max_arguments: usize }
//! impl Provider for Limits {}
//!
//! struct LimitsPlugin { max_arguments: usize }
//!
//! impl Plugin for LimitsPlugin {
//!     fn build(&self, server: &mut Server) {
//!         server.insert_provider(Limits { max_arguments: self.max_arguments });
//!     }
//!
//!     fn dependencies(&self) -> Vec<PluginId> {
//!         vec![PluginId::of::<LoggingPlugin>()]
//!     }
//! }
//!
//! Server::new()
//!     .add_plugins(LoggingPlugin)
//!     .add_plugins(LimitsPlugin { max_arguments: 16 })
//!     .run();
//! ```

use core::any::TypeId;

use crate::server::Server;

// ─────────────────────────────────────────────────────────────────────────────
// PluginId
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for a plugin type.
///
/// Used for dependency resolution and duplicate detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginId {
    type_id: TypeId,
    type_name: &'static str,
}

impl PluginId {
    /// Creates a `PluginId` for the given plugin type.
    #[must_use]
    pub fn of<P: Plugin>() -> Self {
        Self {
            type_id: TypeId::of::<P>(),
            type_name: core::any::type_name::<P>(),
        }
    }

    /// Returns the underlying `TypeId`.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name for debugging.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of server composition.
///
/// The server drives every plugin through three phases:
///
/// 1. **Build** - `build()` in dependency order. Insert providers, APIs and
///    build-time resources; declare flows and hooks through APIs.
/// 2. **Ready** - `ready()` in dependency order, once every plugin is built.
///    Freeze registries into providers, validate wiring.
/// 3. **Cleanup** - `cleanup()` in reverse dependency order on shutdown.
///
/// # Example
///
/// ```ignore
/// impl Plugin for ToolsPlugin {
///     fn build(&self, server: &mut Server) {
///         server.insert_resource(ToolRegistry::new());
///     }
///
///     fn ready(&self, server: &mut Server) {
///         let registry = server
///             .remove_resource::<ToolRegistry>()
///             .expect("ToolRegistry inserted in build");
///         server.insert_provider(registry);
///     }
/// }
/// ```
pub trait Plugin: Send + Sync + 'static {
    /// Configures the server. Called once per plugin, in dependency order.
    fn build(&self, server: &mut Server);

    /// Called after all plugins have been built.
    fn ready(&self, _server: &mut Server) {}

    /// Called when the server shuts down, in reverse dependency order.
    fn cleanup(&self, _server: &mut Server) {}

    /// Returns the plugin's name for debugging and error messages.
    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }

    /// Declares plugins that must be built before this one.
    ///
    /// The server panics during `finish()` if a dependency was never added.
    fn dependencies(&self) -> Vec<PluginId> {
        Vec::new()
    }

    /// Returns true if this plugin can only be added once.
    ///
    /// Defaults to `true`.
    fn is_unique(&self) -> bool {
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugins Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Types accepted by [`Server::add_plugins`]: single plugins and plugin groups.
pub trait Plugins {
    /// Adds these plugins to the server.
    fn add_to_server(self, server: &mut Server);
}

impl<P: Plugin> Plugins for P {
    fn add_to_server(self, server: &mut Server) {
        server.add_plugin_boxed(PluginId::of::<P>(), Box::new(self));
    }
}

impl Plugins for PluginGroupBuilder {
    fn add_to_server(self, server: &mut Server) {
        for boxed in self.plugins {
            server.add_plugin_boxed(boxed.id, boxed.plugin);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PluginGroup
// ─────────────────────────────────────────────────────────────────────────────

/// A bundle of plugins added together.
///
/// ```ignore
/// Server::new()
///     .add_plugins(DefaultPlugins.build().disable::<TracingPlugin>())
///     .run();
/// ```
pub trait PluginGroup {
    /// Returns the plugins in this group.
    fn build(self) -> PluginGroupBuilder;
}

/// A boxed plugin together with the id captured before type erasure.
pub(crate) struct BoxedPlugin {
    pub(crate) id: PluginId,
    pub(crate) plugin: Box<dyn Plugin>,
}

impl BoxedPlugin {
    fn new<P: Plugin>(plugin: P) -> Self {
        Self {
            id: PluginId::of::<P>(),
            plugin: Box::new(plugin),
        }
    }
}

/// Ordered, editable list of plugins.
#[derive(Default)]
pub struct PluginGroupBuilder {
    pub(crate) plugins: Vec<BoxedPlugin>,
}

impl PluginGroupBuilder {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    fn position_of<Target: Plugin>(&self) -> Option<usize> {
        let target = PluginId::of::<Target>();
        self.plugins.iter().position(|p| p.id == target)
    }

    /// Appends a plugin.
    #[must_use]
    #[expect(
        clippy::should_implement_trait,
        reason = "This is a builder method, not std::ops::Add"
    )]
    pub fn add<P: Plugin>(mut self, plugin: P) -> Self {
        self.plugins.push(BoxedPlugin::new(plugin));
        self
    }

    /// Inserts a plugin before `Target`, or at the front if `Target` is absent.
    #[must_use]
    pub fn add_before<P: Plugin, Target: Plugin>(mut self, plugin: P) -> Self {
        let position = self.position_of::<Target>().unwrap_or(0);
        self.plugins.insert(position, BoxedPlugin::new(plugin));
        self
    }

    /// Inserts a plugin after `Target`, or at the end if `Target` is absent.
    #[must_use]
    pub fn add_after<P: Plugin, Target: Plugin>(mut self, plugin: P) -> Self {
        let position = self
            .position_of::<Target>()
            .map_or(self.plugins.len(), |i| i + 1);
        self.plugins.insert(position, BoxedPlugin::new(plugin));
        self
    }

    /// Removes every plugin of type `P`. No-op if absent.
    #[must_use]
    pub fn disable<P: Plugin>(mut self) -> Self {
        let id = PluginId::of::<P>();
        self.plugins.retain(|p| p.id != id);
        self
    }

    /// Returns true if the group contains a plugin of type `P`.
    #[must_use]
    pub fn contains<P: Plugin>(&self) -> bool {
        self.position_of::<P>().is_some()
    }

    /// Returns the number of plugins in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns true if the group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlowsStub;
    impl Plugin for FlowsStub {
        fn build(&self, _server: &mut Server) {}
    }

    struct ToolsStub;
    impl Plugin for ToolsStub {
        fn build(&self, _server: &mut Server) {}
        fn dependencies(&self) -> Vec<PluginId> {
            vec![PluginId::of::<FlowsStub>()]
        }
    }

    struct AuthStub;
    impl Plugin for AuthStub {
        fn build(&self, _server: &mut Server) {}
    }

    fn names(builder: &PluginGroupBuilder) -> Vec<&str> {
        builder
            .plugins
            .iter()
            .map(|p| p.plugin.name().rsplit("::").next().unwrap_or_default())
            .collect()
    }

    #[test]
    fn plugin_id_distinguishes_types() {
        assert_eq!(PluginId::of::<FlowsStub>(), PluginId::of::<FlowsStub>());
        assert_ne!(PluginId::of::<FlowsStub>(), PluginId::of::<ToolsStub>());
        assert_eq!(PluginId::of::<AuthStub>().type_id(), TypeId::of::<AuthStub>());
        assert!(PluginId::of::<AuthStub>().type_name().ends_with("AuthStub"));
    }

    #[test]
    fn plugin_defaults() {
        assert!(FlowsStub.name().contains("FlowsStub"));
        assert!(FlowsStub.is_unique());
        assert!(FlowsStub.dependencies().is_empty());
        assert_eq!(ToolsStub.dependencies(), vec![PluginId::of::<FlowsStub>()]);
    }

    #[test]
    fn group_insertion_positions() {
        let builder = PluginGroupBuilder::new()
            .add(FlowsStub)
            .add(ToolsStub)
            .add_after::<_, FlowsStub>(AuthStub);
        assert_eq!(names(&builder), ["FlowsStub", "AuthStub", "ToolsStub"]);

        let builder = PluginGroupBuilder::new()
            .add(FlowsStub)
            .add(ToolsStub)
            .add_before::<_, FlowsStub>(AuthStub);
        assert_eq!(names(&builder), ["AuthStub", "FlowsStub", "ToolsStub"]);
    }

    #[test]
    fn group_missing_target_falls_back_to_ends() {
        let front = PluginGroupBuilder::new()
            .add(FlowsStub)
            .add_before::<_, ToolsStub>(AuthStub);
        assert_eq!(names(&front), ["AuthStub", "FlowsStub"]);

        let back = PluginGroupBuilder::new()
            .add(FlowsStub)
            .add_after::<_, ToolsStub>(AuthStub);
        assert_eq!(names(&back), ["FlowsStub", "AuthStub"]);
    }

    #[test]
    fn group_disable() {
        let builder = PluginGroupBuilder::new()
            .add(FlowsStub)
            .add(ToolsStub)
            .disable::<FlowsStub>()
            .disable::<AuthStub>();

        assert_eq!(builder.len(), 1);
        assert!(builder.contains::<ToolsStub>());
        assert!(!builder.contains::<FlowsStub>());
    }

    struct Repeatable;
    impl Plugin for Repeatable {
        fn build(&self, _server: &mut Server) {}
        fn is_unique(&self) -> bool {
            false
        }
    }

    #[test]
    fn non_unique_plugin_can_be_added_repeatedly() {
        let mut server = Server::new();
        server.add_plugins(Repeatable);
        server.add_plugins(Repeatable);
        server.finish();
        assert!(server.has_plugin::<Repeatable>());
    }
}

//! Server runtime for plugin orchestration.
//!
//! The [`Server`] orders plugins by their declared dependencies and drives
//! them through build, ready and cleanup. Everything else (flows, tools,
//! auth, logging) arrives as a plugin.
//!
//! # Storage
//!
//! The server holds three kinds of state:
//!
//! - **Providers** - shared services flows resolve at boot
//!   ([`insert_provider`](Server::insert_provider))
//! - **APIs** - build-time registries plugins talk to each other through
//!   ([`insert_api`](Server::insert_api))
//! - **Resources** - mutable build-time state owned by a plugin until it is
//!   frozen or discarded ([`insert_resource`](Server::insert_resource))
//!
//! # Lifecycle
//!
//! 1. **Dependency Resolution** - validate and topologically sort plugins
//! 2. **Build Phase** - `plugin.build()` in dependency order
//! 3. **Ready Phase** - `plugin.ready()` in dependency order
//! 4. **Cleanup Phase** - `plugin.cleanup()` in reverse order

use crate::api::API;
use crate::plugin::{Plugin, PluginId, Plugins};
use crate::provider::{Provider, Providers};
use crate::resource::{Resource, Resources};
use core::any::{Any, TypeId};
use hashbrown::{HashMap, HashSet};
use std::sync::Arc;

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// Type-erased API for dynamic storage.
type BoxedAPI = Box<dyn Any + Send + Sync>;

/// Build progress. Moves linearly `NotStarted` → `Building` → `Built`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum BuildState {
    #[default]
    NotStarted,
    Building,
    Built,
}

/// The runtime that orchestrates plugins.
///
/// # Example
///
/// ```ignore
/// use meridian_system::server::Server;
///
/// let mut server = Server::new();
/// server
///     .add_plugins(DefaultPlugins)
///     .add_plugins(ToolFlowsPlugin)
///     .run();
/// ```
pub struct Server {
    /// Shared services resolved by flows.
    providers: Providers,

    /// Mutable build-time state.
    resources: Resources,

    /// Build-time capability registries.
    apis: HashMap<TypeId, BoxedAPI>,

    /// Plugins waiting for `finish()`.
    pending_plugins: Vec<PluginEntry>,

    /// Plugins that have been built, in dependency order.
    built_plugins: Vec<PluginEntry>,

    /// Every plugin id ever added, for duplicate detection.
    plugin_ids: HashSet<PluginId>,

    build_state: BuildState,
}

struct PluginEntry {
    plugin: Box<dyn Plugin>,
    /// Cached for dependency lookup and error messages.
    name: String,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// Creates a server with no plugins, providers or APIs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: Providers::new(),
            resources: Resources::new(),
            apis: HashMap::new(),
            pending_plugins: Vec::new(),
            built_plugins: Vec::new(),
            plugin_ids: HashSet::new(),
            build_state: BuildState::NotStarted,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Plugin Management
    // ─────────────────────────────────────────────────────────────────────────

    /// Adds a plugin or plugin group.
    ///
    /// Plugins added while the server is building are built immediately.
    ///
    /// # Panics
    ///
    /// Panics if a unique plugin is added twice.
    pub fn add_plugins<P: Plugins>(&mut self, plugins: P) -> &mut Self {
        plugins.add_to_server(self);
        self
    }

    pub(crate) fn add_plugin_boxed(&mut self, id: PluginId, plugin: Box<dyn Plugin>) {
        let name = plugin.name().to_string();

        if plugin.is_unique() && self.plugin_ids.contains(&id) {
            panic!(
                "Plugin '{name}' is unique and was already added.\n\
                 If you intended to add this plugin multiple times, \
                 return `false` from `is_unique()`."
            );
        }
        self.plugin_ids.insert(id);

        let entry = PluginEntry { plugin, name };
        if self.build_state == BuildState::Building {
            entry.plugin.build(self);
            self.built_plugins.push(entry);
        } else {
            self.pending_plugins.push(entry);
        }
    }

    /// Returns true if a plugin of type `P` has been added.
    #[must_use]
    pub fn has_plugin<P: Plugin>(&self) -> bool {
        self.plugin_ids.contains(&PluginId::of::<P>())
    }

    /// Returns true once `finish()` has completed.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.build_state == BuildState::Built
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Providers
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers a shared provider. Returns true if one was replaced.
    pub fn insert_provider<T: Provider>(&mut self, provider: T) -> bool {
        self.providers.insert(provider)
    }

    /// Registers an already shared provider. Returns true if one was replaced.
    pub fn insert_provider_arc<T: Provider>(&mut self, provider: Arc<T>) -> bool {
        self.providers.insert_arc(provider)
    }

    /// Returns the provider of type `T`, if registered.
    #[must_use]
    pub fn get_provider<T: Provider>(&self) -> Option<Arc<T>> {
        self.providers.get::<T>()
    }

    /// Returns true if a provider of type `T` is registered.
    #[must_use]
    pub fn contains_provider<T: Provider>(&self) -> bool {
        self.providers.contains::<T>()
    }

    /// Returns every registered provider.
    #[must_use]
    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resources
    // ─────────────────────────────────────────────────────────────────────────

    /// Inserts a build-time resource, returning the previous value.
    pub fn insert_resource<R: Resource>(&mut self, resource: R) -> Option<R> {
        self.resources.insert(resource)
    }

    /// Returns true if a resource of type `R` exists.
    #[must_use]
    pub fn contains_resource<R: Resource>(&self) -> bool {
        self.resources.contains::<R>()
    }

    /// Returns a shared reference to a resource.
    #[must_use]
    pub fn get_resource<R: Resource>(&self) -> Option<&R> {
        self.resources.get::<R>()
    }

    /// Returns a mutable reference to a resource.
    pub fn get_resource_mut<R: Resource>(&mut self) -> Option<&mut R> {
        self.resources.get_mut::<R>()
    }

    /// Removes a resource and returns it.
    pub fn remove_resource<R: Resource>(&mut self) -> Option<R> {
        self.resources.remove::<R>()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // APIs
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers an API. Returns the previous API of the same type.
    pub fn insert_api<A: API>(&mut self, api: A) -> Option<A> {
        self.apis
            .insert(TypeId::of::<A>(), Box::new(api))
            .and_then(|old| old.downcast::<A>().ok().map(|boxed| *boxed))
    }

    /// Returns the API of type `A`, if registered.
    #[must_use]
    pub fn api<A: API>(&self) -> Option<&A> {
        self.apis
            .get(&TypeId::of::<A>())
            .and_then(|api| api.downcast_ref::<A>())
    }

    /// Returns true if an API of type `A` is registered.
    #[must_use]
    pub fn contains_api<A: API>(&self) -> bool {
        self.apis.contains_key(&TypeId::of::<A>())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Builds and readies every plugin.
    ///
    /// # Panics
    ///
    /// - If a plugin's dependency was never added
    /// - If plugin dependencies form a cycle
    /// - If called more than once
    pub fn finish(&mut self) {
        if self.build_state != BuildState::NotStarted {
            panic!("Server::finish() was already called. Cannot build twice.");
        }

        let sorted = self.sort_plugins_by_dependencies();

        self.build_state = BuildState::Building;
        for entry in sorted {
            entry.plugin.build(self);
            self.built_plugins.push(entry);
        }

        // `ready()` takes `&mut Server`, so the list is moved out while it runs.
        let built = core::mem::take(&mut self.built_plugins);
        for entry in &built {
            entry.plugin.ready(self);
        }
        self.built_plugins = built;

        self.build_state = BuildState::Built;
    }

    /// Runs the build and ready phases.
    ///
    /// # Panics
    ///
    /// Same as [`finish()`](Self::finish).
    pub fn run(&mut self) {
        self.finish();
    }

    /// Cleans up every built plugin in reverse dependency order.
    pub fn cleanup(&mut self) {
        let built = core::mem::take(&mut self.built_plugins);
        for entry in built.iter().rev() {
            entry.plugin.cleanup(self);
        }
        self.built_plugins = built;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal: Dependency Resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Topologically sorts pending plugins (Kahn's algorithm).
    ///
    /// Plugins without ordering constraints keep their insertion order.
    fn sort_plugins_by_dependencies(&mut self) -> Vec<PluginEntry> {
        let pending = core::mem::take(&mut self.pending_plugins);
        let n = pending.len();

        let mut name_to_index: HashMap<&str, usize> = HashMap::new();
        for (i, entry) in pending.iter().enumerate() {
            name_to_index.entry(entry.name.as_str()).or_insert(i);
        }

        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, entry) in pending.iter().enumerate() {
            for dep in entry.plugin.dependencies() {
                let dep_name = dep.type_name();
                if let Some(&dep_idx) = name_to_index.get(dep_name) {
                    dependents[dep_idx].push(i);
                    in_degree[i] += 1;
                } else if !self.built_plugins.iter().any(|p| p.name == dep_name) {
                    panic!(
                        "Plugin '{}' requires '{dep_name}' which was not added.\n\
                         Add {dep_name} before {}, or use a plugin group that includes it.",
                        entry.name, entry.name
                    );
                }
            }
        }

        let mut ready: std::collections::VecDeque<usize> =
            (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order: Vec<usize> = Vec::with_capacity(n);

        while let Some(idx) = ready.pop_front() {
            order.push(idx);
            for &dependent in &dependents[idx] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push_back(dependent);
                }
            }
        }

        if order.len() != n {
            let in_cycle: Vec<&str> = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| pending[i].name.as_str())
                .collect();
            panic!(
                "Circular dependency detected among plugins: {in_cycle:?}\n\
                 Break the cycle by extracting shared functionality into a separate plugin."
            );
        }

        drop(name_to_index);
        let mut slots: Vec<Option<PluginEntry>> = pending.into_iter().map(Some).collect();
        order
            .into_iter()
            .filter_map(|idx| slots[idx].take())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker(u32);
    impl Provider for Marker {}

    struct Registry;
    impl API for Registry {}

    #[test]
    fn providers_are_shared() {
        let mut server = Server::new();
        assert!(!server.insert_provider(Marker(7)));

        let a = server.get_provider::<Marker>().unwrap();
        assert_eq!(a.0, 7);
        assert!(server.contains_provider::<Marker>());
        assert_eq!(server.providers().len(), 1);
    }

    #[test]
    fn resources_are_mutable_until_removed() {
        let mut server = Server::new();
        server.insert_resource(vec![1u8]);
        server.get_resource_mut::<Vec<u8>>().unwrap().push(2);

        assert_eq!(server.get_resource::<Vec<u8>>().unwrap(), &vec![1, 2]);
        assert_eq!(server.remove_resource::<Vec<u8>>(), Some(vec![1, 2]));
        assert!(!server.contains_resource::<Vec<u8>>());
    }

    #[test]
    fn apis_by_type() {
        let mut server = Server::new();
        assert!(server.api::<Registry>().is_none());
        server.insert_api(Registry);
        assert!(server.contains_api::<Registry>());
        assert!(server.api::<Registry>().is_some());
    }

    #[test]
    #[should_panic(expected = "already called")]
    fn finish_twice_panics() {
        let mut server = Server::new();
        server.finish();
        server.finish();
    }
}

//! Flow registry and dispatcher.
//!
//! Boot turns flow declarations into running instances in three steps:
//!
//! 1. [`FlowRegistry::build_map`] normalizes declarations and rejects
//!    duplicate names, malformed plans and stages outside a kind's allow-list.
//! 2. [`FlowMap::build_graph`] resolves every declared provider token.
//! 3. [`FlowRegistry::initialize`] constructs one [`FlowInstance`] per flow,
//!    resolves its [`HookMap`](crate::hooks::map::HookMap) once and awaits
//!    every flow's readiness concurrently.
//!
//! After boot the flow table is immutable. [`FlowRegistry::register_flows`]
//! adds flows later by swapping in a new table; calls already running keep
//! the instance they started with.

use std::sync::Arc;

use futures::future::try_join_all;
use hashbrown::HashMap;
use meridian_system::BoxFuture;
use meridian_system::api::API;
use meridian_system::provider::{ProviderToken, Providers};
use meridian_system::server::Server;
use parking_lot::RwLock;
use serde_json::Value;

use crate::context::StateBag;
use crate::error::{FlowError, RegistrationError};
use crate::flow::{Flow, FlowDefinition, FlowToken};
use crate::hooks::api::FlowHooksAPI;
use crate::hooks::map::HookMapBuilder;
use crate::instance::{FlowInstance, FlowOutcome};
use crate::middleware::MiddlewareChain;

// ─────────────────────────────────────────────────────────────────────────────
// FlowsAPI
// ─────────────────────────────────────────────────────────────────────────────

/// Build-time collection of flow declarations.
///
/// ```ignore
/// impl Plugin for ToolFlowsPlugin {
///     fn build(&self, server: &mut Server) {
///         server
///             .api::<FlowsAPI>()
///             .expect("FlowsPlugin must be added first")
///             .declare::<CallToolFlow>();
///     }
/// }
/// ```
#[derive(Default)]
pub struct FlowsAPI {
    declarations: RwLock<Vec<FlowDefinition>>,
}

impl API for FlowsAPI {}

impl FlowsAPI {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares flow type `F`.
    pub fn declare<F: Flow>(&self) -> &Self {
        self.declare_definition(FlowDefinition::of::<F>())
    }

    /// Declares an already erased flow.
    pub fn declare_definition(&self, definition: FlowDefinition) -> &Self {
        tracing::debug!(flow = definition.name(), "declared flow");
        self.declarations.write().push(definition);
        self
    }

    /// Returns the declarations in declaration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<FlowDefinition> {
        self.declarations.read().clone()
    }

    /// Returns the number of declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.read().len()
    }

    /// Returns true if nothing was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.read().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FlowMap / FlowGraph
// ─────────────────────────────────────────────────────────────────────────────

/// Validated flow declarations.
#[derive(Debug, Default)]
pub struct FlowMap {
    tokens: Vec<FlowToken>,
    definitions: HashMap<&'static str, FlowDefinition>,
}

impl FlowMap {
    /// Returns the flow tokens in declaration order.
    #[must_use]
    pub fn tokens(&self) -> &[FlowToken] {
        &self.tokens
    }

    /// Returns the definition of flow `name`.
    #[must_use]
    pub fn definition(&self, name: &str) -> Option<&FlowDefinition> {
        self.definitions.get(name)
    }

    /// Returns the number of flows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if there are no flows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Resolves every flow's declared dependencies against `providers`.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::MissingDependency`] for the first unresolved token.
    pub fn build_graph(self, providers: &Providers) -> Result<FlowGraph, RegistrationError> {
        let mut edges: HashMap<&'static str, Vec<ProviderToken>> = HashMap::new();
        for token in &self.tokens {
            let Some(definition) = self.definitions.get(token.name()) else {
                continue;
            };
            if let Some(dependency) = providers.first_missing(definition.dependencies()) {
                return Err(RegistrationError::MissingDependency {
                    flow: token.name(),
                    dependency,
                });
            }
            edges.insert(token.name(), definition.dependencies().to_vec());
        }
        Ok(FlowGraph { map: self, edges })
    }
}

/// Flow declarations whose dependencies are known to resolve.
#[derive(Debug)]
pub struct FlowGraph {
    map: FlowMap,
    edges: HashMap<&'static str, Vec<ProviderToken>>,
}

impl FlowGraph {
    /// Returns the providers flow `name` depends on.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> &[ProviderToken] {
        self.edges.get(name).map_or(&[], Vec::as_slice)
    }

    /// Returns the underlying map.
    #[must_use]
    pub fn map(&self) -> &FlowMap {
        &self.map
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FlowRegistry
// ─────────────────────────────────────────────────────────────────────────────

/// Instances visible to callers at one point in time.
#[derive(Default)]
struct FlowTable {
    order: Vec<&'static str>,
    instances: HashMap<&'static str, Arc<FlowInstance>>,
}

impl FlowTable {
    fn extended(&self, added: Vec<Arc<FlowInstance>>) -> Self {
        let mut order = self.order.clone();
        let mut instances = self.instances.clone();
        for instance in added {
            order.push(instance.name());
            instances.insert(instance.name(), instance);
        }
        Self { order, instances }
    }

    fn ordered(&self) -> impl Iterator<Item = &Arc<FlowInstance>> {
        self.order
            .iter()
            .filter_map(|name| self.instances.get(name))
    }
}

/// Boot-initialized table of flow instances.
pub struct FlowRegistry {
    table: RwLock<Arc<FlowTable>>,
}

impl FlowRegistry {
    /// Validates declarations.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::DuplicateFlow`] for a repeated name
    /// - [`RegistrationError::InvalidPlan`] for a malformed plan
    /// - [`RegistrationError::StageNotAllowed`] for a plan stage outside the kind
    pub fn build_map(
        definitions: impl IntoIterator<Item = FlowDefinition>,
    ) -> Result<FlowMap, RegistrationError> {
        let mut map = FlowMap::default();
        for definition in definitions {
            let token = definition.token();
            if map.definitions.contains_key(token.name()) {
                return Err(RegistrationError::DuplicateFlow(token.name()));
            }
            definition
                .plan()
                .validate()
                .map_err(|source| RegistrationError::InvalidPlan {
                    flow: token.name(),
                    source,
                })?;
            if let Some(stage) = token.kind().first_disallowed(definition.plan()) {
                return Err(RegistrationError::stage_not_allowed(token, stage));
            }
            map.tokens.push(token);
            map.definitions.insert(token.name(), definition);
        }
        Ok(map)
    }

    /// Instantiates every flow of `graph` and awaits their readiness.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::StageNotAllowed`] if a flow's own handlers use a
    ///   stage outside its kind
    /// - [`RegistrationError::Initialization`] if a flow fails to construct or
    ///   to become ready
    pub async fn initialize(
        graph: FlowGraph,
        providers: &Providers,
        hooks: &FlowHooksAPI,
    ) -> Result<Self, RegistrationError> {
        let instances = Self::instantiate(graph, providers, hooks).await?;
        let registry = Self {
            table: RwLock::new(Arc::new(FlowTable::default().extended(instances))),
        };
        tracing::info!(flows = registry.len(), "flow registry initialized");
        Ok(registry)
    }

    /// Boots a registry from a finished server: declarations from
    /// [`FlowsAPI`], hooks from [`FlowHooksAPI`], dependencies from the
    /// server's providers.
    ///
    /// # Errors
    ///
    /// Any [`RegistrationError`] raised by the boot steps.
    pub async fn boot(server: &Server) -> Result<Self, RegistrationError> {
        let definitions = server
            .api::<FlowsAPI>()
            .map(FlowsAPI::definitions)
            .unwrap_or_default();
        let default_hooks = FlowHooksAPI::new();
        let hooks = server.api::<FlowHooksAPI>().unwrap_or(&default_hooks);

        let graph = Self::build_map(definitions)?.build_graph(server.providers())?;
        Self::initialize(graph, server.providers(), hooks).await
    }

    /// Adds flows after boot.
    ///
    /// Only the new flows are validated and instantiated. The new table is
    /// swapped in atomically; in-flight calls keep their instances.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::DuplicateFlow`] if a name is already registered,
    /// plus every error of the boot steps.
    pub async fn register_flows(
        &self,
        definitions: impl IntoIterator<Item = FlowDefinition>,
        providers: &Providers,
        hooks: &FlowHooksAPI,
    ) -> Result<(), RegistrationError> {
        let map = Self::build_map(definitions)?;
        self.reject_existing(&map)?;
        let graph = map.build_graph(providers)?;
        let added = Self::instantiate(graph, providers, hooks).await?;

        let mut table = self.table.write();
        // Re-check under the write lock: another registration may have won.
        if let Some(name) = added.iter().map(|i| i.name()).find(|n| table.instances.contains_key(n)) {
            return Err(RegistrationError::DuplicateFlow(name));
        }
        let count = added.len();
        *table = Arc::new(table.extended(added));
        tracing::info!(added = count, total = table.order.len(), "registered additional flows");
        Ok(())
    }

    fn reject_existing(&self, map: &FlowMap) -> Result<(), RegistrationError> {
        let table = self.table.read();
        match map.tokens().iter().find(|t| table.instances.contains_key(t.name())) {
            Some(token) => Err(RegistrationError::DuplicateFlow(token.name())),
            None => Ok(()),
        }
    }

    async fn instantiate(
        graph: FlowGraph,
        providers: &Providers,
        hooks: &FlowHooksAPI,
    ) -> Result<Vec<Arc<FlowInstance>>, RegistrationError> {
        let observers = hooks.observers();
        let FlowGraph { mut map, .. } = graph;

        let mut instances = Vec::with_capacity(map.len());
        let mut readiness: Vec<BoxFuture<'static, Result<(), RegistrationError>>> = Vec::new();

        for token in map.tokens.clone() {
            let Some(definition) = map.definitions.remove(token.name()) else {
                continue;
            };
            let prepared =
                definition
                    .prepare(providers)
                    .map_err(|error| RegistrationError::Initialization {
                        flow: token.name(),
                        reason: error.to_string(),
                    })?;

            let hook_map = HookMapBuilder::new(token)
                .intrinsic(prepared.stages)
                .extrinsic(hooks.hooks_for(token))
                .build()?;

            let ready = prepared.ready;
            readiness.push(Box::pin(async move {
                ready.await.map_err(|error| RegistrationError::Initialization {
                    flow: token.name(),
                    reason: error.to_string(),
                })
            }));

            tracing::debug!(flow = token.name(), hooks = hook_map.len(), "flow instantiated");
            instances.push(Arc::new(FlowInstance::new(
                definition,
                hook_map,
                observers.clone(),
            )));
        }

        try_join_all(readiness).await?;
        Ok(instances)
    }

    /// Returns the instance of flow `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<FlowInstance>> {
        self.table.read().instances.get(name).cloned()
    }

    /// Returns true if flow `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.table.read().instances.contains_key(name)
    }

    /// Returns the registered flow names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.table.read().order.clone()
    }

    /// Returns the number of registered flows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().order.len()
    }

    /// Returns true if no flow is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the route-bound flows as a middleware chain.
    #[must_use]
    pub fn middleware(&self) -> MiddlewareChain {
        let table = Arc::clone(&self.table.read());
        MiddlewareChain::new(
            table
                .ordered()
                .filter(|instance| instance.route().is_some())
                .cloned()
                .collect(),
        )
    }

    /// Runs flow `name` and returns its full outcome.
    ///
    /// # Errors
    ///
    /// [`FlowError::NotRegistered`] for an unknown name, otherwise whatever
    /// the flow raises.
    pub async fn run_outcome(
        &self,
        name: &str,
        input: Value,
        deps: StateBag,
    ) -> Result<FlowOutcome, FlowError> {
        let instance = self
            .get(name)
            .ok_or_else(|| FlowError::NotRegistered(name.to_string()))?;
        instance.run(input, deps).await
    }

    /// Runs flow `name` and returns its output.
    ///
    /// `Next`, `Abort`, `Fail` and `Handled` outcomes have no output for a
    /// direct caller and yield `None`.
    ///
    /// # Errors
    ///
    /// Same as [`run_outcome`](Self::run_outcome).
    pub async fn run_flow(
        &self,
        name: &str,
        input: Value,
        deps: StateBag,
    ) -> Result<Option<Value>, FlowError> {
        let outcome = self.run_outcome(name, input, deps).await?;
        match &outcome {
            FlowOutcome::Aborted(reason) | FlowOutcome::Failed(reason) => tracing::info!(
                flow = name,
                outcome = outcome.label(),
                reason = reason.as_deref().unwrap_or("unspecified"),
                "flow stopped without output"
            ),
            FlowOutcome::Handled | FlowOutcome::NoMatch => {
                tracing::info!(flow = name, outcome = outcome.label(), "flow produced no output");
            }
            FlowOutcome::Responded(_) | FlowOutcome::Completed(_) => {}
        }
        Ok(outcome.into_output())
    }
}

impl core::fmt::Debug for FlowRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FlowRegistry")
            .field("flows", &self.names())
            .finish()
    }
}

impl meridian_system::provider::Provider for FlowRegistry {}

//! Flow declarations.
//!
//! A flow is a type implementing [`Flow`]: a name, a [`FlowKind`], a
//! [`FlowPlan`], the provider tokens it needs, and an explicit table of its
//! own stage handlers. [`FlowDefinition::of`] erases it into a record the
//! registry can store next to flows of other types.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use meridian_flow::prelude::*;
//! use meridian_system::provider::Providers;
//! use serde_json::json;
//!
//! const ECHO_KIND: FlowKind = FlowKind::new("echo", &["read", "reply"]);
//!
//! struct EchoFlow;
//!
//! impl EchoFlow {
//!     fn reply(self: Arc<Self>, ctx: &mut FlowContext) -> HookFuture<'_> {
//!         Box::pin(async move {
//!             let echoed = json!({ "echo": ctx.input().clone() });
//!             ctx.set_output(echoed);
//!             Ok(())
//!         })
//!     }
//! }
//!
//! impl Flow for EchoFlow {
//!     const NAME: &'static str = "echo:reply";
//!     const KIND: FlowKind = ECHO_KIND;
//!
//!     fn plan() -> FlowPlan {
//!         FlowPlan::new().pre(["read"]).finalize(["reply"])
//!     }
//!
//!     fn create(_providers: &Providers) -> Result<Self, FlowError> {
//!         Ok(EchoFlow)
//!     }
//!
//!     fn stages(self: &Arc<Self>) -> StageTable {
//!         StageTable::new().bind("reply", self, Self::reply)
//!     }
//! }
//!
//! let definition = FlowDefinition::of::<EchoFlow>();
//! assert_eq!(definition.token().name(), "echo:reply");
//! ```

use core::fmt;
use std::sync::Arc;

use meridian_system::BoxFuture;
use meridian_system::provider::{ProviderToken, Providers};
use serde_json::Value;

use crate::error::FlowError;
use crate::hooks::binding::StageTable;
use crate::middleware::{MiddlewareRoute, TransportRequest};
use crate::stage::{FlowKind, FlowPlan};

// ─────────────────────────────────────────────────────────────────────────────
// FlowToken
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of a flow: its unique name and its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowToken {
    name: &'static str,
    kind: FlowKind,
}

impl FlowToken {
    /// Creates a token.
    #[must_use]
    pub const fn new(name: &'static str, kind: FlowKind) -> Self {
        Self { name, kind }
    }

    /// Returns the token of flow type `F`.
    #[must_use]
    pub fn of<F: Flow>() -> Self {
        Self::new(F::NAME, F::KIND)
    }

    /// Returns the flow name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the flow kind.
    #[must_use]
    pub const fn kind(&self) -> FlowKind {
        self.kind
    }
}

impl fmt::Display for FlowToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Who may reach a flow through a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowAccess {
    /// Anyone.
    #[default]
    Public,
    /// Requests must carry an `authorization` header.
    Authorized,
}

// ─────────────────────────────────────────────────────────────────────────────
// Flow
// ─────────────────────────────────────────────────────────────────────────────

/// A staged operation pipeline.
///
/// Implementors provide the static description (name, kind, plan, access,
/// schemas, route) as associated items, a constructor resolving providers,
/// and the table of their own stage handlers.
pub trait Flow: Send + Sync + Sized + 'static {
    /// Unique flow name, e.g. `tools:call-tool`.
    const NAME: &'static str;

    /// Flow category and stage allow-list.
    const KIND: FlowKind;

    /// The stage plan.
    fn plan() -> FlowPlan;

    /// Transport access policy.
    fn access() -> FlowAccess {
        FlowAccess::Public
    }

    /// JSON schema of the call input, if published.
    fn input_schema() -> Option<Value> {
        None
    }

    /// JSON schema of the call output, if published.
    fn output_schema() -> Option<Value> {
        None
    }

    /// Route binding for transport middleware.
    fn middleware() -> Option<MiddlewareRoute> {
        None
    }

    /// Flow-level guard evaluated by `can_activate`. Must be pure.
    fn guard(_request: &TransportRequest) -> bool {
        true
    }

    /// Providers that must be registered before the flow can be created.
    fn dependencies() -> Vec<ProviderToken> {
        Vec::new()
    }

    /// Builds the flow from resolved providers.
    ///
    /// # Errors
    ///
    /// Any error aborts boot with an initialization error.
    fn create(providers: &Providers) -> Result<Self, FlowError>;

    /// Returns the flow's own stage handlers.
    fn stages(self: &Arc<Self>) -> StageTable;

    /// Async readiness check run once at boot.
    fn ready(self: &Arc<Self>) -> BoxFuture<'_, Result<(), FlowError>> {
        Box::pin(async { Ok(()) })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FlowDefinition
// ─────────────────────────────────────────────────────────────────────────────

/// A constructed flow, ready to be wired into an instance.
pub(crate) struct PreparedFlow {
    pub(crate) stages: StageTable,
    pub(crate) ready: BoxFuture<'static, Result<(), FlowError>>,
}

type Factory = fn(&Providers) -> Result<PreparedFlow, FlowError>;

fn prepare<F: Flow>(providers: &Providers) -> Result<PreparedFlow, FlowError> {
    let flow = Arc::new(F::create(providers)?);
    let stages = flow.stages();
    let ready = Box::pin(async move { flow.ready().await });
    Ok(PreparedFlow { stages, ready })
}

/// Type-erased, immutable description of a flow.
#[derive(Clone)]
pub struct FlowDefinition {
    token: FlowToken,
    plan: FlowPlan,
    access: FlowAccess,
    input_schema: Option<Value>,
    output_schema: Option<Value>,
    route: Option<MiddlewareRoute>,
    guard: fn(&TransportRequest) -> bool,
    dependencies: Vec<ProviderToken>,
    factory: Factory,
}

impl FlowDefinition {
    /// Describes flow type `F`.
    #[must_use]
    pub fn of<F: Flow>() -> Self {
        Self {
            token: FlowToken::of::<F>(),
            plan: F::plan(),
            access: F::access(),
            input_schema: F::input_schema(),
            output_schema: F::output_schema(),
            route: F::middleware(),
            guard: F::guard,
            dependencies: F::dependencies(),
            factory: prepare::<F>,
        }
    }

    /// Returns the flow token.
    #[must_use]
    pub fn token(&self) -> FlowToken {
        self.token
    }

    /// Returns the flow name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.token.name()
    }

    /// Returns the plan.
    #[must_use]
    pub fn plan(&self) -> &FlowPlan {
        &self.plan
    }

    /// Returns the access policy.
    #[must_use]
    pub fn access(&self) -> FlowAccess {
        self.access
    }

    /// Returns the input schema.
    #[must_use]
    pub fn input_schema(&self) -> Option<&Value> {
        self.input_schema.as_ref()
    }

    /// Returns the output schema.
    #[must_use]
    pub fn output_schema(&self) -> Option<&Value> {
        self.output_schema.as_ref()
    }

    /// Returns the middleware route.
    #[must_use]
    pub fn route(&self) -> Option<&MiddlewareRoute> {
        self.route.as_ref()
    }

    /// Returns the declared provider dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &[ProviderToken] {
        &self.dependencies
    }

    pub(crate) fn guard(&self, request: &TransportRequest) -> bool {
        (self.guard)(request)
    }

    pub(crate) fn prepare(&self, providers: &Providers) -> Result<PreparedFlow, FlowError> {
        (self.factory)(providers)
    }
}

impl fmt::Debug for FlowDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowDefinition")
            .field("token", &self.token)
            .field("plan", &self.plan)
            .field("access", &self.access)
            .field("route", &self.route)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

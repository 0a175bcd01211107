//! Staged, hook-extensible flow engine for Meridian (Layer 2).
//!
//! Every inbound operation runs as a **flow**: a fixed four-phase plan
//! (pre → execute → post → finalize) of named stages. Each stage runs an
//! ordered list of hooks. The flow's own handlers are one source of hooks;
//! plugins attach more (caching, approval gates, rate limits) without
//! touching the flow.
//!
//! # Core Concepts
//!
//! - [`Flow`] - a flow type: name, kind, plan, dependencies, stage handlers
//! - [`FlowPlan`] / [`FlowKind`] - the stage plan and the stage allow-list
//! - [`HookBinding`] / [`HookMapBuilder`] - hook composition
//! - [`FlowContext`] - per-call state
//! - [`Interrupt`] / [`FlowSignal`] - early exits
//! - [`FlowInstance`] - the executor
//! - [`FlowRegistry`] - boot, lookup and dispatch
//! - [`MiddlewareChain`] - transport adapter for route-bound flows
//!
//! # Example
//!
//! ```ignore
//! let mut server = Server::new();
//! server.add_plugins(FlowsPlugin).add_plugins(ToolFlowsPlugin);
//! server.finish();
//!
//! let registry = FlowRegistry::boot(&server).await?;
//! let output = registry
//!     .run_flow("tools:call-tool", input, StateBag::new())
//!     .await?;
//! ```

/// Per-call execution context.
pub mod context;

/// Error types.
pub mod error;

/// Flow trait and definitions.
pub mod flow;

/// Hook bindings, composition and observers.
pub mod hooks;

/// Stage-plan executor.
pub mod instance;

/// Transport middleware adapter.
pub mod middleware;

/// Plugin installing the flow APIs.
pub mod plugin;

/// Flow registry and dispatcher.
pub mod registry;

/// Short-circuit signals.
pub mod signal;

/// Plans, phases and kinds.
pub mod stage;

pub use context::{CallMetadata, CallScope, FlowContext, StateBag};
pub use error::{FlowError, PlanError, RegistrationError};
pub use flow::{Flow, FlowAccess, FlowDefinition, FlowToken};
pub use hooks::{
    FlowEvent, FlowHooksAPI, HookBinding, HookHandler, HookMap, HookMapBuilder, Observers,
    StageTable,
};
pub use instance::{FlowInstance, FlowOutcome};
pub use middleware::{
    MiddlewareChain, MiddlewareRoute, RouteGuard, TransportRequest, TransportResponse,
};
pub use plugin::FlowsPlugin;
pub use registry::{FlowGraph, FlowMap, FlowRegistry, FlowsAPI};
pub use signal::{FlowSignal, HookFuture, HookResult, Interrupt};
pub use stage::{FlowKind, FlowPlan, Phase, ScopedStages, Stage};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::context::{CallScope, FlowContext, StateBag};
    pub use crate::error::{FlowError, RegistrationError};
    pub use crate::flow::{Flow, FlowAccess, FlowDefinition, FlowToken};
    pub use crate::hooks::{FlowEvent, FlowHooksAPI, HookBinding, StageTable};
    pub use crate::instance::{FlowInstance, FlowOutcome};
    pub use crate::middleware::{MiddlewareRoute, TransportRequest, TransportResponse};
    pub use crate::plugin::FlowsPlugin;
    pub use crate::registry::{FlowRegistry, FlowsAPI};
    pub use crate::signal::{FlowSignal, HookFuture, HookResult, Interrupt};
    pub use crate::stage::{FlowKind, FlowPlan, Phase};
}

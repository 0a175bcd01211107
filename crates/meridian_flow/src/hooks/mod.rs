//! Hook composition for flows.
//!
//! Every stage of a flow runs an ordered list of hooks. The list is built
//! from two sources:
//!
//! - **Intrinsic** hooks: the flow's own stage handlers, declared through a
//!   [`StageTable`](binding::StageTable)
//! - **Extrinsic** hooks: behavior other plugins attach through
//!   [`FlowHooksAPI`](api::FlowHooksAPI), optionally scoped to an owner
//!
//! [`HookMapBuilder`](map::HookMapBuilder) merges both into an immutable
//! [`HookMap`](map::HookMap) once per flow at boot. Hooks may also be
//! attached to a single call through
//! [`FlowContext::attach_hook`](crate::context::FlowContext::attach_hook).
//!
//! Ordering within a stage: priority ascending, then intrinsic declaration
//! order, then extrinsic registration order, then per-call attachment order.
//!
//! Lifecycle [`events`] are delivered to observers and cannot influence a call.

pub mod api;
pub mod binding;
pub mod events;
pub mod map;

pub use api::FlowHooksAPI;
pub use binding::{HookBinding, HookHandler, StageTable};
pub use events::{FlowEvent, Observers};
pub use map::{HookMap, HookMapBuilder};

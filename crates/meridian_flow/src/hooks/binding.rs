//! Hook bindings and stage tables.

use core::fmt;
use std::sync::Arc;

use crate::context::FlowContext;
use crate::signal::HookFuture;
use crate::stage::Stage;

/// Type-erased hook handler.
pub type HookHandler = Arc<dyn for<'a> Fn(&'a mut FlowContext) -> HookFuture<'a> + Send + Sync>;

/// A handler bound to one stage, with a priority and an optional owner scope.
///
/// Lower priorities run first; ties keep registration order.
///
/// ```
/// use meridian_flow::hooks::binding::HookBinding;
/// use meridian_flow::signal::Interrupt;
///
/// let cache = HookBinding::new("cache-read", "execute", |ctx| {
///     Box::pin(async move {
///         if ctx.input().get("cached").is_some() {
///             return Err(Interrupt::respond("hit"));
///         }
///         Ok(())
///     })
/// })
/// .with_priority(-10)
/// .with_owner("crm");
///
/// assert_eq!(cache.priority(), -10);
/// assert!(cache.applies_to(Some("crm")));
/// assert!(!cache.applies_to(None));
/// ```
#[derive(Clone)]
pub struct HookBinding {
    name: String,
    stage: Stage,
    priority: i32,
    owner: Option<String>,
    handler: HookHandler,
}

impl HookBinding {
    /// Creates a binding with priority 0 and no owner.
    pub fn new<F>(name: impl Into<String>, stage: Stage, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut FlowContext) -> HookFuture<'a> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            stage,
            priority: 0,
            owner: None,
            handler: Arc::new(handler),
        }
    }

    /// Sets the priority. Lower runs first.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Restricts the hook to calls running under `owner`.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Returns the hook name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stage the hook is bound to.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Returns the priority.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns the owner scope, if any.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Returns true if the hook fires for a call running under `scope`.
    #[must_use]
    pub fn applies_to(&self, scope: Option<&str>) -> bool {
        match &self.owner {
            None => true,
            Some(owner) => scope == Some(owner.as_str()),
        }
    }

    /// Runs the handler.
    pub fn invoke<'a>(&self, ctx: &'a mut FlowContext) -> HookFuture<'a> {
        (self.handler)(ctx)
    }
}

impl fmt::Debug for HookBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookBinding")
            .field("name", &self.name)
            .field("stage", &self.stage)
            .field("priority", &self.priority)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StageTable
// ─────────────────────────────────────────────────────────────────────────────

/// Explicit stage → handler table of a flow's intrinsic hooks.
///
/// Declaration order is preserved and becomes the tie-break order among
/// intrinsic hooks of equal priority.
///
/// ```ignore
/// fn stages(self: &Arc<Self>) -> StageTable {
///     StageTable::new()
///         .bind("parseInput", self, Self::parse_input)
///         .bind("execute", self, Self::execute)
/// }
/// ```
#[derive(Clone, Default)]
pub struct StageTable {
    bindings: Vec<HookBinding>,
}

impl StageTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a free handler for `stage`.
    #[must_use]
    pub fn on<F>(self, stage: Stage, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut FlowContext) -> HookFuture<'a> + Send + Sync + 'static,
    {
        self.with(HookBinding::new(stage, stage, handler))
    }

    /// Adds a handler that receives a shared handle to the flow.
    #[must_use]
    pub fn bind<T, F>(self, stage: Stage, flow: &Arc<T>, handler: F) -> Self
    where
        T: Send + Sync + 'static,
        F: for<'a> Fn(Arc<T>, &'a mut FlowContext) -> HookFuture<'a> + Send + Sync + 'static,
    {
        let flow = Arc::clone(flow);
        self.on(stage, move |ctx| handler(Arc::clone(&flow), ctx))
    }

    /// Adds a fully configured binding.
    #[must_use]
    pub fn with(mut self, binding: HookBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Returns the number of handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns true if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Iterates the bindings in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &HookBinding> {
        self.bindings.iter()
    }

    pub(crate) fn into_bindings(self) -> Vec<HookBinding> {
        self.bindings
    }
}

impl fmt::Debug for StageTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.bindings.iter().map(HookBinding::stage))
            .finish()
    }
}

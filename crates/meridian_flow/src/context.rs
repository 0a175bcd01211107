//! Per-call execution context.
//!
//! Every call gets a fresh [`FlowContext`]. It owns the raw input, a
//! [`StateBag`] seeded with the caller's dependencies, hooks attached for
//! this call only, the checkpoints reached so far and the eventual output.
//! Nothing in it is shared with other calls.

use core::any::{Any, TypeId};
use core::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use serde_json::Value;

use crate::error::{FlowError, RegistrationError};
use crate::flow::FlowToken;
use crate::hooks::binding::HookBinding;
use crate::stage::Stage;

// ─────────────────────────────────────────────────────────────────────────────
// StateBag
// ─────────────────────────────────────────────────────────────────────────────

/// Type-keyed per-call state.
///
/// Callers seed it with dependencies (auth info, session info, the call
/// scope); stages add their intermediate results for later stages.
/// Values are reference counted so a bag can be forked cheaply, and
/// [`get_mut`](Self::get_mut) copies a value on write if a fork still shares it.
///
/// ```
/// use meridian_flow::context::StateBag;
///
/// #[derive(Clone)]
/// struct Attempts(u32);
///
/// let mut deps = StateBag::new();
/// deps.insert(Attempts(0));
///
/// let mut fork = deps.clone();
/// fork.get_mut::<Attempts>().unwrap().0 += 1;
///
/// assert_eq!(deps.get::<Attempts>().unwrap().0, 0);
/// assert_eq!(fork.get::<Attempts>().unwrap().0, 1);
/// ```
#[derive(Clone, Default)]
pub struct StateBag {
    values: HashMap<TypeId, (&'static str, Arc<dyn Any + Send + Sync>)>,
}

impl StateBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        self.values.insert(
            TypeId::of::<T>(),
            (core::any::type_name::<T>(), Arc::new(value)),
        );
        self
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    /// Returns the value of type `T`.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|(_, value)| value.downcast_ref::<T>())
    }

    /// Returns the value of type `T`, or an internal error naming the type.
    ///
    /// # Errors
    ///
    /// [`FlowError::Internal`] if an earlier stage did not store the value.
    pub fn require<T: Send + Sync + 'static>(&self) -> Result<&T, FlowError> {
        self.get::<T>().ok_or_else(|| {
            FlowError::Internal(format!(
                "call state is missing {}",
                core::any::type_name::<T>()
            ))
        })
    }

    /// Returns a mutable reference to the value of type `T`, cloning it first
    /// if it is shared with a fork.
    pub fn get_mut<T: Clone + Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        let (_, slot) = self.values.get_mut(&TypeId::of::<T>())?;
        if Arc::get_mut(slot).is_none() {
            let copy = slot.downcast_ref::<T>()?.clone();
            *slot = Arc::new(copy);
        }
        Arc::get_mut(slot)?.downcast_mut::<T>()
    }

    /// Removes the value of type `T` and returns it.
    pub fn take<T: Clone + Send + Sync + 'static>(&mut self) -> Option<T> {
        let (_, value) = self.values.remove(&TypeId::of::<T>())?;
        let value = value.downcast::<T>().ok()?;
        Some(Arc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// Drops the value of type `T`, returning true if one was stored.
    ///
    /// Unlike [`take`](Self::take) this works for values that cannot be
    /// cloned, such as permits or guards released on drop.
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> bool {
        self.values.remove(&TypeId::of::<T>()).is_some()
    }

    /// Returns true if a value of type `T` is stored.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for StateBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.values.values().map(|(name, _)| name))
            .finish()
    }
}

/// The scope (usually an app id) a call runs under.
///
/// Extrinsic hooks registered with an owner only fire for calls whose scope
/// equals that owner. Put it in the dependencies passed to `run_flow`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallScope(pub String);

// ─────────────────────────────────────────────────────────────────────────────
// FlowContext
// ─────────────────────────────────────────────────────────────────────────────

/// Identity and timing of one call.
#[derive(Debug, Clone)]
pub struct CallMetadata {
    call_id: String,
    token: FlowToken,
    started_at: Instant,
}

impl CallMetadata {
    fn new(token: FlowToken) -> Self {
        Self {
            call_id: nanoid::nanoid!(),
            token,
            started_at: Instant::now(),
        }
    }

    /// Returns the unique call id.
    #[must_use]
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Returns the flow being run.
    #[must_use]
    pub fn token(&self) -> FlowToken {
        self.token
    }

    /// Returns when the call started.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the time elapsed since the call started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Mutable state of a single call.
pub struct FlowContext {
    meta: CallMetadata,
    input: Value,
    scope: Option<String>,
    state: StateBag,
    call_hooks: Vec<HookBinding>,
    checkpoints: Vec<Stage>,
    current_stage: Option<Stage>,
    output: Option<Value>,
}

impl FlowContext {
    /// Creates the context for a new call of `token`.
    #[must_use]
    pub fn new(token: FlowToken, input: Value, deps: StateBag) -> Self {
        let scope = deps.get::<CallScope>().map(|scope| scope.0.clone());
        Self {
            meta: CallMetadata::new(token),
            input,
            scope,
            state: deps,
            call_hooks: Vec::new(),
            checkpoints: Vec::new(),
            current_stage: None,
            output: None,
        }
    }

    /// Returns the call metadata.
    #[must_use]
    pub fn meta(&self) -> &CallMetadata {
        &self.meta
    }

    /// Shorthand for `meta().call_id()`.
    #[must_use]
    pub fn call_id(&self) -> &str {
        self.meta.call_id()
    }

    /// Returns the name of the flow being run.
    #[must_use]
    pub fn flow_name(&self) -> &'static str {
        self.meta.token.name()
    }

    /// Returns the raw call input.
    #[must_use]
    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Returns the scope the call runs under.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Returns the call state.
    #[must_use]
    pub fn state(&self) -> &StateBag {
        &self.state
    }

    /// Returns the call state mutably.
    pub fn state_mut(&mut self) -> &mut StateBag {
        &mut self.state
    }

    /// Returns the stage currently running.
    #[must_use]
    pub fn current_stage(&self) -> Option<Stage> {
        self.current_stage
    }

    pub(crate) fn enter_stage(&mut self, stage: Stage) {
        self.current_stage = Some(stage);
    }

    /// Records that `stage` was reached.
    pub fn checkpoint(&mut self, stage: Stage) {
        self.checkpoints.push(stage);
    }

    /// Returns the checkpoints recorded so far, in order.
    #[must_use]
    pub fn checkpoints(&self) -> &[Stage] {
        &self.checkpoints
    }

    /// Sets the value the call returns on completion.
    pub fn set_output(&mut self, output: Value) {
        self.output = Some(output);
    }

    /// Returns the output set so far.
    #[must_use]
    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub(crate) fn take_output(&mut self) -> Option<Value> {
        self.output.take()
    }

    /// Attaches a hook for the remainder of this call.
    ///
    /// The hook runs after static hooks of the same priority. Hooks attached
    /// while a stage is running take effect from the next stage on.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::StageNotAllowed`] if the flow kind does not allow
    /// the hook's stage.
    pub fn attach_hook(&mut self, hook: HookBinding) -> Result<(), RegistrationError> {
        let token = self.meta.token;
        if !token.kind().allows(hook.stage()) {
            return Err(RegistrationError::stage_not_allowed(token, hook.stage()));
        }
        self.call_hooks.push(hook);
        Ok(())
    }

    pub(crate) fn call_hooks_for(&self, stage: Stage) -> impl Iterator<Item = &HookBinding> {
        self.call_hooks.iter().filter(move |h| h.stage() == stage)
    }
}

impl fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowContext")
            .field("meta", &self.meta)
            .field("scope", &self.scope)
            .field("state", &self.state)
            .field("checkpoints", &self.checkpoints)
            .field("current_stage", &self.current_stage)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::FlowKind;

    const KIND: FlowKind = FlowKind::new("test", &["a", "b"]);
    const TOKEN: FlowToken = FlowToken::new("test:flow", KIND);

    #[derive(Debug, Clone, PartialEq)]
    struct Counter(u32);

    #[test]
    fn scope_comes_from_deps() {
        let deps = StateBag::new().with(CallScope("crm".into()));
        let ctx = FlowContext::new(TOKEN, Value::Null, deps);
        assert_eq!(ctx.scope(), Some("crm"));

        let ctx = FlowContext::new(TOKEN, Value::Null, StateBag::new());
        assert_eq!(ctx.scope(), None);
    }

    #[test]
    fn call_ids_are_unique() {
        let a = FlowContext::new(TOKEN, Value::Null, StateBag::new());
        let b = FlowContext::new(TOKEN, Value::Null, StateBag::new());
        assert_ne!(a.call_id(), b.call_id());
        assert_eq!(a.flow_name(), "test:flow");
    }

    #[test]
    fn forks_copy_on_write() {
        let mut original = StateBag::new().with(Counter(1));
        let mut fork = original.clone();

        fork.get_mut::<Counter>().unwrap().0 = 5;
        original.get_mut::<Counter>().unwrap().0 += 1;

        assert_eq!(original.get::<Counter>(), Some(&Counter(2)));
        assert_eq!(fork.get::<Counter>(), Some(&Counter(5)));
        assert_eq!(fork.take::<Counter>(), Some(Counter(5)));
        assert!(!fork.contains::<Counter>());
    }

    #[test]
    fn remove_drops_values_without_clone() {
        struct Guard {
            _held: Arc<()>,
        }

        let shared = Arc::new(());
        let mut bag = StateBag::new().with(Guard {
            _held: Arc::clone(&shared),
        });
        assert_eq!(Arc::strong_count(&shared), 2);

        assert!(bag.remove::<Guard>());
        assert!(!bag.remove::<Guard>());
        assert_eq!(Arc::strong_count(&shared), 1);
    }

    #[test]
    fn require_names_missing_type() {
        let bag = StateBag::new();
        let err = bag.require::<Counter>().unwrap_err();
        assert!(err.to_string().contains("Counter"));
        assert_eq!(err.public_message(), "internal error");
    }

    #[test]
    fn attach_hook_checks_kind() {
        let mut ctx = FlowContext::new(TOKEN, Value::Null, StateBag::new());
        let allowed = HookBinding::new("h", "a", |_ctx| Box::pin(async { Ok(()) }));
        let rejected = HookBinding::new("h", "zzz", |_ctx| Box::pin(async { Ok(()) }));

        assert!(ctx.attach_hook(allowed).is_ok());
        assert!(matches!(
            ctx.attach_hook(rejected),
            Err(RegistrationError::StageNotAllowed { stage: "zzz", .. })
        ));
        assert_eq!(ctx.call_hooks_for("a").count(), 1);
    }
}

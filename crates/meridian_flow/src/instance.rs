//! The stage-plan executor.
//!
//! A [`FlowInstance`] pairs a flow definition with its immutable
//! [`HookMap`]. [`FlowInstance::run`] walks the plan for one call:
//!
//! 1. Phases run in order: pre → execute → post → finalize.
//! 2. Stages run in plan order; each stage runs its hooks sequentially.
//! 3. A hook returning an [`Interrupt`] stops the walk. Signals become a
//!    [`FlowOutcome`]; errors propagate unchanged.
//! 4. Every scope opened by an acquire stage is closed exactly once. A
//!    release stage reached normally closes its own scope; scopes still
//!    open when the walk stops are released afterwards, newest first.
//!
//! Dropping the future returned by `run` cancels the call without running
//! pending releases.

use core::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::Instrument;

use crate::context::{FlowContext, StateBag};
use crate::error::FlowError;
use crate::flow::{FlowAccess, FlowDefinition, FlowToken};
use crate::hooks::events::{FlowEvent, Observers};
use crate::hooks::map::HookMap;
use crate::middleware::{MiddlewareRoute, TransportRequest};
use crate::signal::{FlowSignal, Interrupt};
use crate::stage::{FlowPlan, Phase, ScopedStages, Stage};

/// How a call ended, when it did not end with an error.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    /// A hook responded early with this value.
    Responded(Value),
    /// Every stage ran; carries the output set on the context, if any.
    Completed(Option<Value>),
    /// A hook signalled that this flow does not handle the call.
    NoMatch,
    /// A hook aborted the call.
    Aborted(Option<String>),
    /// A hook failed the call.
    Failed(Option<String>),
    /// A hook answered the caller out of band.
    Handled,
}

impl FlowOutcome {
    /// Returns the value a direct caller receives.
    #[must_use]
    pub fn into_output(self) -> Option<Value> {
        match self {
            FlowOutcome::Responded(value) => Some(value),
            FlowOutcome::Completed(output) => output,
            FlowOutcome::NoMatch
            | FlowOutcome::Aborted(_)
            | FlowOutcome::Failed(_)
            | FlowOutcome::Handled => None,
        }
    }

    /// Returns a short label for logs and events.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            FlowOutcome::Responded(_) => "respond",
            FlowOutcome::Completed(_) => "completed",
            FlowOutcome::NoMatch => "next",
            FlowOutcome::Aborted(_) => "abort",
            FlowOutcome::Failed(_) => "fail",
            FlowOutcome::Handled => "handled",
        }
    }
}

impl From<FlowSignal> for FlowOutcome {
    fn from(signal: FlowSignal) -> Self {
        match signal {
            FlowSignal::Respond(value) => FlowOutcome::Responded(value),
            FlowSignal::Next => FlowOutcome::NoMatch,
            FlowSignal::Abort(reason) => FlowOutcome::Aborted(reason),
            FlowSignal::Fail(reason) => FlowOutcome::Failed(reason),
            FlowSignal::Handled => FlowOutcome::Handled,
        }
    }
}

/// A booted flow: definition plus resolved hooks.
pub struct FlowInstance {
    definition: FlowDefinition,
    hooks: HookMap,
    observers: Observers,
}

impl FlowInstance {
    pub(crate) fn new(definition: FlowDefinition, hooks: HookMap, observers: Observers) -> Self {
        Self {
            definition,
            hooks,
            observers,
        }
    }

    /// Returns the flow token.
    #[must_use]
    pub fn token(&self) -> FlowToken {
        self.definition.token()
    }

    /// Returns the flow name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.definition.name()
    }

    /// Returns the plan.
    #[must_use]
    pub fn plan(&self) -> &FlowPlan {
        self.definition.plan()
    }

    /// Returns the definition.
    #[must_use]
    pub fn definition(&self) -> &FlowDefinition {
        &self.definition
    }

    /// Returns the resolved hooks.
    #[must_use]
    pub fn hooks(&self) -> &HookMap {
        &self.hooks
    }

    /// Returns the transport access policy.
    #[must_use]
    pub fn access(&self) -> FlowAccess {
        self.definition.access()
    }

    /// Returns the middleware route, if the flow is route-bound.
    #[must_use]
    pub fn route(&self) -> Option<&MiddlewareRoute> {
        self.definition.route()
    }

    /// Returns true if this flow should handle `request`.
    ///
    /// Combines the route filter (when bound) with the flow's own guard.
    #[must_use]
    pub fn can_activate(&self, request: &TransportRequest) -> bool {
        self.route().is_none_or(|route| route.matches(request)) && self.definition.guard(request)
    }

    /// Runs one call.
    ///
    /// # Errors
    ///
    /// Returns the first [`FlowError`] raised by a hook.
    pub async fn run(&self, input: Value, deps: StateBag) -> Result<FlowOutcome, FlowError> {
        let mut ctx = FlowContext::new(self.token(), input, deps);
        let span = tracing::info_span!("flow", flow = self.name(), call_id = %ctx.call_id());
        async move { self.run_in_context(&mut ctx).await }
            .instrument(span)
            .await
    }

    async fn run_in_context(&self, ctx: &mut FlowContext) -> Result<FlowOutcome, FlowError> {
        let call_id: Arc<str> = ctx.call_id().into();
        self.observers.emit(&FlowEvent::FlowStart {
            flow: self.name(),
            call_id: Arc::clone(&call_id),
        });
        tracing::debug!("flow started");

        let mut open_scopes: Vec<ScopedStages> = Vec::new();
        let walked = self.walk(ctx, &call_id, &mut open_scopes).await;

        while let Some(scope) = open_scopes.pop() {
            self.release(ctx, &call_id, scope).await;
        }

        let duration = ctx.meta().elapsed();
        let outcome = walked.map(|signal| match signal {
            Some(signal) => FlowOutcome::from(signal),
            None => FlowOutcome::Completed(ctx.take_output()),
        });

        match &outcome {
            Ok(done) => {
                tracing::debug!(outcome = done.label(), ?duration, "flow finished");
                self.observers.emit(&FlowEvent::FlowComplete {
                    flow: self.name(),
                    call_id,
                    outcome: done.label(),
                    duration,
                });
            }
            Err(error) => {
                tracing::debug!(%error, ?duration, "flow failed");
                self.observers.emit(&FlowEvent::FlowFailed {
                    flow: self.name(),
                    call_id,
                    error: error.to_string(),
                    duration,
                });
            }
        }
        outcome
    }

    /// Walks the plan. `Ok(None)` means every stage ran.
    async fn walk(
        &self,
        ctx: &mut FlowContext,
        call_id: &Arc<str>,
        open_scopes: &mut Vec<ScopedStages>,
    ) -> Result<Option<FlowSignal>, FlowError> {
        let plan = self.plan();
        for (phase, stage) in plan.iter() {
            if let Some(scope) = plan.scope_acquired_by(stage) {
                open_scopes.push(scope);
            }
            if let Some(scope) = plan.scope_released_by(stage) {
                open_scopes.retain(|open| *open != scope);
            }

            match self.run_stage(ctx, call_id, phase, stage).await {
                Ok(()) => {}
                Err(Interrupt::Signal(signal)) => {
                    tracing::debug!(stage, signal = signal.label(), "stage short-circuited");
                    return Ok(Some(signal));
                }
                Err(Interrupt::Error(error)) => {
                    tracing::debug!(stage, %error, "stage raised an error");
                    return Err(error);
                }
            }
        }
        Ok(None)
    }

    /// Runs a release stage for a scope left open by an early exit.
    async fn release(&self, ctx: &mut FlowContext, call_id: &Arc<str>, scope: ScopedStages) {
        let phase = self.plan().phase_of(scope.release).unwrap_or(Phase::Finalize);
        match self.run_stage(ctx, call_id, phase, scope.release).await {
            Ok(()) => {}
            Err(Interrupt::Signal(signal)) => tracing::warn!(
                stage = scope.release,
                signal = signal.label(),
                "signal raised during scope release was ignored"
            ),
            Err(Interrupt::Error(error)) => tracing::warn!(
                stage = scope.release,
                %error,
                "error raised during scope release was ignored"
            ),
        }
    }

    async fn run_stage(
        &self,
        ctx: &mut FlowContext,
        call_id: &Arc<str>,
        phase: Phase,
        stage: Stage,
    ) -> Result<(), Interrupt> {
        ctx.enter_stage(stage);
        self.observers.emit(&FlowEvent::StageStart {
            flow: self.name(),
            call_id: Arc::clone(call_id),
            phase,
            stage,
        });

        let per_call: Vec<_> = ctx.call_hooks_for(stage).cloned().collect();
        let hooks = self.hooks.resolve(stage, ctx.scope(), per_call);
        for hook in hooks {
            tracing::trace!(%phase, stage, hook = hook.name(), "running hook");
            hook.invoke(ctx).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for FlowInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowInstance")
            .field("definition", &self.definition)
            .field("hooks", &self.hooks.len())
            .field("observers", &self.observers)
            .finish()
    }
}

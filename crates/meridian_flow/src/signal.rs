//! Short-circuit signals.
//!
//! A hook ends the stage walk early by returning an [`Interrupt`]: either a
//! [`FlowSignal`] (a deliberate early exit) or a [`FlowError`]. Signals are
//! converted into a [`FlowOutcome`](crate::instance::FlowOutcome) exactly
//! once, by [`FlowInstance::run`](crate::instance::FlowInstance::run).

use meridian_system::BoxFuture;
use serde_json::Value;

use crate::error::FlowError;

/// A deliberate early exit from the stage walk.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowSignal {
    /// Finish the call now with this output.
    Respond(Value),
    /// This flow does not handle the call; let the next candidate try.
    Next,
    /// Stop the call; transports answer with a generic server error.
    Abort(Option<String>),
    /// Stop the call as failed; transports answer with a generic server error.
    Fail(Option<String>),
    /// A hook already answered the caller out of band.
    Handled,
}

impl FlowSignal {
    /// Returns a short label for logs and events.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            FlowSignal::Respond(_) => "respond",
            FlowSignal::Next => "next",
            FlowSignal::Abort(_) => "abort",
            FlowSignal::Fail(_) => "fail",
            FlowSignal::Handled => "handled",
        }
    }
}

/// Why a hook stopped the stage walk.
#[derive(Debug)]
pub enum Interrupt {
    /// Deliberate early exit.
    Signal(FlowSignal),
    /// Failure; propagates out of `run` unchanged.
    Error(FlowError),
}

impl Interrupt {
    /// Ends the call with `output`.
    #[must_use]
    pub fn respond(output: impl Into<Value>) -> Self {
        Self::Signal(FlowSignal::Respond(output.into()))
    }

    /// Passes the call to the next candidate flow.
    #[must_use]
    pub fn next() -> Self {
        Self::Signal(FlowSignal::Next)
    }

    /// Aborts the call.
    #[must_use]
    pub fn abort(reason: impl Into<String>) -> Self {
        Self::Signal(FlowSignal::Abort(Some(reason.into())))
    }

    /// Fails the call.
    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Signal(FlowSignal::Fail(Some(reason.into())))
    }

    /// Marks the call as answered out of band.
    #[must_use]
    pub fn handled() -> Self {
        Self::Signal(FlowSignal::Handled)
    }
}

impl From<FlowError> for Interrupt {
    fn from(error: FlowError) -> Self {
        Self::Error(error)
    }
}

impl From<FlowSignal> for Interrupt {
    fn from(signal: FlowSignal) -> Self {
        Self::Signal(signal)
    }
}

/// Result of a single hook.
pub type HookResult = Result<(), Interrupt>;

/// Future returned by hook handlers.
pub type HookFuture<'a> = BoxFuture<'a, HookResult>;

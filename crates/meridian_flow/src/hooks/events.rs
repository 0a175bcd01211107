//! Lifecycle events delivered to flow observers.
//!
//! Observers see every call without being able to change it.
//!
//! ```ignore
//! hooks.register_observer("latency", |event: &FlowEvent| {
//!     if let FlowEvent::FlowComplete { flow, duration, .. } = event {
//!         tracing::info!(flow, ?duration, "flow finished");
//!     }
//! })?;
//! ```

use core::time::Duration;
use std::sync::Arc;

use crate::stage::{Phase, Stage};

/// Event emitted by a running flow.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// A call started.
    FlowStart {
        /// Flow name.
        flow: &'static str,
        /// Call id.
        call_id: Arc<str>,
    },

    /// A stage is about to run its hooks.
    StageStart {
        /// Flow name.
        flow: &'static str,
        /// Call id.
        call_id: Arc<str>,
        /// Phase of the stage.
        phase: Phase,
        /// Stage name.
        stage: Stage,
    },

    /// A call ended without error.
    FlowComplete {
        /// Flow name.
        flow: &'static str,
        /// Call id.
        call_id: Arc<str>,
        /// Outcome label (`completed`, `respond`, `next`, ...).
        outcome: &'static str,
        /// Total duration.
        duration: Duration,
    },

    /// A call ended with an error.
    FlowFailed {
        /// Flow name.
        flow: &'static str,
        /// Call id.
        call_id: Arc<str>,
        /// Log-level error message.
        error: String,
        /// Total duration.
        duration: Duration,
    },
}

impl FlowEvent {
    /// Returns the flow name.
    #[must_use]
    pub fn flow(&self) -> &'static str {
        match self {
            FlowEvent::FlowStart { flow, .. }
            | FlowEvent::StageStart { flow, .. }
            | FlowEvent::FlowComplete { flow, .. }
            | FlowEvent::FlowFailed { flow, .. } => flow,
        }
    }

    /// Returns the call id.
    #[must_use]
    pub fn call_id(&self) -> &str {
        match self {
            FlowEvent::FlowStart { call_id, .. }
            | FlowEvent::StageStart { call_id, .. }
            | FlowEvent::FlowComplete { call_id, .. }
            | FlowEvent::FlowFailed { call_id, .. } => call_id,
        }
    }
}

/// Observer callback.
pub type Observer = Arc<dyn Fn(&FlowEvent) + Send + Sync>;

/// Snapshot of the observers registered at boot.
#[derive(Clone, Default)]
pub struct Observers(Arc<[Observer]>);

impl Observers {
    pub(crate) fn new(observers: Vec<Observer>) -> Self {
        Self(observers.into())
    }

    /// Delivers `event` to every observer, in registration order.
    pub fn emit(&self, event: &FlowEvent) {
        for observer in self.0.iter() {
            observer(event);
        }
    }

    /// Returns the number of observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no observers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl core::fmt::Debug for Observers {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Observers({})", self.0.len())
    }
}

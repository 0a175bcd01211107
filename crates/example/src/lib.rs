//! Example tool server built with Meridian.
//!
//! Wires the tool flows, registers two tools and plugs admission control and
//! call logging into `tools:call-tool` through extrinsic hooks and observers.
//!
//! ```text
//! parseInput → findTool → checkToolAuthorization → createToolCallContext
//!     → acquireQuota → acquireSemaphore ──┐
//!                                        │  ConcurrencyLimit (this crate)
//!     validateInput → execute → validateOutput
//!                                        │
//!     releaseSemaphore ◀─────────────────┘ → releaseQuota → finalize
//! ```

pub mod tools;

use std::sync::Arc;

use meridian_flow::hooks::{FlowEvent, FlowHooksAPI, HookBinding};
use meridian_flow::plugin::FlowsPlugin;
use meridian_flow::signal::Interrupt;
use meridian_system::plugin::{Plugin, PluginId};
use meridian_system::provider::Provider;
use meridian_system::server::Server;
use meridian_tools::flows::CallToolFlow;
use meridian_tools::flows::call_tool::stages::{ACQUIRE_SEMAPHORE, RELEASE_SEMAPHORE};
use meridian_tools::registry::{ToolRegistry, ToolsPlugin};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps the number of tool calls executing at once.
///
/// A call holds an [`OwnedSemaphorePermit`] in its state between
/// `acquireSemaphore` and `releaseSemaphore`.
#[derive(Debug)]
pub struct ConcurrencyLimit {
    max: usize,
    permits: Arc<Semaphore>,
}

impl Provider for ConcurrencyLimit {}

impl ConcurrencyLimit {
    /// Creates a limit of `max` concurrent calls.
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            max,
            permits: Arc::new(Semaphore::new(max)),
        }
    }

    /// Takes a permit without waiting, or `None` when all are taken.
    #[must_use]
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.permits).try_acquire_owned().ok()
    }

    /// Returns the number of permits in use.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.max - self.permits.available_permits()
    }
}

/// Registers the demo tools, the concurrency limit and call logging.
#[derive(Debug)]
pub struct DemoPlugin {
    limit: Arc<ConcurrencyLimit>,
}

impl DemoPlugin {
    /// Allows `max_concurrent` tool calls at once.
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            limit: Arc::new(ConcurrencyLimit::new(max_concurrent)),
        }
    }

    fn admission_hooks(&self) -> [HookBinding; 2] {
        let acquire = Arc::clone(&self.limit);
        [
            HookBinding::new("concurrency:acquire", ACQUIRE_SEMAPHORE, move |ctx| {
                let admitted = match acquire.try_acquire() {
                    Some(permit) => {
                        ctx.state_mut().insert(permit);
                        true
                    }
                    None => false,
                };
                Box::pin(async move {
                    if admitted {
                        Ok(())
                    } else {
                        Err(Interrupt::fail("too many concurrent tool calls"))
                    }
                })
            }),
            HookBinding::new("concurrency:release", RELEASE_SEMAPHORE, |ctx| {
                ctx.state_mut().remove::<OwnedSemaphorePermit>();
                Box::pin(async { Ok(()) })
            }),
        ]
    }
}

impl Plugin for DemoPlugin {
    fn build(&self, server: &mut Server) {
        server.insert_provider_arc(Arc::clone(&self.limit));

        let registry = server
            .get_resource_mut::<ToolRegistry>()
            .expect("ToolsPlugin must be added first");
        for tool in tools::all() {
            registry.register(tool).expect("demo tools are valid");
        }

        let hooks = server
            .api::<FlowHooksAPI>()
            .expect("FlowsPlugin must be added first");
        for hook in self.admission_hooks() {
            hooks
                .register::<CallToolFlow>(hook)
                .expect("admission hooks bind to call-tool stages");
        }
        hooks
            .register_observer("demo:log", log_event)
            .expect("observer name is unique");
    }

    fn dependencies(&self) -> Vec<PluginId> {
        vec![PluginId::of::<FlowsPlugin>(), PluginId::of::<ToolsPlugin>()]
    }
}

fn log_event(event: &FlowEvent) {
    match event {
        FlowEvent::FlowComplete {
            flow,
            outcome,
            duration,
            ..
        } => tracing::info!(flow, outcome, ?duration, "call finished"),
        FlowEvent::FlowFailed { flow, error, .. } => {
            tracing::warn!(flow, error = error.as_str(), "call failed");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_refuses_past_max_and_recovers() {
        let limit = ConcurrencyLimit::new(1);

        let permit = limit.try_acquire();
        assert!(permit.is_some());
        assert!(limit.try_acquire().is_none());
        assert_eq!(limit.in_flight(), 1);

        drop(permit);
        assert_eq!(limit.in_flight(), 0);
        assert!(limit.try_acquire().is_some());
    }
}

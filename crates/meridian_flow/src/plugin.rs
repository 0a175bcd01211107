//! Plugin installing the flow registration APIs.

use meridian_system::plugin::Plugin;
use meridian_system::server::Server;

use crate::hooks::api::FlowHooksAPI;
use crate::registry::FlowsAPI;

/// Inserts [`FlowsAPI`] and [`FlowHooksAPI`] so other plugins can declare
/// flows and attach hooks during their build phase.
///
/// Plugins that use either API should list `FlowsPlugin` in their
/// dependencies.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlowsPlugin;

impl Plugin for FlowsPlugin {
    fn build(&self, server: &mut Server) {
        server.insert_api(FlowsAPI::new());
        server.insert_api(FlowHooksAPI::new());
    }

    fn ready(&self, server: &mut Server) {
        let flows = server.api::<FlowsAPI>().map_or(0, FlowsAPI::len);
        tracing::debug!(flows, "flow declarations collected");
    }
}

//! Plugin declaring the tool flows.

use meridian_flow::plugin::FlowsPlugin;
use meridian_flow::registry::FlowsAPI;
use meridian_system::plugin::{Plugin, PluginId};
use meridian_system::server::Server;

use crate::auth::AuthConfig;
use crate::flows::{CallToolFlow, ListToolsFlow};
use crate::registry::ToolsPlugin;
use crate::render::Renderer;

/// Declares `tools:call-tool` and `tools:list-tools`.
///
/// Installs the [`AuthConfig`] and, when configured, the [`Renderer`] as
/// providers. Without an explicit config the flows use
/// [`AuthConfig::default`].
///
/// ```ignore
/// server
///     .add_plugins(FlowsPlugin)
///     .add_plugins(ToolsPlugin)
///     .add_plugins(ToolFlowsPlugin::default().with_renderer(Renderer::new(TemplateRenderer)));
/// ```
#[derive(Debug, Default)]
pub struct ToolFlowsPlugin {
    auth: Option<AuthConfig>,
    renderer: Option<Renderer>,
}

impl ToolFlowsPlugin {
    /// Uses `auth` as the server-wide authorization policy.
    #[must_use]
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Renders results of tools that declare a render contract.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = Some(renderer);
        self
    }
}

impl Plugin for ToolFlowsPlugin {
    fn build(&self, server: &mut Server) {
        if let Some(auth) = &self.auth {
            server.insert_provider(auth.clone());
        }
        if let Some(renderer) = &self.renderer {
            server.insert_provider(renderer.clone());
        }

        server
            .api::<FlowsAPI>()
            .expect("FlowsPlugin must be added before ToolFlowsPlugin")
            .declare::<CallToolFlow>()
            .declare::<ListToolsFlow>();
    }

    fn dependencies(&self) -> Vec<PluginId> {
        vec![PluginId::of::<FlowsPlugin>(), PluginId::of::<ToolsPlugin>()]
    }
}

//! Example tool server CLI.
//!
//! Boots a Meridian server with the tool flows and runs one request.
//!
//! # Usage
//!
//! ```bash
//! meridian-demo                                   # list tools
//! meridian-demo <tool> '<json arguments>'         # call a tool
//! meridian-demo <tool> '<json arguments>' notes   # call as a caller who authorized `notes`
//! ```
//!
//! # Environment
//!
//! Read from the process environment and `.env`:
//!
//! - `MERIDIAN_AUTH_MODE`, `MERIDIAN_AUTH_BASE_URL`,
//!   `MERIDIAN_AUTH_SKIPPED_APP_BEHAVIOR` - authorization policy
//! - `MERIDIAN_LOG_FORMAT` - `pretty`, `compact` or `json`
//! - `RUST_LOG` - tracing directives

use example::DemoPlugin;
use meridian_core::{ServerInfo, ServerInfoPlugin, TracingFormat, TracingPlugin};
use meridian_flow::context::StateBag;
use meridian_flow::flow::Flow;
use meridian_flow::plugin::FlowsPlugin;
use meridian_flow::registry::FlowRegistry;
use meridian_system::server::Server;
use meridian_tools::auth::{AuthConfig, AuthInfo};
use meridian_tools::flows::{CallToolFlow, ListToolsFlow};
use meridian_tools::plugin::ToolFlowsPlugin;
use meridian_tools::registry::ToolsPlugin;
use meridian_tools::render::{Renderer, TemplateRenderer};
use serde_json::{Value, json};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let auth = AuthConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
    let format = std::env::var("MERIDIAN_LOG_FORMAT")
        .ok()
        .and_then(|value| value.parse::<TracingFormat>().ok())
        .unwrap_or_default();

    let mut server = Server::new();
    server
        .add_plugins(ServerInfoPlugin::named("meridian-demo"))
        .add_plugins(TracingPlugin::default().with_format(format))
        .add_plugins(FlowsPlugin)
        .add_plugins(ToolsPlugin)
        .add_plugins(
            ToolFlowsPlugin::default()
                .with_auth(auth)
                .with_renderer(Renderer::new(TemplateRenderer)),
        )
        .add_plugins(DemoPlugin::new(4));
    server.finish();

    if let Some(info) = server.get_provider::<ServerInfo>() {
        tracing::info!(name = %info.name, version = info.version, "server ready");
    }

    let registry = match FlowRegistry::boot(&server).await {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (flow, input, deps) = match args.as_slice() {
        [] => (ListToolsFlow::NAME, json!({ "method": "tools/list" }), StateBag::new()),
        [tool, rest @ ..] => {
            let arguments = match rest.first() {
                Some(raw) => serde_json::from_str::<Value>(raw).unwrap_or_else(|e| {
                    eprintln!("Error: arguments are not JSON: {e}");
                    std::process::exit(1);
                }),
                None => json!({}),
            };
            let mut deps = StateBag::new();
            if rest.len() > 1 {
                deps.insert(AuthInfo::new().with_granted(rest[1..].iter().cloned()));
            }
            let input = json!({
                "method": "tools/call",
                "params": { "name": tool, "arguments": arguments }
            });
            (CallToolFlow::NAME, input, deps)
        }
    };

    match registry.run_flow(flow, input, deps).await {
        Ok(Some(output)) => match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Error: {e}"),
        },
        Ok(None) => eprintln!("No output"),
        Err(e) => {
            eprintln!("Error: {}", e.public_message());
            std::process::exit(1);
        }
    }

    server.cleanup();
}

//! The demo server end to end.

use example::{ConcurrencyLimit, DemoPlugin};
use meridian_flow::context::StateBag;
use meridian_flow::error::FlowError;
use meridian_flow::flow::Flow;
use meridian_flow::instance::FlowOutcome;
use meridian_flow::plugin::FlowsPlugin;
use meridian_flow::registry::FlowRegistry;
use meridian_system::server::Server;
use meridian_tools::auth::{AuthConfig, AuthInfo, AuthMode};
use meridian_tools::flows::CallToolFlow;
use meridian_tools::plugin::ToolFlowsPlugin;
use meridian_tools::registry::ToolsPlugin;
use meridian_tools::render::{Renderer, TemplateRenderer};
use serde_json::{Value, json};

async fn demo(mode: AuthMode, max_concurrent: usize) -> (Server, FlowRegistry) {
    let mut server = Server::new();
    server
        .add_plugins(FlowsPlugin)
        .add_plugins(ToolsPlugin)
        .add_plugins(
            ToolFlowsPlugin::default()
                .with_auth(AuthConfig::new(mode))
                .with_renderer(Renderer::new(TemplateRenderer)),
        )
        .add_plugins(DemoPlugin::new(max_concurrent));
    server.finish();
    let registry = FlowRegistry::boot(&server).await.unwrap();
    (server, registry)
}

fn call(tool: &str, arguments: Value) -> Value {
    json!({ "method": "tools/call", "params": { "name": tool, "arguments": arguments } })
}

#[tokio::test]
async fn word_count_runs_and_frees_its_slot() {
    let (server, registry) = demo(AuthMode::Public, 1).await;

    for _ in 0..3 {
        let output = registry
            .run_flow(
                CallToolFlow::NAME,
                call("word_count", json!({ "text": "to be or not" })),
                StateBag::new(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(output["structuredContent"]["words"], 4);
    }

    let limit = server.get_provider::<ConcurrencyLimit>().unwrap();
    assert_eq!(limit.in_flight(), 0);
}

#[tokio::test]
async fn notes_require_authorization_on_orchestrated_servers() {
    let (_server, registry) = demo(AuthMode::Orchestrated, 4).await;
    let input = call("create_note", json!({ "title": "Hello", "body": "World" }));

    let refused = registry
        .run_flow(
            CallToolFlow::NAME,
            input.clone(),
            StateBag::new().with(AuthInfo::new()),
        )
        .await
        .unwrap_err();
    let rendered = registry
        .run_flow(
            CallToolFlow::NAME,
            input,
            StateBag::new().with(AuthInfo::new().with_granted(["notes"])),
        )
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(refused, FlowError::AuthorizationRequired { app_id, .. } if app_id == "notes"));
    assert_eq!(rendered["_meta"]["ui/html"], "<h1>Hello</h1><p>World</p>");
}

#[tokio::test]
async fn tool_errors_release_the_slot() {
    let (server, registry) = demo(AuthMode::Public, 1).await;

    let err = registry
        .run_flow(
            CallToolFlow::NAME,
            call("create_note", json!({ "title": "  " })),
            StateBag::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::OperationExecution { .. }));
    assert_eq!(
        server.get_provider::<ConcurrencyLimit>().unwrap().in_flight(),
        0
    );
}

#[tokio::test]
async fn calls_are_refused_while_every_permit_is_held() {
    let (server, registry) = demo(AuthMode::Public, 1).await;
    let limit = server.get_provider::<ConcurrencyLimit>().unwrap();
    let input = call("word_count", json!({ "text": "one two" }));

    let held = limit.try_acquire().unwrap();
    let refused = registry
        .run_outcome(CallToolFlow::NAME, input.clone(), StateBag::new())
        .await
        .unwrap();
    assert_eq!(
        refused,
        FlowOutcome::Failed(Some("too many concurrent tool calls".into()))
    );
    assert_eq!(limit.in_flight(), 1);

    drop(held);
    let admitted = registry
        .run_flow(CallToolFlow::NAME, input, StateBag::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(admitted["structuredContent"]["words"], 2);
    assert_eq!(limit.in_flight(), 0);
}

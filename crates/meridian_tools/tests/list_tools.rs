//! The `tools:list-tools` flow.

mod test_utils;

use meridian_flow::prelude::*;
use meridian_tools::prelude::*;
use serde_json::{Value, json};
use test_utils::{Journal, boot, list};

async fn listed(registry: &FlowRegistry, deps: StateBag) -> Vec<String> {
    let output = registry
        .run_flow(ListToolsFlow::NAME, list(), deps)
        .await
        .unwrap()
        .unwrap();
    output["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn lists_visible_tools_in_registration_order() {
    let journal = Journal::default();
    let registry = boot(ToolFlowsPlugin::default(), &journal, vec![]).await;

    let names = listed(&registry, StateBag::new()).await;

    assert_eq!(names.first().map(String::as_str), Some("add"));
    assert!(names.contains(&"crm_lead".to_string()));
    assert!(!names.contains(&"secret".to_string()));
    assert!(journal.entries().is_empty());
}

#[tokio::test]
async fn entries_carry_schemas() {
    let journal = Journal::default();
    let registry = boot(ToolFlowsPlugin::default(), &journal, vec![]).await;

    let output = registry
        .run_flow(ListToolsFlow::NAME, list(), StateBag::new())
        .await
        .unwrap()
        .unwrap();
    let tools = output["tools"].as_array().unwrap();
    let find = |name: &str| -> &Value { tools.iter().find(|t| t["name"] == name).unwrap() };

    assert_eq!(find("add")["inputSchema"]["required"], json!(["a", "b"]));
    assert!(find("add").get("outputSchema").is_some());
    assert!(find("echo").get("outputSchema").is_none());
    assert_eq!(find("echo")["description"], "Returns its arguments.");
    assert!(find("crm_lead").get("owner").is_none());
}

#[tokio::test]
async fn ungranted_apps_are_hidden_when_authorization_is_required() {
    let journal = Journal::default();
    let registry = boot(
        ToolFlowsPlugin::default().with_auth(AuthConfig::new(AuthMode::Orchestrated)),
        &journal,
        vec![],
    )
    .await;

    let anonymous = listed(&registry, StateBag::new()).await;
    let ungranted = listed(&registry, StateBag::new().with(AuthInfo::new())).await;
    let granted = listed(
        &registry,
        StateBag::new().with(AuthInfo::new().with_granted(["crm"])),
    )
    .await;

    assert!(anonymous.contains(&"crm_lead".to_string()));
    assert!(!ungranted.contains(&"crm_lead".to_string()));
    assert!(ungranted.contains(&"add".to_string()));
    assert!(granted.contains(&"crm_lead".to_string()));
}

#[tokio::test]
async fn anonymous_fallback_lists_everything() {
    let journal = Journal::default();
    let registry = boot(ToolFlowsPlugin::default(), &journal, vec![]).await;

    let names = listed(&registry, StateBag::new().with(AuthInfo::new())).await;

    assert!(names.contains(&"crm_lead".to_string()));
}

#[tokio::test]
async fn envelope_is_checked() {
    let journal = Journal::default();
    let registry = boot(ToolFlowsPlugin::default(), &journal, vec![]).await;

    let wrong = registry
        .run_flow(ListToolsFlow::NAME, json!({ "method": "tools/call" }), StateBag::new())
        .await
        .unwrap_err();
    let with_cursor = registry
        .run_flow(
            ListToolsFlow::NAME,
            json!({ "method": "tools/list", "params": { "cursor": "abc" } }),
            StateBag::new(),
        )
        .await
        .unwrap();

    let unknown_param = registry
        .run_flow(
            ListToolsFlow::NAME,
            json!({ "method": "tools/list", "params": { "page": 2 } }),
            StateBag::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(wrong, FlowError::InvalidInput(_)));
    assert!(with_cursor.is_some());
    assert!(matches!(unknown_param, FlowError::InvalidInput(m) if m.contains("page")));
}

#[tokio::test]
async fn both_flows_publish_schemas_and_routes() {
    let journal = Journal::default();
    let registry = boot(ToolFlowsPlugin::default(), &journal, vec![]).await;

    assert_eq!(registry.names(), [CallToolFlow::NAME, ListToolsFlow::NAME]);
    for name in registry.names() {
        let instance = registry.get(name).unwrap();
        assert!(instance.definition().input_schema().is_some());
        assert!(instance.definition().output_schema().is_some());
        assert!(instance.route().is_some());
    }

    let response = registry
        .middleware()
        .dispatch(
            TransportRequest::new("POST", "/tools/list").with_body(list()),
            StateBag::new(),
        )
        .await;
    assert!(matches!(response, TransportResponse::Reply { status: 200, .. }));
}

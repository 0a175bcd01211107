//! Registry boot, validation and late registration.


use std::sync::Arc;

use meridian_flow::prelude::*;
use meridian_flow::{FlowRegistry, PlanError};
use meridian_system::BoxFuture;
use meridian_system::plugin::{Plugin, PluginId};
use meridian_system::provider::{ProviderToken, Providers};
use meridian_system::server::Server;
use serde_json::json;
use test_utils::{
    AdmissionFlow, SCENARIO_KIND, ScenarioFlow, Trace, boot, providers_with, recording,
};

// ═══════════════════════════════════════════════════════════════════════════════
// FIXTURE FLOWS
// ═══════════════════════════════════════════════════════════════════════════════

struct ReversedScopeFlow;

impl Flow for ReversedScopeFlow {
    const NAME: &'static str = "test:reversed-scope";
    const KIND: FlowKind = SCENARIO_KIND;

    fn plan() -> FlowPlan {
        FlowPlan::new()
            .pre(["s1"])
            .finalize(["s3"])
            .scoped("s3", "s1")
    }

    fn create(_providers: &Providers) -> Result<Self, FlowError> {
        Ok(Self)
    }

    fn stages(self: &Arc<Self>) -> StageTable {
        StageTable::new()
    }
}

struct ForeignPlanFlow;

impl Flow for ForeignPlanFlow {
    const NAME: &'static str = "test:foreign-plan";
    const KIND: FlowKind = SCENARIO_KIND;

    fn plan() -> FlowPlan {
        FlowPlan::new().pre(["s1"]).execute(["s9"])
    }

    fn create(_providers: &Providers) -> Result<Self, FlowError> {
        Ok(Self)
    }

    fn stages(self: &Arc<Self>) -> StageTable {
        StageTable::new()
    }
}

struct ForeignHandlerFlow;

impl Flow for ForeignHandlerFlow {
    const NAME: &'static str = "test:foreign-handler";
    const KIND: FlowKind = SCENARIO_KIND;

    fn plan() -> FlowPlan {
        FlowPlan::new().pre(["s1"])
    }

    fn create(_providers: &Providers) -> Result<Self, FlowError> {
        Ok(Self)
    }

    fn stages(self: &Arc<Self>) -> StageTable {
        StageTable::new().on("zz", |_ctx| Box::pin(async { Ok(()) }))
    }
}

struct NeverReadyFlow;

impl Flow for NeverReadyFlow {
    const NAME: &'static str = "test:never-ready";
    const KIND: FlowKind = SCENARIO_KIND;

    fn plan() -> FlowPlan {
        FlowPlan::new().pre(["s1"])
    }

    fn create(_providers: &Providers) -> Result<Self, FlowError> {
        Ok(Self)
    }

    fn stages(self: &Arc<Self>) -> StageTable {
        StageTable::new()
    }

    fn ready(self: &Arc<Self>) -> BoxFuture<'_, Result<(), FlowError>> {
        Box::pin(async {
            tokio::task::yield_now().await;
            Err(FlowError::Internal("warm-up failed".into()))
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILD MAP / BUILD GRAPH
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn duplicate_flow_names_are_rejected() {
    let result = FlowRegistry::build_map([
        FlowDefinition::of::<ScenarioFlow>(),
        FlowDefinition::of::<ScenarioFlow>(),
    ]);

    assert!(matches!(
        result,
        Err(RegistrationError::DuplicateFlow("test:scenario"))
    ));
}

#[test]
fn malformed_plans_are_rejected() {
    let result = FlowRegistry::build_map([FlowDefinition::of::<ReversedScopeFlow>()]);

    let Err(RegistrationError::InvalidPlan { flow, source }) = result else {
        panic!("expected InvalidPlan");
    };
    assert_eq!(flow, ReversedScopeFlow::NAME);
    assert_eq!(
        source,
        PlanError::ReleaseBeforeAcquire {
            acquire: "s3",
            release: "s1"
        }
    );
}

#[test]
fn plan_stages_must_belong_to_the_kind() {
    let result = FlowRegistry::build_map([FlowDefinition::of::<ForeignPlanFlow>()]);

    assert_eq!(
        result.unwrap_err(),
        RegistrationError::StageNotAllowed {
            flow: ForeignPlanFlow::NAME,
            kind: "scenario",
            stage: "s9",
        }
    );
}

#[test]
fn missing_provider_fails_the_graph() {
    let map = FlowRegistry::build_map([FlowDefinition::of::<ScenarioFlow>()]).unwrap();
    assert_eq!(map.tokens(), [FlowToken::of::<ScenarioFlow>()]);

    let result = map.build_graph(&Providers::new());

    assert_eq!(
        result.unwrap_err(),
        RegistrationError::MissingDependency {
            flow: ScenarioFlow::NAME,
            dependency: ProviderToken::of::<Trace>(),
        }
    );
}

#[test]
fn graph_records_dependency_edges() {
    let trace = Trace::default();
    let graph = FlowRegistry::build_map([FlowDefinition::of::<AdmissionFlow>()])
        .unwrap()
        .build_graph(&providers_with(&trace))
        .unwrap();

    assert_eq!(
        graph.dependencies_of(AdmissionFlow::NAME),
        [ProviderToken::of::<Trace>()]
    );
    assert!(graph.dependencies_of("test:unknown").is_empty());
    assert_eq!(graph.map().len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOOK REGISTRATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn hook_stage_is_checked_at_registration() {
    let trace = Trace::default();
    let hooks = FlowHooksAPI::new();

    let result = hooks.register::<ScenarioFlow>(recording(&trace, "stray", "s9", 0));

    assert!(matches!(
        result,
        Err(RegistrationError::StageNotAllowed { stage: "s9", .. })
    ));
    assert_eq!(hooks.hook_count(FlowToken::of::<ScenarioFlow>()), 0);
}

#[test]
fn duplicate_hook_names_are_rejected_per_stage() {
    let trace = Trace::default();
    let hooks = FlowHooksAPI::new();
    hooks
        .register::<ScenarioFlow>(recording(&trace, "cache", "s1", 0))
        .unwrap();

    let same_stage = hooks.register::<ScenarioFlow>(recording(&trace, "cache", "s1", 5));
    let other_stage = hooks.register::<ScenarioFlow>(recording(&trace, "cache", "s2", 0));

    assert!(matches!(
        same_stage,
        Err(RegistrationError::DuplicateHook { stage: "s1", .. })
    ));
    assert!(other_stage.is_ok());
    assert!(hooks.contains_hook(FlowToken::of::<ScenarioFlow>(), "cache"));
}

// ═══════════════════════════════════════════════════════════════════════════════
// INITIALIZE
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn intrinsic_stage_outside_kind_fails_at_boot() {
    let graph = FlowRegistry::build_map([FlowDefinition::of::<ForeignHandlerFlow>()])
        .unwrap()
        .build_graph(&Providers::new())
        .unwrap();

    let result = FlowRegistry::initialize(graph, &Providers::new(), &FlowHooksAPI::new()).await;

    assert!(matches!(
        result,
        Err(RegistrationError::StageNotAllowed { stage: "zz", .. })
    ));
}

#[tokio::test]
async fn readiness_failure_is_an_initialization_error() {
    let graph = FlowRegistry::build_map([FlowDefinition::of::<NeverReadyFlow>()])
        .unwrap()
        .build_graph(&Providers::new())
        .unwrap();

    let result = FlowRegistry::initialize(graph, &Providers::new(), &FlowHooksAPI::new()).await;

    let Err(RegistrationError::Initialization { flow, reason }) = result else {
        panic!("expected Initialization");
    };
    assert_eq!(flow, NeverReadyFlow::NAME);
    assert!(reason.contains("warm-up failed"));
}

#[tokio::test]
async fn initialize_keeps_declaration_order() {
    let trace = Trace::default();
    let registry = boot(
        vec![
            FlowDefinition::of::<AdmissionFlow>(),
            FlowDefinition::of::<ScenarioFlow>(),
        ],
        &FlowHooksAPI::new(),
        &trace,
    )
    .await;

    assert_eq!(registry.names(), [AdmissionFlow::NAME, ScenarioFlow::NAME]);
    assert_eq!(registry.len(), 2);
    assert!(registry.middleware().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// LATE REGISTRATION
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn late_flows_layer_over_the_booted_table() {
    let trace = Trace::default();
    let hooks = FlowHooksAPI::new();
    let registry = boot(vec![FlowDefinition::of::<ScenarioFlow>()], &hooks, &trace).await;
    let before = registry.get(ScenarioFlow::NAME).unwrap();

    registry
        .register_flows(
            [FlowDefinition::of::<AdmissionFlow>()],
            &providers_with(&trace),
            &hooks,
        )
        .await
        .unwrap();

    assert_eq!(registry.names(), [ScenarioFlow::NAME, AdmissionFlow::NAME]);
    let after = registry.get(ScenarioFlow::NAME).unwrap();
    assert!(Arc::ptr_eq(&before, &after));

    let output = registry
        .run_flow(AdmissionFlow::NAME, json!({}), StateBag::new())
        .await
        .unwrap();
    assert_eq!(output, Some(json!({ "done": true })));
}

#[tokio::test]
async fn late_registration_rejects_existing_names() {
    let trace = Trace::default();
    let hooks = FlowHooksAPI::new();
    let registry = boot(vec![FlowDefinition::of::<ScenarioFlow>()], &hooks, &trace).await;

    let result = registry
        .register_flows(
            [FlowDefinition::of::<ScenarioFlow>()],
            &providers_with(&trace),
            &hooks,
        )
        .await;

    assert!(matches!(
        result,
        Err(RegistrationError::DuplicateFlow("test:scenario"))
    ));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn late_flows_still_need_their_providers() {
    let trace = Trace::default();
    let hooks = FlowHooksAPI::new();
    let registry = boot(vec![FlowDefinition::of::<ScenarioFlow>()], &hooks, &trace).await;

    let result = registry
        .register_flows(
            [FlowDefinition::of::<AdmissionFlow>()],
            &Providers::new(),
            &hooks,
        )
        .await;

    assert!(matches!(
        result,
        Err(RegistrationError::MissingDependency { .. })
    ));
    assert!(!registry.contains(AdmissionFlow::NAME));
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVER BOOT
// ═══════════════════════════════════════════════════════════════════════════════

struct ScenarioPlugin {
    trace: Trace,
}

impl Plugin for ScenarioPlugin {
    fn build(&self, server: &mut Server) {
        server.insert_provider(self.trace.clone());
        server
            .api::<FlowsAPI>()
            .expect("FlowsPlugin must be added first")
            .declare::<ScenarioFlow>();
        server
            .api::<FlowHooksAPI>()
            .expect("FlowsPlugin must be added first")
            .register::<ScenarioFlow>(recording(&self.trace, "from-plugin", "s1", 0))
            .expect("hook registers");
    }

    fn dependencies(&self) -> Vec<PluginId> {
        vec![PluginId::of::<FlowsPlugin>()]
    }
}

#[tokio::test]
async fn boots_from_a_finished_server() {
    let trace = Trace::default();
    let mut server = Server::new();
    server
        .add_plugins(ScenarioPlugin {
            trace: trace.clone(),
        })
        .add_plugins(FlowsPlugin);
    server.finish();

    let registry = FlowRegistry::boot(&server).await.unwrap();
    registry
        .run_flow(ScenarioFlow::NAME, json!({}), StateBag::new())
        .await
        .unwrap();

    assert_eq!(
        trace.entries(),
        vec!["from-plugin", "s2:intrinsic", "s3:intrinsic"]
    );
}

#[tokio::test]
async fn boot_without_flows_plugin_is_empty() {
    let mut server = Server::new();
    server.finish();

    let registry = FlowRegistry::boot(&server).await.unwrap();

    assert!(registry.is_empty());
}

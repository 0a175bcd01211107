//! Shared test utilities for `meridian_tools` integration tests.
//!
//! Provides a journal, a fixture tool set and a booted server. Import via
//! `mod test_utils;` in test files.

#![allow(
    dead_code,
    missing_docs,
    reason = "shared test utilities — not all items used in every test binary"
)]

use std::sync::Arc;

use meridian_flow::prelude::*;
use meridian_flow::stage::Stage;
use meridian_system::plugin::{Plugin, PluginId};
use meridian_system::server::Server;
use meridian_tools::flows::call_tool::stages::*;
use meridian_tools::prelude::*;
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// ═══════════════════════════════════════════════════════════════════════════════
// JOURNAL
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered log of stages reached and tools executed.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.count(entry) > 0
    }
}

/// Every stage of the call-tool plan, in plan order.
pub const CALL_STAGES: [Stage; 12] = [
    PARSE_INPUT,
    FIND_TOOL,
    CHECK_TOOL_AUTHORIZATION,
    CREATE_TOOL_CALL_CONTEXT,
    ACQUIRE_QUOTA,
    ACQUIRE_SEMAPHORE,
    VALIDATE_INPUT,
    EXECUTE,
    VALIDATE_OUTPUT,
    RELEASE_SEMAPHORE,
    RELEASE_QUOTA,
    FINALIZE,
];

/// Extrinsic hooks recording each call-tool stage once its intrinsic
/// handler succeeded.
pub fn stage_probes(journal: &Journal) -> Vec<HookBinding> {
    CALL_STAGES
        .into_iter()
        .map(|stage| {
            let journal = journal.clone();
            HookBinding::new(format!("probe:{stage}"), stage, move |_ctx| {
                journal.push(stage);
                Box::pin(async { Ok(()) })
            })
            .with_priority(100)
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOOLS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize, JsonSchema)]
pub struct AddInput {
    pub a: i64,
    pub b: i64,
}

#[derive(Serialize, JsonSchema)]
pub struct AddOutput {
    pub sum: i64,
}

fn add(journal: &Journal) -> FnTool {
    let journal = journal.clone();
    FnTool::typed("add", "Adds two numbers.", move |input: AddInput, _ctx| {
        journal.push("run:add");
        async move {
            Ok(AddOutput {
                sum: input.a + input.b,
            })
        }
    })
}

fn raw(journal: &Journal, definition: ToolDefinition, output: Value) -> FnTool {
    let journal = journal.clone();
    let entry = format!("run:{}", definition.name);
    FnTool::new(definition, move |_args, _ctx| {
        journal.push(entry.clone());
        let output = output.clone();
        Box::pin(async move { Ok(output) })
    })
}

/// The fixture tool set.
///
/// | Tool           | Behavior |
/// |----------------|----------|
/// | `add`          | typed, returns `{"sum": a + b}` |
/// | `echo`         | returns its arguments and call context |
/// | `broken`       | output violates its declared schema |
/// | `primes`       | returns an array checked by its output schema |
/// | `count`        | returns an integer checked by its output schema |
/// | `explode`      | fails with an internal detail |
/// | `crm_lead`     | owned by app `crm` |
/// | `secret`       | hidden |
/// | `weather`      | renders `<b>{{city}}</b>` |
/// | `bad_render`   | template names a missing field |
/// | `audited`      | carries a class hook on `execute` |
/// | `misconfigured`| carries a hook on a stage outside the kind |
pub fn fixture_tools(journal: &Journal) -> Vec<FnTool> {
    let echo_journal = journal.clone();
    let audit_journal = journal.clone();

    vec![
        add(journal),
        FnTool::new(
            ToolDefinition::new("echo", "Returns its arguments."),
            move |args, ctx| {
                echo_journal.push("run:echo");
                Box::pin(async move {
                    Ok(json!({
                        "args": args,
                        "callId": ctx.call_id,
                        "meta": ctx.meta,
                    }))
                })
            },
        ),
        raw(
            journal,
            ToolDefinition::new("broken", "Returns the wrong shape.").with_output_schema(json!({
                "type": "object",
                "properties": { "total": { "type": "integer" } },
                "required": ["total"]
            })),
            json!({ "sum": 1 }),
        ),
        raw(
            journal,
            ToolDefinition::new("primes", "First primes.").with_output_schema(json!({
                "type": "array",
                "items": { "type": "integer" }
            })),
            json!([2, 3, 5]),
        ),
        raw(
            journal,
            ToolDefinition::new("count", "A single number.")
                .with_output_schema(json!({ "type": "integer" })),
            json!(42),
        ),
        FnTool::new(ToolDefinition::new("explode", "Always fails."), |_args, _ctx| {
            Box::pin(async { Err(ToolError::execution_error("db down at 10.0.0.7")) })
        }),
        raw(
            journal,
            ToolDefinition::new("crm_lead", "Creates a lead.").owned_by("crm"),
            json!({ "lead": 7 }),
        ),
        raw(
            journal,
            ToolDefinition::new("secret", "Not listed.").hidden(),
            json!("classified"),
        ),
        raw(
            journal,
            ToolDefinition::new("weather", "Current weather.")
                .with_render(RenderConfig::html("<b>{{city}}</b>")),
            json!({ "city": "Oslo", "temp": 4 }),
        ),
        raw(
            journal,
            ToolDefinition::new("bad_render", "Renders a missing field.")
                .with_render(RenderConfig::html("{{wind}}")),
            json!({ "city": "Oslo" }),
        ),
        raw(
            journal,
            ToolDefinition::new("audited", "Runs behind a class hook."),
            json!({ "ok": true }),
        )
        .with_hook(
            HookBinding::new("audit", EXECUTE, move |_ctx| {
                audit_journal.push("audit");
                Box::pin(async { Ok(()) })
            })
            .with_priority(-1),
        ),
        raw(
            journal,
            ToolDefinition::new("misconfigured", "Hooks a stage it cannot use."),
            json!({}),
        )
        .with_hook(HookBinding::new("stray", "render", |_ctx| {
            Box::pin(async { Ok(()) })
        })),
    ]
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVER
// ═══════════════════════════════════════════════════════════════════════════════

/// Registers the fixture tools and extra call-tool hooks.
struct FixturePlugin {
    journal: Journal,
    hooks: Vec<HookBinding>,
}

impl Plugin for FixturePlugin {
    fn build(&self, server: &mut Server) {
        let registry = server
            .get_resource_mut::<ToolRegistry>()
            .expect("ToolsPlugin must be added first");
        for tool in fixture_tools(&self.journal) {
            registry.register(tool).expect("fixture tool is valid");
        }

        let hooks = server
            .api::<FlowHooksAPI>()
            .expect("FlowsPlugin must be added first");
        for hook in &self.hooks {
            hooks
                .register::<CallToolFlow>(hook.clone())
                .expect("fixture hook registers");
        }
    }

    fn dependencies(&self) -> Vec<PluginId> {
        vec![PluginId::of::<ToolsPlugin>(), PluginId::of::<FlowsPlugin>()]
    }
}

/// Builds a server with the fixture tools and boots its flows.
pub async fn boot(
    flows: ToolFlowsPlugin,
    journal: &Journal,
    hooks: Vec<HookBinding>,
) -> FlowRegistry {
    let mut server = Server::new();
    server
        .add_plugins(FlowsPlugin)
        .add_plugins(ToolsPlugin)
        .add_plugins(flows)
        .add_plugins(FixturePlugin {
            journal: journal.clone(),
            hooks,
        });
    server.finish();

    FlowRegistry::boot(&server).await.expect("flows boot")
}

/// Boots with default policy and stage probes on every stage.
pub async fn boot_probed(journal: &Journal) -> FlowRegistry {
    boot(ToolFlowsPlugin::default(), journal, stage_probes(journal)).await
}

pub fn call(name: &str, arguments: Value) -> Value {
    json!({
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
}

pub fn list() -> Value {
    json!({ "method": "tools/list" })
}

pub async fn call_tool(
    registry: &FlowRegistry,
    input: Value,
    deps: StateBag,
) -> Result<Value, FlowError> {
    let output = registry
        .run_flow(CallToolFlow::NAME, input, deps)
        .await?;
    Ok(output.expect("call-tool always produces output"))
}

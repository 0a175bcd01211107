//! The `tools:call-tool` flow.
//!
//! | Phase    | Stages |
//! |----------|--------|
//! | pre      | `parseInput`, `findTool`, `checkToolAuthorization`, `createToolCallContext`, `acquireQuota`, `acquireSemaphore` |
//! | execute  | `validateInput`, `execute`, `validateOutput` |
//! | post     | |
//! | finalize | `releaseSemaphore`, `releaseQuota`, `finalize` |
//!
//! `acquireQuota`/`releaseQuota` and `acquireSemaphore`/`releaseSemaphore`
//! are scoped pairs: once an acquire stage is entered, its release stage
//! runs exactly once however the call ends. The flow itself only records
//! checkpoints there; admission control is plugged in with extrinsic hooks.

use std::sync::Arc;

use meridian_flow::prelude::*;
use meridian_flow::stage::Stage;
use meridian_system::provider::{ProviderToken, Providers};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::auth::{AnonymousToolAccess, AuthConfig, AuthInfo, AuthorizationFallback, SessionInfo};
use crate::registry::{ToolEntry, ToolRegistry};
use crate::render::{PlatformHint, RenderMetadata, RenderRequest, Renderer};
use crate::schema::schema_for;
use crate::tool::ToolCallContext;

/// Envelope method accepted by the flow.
pub const CALL_TOOL_METHOD: &str = "tools/call";

/// Stage names of the call-tool kind.
pub mod stages {
    #![allow(missing_docs, reason = "stage names are self-describing")]

    use meridian_flow::stage::Stage;

    pub const PARSE_INPUT: Stage = "parseInput";
    pub const FIND_TOOL: Stage = "findTool";
    pub const CHECK_TOOL_AUTHORIZATION: Stage = "checkToolAuthorization";
    pub const CREATE_TOOL_CALL_CONTEXT: Stage = "createToolCallContext";
    pub const ACQUIRE_QUOTA: Stage = "acquireQuota";
    pub const ACQUIRE_SEMAPHORE: Stage = "acquireSemaphore";
    pub const VALIDATE_INPUT: Stage = "validateInput";
    pub const EXECUTE: Stage = "execute";
    pub const VALIDATE_OUTPUT: Stage = "validateOutput";
    pub const RELEASE_SEMAPHORE: Stage = "releaseSemaphore";
    pub const RELEASE_QUOTA: Stage = "releaseQuota";
    pub const FINALIZE: Stage = "finalize";
}

use stages::*;

/// Kind shared by tool-call flows.
pub const CALL_TOOL_KIND: FlowKind = FlowKind::new(
    "tools:call",
    &[
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
    ],
);

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

/// The call envelope.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CallToolRequest {
    /// Must be `tools/call`.
    pub method: String,
    /// Call parameters.
    pub params: CallToolParams,
}

/// Parameters of a tool call. Stored in call state after `parseInput`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CallToolParams {
    /// Tool name.
    pub name: String,
    /// Tool arguments. Missing arguments are `{}`.
    #[serde(default)]
    pub arguments: Option<Value>,
    /// Caller metadata passed through to the tool.
    #[serde(rename = "_meta", default)]
    pub meta: Option<Value>,
}

/// One content block of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
}

/// The flow output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Human-readable content.
    pub content: Vec<ContentBlock>,
    /// Machine-readable result: the validated value for tools with an output
    /// schema, otherwise object outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    /// Result metadata, including rendering output.
    #[serde(rename = "_meta", default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
    /// True when the tool reported a domain error.
    pub is_error: bool,
}

impl CallToolResult {
    /// Wraps the output of a tool without an output schema. Objects are also
    /// exposed as structured content.
    #[must_use]
    pub fn from_output(output: Value) -> Self {
        let structured = output.is_object();
        Self::wrap(output, structured)
    }

    /// Wraps an output that passed the tool's output schema. It is exposed
    /// unchanged as structured content whatever its JSON type.
    #[must_use]
    pub fn from_validated(output: Value) -> Self {
        Self::wrap(output, true)
    }

    fn wrap(output: Value, structured: bool) -> Self {
        let text = match &output {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        Self {
            content: vec![ContentBlock::Text { text }],
            structured_content: structured.then_some(output),
            meta: Map::new(),
            is_error: false,
        }
    }

    /// Merges rendering metadata. Structured results drop their text content
    /// once rendered.
    pub fn apply_render(&mut self, rendered: RenderMetadata) {
        self.meta.extend(rendered.meta);
        if self.structured_content.is_some() {
            self.content.clear();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Call state
// ─────────────────────────────────────────────────────────────────────────────

/// Arguments that passed input validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInput(pub Value);

/// What `execute` returned, before `validateOutput`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput(pub Value);

/// The tool result as handed to `finalize`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawToolOutput(pub Value);

// ─────────────────────────────────────────────────────────────────────────────
// Flow
// ─────────────────────────────────────────────────────────────────────────────

/// Invokes a registered tool.
pub struct CallToolFlow {
    tools: Arc<ToolRegistry>,
    auth: Arc<AuthConfig>,
    renderer: Option<Arc<Renderer>>,
}

fn entry(ctx: &FlowContext) -> Result<Arc<ToolEntry>, FlowError> {
    ctx.state().require::<Arc<ToolEntry>>().map(Arc::clone)
}

impl CallToolFlow {
    fn checkpoint(self: Arc<Self>, ctx: &mut FlowContext) -> HookFuture<'_> {
        if let Some(stage) = ctx.current_stage() {
            ctx.checkpoint(stage);
        }
        Box::pin(async { Ok(()) })
    }

    fn parse_input(self: Arc<Self>, ctx: &mut FlowContext) -> HookFuture<'_> {
        Box::pin(async move {
            let request: CallToolRequest = serde_json::from_value(ctx.input().clone())
                .map_err(|e| FlowError::InvalidInput(e.to_string()))?;
            if request.method != CALL_TOOL_METHOD {
                return Err(FlowError::InvalidInput(format!(
                    "expected method '{CALL_TOOL_METHOD}', got '{}'",
                    request.method
                ))
                .into());
            }
            ctx.state_mut().insert(request.params);
            Ok(())
        })
    }

    fn find_tool(self: Arc<Self>, ctx: &mut FlowContext) -> HookFuture<'_> {
        Box::pin(async move {
            let name = ctx.state().require::<CallToolParams>()?.name.clone();
            let Some(entry) = self.tools.find(&name) else {
                return Err(FlowError::NotFound { kind: "tool", name }.into());
            };
            ctx.state_mut().insert(entry);
            Ok(())
        })
    }

    /// Decides whether the caller may run the resolved tool.
    fn authorize(&self, state: &StateBag) -> Result<Option<AnonymousToolAccess>, FlowError> {
        let Some(auth) = state.get::<AuthInfo>() else {
            return Ok(None);
        };
        let entry = state.require::<Arc<ToolEntry>>()?;
        let Some(app_id) = entry.owner() else {
            return Ok(None);
        };
        if auth.is_granted(app_id) {
            return Ok(None);
        }

        match self.auth.fallback_policy() {
            AuthorizationFallback::Anonymous => Ok(Some(AnonymousToolAccess {
                app_id: app_id.to_string(),
                tool: entry.name().to_string(),
            })),
            AuthorizationFallback::MustAuthorize => Err(FlowError::AuthorizationRequired {
                operation: entry.name().to_string(),
                app_id: app_id.to_string(),
                auth_url: self.auth.authorize_url(app_id, entry.name()),
            }),
        }
    }

    fn check_authorization(self: Arc<Self>, ctx: &mut FlowContext) -> HookFuture<'_> {
        Box::pin(async move {
            if let Some(access) = self.authorize(ctx.state())? {
                tracing::info!(
                    tool = %access.tool,
                    app = %access.app_id,
                    "running tool anonymously for an unauthorized app"
                );
                ctx.state_mut().insert(access);
            }
            Ok(())
        })
    }

    fn create_context(self: Arc<Self>, ctx: &mut FlowContext) -> HookFuture<'_> {
        Box::pin(async move {
            let entry = entry(ctx)?;
            let call = ToolCallContext {
                call_id: ctx.call_id().to_string(),
                tool: entry.name().to_string(),
                owner: entry.owner().map(str::to_string),
                meta: ctx.state().require::<CallToolParams>()?.meta.clone(),
            };
            for hook in entry.tool().hooks() {
                ctx.attach_hook(hook)
                    .map_err(|e| FlowError::ExecutionSetupFailed(e.to_string()))?;
            }
            ctx.state_mut().insert(call);
            ctx.checkpoint(CREATE_TOOL_CALL_CONTEXT);
            Ok(())
        })
    }

    fn validate_input(self: Arc<Self>, ctx: &mut FlowContext) -> HookFuture<'_> {
        Box::pin(async move {
            let entry = entry(ctx)?;
            let args = ctx
                .state()
                .require::<CallToolParams>()?
                .arguments
                .clone()
                .unwrap_or_else(|| json!({}));
            entry.validate_input(&args).map_err(|violations| {
                FlowError::InvalidInput(format!(
                    "invalid arguments for '{}': {violations}",
                    entry.name()
                ))
            })?;
            ctx.state_mut().insert(ValidatedInput(args));
            Ok(())
        })
    }

    fn execute(self: Arc<Self>, ctx: &mut FlowContext) -> HookFuture<'_> {
        Box::pin(async move {
            let entry = entry(ctx)?;
            let args = ctx.state().require::<ValidatedInput>()?.0.clone();
            let call = ctx.state().require::<ToolCallContext>()?.clone();

            let output = entry.tool().execute(args, call).await.map_err(|error| {
                tracing::debug!(tool = entry.name(), %error, "tool execution failed");
                FlowError::OperationExecution {
                    operation: entry.name().to_string(),
                    reason: error.to_string(),
                }
            })?;
            ctx.state_mut().insert(ExecutionOutput(output));
            Ok(())
        })
    }

    fn validate_output(self: Arc<Self>, ctx: &mut FlowContext) -> HookFuture<'_> {
        Box::pin(async move {
            let Some(ExecutionOutput(output)) = ctx.state_mut().take::<ExecutionOutput>() else {
                return Err(FlowError::Internal("tool produced no output".into()).into());
            };
            ctx.state_mut().insert(RawToolOutput(output));
            Ok(())
        })
    }

    fn finalize(self: Arc<Self>, ctx: &mut FlowContext) -> HookFuture<'_> {
        Box::pin(async move {
            let entry = entry(ctx)?;
            let raw = ctx.state().require::<RawToolOutput>()?.0.clone();

            if let Err(violations) = entry.validate_output(&raw) {
                tracing::warn!(tool = entry.name(), %violations, "tool output violates its schema");
                return Err(FlowError::InvalidOutput {
                    operation: entry.name().to_string(),
                }
                .into());
            }

            let mut result = if entry.definition().output_schema.is_some() {
                CallToolResult::from_validated(raw.clone())
            } else {
                CallToolResult::from_output(raw.clone())
            };
            if let Some(config) = entry.definition().render.clone()
                && let Some(renderer) = &self.renderer
            {
                let request = RenderRequest {
                    tool: entry.name().to_string(),
                    input: ctx
                        .state()
                        .get::<ValidatedInput>()
                        .map(|input| input.0.clone())
                        .unwrap_or_default(),
                    output: raw,
                    config,
                    platform: PlatformHint::detect(
                        ctx.state()
                            .get::<AuthInfo>()
                            .and_then(AuthInfo::session)
                            .or_else(|| ctx.state().get::<SessionInfo>()),
                    ),
                };
                match renderer.render(request).await {
                    Ok(rendered) => result.apply_render(rendered),
                    Err(error) => tracing::warn!(
                        tool = entry.name(),
                        %error,
                        "rendering failed; returning the plain result"
                    ),
                }
            }

            let output =
                serde_json::to_value(result).map_err(|e| FlowError::Internal(e.to_string()))?;
            ctx.set_output(output);
            Ok(())
        })
    }
}

impl Flow for CallToolFlow {
    const NAME: &'static str = "tools:call-tool";
    const KIND: FlowKind = CALL_TOOL_KIND;

    fn plan() -> FlowPlan {
        FlowPlan::new()
            .pre([
                PARSE_INPUT,
                FIND_TOOL,
                CHECK_TOOL_AUTHORIZATION,
                CREATE_TOOL_CALL_CONTEXT,
                ACQUIRE_QUOTA,
                ACQUIRE_SEMAPHORE,
            ])
            .execute([VALIDATE_INPUT, EXECUTE, VALIDATE_OUTPUT])
            .finalize([RELEASE_SEMAPHORE, RELEASE_QUOTA, FINALIZE])
            .scoped(ACQUIRE_QUOTA, RELEASE_QUOTA)
            .scoped(ACQUIRE_SEMAPHORE, RELEASE_SEMAPHORE)
    }

    fn input_schema() -> Option<Value> {
        Some(schema_for::<CallToolRequest>())
    }

    fn output_schema() -> Option<Value> {
        Some(schema_for::<CallToolResult>())
    }

    fn middleware() -> Option<MiddlewareRoute> {
        Some(MiddlewareRoute::new("/tools/call").with_method("POST"))
    }

    fn dependencies() -> Vec<ProviderToken> {
        vec![ProviderToken::of::<ToolRegistry>()]
    }

    fn create(providers: &Providers) -> Result<Self, FlowError> {
        let tools = providers
            .require::<ToolRegistry>()
            .map_err(|e| FlowError::Internal(e.to_string()))?;
        Ok(Self {
            tools,
            auth: providers
                .get::<AuthConfig>()
                .unwrap_or_else(|| Arc::new(AuthConfig::default())),
            renderer: providers.get::<Renderer>(),
        })
    }

    fn stages(self: &Arc<Self>) -> StageTable {
        let checkpoints: [Stage; 4] = [
            ACQUIRE_QUOTA,
            ACQUIRE_SEMAPHORE,
            RELEASE_SEMAPHORE,
            RELEASE_QUOTA,
        ];
        checkpoints.into_iter().fold(
            StageTable::new()
                .bind(PARSE_INPUT, self, Self::parse_input)
                .bind(FIND_TOOL, self, Self::find_tool)
                .bind(CHECK_TOOL_AUTHORIZATION, self, Self::check_authorization)
                .bind(CREATE_TOOL_CALL_CONTEXT, self, Self::create_context)
                .bind(VALIDATE_INPUT, self, Self::validate_input)
                .bind(EXECUTE, self, Self::execute)
                .bind(VALIDATE_OUTPUT, self, Self::validate_output)
                .bind(FINALIZE, self, Self::finalize),
            |table, stage| table.bind(stage, self, Self::checkpoint),
        )
    }

    fn ready(self: &Arc<Self>) -> meridian_system::BoxFuture<'_, Result<(), FlowError>> {
        let tools = self.tools.len();
        Box::pin(async move {
            tracing::debug!(tools, "call-tool flow ready");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_fits_its_kind() {
        let plan = CallToolFlow::plan();

        assert!(plan.validate().is_ok());
        assert_eq!(CALL_TOOL_KIND.first_disallowed(&plan), None);
        assert_eq!(plan.scopes().len(), 2);
        assert!(plan.stages(Phase::Post).is_empty());
    }

    #[test]
    fn envelope_rejects_unknown_fields() {
        let strict = serde_json::from_value::<CallToolRequest>(json!({
            "method": "tools/call",
            "params": { "name": "echo", "extra": 1 }
        }));
        let ok = serde_json::from_value::<CallToolRequest>(json!({
            "method": "tools/call",
            "params": { "name": "echo", "_meta": { "trace": "t1" } }
        }))
        .unwrap();

        assert!(strict.is_err());
        assert_eq!(ok.params.arguments, None);
        assert_eq!(ok.params.meta, Some(json!({ "trace": "t1" })));
    }

    #[test]
    fn result_shape() {
        let structured = CallToolResult::from_output(json!({ "sum": 3 }));
        let text = CallToolResult::from_output(json!("hello"));

        assert_eq!(
            serde_json::to_value(&structured).unwrap(),
            json!({
                "content": [{ "type": "text", "text": "{\"sum\":3}" }],
                "structuredContent": { "sum": 3 },
                "isError": false
            })
        );
        assert_eq!(text.structured_content, None);
        assert_eq!(text.content, [ContentBlock::Text { text: "hello".into() }]);
    }

    #[test]
    fn validated_outputs_are_structured_whatever_their_type() {
        for value in [json!([1, 2]), json!(7), json!("hi"), json!(null)] {
            let result = CallToolResult::from_validated(value.clone());
            assert_eq!(result.structured_content, Some(value));
        }
    }

    #[test]
    fn rendering_clears_content_of_structured_results() {
        let mut structured = CallToolResult::from_output(json!({ "sum": 3 }));
        let mut text = CallToolResult::from_output(json!("hello"));
        let rendered = RenderMetadata::default().with("ui/html", "<p>3</p>");

        structured.apply_render(rendered.clone());
        text.apply_render(rendered);

        assert!(structured.content.is_empty());
        assert_eq!(structured.meta["ui/html"], "<p>3</p>");
        assert_eq!(text.content.len(), 1);
    }
}

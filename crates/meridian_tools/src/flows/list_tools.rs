//! The `tools:list-tools` flow.
//!
//! Lists visible tools in registration order. When the caller is
//! authenticated and the server requires authorization, tools of apps the
//! caller has not authorized are left out.

use std::sync::Arc;

use meridian_flow::prelude::*;
use meridian_system::provider::{ProviderToken, Providers};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{AuthConfig, AuthInfo, AuthorizationFallback};
use crate::registry::{ToolEntry, ToolRegistry};
use crate::schema::schema_for;

/// Envelope method accepted by the flow.
pub const LIST_TOOLS_METHOD: &str = "tools/list";

const PARSE_INPUT: &str = "parseInput";
const FIND_TOOLS: &str = "findTools";
const FINALIZE: &str = "finalize";

/// Kind shared by tool-listing flows.
pub const LIST_TOOLS_KIND: FlowKind = FlowKind::new("tools:list", &[PARSE_INPUT, FIND_TOOLS, FINALIZE]);

/// The list envelope.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListToolsRequest {
    /// Must be `tools/list`.
    pub method: String,
    /// Optional parameters.
    #[serde(default)]
    pub params: Option<ListToolsParams>,
}

/// List parameters.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListToolsParams {
    /// Pagination cursor. Accepted and ignored; the whole list is returned.
    #[serde(default)]
    pub cursor: Option<String>,
}

/// One listed tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListedTool {
    /// Tool name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Argument schema.
    pub input_schema: Value,
    /// Result schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

impl From<&ToolEntry> for ListedTool {
    fn from(entry: &ToolEntry) -> Self {
        let definition = entry.definition();
        Self {
            name: definition.name.clone(),
            description: definition.description.clone(),
            input_schema: definition.input_schema.clone(),
            output_schema: definition.output_schema.clone(),
        }
    }
}

/// The flow output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ListToolsResult {
    /// Tools the caller may see.
    pub tools: Vec<ListedTool>,
}

/// Lists tools.
pub struct ListToolsFlow {
    tools: Arc<ToolRegistry>,
    auth: Arc<AuthConfig>,
}

impl ListToolsFlow {
    fn parse_input(self: Arc<Self>, ctx: &mut FlowContext) -> HookFuture<'_> {
        Box::pin(async move {
            let request: ListToolsRequest = serde_json::from_value(ctx.input().clone())
                .map_err(|e| FlowError::InvalidInput(e.to_string()))?;
            if request.method != LIST_TOOLS_METHOD {
                return Err(FlowError::InvalidInput(format!(
                    "expected method '{LIST_TOOLS_METHOD}', got '{}'",
                    request.method
                ))
                .into());
            }
            if let Some(cursor) = request.params.and_then(|p| p.cursor) {
                tracing::debug!(%cursor, "ignoring list cursor");
            }
            Ok(())
        })
    }

    fn find_tools(self: Arc<Self>, ctx: &mut FlowContext) -> HookFuture<'_> {
        Box::pin(async move {
            let restrict = self.auth.fallback_policy() == AuthorizationFallback::MustAuthorize;
            let auth = ctx.state().get::<AuthInfo>();
            let tools: Vec<ListedTool> = self
                .tools
                .visible()
                .filter(|entry| match (restrict, auth, entry.owner()) {
                    (true, Some(auth), Some(app_id)) => auth.is_granted(app_id),
                    _ => true,
                })
                .map(|entry| ListedTool::from(entry.as_ref()))
                .collect();
            ctx.state_mut().insert(ListToolsResult { tools });
            Ok(())
        })
    }

    fn finalize(self: Arc<Self>, ctx: &mut FlowContext) -> HookFuture<'_> {
        Box::pin(async move {
            let result = ctx.state().require::<ListToolsResult>()?;
            let output =
                serde_json::to_value(result).map_err(|e| FlowError::Internal(e.to_string()))?;
            ctx.set_output(output);
            Ok(())
        })
    }
}

impl Flow for ListToolsFlow {
    const NAME: &'static str = "tools:list-tools";
    const KIND: FlowKind = LIST_TOOLS_KIND;

    fn plan() -> FlowPlan {
        FlowPlan::new()
            .pre([PARSE_INPUT])
            .execute([FIND_TOOLS])
            .finalize([FINALIZE])
    }

    fn input_schema() -> Option<Value> {
        Some(schema_for::<ListToolsRequest>())
    }

    fn output_schema() -> Option<Value> {
        Some(schema_for::<ListToolsResult>())
    }

    fn middleware() -> Option<MiddlewareRoute> {
        Some(MiddlewareRoute::new("/tools/list").with_method("POST"))
    }

    fn dependencies() -> Vec<ProviderToken> {
        vec![ProviderToken::of::<ToolRegistry>()]
    }

    fn create(providers: &Providers) -> Result<Self, FlowError> {
        Ok(Self {
            tools: providers
                .require::<ToolRegistry>()
                .map_err(|e| FlowError::Internal(e.to_string()))?,
            auth: providers
                .get::<AuthConfig>()
                .unwrap_or_else(|| Arc::new(AuthConfig::default())),
        })
    }

    fn stages(self: &Arc<Self>) -> StageTable {
        StageTable::new()
            .bind(PARSE_INPUT, self, Self::parse_input)
            .bind(FIND_TOOLS, self, Self::find_tools)
            .bind(FINALIZE, self, Self::finalize)
    }
}

//! The core [`Tool`] trait, its definition, and closure-backed tools.

use std::sync::Arc;

use meridian_flow::hooks::HookBinding;
use meridian_system::BoxFuture;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;
use crate::render::RenderConfig;
use crate::schema::{any_object, schema_for};

/// Caller-facing description of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name, e.g. `get_weather`.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema of the arguments.
    pub input_schema: Value,
    /// JSON Schema of the result, if the tool declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Id of the app that owns the tool. Ownerless tools are global.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Hidden tools can be called by name but are not listed.
    #[serde(default)]
    pub hidden: bool,
    /// How to render results for UI-capable clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render: Option<RenderConfig>,
}

impl ToolDefinition {
    /// Creates a global, visible definition accepting any object.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: any_object(),
            output_schema: None,
            owner: None,
            hidden: false,
            render: None,
        }
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Sets the output schema.
    #[must_use]
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Marks the tool as owned by `app_id`.
    #[must_use]
    pub fn owned_by(mut self, app_id: impl Into<String>) -> Self {
        self.owner = Some(app_id.into());
        self
    }

    /// Hides the tool from listings.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Attaches a render contract.
    #[must_use]
    pub fn with_render(mut self, render: RenderConfig) -> Self {
        self.render = Some(render);
        self
    }
}

/// Per-call facts handed to a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallContext {
    /// Id of the flow call.
    pub call_id: String,
    /// Name of the tool being called.
    pub tool: String,
    /// App owning the tool, if any.
    pub owner: Option<String>,
    /// `_meta` sent with the request.
    pub meta: Option<Value>,
}

/// A tool that can be invoked through the `tools:call-tool` flow.
///
/// Tools expose a [`ToolDefinition`] and an async [`execute`](Tool::execute)
/// method. A tool may also contribute hooks that run only during its own
/// calls, see [`hooks`](Tool::hooks).
pub trait Tool: Send + Sync + 'static {
    /// Returns the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool with schema-validated JSON arguments.
    fn execute(
        &self,
        args: Value,
        ctx: ToolCallContext,
    ) -> BoxFuture<'_, Result<Value, ToolError>>;

    /// Hooks attached to every call of this tool.
    ///
    /// Their stages must belong to the call-tool kind; a stray stage fails
    /// the call with `ExecutionSetupFailed`.
    fn hooks(&self) -> Vec<HookBinding> {
        Vec::new()
    }
}

type ToolFn = dyn Fn(Value, ToolCallContext) -> BoxFuture<'static, Result<Value, ToolError>>
    + Send
    + Sync;

/// A [`Tool`] backed by a closure.
///
/// ```
/// use meridian_tools::tool::{FnTool, ToolDefinition};
///
/// let echo = FnTool::new(ToolDefinition::new("echo", "Returns its input."), |args, _ctx| {
///     Box::pin(async move { Ok(args) })
/// });
/// ```
#[derive(Clone)]
pub struct FnTool {
    definition: ToolDefinition,
    handler: Arc<ToolFn>,
    hooks: Vec<HookBinding>,
}

impl FnTool {
    /// Wraps a raw JSON handler.
    pub fn new<F>(definition: ToolDefinition, handler: F) -> Self
    where
        F: Fn(Value, ToolCallContext) -> BoxFuture<'static, Result<Value, ToolError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            definition,
            handler: Arc::new(handler),
            hooks: Vec::new(),
        }
    }

    /// Wraps a typed handler; input and output schemas are generated from
    /// `I` and `O`.
    pub fn typed<I, O, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        I: DeserializeOwned + JsonSchema + Send + 'static,
        O: Serialize + JsonSchema + 'static,
        F: Fn(I, ToolCallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ToolError>> + Send + 'static,
    {
        let definition = ToolDefinition::new(name, description)
            .with_input_schema(schema_for::<I>())
            .with_output_schema(schema_for::<O>());
        let handler = Arc::new(handler);
        Self::new(definition, move |args, ctx| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let input: I = serde_json::from_value(args)
                    .map_err(|e| ToolError::parameter_error(e.to_string()))?;
                let output = handler(input, ctx).await?;
                Ok(serde_json::to_value(output)?)
            })
        })
    }

    /// Applies `edit` to the definition.
    #[must_use]
    pub fn with_definition(mut self, edit: impl FnOnce(ToolDefinition) -> ToolDefinition) -> Self {
        self.definition = edit(self.definition);
        self
    }

    /// Adds a hook that runs during this tool's calls.
    #[must_use]
    pub fn with_hook(mut self, hook: HookBinding) -> Self {
        self.hooks.push(hook);
        self
    }
}

impl Tool for FnTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn execute(
        &self,
        args: Value,
        ctx: ToolCallContext,
    ) -> BoxFuture<'_, Result<Value, ToolError>> {
        (self.handler)(args, ctx)
    }

    fn hooks(&self) -> Vec<HookBinding> {
        self.hooks.clone()
    }
}

impl core::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FnTool")
            .field("definition", &self.definition)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

//! Rendering tool results for UI-capable clients.
//!
//! A tool opts in by declaring a [`RenderConfig`]. When a [`Renderer`]
//! provider is installed, the call flow hands it each successful result and
//! merges the returned [`RenderMetadata`] into the result's `_meta`.
//! Rendering is best effort: a [`RenderError`] is logged and the plain
//! result is returned.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use meridian_system::provider::Provider;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::SessionInfo;
use crate::error::RenderError;

/// A tool's render contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfig {
    /// Template source. `{{field}}` placeholders name top-level output fields.
    pub template: String,
    /// MIME type of the rendered document.
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
}

fn default_mime_type() -> String {
    "text/html".to_string()
}

impl RenderConfig {
    /// Creates an HTML render contract.
    pub fn html(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            mime_type: default_mime_type(),
        }
    }
}

/// The client family a result is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformHint {
    /// ChatGPT and other OpenAI clients.
    OpenAi,
    /// Claude clients.
    Claude,
    /// Cursor.
    Cursor,
    /// Anything else.
    #[default]
    Generic,
}

impl PlatformHint {
    /// Detects the platform from session facts. Missing sessions are generic.
    #[must_use]
    pub fn detect(session: Option<&SessionInfo>) -> Self {
        let Some(session) = session else {
            return Self::Generic;
        };
        let haystack = format!(
            "{} {}",
            session.client_name.as_deref().unwrap_or_default(),
            session.user_agent.as_deref().unwrap_or_default()
        )
        .to_ascii_lowercase();

        if haystack.contains("openai") || haystack.contains("chatgpt") {
            Self::OpenAi
        } else if haystack.contains("claude") {
            Self::Claude
        } else if haystack.contains("cursor") {
            Self::Cursor
        } else {
            Self::Generic
        }
    }

    /// Returns the wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "open-ai",
            Self::Claude => "claude",
            Self::Cursor => "cursor",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for PlatformHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a renderer gets for one result.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Tool name.
    pub tool: String,
    /// Validated arguments.
    pub input: Value,
    /// Schema-checked output.
    pub output: Value,
    /// The tool's render contract.
    pub config: RenderConfig,
    /// Target client family.
    pub platform: PlatformHint,
}

/// Metadata merged into a result's `_meta`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderMetadata {
    /// Keys to merge. Existing keys are overwritten.
    pub meta: Map<String, Value>,
}

impl RenderMetadata {
    /// Adds a key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// Turns a tool result into UI metadata.
#[async_trait]
pub trait ResultRenderer: Send + Sync + 'static {
    /// Renders one result.
    async fn render(&self, request: RenderRequest) -> Result<RenderMetadata, RenderError>;
}

/// Provider wrapping the installed [`ResultRenderer`].
#[derive(Clone)]
pub struct Renderer(Arc<dyn ResultRenderer>);

impl Provider for Renderer {}

impl Renderer {
    /// Wraps `renderer`.
    pub fn new(renderer: impl ResultRenderer) -> Self {
        Self(Arc::new(renderer))
    }

    /// Renders one result.
    ///
    /// # Errors
    ///
    /// Whatever the wrapped renderer returns.
    pub async fn render(&self, request: RenderRequest) -> Result<RenderMetadata, RenderError> {
        self.0.render(request).await
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Renderer").finish_non_exhaustive()
    }
}

/// Substitutes `{{field}}` placeholders with top-level output fields.
///
/// Produces `ui/html`, `ui/mimeType` and `ui/platform` metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    fn fill(request: &RenderRequest) -> Result<String, RenderError> {
        let mut rendered = String::with_capacity(request.config.template.len());
        let mut rest = request.config.template.as_str();

        while let Some(start) = rest.find("{{") {
            rendered.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                return Err(RenderError::Failed(format!(
                    "unterminated placeholder in template for '{}'",
                    request.tool
                )));
            };
            let field = after[..end].trim();
            let value = request
                .output
                .get(field)
                .ok_or_else(|| RenderError::MissingField {
                    tool: request.tool.clone(),
                    field: field.to_string(),
                })?;
            match value {
                Value::String(text) => rendered.push_str(text),
                other => rendered.push_str(&other.to_string()),
            }
            rest = &after[end + 2..];
        }
        rendered.push_str(rest);
        Ok(rendered)
    }
}

#[async_trait]
impl ResultRenderer for TemplateRenderer {
    async fn render(&self, request: RenderRequest) -> Result<RenderMetadata, RenderError> {
        let html = Self::fill(&request)?;
        Ok(RenderMetadata::default()
            .with("ui/html", html)
            .with("ui/mimeType", request.config.mime_type.clone())
            .with("ui/platform", request.platform.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(template: &str, output: Value) -> RenderRequest {
        RenderRequest {
            tool: "weather".into(),
            input: json!({}),
            output,
            config: RenderConfig::html(template),
            platform: PlatformHint::Claude,
        }
    }

    #[tokio::test]
    async fn template_fills_placeholders() {
        let meta = TemplateRenderer
            .render(request(
                "<b>{{ city }}</b>: {{temp}}",
                json!({ "city": "Oslo", "temp": 4 }),
            ))
            .await
            .unwrap();

        assert_eq!(meta.meta["ui/html"], "<b>Oslo</b>: 4");
        assert_eq!(meta.meta["ui/mimeType"], "text/html");
        assert_eq!(meta.meta["ui/platform"], "claude");
    }

    #[tokio::test]
    async fn missing_field_is_an_error() {
        let err = TemplateRenderer
            .render(request("{{wind}}", json!({ "city": "Oslo" })))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RenderError::MissingField {
                tool: "weather".into(),
                field: "wind".into()
            }
        );
    }

    #[test]
    fn platform_detection() {
        let session = |client: &str| SessionInfo {
            client_name: Some(client.into()),
            user_agent: None,
        };

        assert_eq!(PlatformHint::detect(None), PlatformHint::Generic);
        assert_eq!(PlatformHint::detect(Some(&session("ChatGPT"))), PlatformHint::OpenAi);
        assert_eq!(PlatformHint::detect(Some(&session("claude-desktop"))), PlatformHint::Claude);
        assert_eq!(PlatformHint::detect(Some(&session("Cursor"))), PlatformHint::Cursor);
        assert_eq!(PlatformHint::detect(Some(&session("zed"))), PlatformHint::Generic);
    }
}

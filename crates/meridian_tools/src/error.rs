//! Error types for tools, registration and rendering.

use thiserror::Error;

/// Failure reported by a tool. Surfaces to callers as a sanitized
/// `OperationExecution` error whose public message omits this detail.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The arguments passed schema validation but the tool rejected them.
    #[error("Parameter error: {0}")]
    ParameterError(String),

    /// The tool ran and failed.
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// A typed tool could not convert its input or output.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl ToolError {
    /// Creates a [`ParameterError`](Self::ParameterError).
    pub fn parameter_error(msg: impl Into<String>) -> Self {
        Self::ParameterError(msg.into())
    }

    /// Creates an [`ExecutionError`](Self::ExecutionError).
    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::ExecutionError(msg.into())
    }
}

/// Errors raised while adding a tool to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolRegistrationError {
    /// A tool with the same name is already registered.
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    /// One of the tool's schemas does not compile.
    #[error("Tool '{tool}' declares an invalid {which} schema: {reason}")]
    InvalidSchema {
        /// The tool name.
        tool: String,
        /// `input` or `output`.
        which: &'static str,
        /// Compiler message.
        reason: String,
    },
}

/// Errors raised while rendering a tool result.
///
/// Rendering failures are logged by the call flow and never fail a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The template references a field the output does not have.
    #[error("template for '{tool}' references missing field '{field}'")]
    MissingField {
        /// The tool being rendered.
        tool: String,
        /// The unresolved placeholder.
        field: String,
    },

    /// The renderer cannot produce output for this request.
    #[error("renderer failed: {0}")]
    Failed(String),
}

/// Errors raised while reading [`AuthConfig`](crate::auth::AuthConfig)
/// from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthConfigError {
    /// Unknown auth mode.
    #[error("unknown auth mode '{0}' (expected public, transparent or orchestrated)")]
    InvalidMode(String),

    /// Unknown fallback behavior.
    #[error("unknown skipped-app behavior '{0}' (expected anonymous or require-auth)")]
    InvalidFallback(String),

    /// The authorization base URL does not parse.
    #[error("invalid authorization base url '{value}': {source}")]
    InvalidUrl {
        /// The configured value.
        value: String,
        /// Parser error.
        #[source]
        source: url::ParseError,
    },
}

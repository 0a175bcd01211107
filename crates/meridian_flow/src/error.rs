//! Error types for flow registration and execution.
//!
//! Two families exist:
//!
//! - [`RegistrationError`] - structural mistakes found while declaring flows,
//!   registering hooks or booting the registry. These are fatal at boot.
//! - [`FlowError`] - failures of a single call. Each variant knows the
//!   message that is safe to show a caller ([`FlowError::public_message`]),
//!   a JSON-RPC style code, and an HTTP status for transport adapters.

use crate::flow::FlowToken;
use meridian_system::provider::ProviderToken;

/// Structural problems in a [`FlowPlan`](crate::stage::FlowPlan).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// The same stage name appears twice in the plan.
    #[error("stage '{0}' appears more than once")]
    DuplicateStage(&'static str),

    /// A scoped pair names a stage that is not in the plan.
    #[error("scoped stage '{0}' is not part of the plan")]
    UnknownScopeStage(&'static str),

    /// A scope's release stage is planned before its acquire stage.
    #[error("release stage '{release}' runs before its acquire stage '{acquire}'")]
    ReleaseBeforeAcquire {
        /// The acquire stage.
        acquire: &'static str,
        /// The release stage.
        release: &'static str,
    },

    /// A stage takes part in more than one scope.
    #[error("stage '{0}' belongs to more than one scope")]
    OverlappingScope(&'static str),
}

/// Errors raised while declaring flows, registering hooks or booting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// A hook or plan stage is outside the flow kind's allow-list.
    #[error("stage '{stage}' is not allowed for flow '{flow}' of kind '{kind}'")]
    StageNotAllowed {
        /// The flow the stage was bound against.
        flow: &'static str,
        /// The flow's kind.
        kind: &'static str,
        /// The rejected stage.
        stage: &'static str,
    },

    /// A hook with the same name is already bound to this flow and stage.
    #[error("hook '{name}' already registered for '{flow}' at stage '{stage}'")]
    DuplicateHook {
        /// The flow.
        flow: &'static str,
        /// The stage.
        stage: &'static str,
        /// The duplicate hook name.
        name: String,
    },

    /// An observer with the same name is already registered.
    #[error("observer '{0}' already registered")]
    DuplicateObserver(String),

    /// Two flows share a name.
    #[error("flow '{0}' is already registered")]
    DuplicateFlow(&'static str),

    /// A flow's plan is malformed.
    #[error("flow '{flow}' has an invalid plan: {source}")]
    InvalidPlan {
        /// The offending flow.
        flow: &'static str,
        /// What is wrong with the plan.
        #[source]
        source: PlanError,
    },

    /// A flow depends on a provider that was never registered.
    #[error("flow '{flow}' depends on unregistered provider '{dependency}'")]
    MissingDependency {
        /// The flow declaring the dependency.
        flow: &'static str,
        /// The missing provider.
        dependency: ProviderToken,
    },

    /// A flow failed to construct or become ready.
    #[error("flow '{flow}' failed to initialize: {reason}")]
    Initialization {
        /// The failing flow.
        flow: &'static str,
        /// Why it failed.
        reason: String,
    },
}

impl RegistrationError {
    pub(crate) fn stage_not_allowed(token: FlowToken, stage: &'static str) -> Self {
        Self::StageNotAllowed {
            flow: token.name(),
            kind: token.kind().name(),
            stage,
        }
    }
}

/// Failure of a single flow call.
///
/// `Display` carries the full diagnostic and is meant for logs. Callers
/// outside the process should only ever see [`public_message`](Self::public_message).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    /// No flow with this name is registered.
    #[error("flow '{0}' is not registered")]
    NotRegistered(String),

    /// The call input was rejected.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A named entity (for example a tool) does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// What kind of entity was looked up.
        kind: &'static str,
        /// The name that was looked up.
        name: String,
    },

    /// The caller has not authorized the app owning the operation.
    #[error("authorization required for app '{app_id}' to run '{operation}'")]
    AuthorizationRequired {
        /// The operation that was requested.
        operation: String,
        /// The app the caller must authorize.
        app_id: String,
        /// Where the caller can complete authorization.
        auth_url: String,
    },

    /// The per-call execution context could not be prepared.
    #[error("execution setup failed: {0}")]
    ExecutionSetupFailed(String),

    /// The operation itself failed.
    #[error("operation '{operation}' failed: {reason}")]
    OperationExecution {
        /// The operation name.
        operation: String,
        /// Detail from the operation. Never shown to callers.
        reason: String,
    },

    /// The operation produced output that violates its declared schema.
    #[error("operation '{operation}' produced invalid output")]
    InvalidOutput {
        /// The operation name.
        operation: String,
    },

    /// An engine-side failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FlowError {
    /// Returns the message that is safe to expose to a caller.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::NotRegistered(_)
            | Self::InvalidInput(_)
            | Self::NotFound { .. }
            | Self::InvalidOutput { .. } => self.to_string(),
            Self::AuthorizationRequired {
                app_id, auth_url, ..
            } => format!("authorization required for app '{app_id}'; authorize at {auth_url}"),
            Self::ExecutionSetupFailed(_) => "failed to prepare the operation".to_string(),
            Self::OperationExecution { operation, .. } => {
                format!("operation '{operation}' failed")
            }
            Self::Internal(_) => "internal error".to_string(),
        }
    }

    /// Returns a JSON-RPC style error code.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::NotRegistered(_) => -32601,
            Self::InvalidInput(_) | Self::NotFound { .. } => -32602,
            Self::AuthorizationRequired { .. } => -32001,
            Self::ExecutionSetupFailed(_)
            | Self::OperationExecution { .. }
            | Self::InvalidOutput { .. }
            | Self::Internal(_) => -32603,
        }
    }

    /// Returns the HTTP status a transport adapter should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotRegistered(_) | Self::NotFound { .. } => 404,
            Self::InvalidInput(_) => 400,
            Self::AuthorizationRequired { .. } => 403,
            Self::ExecutionSetupFailed(_)
            | Self::OperationExecution { .. }
            | Self::InvalidOutput { .. }
            | Self::Internal(_) => 500,
        }
    }
}

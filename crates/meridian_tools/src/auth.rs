//! Authorization context for tool calls.
//!
//! Transports put an [`AuthInfo`] into the call dependencies when the caller
//! is authenticated. Server-wide policy lives in the [`AuthConfig`] provider.

use std::str::FromStr;

use hashbrown::HashSet;
use meridian_system::provider::Provider;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthConfigError;

/// Environment variable selecting the [`AuthMode`].
pub const AUTH_MODE_VAR: &str = "MERIDIAN_AUTH_MODE";
/// Environment variable holding the authorization base URL.
pub const AUTH_BASE_URL_VAR: &str = "MERIDIAN_AUTH_BASE_URL";
/// Environment variable overriding the [`AuthorizationFallback`].
pub const SKIPPED_APP_BEHAVIOR_VAR: &str = "MERIDIAN_AUTH_SKIPPED_APP_BEHAVIOR";

const DEFAULT_BASE_URL: &str = "http://localhost:3000/oauth/authorize";

/// Facts about the client session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Client name announced at initialization.
    pub client_name: Option<String>,
    /// Transport user agent.
    pub user_agent: Option<String>,
}

/// Who is calling and which apps they have authorized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthInfo {
    granted_apps: HashSet<String>,
    session: Option<SessionInfo>,
}

impl AuthInfo {
    /// Creates an identity with no granted apps.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds granted apps.
    #[must_use]
    pub fn with_granted<I, S>(mut self, apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.granted_apps.extend(apps.into_iter().map(Into::into));
        self
    }

    /// Sets the session facts.
    #[must_use]
    pub fn with_session(mut self, session: SessionInfo) -> Self {
        self.session = Some(session);
        self
    }

    /// Returns true if `app_id` was authorized.
    #[must_use]
    pub fn is_granted(&self, app_id: &str) -> bool {
        self.granted_apps.contains(app_id)
    }

    /// Returns the session facts.
    #[must_use]
    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }
}

/// How the server authenticates callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// No authentication.
    #[default]
    Public,
    /// Tokens are passed through to the apps.
    Transparent,
    /// The server runs its own authorization flow.
    Orchestrated,
}

impl FromStr for AuthMode {
    type Err = AuthConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "transparent" => Ok(Self::Transparent),
            "orchestrated" => Ok(Self::Orchestrated),
            _ => Err(AuthConfigError::InvalidMode(s.to_string())),
        }
    }
}

/// What happens when a caller uses a tool of an app they have not authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthorizationFallback {
    /// Run the tool anonymously.
    Anonymous,
    /// Refuse with a link to authorize the app.
    MustAuthorize,
}

impl FromStr for AuthorizationFallback {
    type Err = AuthConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anonymous" => Ok(Self::Anonymous),
            "require-auth" | "must-authorize" => Ok(Self::MustAuthorize),
            _ => Err(AuthConfigError::InvalidFallback(s.to_string())),
        }
    }
}

/// Recorded in call state when a tool runs under the anonymous fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymousToolAccess {
    /// The app the caller has not authorized.
    pub app_id: String,
    /// The tool that ran.
    pub tool: String,
}

/// Server-wide authorization policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    mode: AuthMode,
    base_url: Url,
    skipped_app_behavior: Option<AuthorizationFallback>,
}

impl Provider for AuthConfig {}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(AuthMode::default())
    }
}

impl AuthConfig {
    /// Creates a config for `mode` with the default authorization URL.
    #[must_use]
    pub fn new(mode: AuthMode) -> Self {
        Self {
            mode,
            base_url: default_base_url(),
            skipped_app_behavior: None,
        }
    }

    /// Sets the authorization base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Overrides the fallback derived from the mode.
    #[must_use]
    pub fn with_fallback(mut self, fallback: AuthorizationFallback) -> Self {
        self.skipped_app_behavior = Some(fallback);
        self
    }

    /// Reads the config from the process environment.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthConfigError`] for a value that does not parse.
    pub fn from_env() -> Result<Self, AuthConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the config through `lookup`, keyed by the `MERIDIAN_AUTH_*`
    /// variable names.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthConfigError`] for a value that does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AuthConfigError> {
        let mut config = match lookup(AUTH_MODE_VAR) {
            Some(mode) => Self::new(mode.parse()?),
            None => Self::default(),
        };
        if let Some(value) = lookup(AUTH_BASE_URL_VAR) {
            let base_url = Url::parse(&value)
                .map_err(|source| AuthConfigError::InvalidUrl { value, source })?;
            config = config.with_base_url(base_url);
        }
        if let Some(behavior) = lookup(SKIPPED_APP_BEHAVIOR_VAR) {
            config = config.with_fallback(behavior.parse()?);
        }
        Ok(config)
    }

    /// Returns the auth mode.
    #[must_use]
    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Returns the effective fallback policy.
    ///
    /// An explicit setting wins. Otherwise public servers fall back to
    /// anonymous access and authenticating servers require authorization.
    #[must_use]
    pub fn fallback_policy(&self) -> AuthorizationFallback {
        self.skipped_app_behavior.unwrap_or(match self.mode {
            AuthMode::Public => AuthorizationFallback::Anonymous,
            AuthMode::Transparent | AuthMode::Orchestrated => AuthorizationFallback::MustAuthorize,
        })
    }

    /// Returns the URL where a caller authorizes `app_id` to run `tool_id`.
    #[must_use]
    pub fn authorize_url(&self, app_id: &str, tool_id: &str) -> String {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("app", app_id)
            .append_pair("tool", tool_id);
        url.into()
    }
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("default authorization url is valid")
}

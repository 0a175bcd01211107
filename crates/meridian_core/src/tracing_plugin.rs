//! Structured logging for Meridian servers.
//!
//! [`TracingPlugin`] installs the global `tracing` subscriber and publishes
//! the settings it used as the [`TracingConfig`] provider.
//!
//! # Lifecycle
//!
//! - **`build()`** registers the [`TracingConfig`] provider so other plugins
//!   can read the intended configuration during build.
//! - **`ready()`** installs the subscriber, after every plugin has been
//!   built.
//!
//! Every flow call runs inside a `flow` span carrying `flow` and `call_id`,
//! so span events show one enter/exit pair per call.
//!
//! # Example
//!
//! ```
//! use meridian_system::server::Server;
//! use meridian_core::{ServerInfoPlugin, TracingConfig, TracingFormat, TracingPlugin};
//! use tracing::Level;
//!
//! let mut server = Server::new();
//! server.add_plugins(ServerInfoPlugin::default());
//! server.add_plugins(
//!     TracingPlugin::default()
//!         .with_level(Level::DEBUG)
//!         .with_format(TracingFormat::Compact),
//! );
//! server.finish();
//!
//! let config = server.get_provider::<TracingConfig>().unwrap();
//! assert_eq!(config.level, Level::DEBUG);
//! ```

use core::str::FromStr;

use meridian_system::plugin::{Plugin, PluginId};
use meridian_system::provider::Provider;
use meridian_system::server::Server;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::ServerInfoPlugin;

// ─────────────────────────────────────────────────────────────────────────────
// TracingFormat
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Multi-line, colored. The default.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// Newline-delimited JSON.
    Json,
}

/// Error returned when a format name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tracing format '{0}', expected pretty, compact or json")]
pub struct UnknownFormat(pub String);

impl FromStr for TracingFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing configuration provider.
///
/// Flows and plugins can read it to decide how much diagnostic detail to
/// produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// The configured maximum log level.
    pub level: Level,
    /// The configured output format.
    pub format: TracingFormat,
    /// Directive string used instead of `level`, if any.
    pub env_filter: Option<String>,
}

impl Provider for TracingConfig {}

// ─────────────────────────────────────────────────────────────────────────────
// TracingPlugin
// ─────────────────────────────────────────────────────────────────────────────

/// Installs the `tracing` subscriber once every plugin is built.
///
/// # Providers
///
/// | Provider | Description |
/// |----------|-------------|
/// | [`TracingConfig`] | Tracing configuration (read-only) |
///
/// # Dependencies
///
/// - [`ServerInfoPlugin`]
///
/// # Filters
///
/// Directives are taken, in order, from [`with_env_filter`](Self::with_env_filter),
/// then the `RUST_LOG` environment variable, then the configured level.
///
/// ```
/// use meridian_core::{TracingFormat, TracingPlugin};
/// use tracing::Level;
///
/// // JSON lines, engine at info, tools at debug
/// let prod = TracingPlugin::default()
///     .with_format(TracingFormat::Json)
///     .with_env_filter("meridian_flow=info,meridian_tools=debug");
/// ```
#[derive(Debug, Clone)]
pub struct TracingPlugin {
    level: Level,
    format: TracingFormat,
    env_filter: Option<String>,
    span_events: bool,
}

impl Default for TracingPlugin {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingFormat::Pretty,
            env_filter: None,
            span_events: false,
        }
    }
}

impl TracingPlugin {
    /// Same as [`Default::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the level used when no directives are given.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets a directive string, e.g. `meridian_flow=debug,meridian_tools=warn`.
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Logs entering and leaving each `flow` span.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    fn filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.as_str());
        match &self.env_filter {
            Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|error| {
                tracing::warn!(%error, directives = directives.as_str(), "invalid tracing filter, using level");
                fallback()
            }),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

impl Plugin for TracingPlugin {
    fn build(&self, server: &mut Server) {
        server.insert_provider(TracingConfig {
            level: self.level,
            format: self.format,
            env_filter: self.env_filter.clone(),
        });
    }

    fn ready(&self, _server: &mut Server) {
        let filter = self.filter();
        let span_events = if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        };

        // try_init fails if a subscriber is already installed; keep that one.
        let installed = match self.format {
            TracingFormat::Pretty => tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_span_events(span_events),
                )
                .try_init(),
            TracingFormat::Compact => tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_span_events(span_events),
                )
                .try_init(),
            TracingFormat::Json => tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_span_events(span_events),
                )
                .try_init(),
        }
        .is_ok();

        tracing::info!(
            level = %self.level,
            format = ?self.format,
            installed,
            "tracing subscriber configured"
        );
    }

    fn cleanup(&self, _server: &mut Server) {
        tracing::info!("tracing plugin stopped");
    }

    fn dependencies(&self) -> Vec<PluginId> {
        vec![PluginId::of::<ServerInfoPlugin>()]
    }
}

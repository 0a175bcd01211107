//! Provider container for shared services.
//!
//! Providers are the dependencies flows and hooks resolve at boot: tool
//! registries, auth configuration, renderers. Each provider is stored once,
//! behind an [`Arc`], and identified by a [`ProviderToken`] derived from its
//! type. A flow declares the tokens it needs; the registry checks them all
//! before any flow is constructed.
//!
//! ```
//! use meridian_system::provider::{Provider, ProviderToken, Providers};
//!
//! struct Clock;
//! impl Provider for Clock {}
//!
//! let mut providers = Providers::new();
//! providers.insert(Clock);
//!
//! assert!(providers.contains_token(&ProviderToken::of::<Clock>()));
//! assert!(providers.require::<Clock>().is_ok());
//! ```

use core::any::{Any, TypeId};
use core::fmt;
use hashbrown::HashMap;
use std::sync::Arc;

/// Marker trait for types that can be registered as providers.
///
/// Providers are shared across concurrent calls and must therefore be
/// `Send + Sync`. Mutation, if any, goes through interior mutability.
pub trait Provider: Send + Sync + 'static {}

/// Identifier for a provider type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderToken {
    type_id: TypeId,
    type_name: &'static str,
}

impl ProviderToken {
    /// Creates the token for provider type `T`.
    #[must_use]
    pub fn of<T: Provider>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: core::any::type_name::<T>(),
        }
    }

    /// Returns the provider's type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for ProviderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProviderToken({})", self.type_name)
    }
}

impl fmt::Display for ProviderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Errors raised while resolving providers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// No provider of the requested type was registered.
    #[error("provider not registered: {0}")]
    Missing(ProviderToken),
}

/// Shared map from provider token to instance.
///
/// Cloning is cheap: only the `Arc` handles are cloned.
#[derive(Clone, Default)]
pub struct Providers {
    entries: HashMap<TypeId, (ProviderToken, Arc<dyn Any + Send + Sync>)>,
}

impl Providers {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registers a provider, returning `true` if one of the same type was replaced.
    pub fn insert<T: Provider>(&mut self, provider: T) -> bool {
        self.insert_arc(Arc::new(provider))
    }

    /// Registers an already shared provider.
    pub fn insert_arc<T: Provider>(&mut self, provider: Arc<T>) -> bool {
        let token = ProviderToken::of::<T>();
        self.entries
            .insert(token.type_id, (token, provider))
            .is_some()
    }

    /// Returns the provider of type `T`, if registered.
    #[must_use]
    pub fn get<T: Provider>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|(_, provider)| Arc::clone(provider).downcast::<T>().ok())
    }

    /// Returns the provider of type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Missing`] if no such provider is registered.
    pub fn require<T: Provider>(&self) -> Result<Arc<T>, ProviderError> {
        self.get::<T>()
            .ok_or_else(|| ProviderError::Missing(ProviderToken::of::<T>()))
    }

    /// Returns true if a provider of type `T` is registered.
    #[must_use]
    pub fn contains<T: Provider>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Returns true if a provider matching `token` is registered.
    #[must_use]
    pub fn contains_token(&self, token: &ProviderToken) -> bool {
        self.entries.contains_key(&token.type_id)
    }

    /// Returns the first token in `tokens` that has no registered provider.
    #[must_use]
    pub fn first_missing<'a>(
        &self,
        tokens: impl IntoIterator<Item = &'a ProviderToken>,
    ) -> Option<ProviderToken> {
        tokens
            .into_iter()
            .find(|token| !self.contains_token(token))
            .copied()
    }

    /// Returns the tokens of every registered provider.
    pub fn tokens(&self) -> impl Iterator<Item = ProviderToken> + '_ {
        self.entries.values().map(|(token, _)| *token)
    }

    /// Returns the number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no providers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Providers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.tokens()).finish()
    }
}

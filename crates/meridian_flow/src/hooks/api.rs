//! Extrinsic hook registration.
//!
//! [`FlowHooksAPI`] is where plugins attach behavior to flows they do not
//! own: caching, approval gates, redaction, rate limiting. Hooks are keyed
//! by [`FlowToken`] and validated against the flow kind's allow-list when
//! they are registered, so a typo in a stage name fails at build time
//! rather than on the first call.
//!
//! # Example
//!
//! ```ignore
//! let hooks = server.api::<FlowHooksAPI>().expect("FlowsPlugin required");
//!
//! hooks.register::<CallToolFlow>(
//!     HookBinding::new("cache-read", "execute", |ctx| Box::pin(async move {
//!         match cached(ctx.input()) {
//!             Some(hit) => Err(Interrupt::respond(hit)),
//!             None => Ok(()),
//!         }
//!     }))
//!     .with_priority(-100),
//! )?;
//!
//! hooks.register_observer("access-log", |event: &FlowEvent| {
//!     tracing::debug!(flow = event.flow(), call_id = event.call_id(), "flow event");
//! })?;
//! ```

use std::sync::Arc;

use hashbrown::HashMap;
use meridian_system::api::API;
use parking_lot::RwLock;

use super::binding::HookBinding;
use super::events::{FlowEvent, Observer, Observers};
use crate::error::RegistrationError;
use crate::flow::{Flow, FlowToken};

/// Registry of extrinsic hooks and lifecycle observers.
///
/// Uses interior mutability so plugins can register through `server.api()`.
#[derive(Default)]
pub struct FlowHooksAPI {
    /// Flow name → hooks in registration order.
    hooks: RwLock<HashMap<&'static str, Vec<HookBinding>>>,
    observers: RwLock<Vec<(String, Observer)>>,
}

impl API for FlowHooksAPI {}

impl FlowHooksAPI {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook on flow `F`.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::StageNotAllowed`] if `F`'s kind does not allow the stage
    /// - [`RegistrationError::DuplicateHook`] if the name is taken on that stage
    pub fn register<F: Flow>(&self, binding: HookBinding) -> Result<&Self, RegistrationError> {
        self.register_for(FlowToken::of::<F>(), binding)
    }

    /// Registers a hook on the flow identified by `token`.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_for(
        &self,
        token: FlowToken,
        binding: HookBinding,
    ) -> Result<&Self, RegistrationError> {
        if !token.kind().allows(binding.stage()) {
            return Err(RegistrationError::stage_not_allowed(token, binding.stage()));
        }

        let mut hooks = self.hooks.write();
        let entries = hooks.entry(token.name()).or_default();

        if entries
            .iter()
            .any(|h| h.stage() == binding.stage() && h.name() == binding.name())
        {
            return Err(RegistrationError::DuplicateHook {
                flow: token.name(),
                stage: binding.stage(),
                name: binding.name().to_string(),
            });
        }

        tracing::debug!(
            flow = token.name(),
            stage = binding.stage(),
            hook = binding.name(),
            priority = binding.priority(),
            "registered flow hook"
        );
        entries.push(binding);
        Ok(self)
    }

    /// Returns the hooks registered for `token`, in registration order.
    #[must_use]
    pub fn hooks_for(&self, token: FlowToken) -> Vec<HookBinding> {
        self.hooks
            .read()
            .get(token.name())
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the number of hooks registered for `token`.
    #[must_use]
    pub fn hook_count(&self, token: FlowToken) -> usize {
        self.hooks.read().get(token.name()).map_or(0, Vec::len)
    }

    /// Returns true if a hook named `name` is registered for `token`.
    #[must_use]
    pub fn contains_hook(&self, token: FlowToken, name: &str) -> bool {
        self.hooks
            .read()
            .get(token.name())
            .is_some_and(|entries| entries.iter().any(|h| h.name() == name))
    }

    /// Registers an observer receiving every [`FlowEvent`] of every flow.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::DuplicateObserver`] if the name is taken.
    pub fn register_observer<F>(
        &self,
        name: impl Into<String>,
        observer: F,
    ) -> Result<&Self, RegistrationError>
    where
        F: Fn(&FlowEvent) + Send + Sync + 'static,
    {
        let name = name.into();
        let mut observers = self.observers.write();
        if observers.iter().any(|(existing, _)| *existing == name) {
            return Err(RegistrationError::DuplicateObserver(name));
        }
        observers.push((name, Arc::new(observer)));
        Ok(self)
    }

    /// Returns a snapshot of the registered observers.
    #[must_use]
    pub fn observers(&self) -> Observers {
        Observers::new(
            self.observers
                .read()
                .iter()
                .map(|(_, observer)| Arc::clone(observer))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::FlowKind;
    use core::sync::atomic::{AtomicUsize, Ordering};

    const KIND: FlowKind = FlowKind::new("test", &["parse", "run"]);
    const TOKEN: FlowToken = FlowToken::new("test:flow", KIND);

    fn noop(name: &str, stage: &'static str) -> HookBinding {
        HookBinding::new(name, stage, |_ctx| Box::pin(async { Ok(()) }))
    }

    #[test]
    fn register_keeps_registration_order() {
        let api = FlowHooksAPI::new();
        api.register_for(TOKEN, noop("first", "run"))
            .and_then(|api| api.register_for(TOKEN, noop("second", "parse")))
            .and_then(|api| api.register_for(TOKEN, noop("third", "run")))
            .expect("registration should succeed");

        let names: Vec<_> = api
            .hooks_for(TOKEN)
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(names, ["first", "second", "third"]);
        assert_eq!(api.hook_count(TOKEN), 3);
        assert!(api.contains_hook(TOKEN, "second"));
    }

    #[test]
    fn stage_outside_allow_list_fails_at_registration() {
        let api = FlowHooksAPI::new();
        let err = api.register_for(TOKEN, noop("h", "execute")).err();

        assert_eq!(
            err,
            Some(RegistrationError::StageNotAllowed {
                flow: "test:flow",
                kind: "test",
                stage: "execute",
            })
        );
        assert_eq!(api.hook_count(TOKEN), 0);
    }

    #[test]
    fn duplicate_name_on_same_stage_fails() {
        let api = FlowHooksAPI::new();
        api.register_for(TOKEN, noop("cache", "run")).unwrap();

        assert!(matches!(
            api.register_for(TOKEN, noop("cache", "run")),
            Err(RegistrationError::DuplicateHook { .. })
        ));
        // Same name on another stage is fine.
        assert!(api.register_for(TOKEN, noop("cache", "parse")).is_ok());
    }

    #[test]
    fn observers_receive_events() {
        let api = FlowHooksAPI::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        api.register_observer("count", move |_: &FlowEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert!(matches!(
            api.register_observer("count", |_: &FlowEvent| {}),
            Err(RegistrationError::DuplicateObserver(_))
        ));

        let observers = api.observers();
        observers.emit(&FlowEvent::FlowStart {
            flow: "test:flow",
            call_id: "c1".into(),
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(observers.len(), 1);
    }
}

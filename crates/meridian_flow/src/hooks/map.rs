//! Composition of intrinsic and extrinsic hooks into a per-flow [`HookMap`].

use std::borrow::Cow;

use hashbrown::HashMap;

use super::binding::{HookBinding, StageTable};
use crate::error::RegistrationError;
use crate::flow::FlowToken;
use crate::stage::Stage;

/// Immutable stage → ordered hooks table of one flow.
///
/// Built once per flow at boot and shared by every call.
#[derive(Debug, Clone)]
pub struct HookMap {
    token: FlowToken,
    stages: HashMap<Stage, Vec<HookBinding>>,
}

impl HookMap {
    /// Returns the flow this map belongs to.
    #[must_use]
    pub fn token(&self) -> FlowToken {
        self.token
    }

    /// Returns the hooks bound to `stage`, in execution order.
    #[must_use]
    pub fn hooks_for(&self, stage: &str) -> &[HookBinding] {
        self.stages.get(stage).map_or(&[], Vec::as_slice)
    }

    /// Returns the hooks of `stage` that fire for `scope`, merged with
    /// `extra` per-call hooks.
    ///
    /// Per-call hooks sort after static hooks of equal priority.
    pub(crate) fn resolve<'a>(
        &'a self,
        stage: &str,
        scope: Option<&str>,
        extra: impl IntoIterator<Item = HookBinding>,
    ) -> Vec<Cow<'a, HookBinding>> {
        let mut hooks: Vec<Cow<'a, HookBinding>> = self
            .hooks_for(stage)
            .iter()
            .filter(|hook| hook.applies_to(scope))
            .map(Cow::Borrowed)
            .chain(
                extra
                    .into_iter()
                    .filter(|hook| hook.applies_to(scope))
                    .map(Cow::Owned),
            )
            .collect();
        hooks.sort_by_key(|hook| hook.priority());
        hooks
    }

    /// Returns the total number of hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.values().map(Vec::len).sum()
    }

    /// Returns true if no hooks are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builder assembling a [`HookMap`].
///
/// Intrinsic hooks come first, in declaration order, followed by extrinsic
/// hooks in registration order. Each stage's list is then stable-sorted by
/// priority, so equal priorities keep that combined order.
///
/// ```ignore
/// let map = HookMapBuilder::new(FlowToken::of::<CallToolFlow>())
///     .intrinsic(flow.stages())
///     .extrinsic(hooks_api.hooks_for(FlowToken::of::<CallToolFlow>()))
///     .build()?;
/// ```
#[derive(Debug)]
pub struct HookMapBuilder {
    token: FlowToken,
    bindings: Vec<HookBinding>,
}

impl HookMapBuilder {
    /// Starts a map for the flow identified by `token`.
    #[must_use]
    pub fn new(token: FlowToken) -> Self {
        Self {
            token,
            bindings: Vec::new(),
        }
    }

    /// Adds the flow's own stage handlers.
    #[must_use]
    pub fn intrinsic(mut self, table: StageTable) -> Self {
        self.bindings.extend(table.into_bindings());
        self
    }

    /// Adds hooks registered by other plugins.
    #[must_use]
    pub fn extrinsic(mut self, bindings: impl IntoIterator<Item = HookBinding>) -> Self {
        self.bindings.extend(bindings);
        self
    }

    /// Validates every stage against the flow kind and builds the map.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::StageNotAllowed`] for a hook outside the allow-list.
    pub fn build(self) -> Result<HookMap, RegistrationError> {
        let kind = self.token.kind();
        let mut stages: HashMap<Stage, Vec<HookBinding>> = HashMap::new();

        for binding in self.bindings {
            if !kind.allows(binding.stage()) {
                return Err(RegistrationError::stage_not_allowed(
                    self.token,
                    binding.stage(),
                ));
            }
            stages.entry(binding.stage()).or_default().push(binding);
        }

        for hooks in stages.values_mut() {
            hooks.sort_by_key(HookBinding::priority);
        }

        Ok(HookMap {
            token: self.token,
            stages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::FlowKind;

    const KIND: FlowKind = FlowKind::new("test", &["s1", "s2"]);
    const TOKEN: FlowToken = FlowToken::new("test:map", KIND);

    fn hook(name: &str, stage: &'static str, priority: i32) -> HookBinding {
        HookBinding::new(name, stage, |_ctx| Box::pin(async { Ok(()) })).with_priority(priority)
    }

    fn names(hooks: &[HookBinding]) -> Vec<&str> {
        hooks.iter().map(HookBinding::name).collect()
    }

    #[test]
    fn intrinsic_precede_extrinsic_at_equal_priority() {
        let map = HookMapBuilder::new(TOKEN)
            .intrinsic(StageTable::new().with(hook("own", "s1", 0)))
            .extrinsic([hook("ext-a", "s1", 0), hook("early", "s1", -5), hook("ext-b", "s1", 0)])
            .build()
            .unwrap();

        assert_eq!(names(map.hooks_for("s1")), ["early", "own", "ext-a", "ext-b"]);
        assert!(map.hooks_for("s2").is_empty());
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn intrinsic_stage_outside_kind_fails_at_build() {
        let result = HookMapBuilder::new(TOKEN)
            .intrinsic(StageTable::new().with(hook("own", "s9", 0)))
            .build();

        assert!(matches!(
            result,
            Err(RegistrationError::StageNotAllowed { stage: "s9", .. })
        ));
    }

    #[test]
    fn resolve_filters_owner_and_orders_call_hooks_last() {
        let map = HookMapBuilder::new(TOKEN)
            .extrinsic([
                hook("global", "s1", 1),
                hook("crm-only", "s1", 1).with_owner("crm"),
                hook("billing-only", "s1", 0).with_owner("billing"),
            ])
            .build()
            .unwrap();
        let per_call = [hook("per-call", "s1", 1), hook("urgent", "s1", -1)];

        let resolved = map.resolve("s1", Some("crm"), per_call);
        let order: Vec<&str> = resolved.iter().map(|h| h.name()).collect();
        assert_eq!(order, ["urgent", "global", "crm-only", "per-call"]);

        let unscoped = map.resolve("s1", None, []);
        assert_eq!(unscoped.len(), 1);
    }
}

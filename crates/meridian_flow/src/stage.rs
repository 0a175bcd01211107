//! Flow plans, phases and kinds.
//!
//! A [`FlowPlan`] names the stages of a flow, grouped into four fixed
//! [`Phase`]s, plus the acquire/release pairs that form guaranteed-release
//! scopes. A [`FlowKind`] names a category of flows and the stages any flow
//! of that category may use.

use core::fmt;

use crate::error::PlanError;

/// A stage name.
pub type Stage = &'static str;

// ─────────────────────────────────────────────────────────────────────────────
// Phase
// ─────────────────────────────────────────────────────────────────────────────

/// The four phases of every flow, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Parsing, lookup, authorization, admission.
    Pre,
    /// The operation itself.
    Execute,
    /// Post-processing of the raw result.
    Post,
    /// Releases and output shaping.
    Finalize,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 4] = [Phase::Pre, Phase::Execute, Phase::Post, Phase::Finalize];

    /// Returns the phase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Pre => "pre",
            Phase::Execute => "execute",
            Phase::Post => "post",
            Phase::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FlowPlan
// ─────────────────────────────────────────────────────────────────────────────

/// An acquire/release stage pair.
///
/// Once the acquire stage is entered, the release stage is guaranteed to run
/// exactly once, whatever way the call ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopedStages {
    /// Stage that opens the scope.
    pub acquire: Stage,
    /// Stage that closes the scope.
    pub release: Stage,
}

/// Declarative stage plan of a flow.
///
/// # Example
///
/// ```
/// use meridian_flow::stage::{FlowPlan, Phase};
///
/// let plan = FlowPlan::new()
///     .pre(["parse", "acquireSlot"])
///     .execute(["run"])
///     .finalize(["releaseSlot", "respond"])
///     .scoped("acquireSlot", "releaseSlot");
///
/// assert!(plan.validate().is_ok());
/// assert_eq!(plan.stages(Phase::Execute), ["run"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowPlan {
    pre: Vec<Stage>,
    execute: Vec<Stage>,
    post: Vec<Stage>,
    finalize: Vec<Stage>,
    scopes: Vec<ScopedStages>,
}

impl FlowPlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends stages to the pre phase.
    #[must_use]
    pub fn pre(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.pre.extend(stages);
        self
    }

    /// Appends stages to the execute phase.
    #[must_use]
    pub fn execute(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.execute.extend(stages);
        self
    }

    /// Appends stages to the post phase.
    #[must_use]
    pub fn post(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.post.extend(stages);
        self
    }

    /// Appends stages to the finalize phase.
    #[must_use]
    pub fn finalize(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.finalize.extend(stages);
        self
    }

    /// Declares an acquire/release scope.
    #[must_use]
    pub fn scoped(mut self, acquire: Stage, release: Stage) -> Self {
        self.scopes.push(ScopedStages { acquire, release });
        self
    }

    /// Returns the stages of one phase.
    #[must_use]
    pub fn stages(&self, phase: Phase) -> &[Stage] {
        match phase {
            Phase::Pre => &self.pre,
            Phase::Execute => &self.execute,
            Phase::Post => &self.post,
            Phase::Finalize => &self.finalize,
        }
    }

    /// Iterates every stage in execution order, with its phase.
    pub fn iter(&self) -> impl Iterator<Item = (Phase, Stage)> + '_ {
        Phase::ALL
            .into_iter()
            .flat_map(move |phase| self.stages(phase).iter().map(move |&stage| (phase, stage)))
    }

    /// Returns the phase containing `stage`.
    #[must_use]
    pub fn phase_of(&self, stage: &str) -> Option<Phase> {
        self.iter().find(|(_, s)| *s == stage).map(|(phase, _)| phase)
    }

    /// Returns true if the plan contains `stage`.
    #[must_use]
    pub fn contains(&self, stage: &str) -> bool {
        self.phase_of(stage).is_some()
    }

    /// Returns the total number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        Phase::ALL.iter().map(|&p| self.stages(p).len()).sum()
    }

    /// Returns true if the plan has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the declared scopes.
    #[must_use]
    pub fn scopes(&self) -> &[ScopedStages] {
        &self.scopes
    }

    /// Returns the scope opened by `stage`, if any.
    #[must_use]
    pub fn scope_acquired_by(&self, stage: &str) -> Option<ScopedStages> {
        self.scopes.iter().find(|s| s.acquire == stage).copied()
    }

    /// Returns the scope closed by `stage`, if any.
    #[must_use]
    pub fn scope_released_by(&self, stage: &str) -> Option<ScopedStages> {
        self.scopes.iter().find(|s| s.release == stage).copied()
    }

    /// Checks stage uniqueness and scope ordering.
    ///
    /// # Errors
    ///
    /// Returns the first [`PlanError`] found.
    pub fn validate(&self) -> Result<(), PlanError> {
        let ordered: Vec<Stage> = self.iter().map(|(_, stage)| stage).collect();
        for (i, &stage) in ordered.iter().enumerate() {
            if ordered[..i].contains(&stage) {
                return Err(PlanError::DuplicateStage(stage));
            }
        }

        let position = |stage: Stage| {
            ordered
                .iter()
                .position(|s| *s == stage)
                .ok_or(PlanError::UnknownScopeStage(stage))
        };

        let mut scoped: Vec<Stage> = Vec::with_capacity(self.scopes.len() * 2);
        for scope in &self.scopes {
            for stage in [scope.acquire, scope.release] {
                if scoped.contains(&stage) || scope.acquire == scope.release {
                    return Err(PlanError::OverlappingScope(stage));
                }
                scoped.push(stage);
            }
            if position(scope.release)? < position(scope.acquire)? {
                return Err(PlanError::ReleaseBeforeAcquire {
                    acquire: scope.acquire,
                    release: scope.release,
                });
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FlowKind
// ─────────────────────────────────────────────────────────────────────────────

/// A category of flows with an explicit stage allow-list.
///
/// ```
/// use meridian_flow::stage::FlowKind;
///
/// const CACHE: FlowKind = FlowKind::new("cache", &["lookup", "store"]);
/// assert!(CACHE.allows("lookup"));
/// assert!(!CACHE.allows("execute"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKind {
    name: &'static str,
    stages: &'static [Stage],
}

impl FlowKind {
    /// Creates a kind from its name and allowed stages.
    #[must_use]
    pub const fn new(name: &'static str, stages: &'static [Stage]) -> Self {
        Self { name, stages }
    }

    /// Returns the kind name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the allowed stages.
    #[must_use]
    pub const fn stages(&self) -> &'static [Stage] {
        self.stages
    }

    /// Returns true if hooks may bind to `stage` in flows of this kind.
    #[must_use]
    pub fn allows(&self, stage: &str) -> bool {
        self.stages.iter().any(|allowed| *allowed == stage)
    }

    /// Returns the first plan stage outside the allow-list.
    #[must_use]
    pub fn first_disallowed(&self, plan: &FlowPlan) -> Option<Stage> {
        plan.iter()
            .map(|(_, stage)| stage)
            .find(|stage| !self.allows(stage))
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

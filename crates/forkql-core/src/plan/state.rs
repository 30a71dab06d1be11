//! Plan lifecycle tracking.

use std::fmt;

use super::node::LogicalPlan;

/// How far a plan has progressed through the planning pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PlanPhase {
    /// Fresh from the parser or builder.
    Unresolved,
    /// Every reference resolved and verified.
    Analyzed,
    /// Logical rewrites applied; ready for phased rounds or execution.
    Optimized,
}

impl fmt::Display for PlanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlanPhase::Unresolved => "unresolved",
            PlanPhase::Analyzed => "analyzed",
            PlanPhase::Optimized => "optimized",
        };
        f.write_str(name)
    }
}

/// A plan paired with its lifecycle phase.
///
/// Phases only move forward. Every transition consumes the state and hands
/// back a new one, so a marker is set once per transition and never cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanState {
    plan: LogicalPlan,
    phase: PlanPhase,
}

impl PlanState {
    /// Wrap a plan that has not been analyzed.
    pub fn new(plan: LogicalPlan) -> Self {
        Self {
            plan,
            phase: PlanPhase::Unresolved,
        }
    }

    /// Wrap a plan fragment that was built from already resolved nodes.
    pub(crate) fn preanalyzed(plan: LogicalPlan) -> Self {
        Self {
            plan,
            phase: PlanPhase::Analyzed,
        }
    }

    pub fn plan(&self) -> &LogicalPlan {
        &self.plan
    }

    pub fn into_plan(self) -> LogicalPlan {
        self.plan
    }

    pub fn phase(&self) -> PlanPhase {
        self.phase
    }

    pub fn is_analyzed(&self) -> bool {
        self.phase >= PlanPhase::Analyzed
    }

    pub fn is_optimized(&self) -> bool {
        self.phase == PlanPhase::Optimized
    }

    /// Move to `Analyzed` with the analyzer's output.
    ///
    /// # Panics
    ///
    /// If the plan was already analyzed.
    pub fn analyzed(self, plan: LogicalPlan) -> PlanState {
        self.advance(plan, PlanPhase::Analyzed)
    }

    /// Move to `Optimized` with the optimizer's output.
    ///
    /// # Panics
    ///
    /// If the plan is not exactly `Analyzed`.
    pub fn optimized(self, plan: LogicalPlan) -> PlanState {
        self.advance(plan, PlanPhase::Optimized)
    }

    fn advance(self, plan: LogicalPlan, next: PlanPhase) -> PlanState {
        let expected = match next {
            PlanPhase::Unresolved => unreachable!("no transition leads back to unresolved"),
            PlanPhase::Analyzed => PlanPhase::Unresolved,
            PlanPhase::Optimized => PlanPhase::Analyzed,
        };
        assert_eq!(
            self.phase, expected,
            "plan cannot move from {} to {next}",
            self.phase
        );
        PlanState { plan, phase: next }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::relation::LocalRelation;

    fn plan() -> LogicalPlan {
        LogicalPlan::LocalRelation(LocalRelation::empty(vec![]))
    }

    #[test]
    fn test_forward_transitions() {
        let state = PlanState::new(plan());
        assert!(!state.is_analyzed());
        let state = state.analyzed(plan());
        assert!(state.is_analyzed());
        assert!(!state.is_optimized());
        let state = state.optimized(plan());
        assert!(state.is_analyzed());
        assert!(state.is_optimized());
    }

    #[test]
    #[should_panic(expected = "cannot move from analyzed to analyzed")]
    fn test_analyze_twice_panics() {
        PlanState::new(plan()).analyzed(plan()).analyzed(plan());
    }

    #[test]
    #[should_panic(expected = "cannot move from unresolved to optimized")]
    fn test_optimize_before_analyze_panics() {
        PlanState::new(plan()).optimized(plan());
    }
}

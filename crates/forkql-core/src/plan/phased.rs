//! The Phased protocol.
//!
//! A Phased node cannot be computed in one pass. It names the sub-plans that
//! must run first ([`Phased::first_phases`]) and, once their results are in,
//! produces the node that replaces it ([`Phased::next_phase`]).
//!
//! A driver alternates [`extract_first_phases`] and
//! [`apply_results_from_first_phases`] until no Phased node remains. Each
//! round substitutes exactly one node: the first Phased node in bottom-up
//! order.

use forkql_proto::Attribute;
use tracing::debug;

use super::node::LogicalPlan;
use super::state::PlanState;
use crate::block::Page;
use crate::error::Result;

/// Materialized output of one first-phase sub-plan.
#[derive(Debug)]
pub struct PhaseResult {
    /// Output columns of the sub-plan.
    pub schema: Vec<Attribute>,
    /// Pages in production order.
    pub pages: Vec<Page>,
}

impl PhaseResult {
    pub fn new(schema: Vec<Attribute>, pages: Vec<Page>) -> Self {
        Self { schema, pages }
    }

    /// Total rows across all pages.
    pub fn row_count(&self) -> usize {
        self.pages.iter().map(Page::position_count).sum()
    }

    /// Release every page.
    pub fn release(self) {
        for page in self.pages {
            page.release();
        }
    }
}

/// A plan node that must run sub-plans before it can be resolved further.
pub trait Phased {
    /// Sub-plans to execute first, or `None` if the node runs standalone.
    fn first_phases(&self) -> Option<Vec<LogicalPlan>>;

    /// Build the replacement node from the results of [`Phased::first_phases`],
    /// one result per sub-plan, in the same order.
    fn next_phase(&self, results: Vec<PhaseResult>) -> Result<LogicalPlan>;
}

/// First phases extracted from a plan, waiting to be executed.
#[derive(Debug)]
pub struct PhaseRound {
    source: LogicalPlan,
    phases: Vec<PlanState>,
}

impl PhaseRound {
    /// The sub-plans to execute, each already marked analyzed.
    pub fn phases(&self) -> &[PlanState] {
        &self.phases
    }

    /// The Phased node the round was extracted from.
    pub fn source(&self) -> &LogicalPlan {
        &self.source
    }

    /// Pair the round with the results of every one of its phases.
    ///
    /// # Panics
    ///
    /// If the number of results differs from the number of phases. A round
    /// is applied with a complete result set or not at all.
    pub fn complete(self, results: Vec<PhaseResult>) -> CompletedRound {
        assert_eq!(
            results.len(),
            self.phases.len(),
            "phase round completed with {} results for {} first phases",
            results.len(),
            self.phases.len()
        );
        CompletedRound {
            source: self.source,
            results,
        }
    }
}

/// A round whose first phases have all been executed.
#[derive(Debug)]
pub struct CompletedRound {
    source: LogicalPlan,
    results: Vec<PhaseResult>,
}

impl CompletedRound {
    /// Release the results without applying them.
    pub fn discard(self) {
        for result in self.results {
            result.release();
        }
    }
}

/// Find the first Phased node, bottom-up, and return its first phases.
///
/// Returns `None` when the plan contains no Phased node, meaning the plan
/// can be executed as-is.
///
/// # Panics
///
/// If the plan is not optimized.
pub fn extract_first_phases(state: &PlanState) -> Option<PhaseRound> {
    assert!(
        state.is_optimized(),
        "first phases extracted from a plan that is {}",
        state.phase()
    );
    let mut round = None;
    state.plan().for_each_up(&mut |node| {
        if round.is_some() {
            return;
        }
        if let Some(phases) = node.as_phased().and_then(Phased::first_phases) {
            round = Some(PhaseRound {
                source: node.clone(),
                phases: phases.into_iter().map(PlanState::preanalyzed).collect(),
            });
        }
    });
    if let Some(round) = &round {
        debug!(
            node = round.source.command_name(),
            phases = round.phases.len(),
            "extracted first phases"
        );
    }
    round
}

/// Replace the first Phased node with the node its results produce.
///
/// The returned plan is marked analyzed.
///
/// # Panics
///
/// If the plan is not analyzed, or if its first Phased node is not the node
/// the round was extracted from.
pub fn apply_results_from_first_phases(state: PlanState, round: CompletedRound) -> Result<PlanState> {
    assert!(
        state.is_analyzed(),
        "phase results applied to a plan that is {}",
        state.phase()
    );
    let CompletedRound { source, results } = round;
    let mut pending = Some(results);
    let plan = state.into_plan().transform_up(&mut |node| {
        if pending.is_none() {
            return Ok(node);
        }
        let Some(phased) = node.as_phased() else {
            return Ok(node);
        };
        if phased.first_phases().is_none() {
            return Ok(node);
        }
        assert!(
            node == source,
            "phase results applied to a node whose first phases were not executed"
        );
        let results = pending.take().unwrap_or_default();
        phased.next_phase(results)
    })?;
    assert!(pending.is_none(), "plan has no phased node for the completed round");
    Ok(PlanState::preanalyzed(plan))
}

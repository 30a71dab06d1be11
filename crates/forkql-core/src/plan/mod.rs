//! Logical plans.
//!
//! - [`node`] - The plan tree and its traversals
//! - [`relation`] - Leaf relations
//! - [`fork`] / [`merge`] - Branching and recombination
//! - [`rerank`] - Reciprocal rank fusion
//! - [`phased`] - Multi-round execution protocol
//! - [`state`] - Plan lifecycle markers
//! - [`builder`] - Fluent plan construction
//! - [`wire`] - Named-frame codec for executable plans

pub mod builder;
pub mod fork;
pub mod merge;
pub mod node;
pub mod phased;
pub mod relation;
pub mod rerank;
pub mod state;
pub mod wire;

pub use builder::PlanBuilder;
pub use fork::Fork;
pub use merge::Merge;
pub use node::{LogicalPlan, SortOrder};
pub use phased::{
    apply_results_from_first_phases, extract_first_phases, CompletedRound, PhaseResult, PhaseRound, Phased,
};
pub use relation::{FieldQuery, LocalRelation, Relation, Retrieve};
pub use rerank::Rerank;
pub use state::{PlanPhase, PlanState};
pub use wire::{decode_plan, encode_plan, WRITEABLE_NAMES};

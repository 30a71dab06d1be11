//! Physical execution.
//!
//! Pipelines are chains of [`Operator`]s moved forward by a [`Driver`]. A
//! [`LocalExecutionPlanner`] builds them from an optimized logical plan,
//! materializing fork branches ahead of the live branch.

pub mod driver;
pub mod filter;
pub mod limit;
pub mod merge;
pub mod operator;
pub mod planner;
pub mod project;
pub mod sort;
pub mod source;

pub use driver::{Driver, DriverContext};
pub use merge::{branch_tag, BranchMergeOperator, LocalSupplier};
pub use operator::{Operator, OperatorState, SourceOperator};
pub use planner::{LocalExecutionPlanner, QueryResult};

//! forkql core - phased execution, fork/merge branching and rank fusion.
//!
//! A query is a [`LogicalPlan`]. A [`QuerySession`] analyzes it against a
//! [`RetrievalService`], rewrites `FORK` into merges, runs the rounds of any
//! Phased node (such as `RERANK`) and executes the final plan through
//! columnar pipelines.

pub mod analyzer;
pub mod block;
pub mod config;
pub mod error;
pub mod exec;
pub mod expr;
pub mod optimizer;
pub mod plan;
pub mod retrieval;
pub mod session;

pub use analyzer::Analyzer;
pub use block::{Block, BlockFactory, Page};
pub use config::{EngineConfig, KnnConfig};
pub use error::{Error, Result};
pub use exec::{BranchMergeOperator, Driver, DriverContext, LocalSupplier, QueryResult};
pub use optimizer::Optimizer;
pub use plan::{
    apply_results_from_first_phases, extract_first_phases, Fork, LogicalPlan, Merge, PhaseResult, Phased,
    PlanBuilder, PlanPhase, PlanState, Rerank, Retrieve, SortOrder,
};
pub use retrieval::{MemoryIndex, RetrievalService, SearchQuery, SearchRequest};
pub use session::QuerySession;

/// Re-export protocol types.
pub use forkql_proto as proto;

//! Fluent construction of logical plans.

use forkql_proto::Attribute;

use super::fork::Fork;
use super::node::{LogicalPlan, SortOrder};
use super::relation::{LocalRelation, Relation, Retrieve};
use super::rerank::Rerank;
use crate::config::DEFAULT_DISCRIMINATOR;
use crate::expr::{lit, Expr};

/// Builds a plan pipeline-style, one command after another.
///
/// ```
/// use forkql_core::expr::{col, lit, matches};
/// use forkql_core::plan::{PlanBuilder, Retrieve};
///
/// let plan = PlanBuilder::retrieve(Retrieve::new("docs").with_metadata(["_id"]))
///     .filter(col("id").gt(lit(2)))
///     .fork(|input| {
///         vec![
///             input.clone().filter(matches("content", "fox")),
///             input.filter(matches("content", "dog")),
///         ]
///     })
///     .build();
/// assert_eq!(plan.command_name(), "FORK");
/// ```
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    plan: LogicalPlan,
}

impl PlanBuilder {
    /// Start from an existing plan.
    pub fn from_plan(plan: LogicalPlan) -> Self {
        Self { plan }
    }

    /// `RETRIEVE index ...`
    pub fn retrieve(retrieve: Retrieve) -> Self {
        Self::from_plan(LogicalPlan::Retrieve(retrieve))
    }

    /// Start from a resolved relation.
    pub fn relation(relation: Relation) -> Self {
        Self::from_plan(LogicalPlan::Relation(relation))
    }

    /// Start from literal rows.
    pub fn local(local: LocalRelation) -> Self {
        Self::from_plan(LogicalPlan::LocalRelation(local))
    }

    /// `WHERE condition`
    pub fn filter(self, condition: Expr) -> Self {
        Self::from_plan(LogicalPlan::Filter {
            input: Box::new(self.plan),
            condition,
        })
    }

    /// `SORT orders`
    pub fn sort(self, orders: Vec<SortOrder>) -> Self {
        Self::from_plan(LogicalPlan::OrderBy {
            input: Box::new(self.plan),
            orders,
        })
    }

    /// `LIMIT n`
    pub fn limit(self, n: i32) -> Self {
        self.limit_expr(lit(n))
    }

    /// `LIMIT expr`; the expression must fold during analysis.
    pub fn limit_expr(self, limit: Expr) -> Self {
        Self::from_plan(LogicalPlan::Limit {
            input: Box::new(self.plan),
            limit,
        })
    }

    /// `KEEP columns`
    pub fn keep<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_plan(LogicalPlan::Project {
            input: Box::new(self.plan),
            columns: columns.into_iter().map(Into::into).collect(),
        })
    }

    /// `FORK [..] [..]` with a discriminator synthesized during analysis.
    ///
    /// `branches` receives the current pipeline and returns one pipeline per
    /// branch, each continuing from its own copy of the input.
    pub fn fork<F>(self, branches: F) -> Self
    where
        F: FnOnce(PlanBuilder) -> Vec<PlanBuilder>,
    {
        self.fork_with(Attribute::unresolved(DEFAULT_DISCRIMINATOR), branches)
    }

    /// `FORK` with an explicitly named discriminator column.
    pub fn fork_named<F>(self, discriminator: &str, branches: F) -> Self
    where
        F: FnOnce(PlanBuilder) -> Vec<PlanBuilder>,
    {
        self.fork_with(Attribute::discriminator(discriminator), branches)
    }

    fn fork_with<F>(self, discriminator: Attribute, branches: F) -> Self
    where
        F: FnOnce(PlanBuilder) -> Vec<PlanBuilder>,
    {
        let input = self.plan.clone();
        let branches = branches(self).into_iter().map(PlanBuilder::build).collect();
        Self::from_plan(LogicalPlan::Fork(Fork::new(input, branches, discriminator)))
    }

    /// Fuse two ranked passes over the current pipeline, keeping `limit`
    /// documents.
    pub fn rerank(self, limit: i32, first_query: Expr, second_query: Expr) -> Self {
        Self::from_plan(LogicalPlan::Rerank(Rerank::new(
            self.plan,
            lit(limit),
            first_query,
            second_query,
        )))
    }

    pub fn build(self) -> LogicalPlan {
        self.plan
    }
}

impl From<PlanBuilder> for LogicalPlan {
    fn from(builder: PlanBuilder) -> Self {
        builder.build()
    }
}

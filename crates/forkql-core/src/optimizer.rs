//! Logical rewrites applied after analysis.

use tracing::debug;

use crate::error::Result;
use crate::expr::{lit, Expr};
use crate::plan::{FieldQuery, LogicalPlan, PlanState};

/// Rewrites an analyzed plan into its executable form:
///
/// 1. `Fork` surrogates become left-deep `Merge` chains.
/// 2. Stacked filters combine into one conjunction.
/// 3. Match conjuncts directly above a relation move into it. The first one
///    ranks an unranked relation; the others restrict it.
/// 4. Stacked limits collapse into the smaller one.
#[derive(Debug, Default, Clone, Copy)]
pub struct Optimizer;

impl Optimizer {
    pub fn new() -> Self {
        Self
    }

    pub fn optimize(&self, state: PlanState) -> Result<PlanState> {
        let plan = state
            .plan()
            .clone()
            .transform_up(&mut substitute_surrogates)?
            .transform_up(&mut combine_filters)?
            .transform_up(&mut push_match_to_source)?
            .transform_up(&mut combine_limits)?;
        Ok(state.optimized(plan))
    }
}

fn substitute_surrogates(node: LogicalPlan) -> Result<LogicalPlan> {
    match node {
        LogicalPlan::Fork(fork) => fork.surrogate(),
        other => Ok(other),
    }
}

fn combine_filters(node: LogicalPlan) -> Result<LogicalPlan> {
    Ok(match node {
        LogicalPlan::Filter { input, condition } => match *input {
            LogicalPlan::Filter {
                input: inner,
                condition: inner_condition,
            } => LogicalPlan::Filter {
                input: inner,
                condition: inner_condition.and(condition),
            },
            input => LogicalPlan::Filter {
                input: Box::new(input),
                condition,
            },
        },
        other => other,
    })
}

fn conjuncts(expr: Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::And(left, right) => {
            conjuncts(*left, out);
            conjuncts(*right, out);
        }
        other => out.push(other),
    }
}

fn push_match_to_source(node: LogicalPlan) -> Result<LogicalPlan> {
    let (mut relation, condition) = match node {
        LogicalPlan::Filter { input, condition } => match *input {
            LogicalPlan::Relation(relation) => (relation, condition),
            input => {
                return Ok(LogicalPlan::Filter {
                    input: Box::new(input),
                    condition,
                })
            }
        },
        other => return Ok(other),
    };

    let mut parts = vec![];
    conjuncts(condition, &mut parts);
    let mut rest = vec![];
    for part in parts {
        match part {
            Expr::Match { field, query } if relation.attributes.iter().any(|a| a.name == field && !a.synthetic) => {
                let query = FieldQuery::new(field, query);
                if relation.query.is_none() && relation.ranked_docs.is_none() {
                    debug!(index = %relation.index, field = %query.field, "match pushed into relation");
                    relation.query = Some(query);
                } else {
                    debug!(index = %relation.index, field = %query.field, "match pushed into relation as a restriction");
                    relation.restrict(query);
                }
            }
            other => rest.push(other),
        }
    }

    let relation = LogicalPlan::Relation(relation);
    let mut rest = rest.into_iter();
    Ok(match rest.next() {
        None => relation,
        Some(first) => LogicalPlan::Filter {
            input: Box::new(relation),
            condition: rest.fold(first, Expr::and),
        },
    })
}

fn combine_limits(node: LogicalPlan) -> Result<LogicalPlan> {
    let (input, limit) = match node {
        LogicalPlan::Limit { input, limit } => (input, limit),
        other => return Ok(other),
    };
    match *input {
        LogicalPlan::Limit {
            input: inner,
            limit: inner_limit,
        } if limit.foldable() && inner_limit.foldable() => {
            let smaller = limit.fold_to_count()?.min(inner_limit.fold_to_count()?);
            Ok(LogicalPlan::Limit {
                input: inner,
                limit: lit(smaller as i64),
            })
        }
        input => Ok(LogicalPlan::Limit {
            input: Box::new(input),
            limit,
        }),
    }
}

//! The logical plan tree.
//!
//! Plans are immutable value trees. Rewrites consume a tree and build a new
//! one, so a traversal never observes a node that is being replaced.

use std::fmt;

use forkql_proto::Attribute;
use serde::{Deserialize, Serialize};

use super::fork::Fork;
use super::merge::Merge;
use super::phased::Phased;
use super::relation::{LocalRelation, Relation, Retrieve};
use super::rerank::Rerank;
use crate::error::Result;
use crate::expr::Expr;

/// Sort key of an `OrderBy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortOrder {
    /// Key expression.
    pub expr: Expr,
    /// Descending instead of ascending.
    pub descending: bool,
    /// Nulls sort before non-null values.
    pub nulls_first: bool,
}

impl SortOrder {
    /// Ascending, nulls last.
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
            nulls_first: false,
        }
    }

    /// Descending, nulls last.
    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            descending: true,
            nulls_first: false,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = if self.descending { "DESC" } else { "ASC" };
        let nulls = if self.nulls_first { "FIRST" } else { "LAST" };
        write!(f, "{} {direction} NULLS {nulls}", self.expr)
    }
}

/// A logical query plan node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalPlan {
    /// Unresolved index reference.
    Retrieve(Retrieve),
    /// Resolved index relation.
    Relation(Relation),
    /// Pre-materialized rows.
    LocalRelation(LocalRelation),
    /// WHERE.
    Filter {
        input: Box<LogicalPlan>,
        condition: Expr,
    },
    /// SORT.
    OrderBy {
        input: Box<LogicalPlan>,
        orders: Vec<SortOrder>,
    },
    /// LIMIT.
    Limit {
        input: Box<LogicalPlan>,
        limit: Expr,
    },
    /// KEEP.
    Project {
        input: Box<LogicalPlan>,
        columns: Vec<String>,
    },
    /// Branching surrogate, rewritten into `Merge` before execution.
    Fork(Fork),
    /// Recombination of two branches with a discriminator column.
    Merge(Merge),
    /// Two-phase rank fusion.
    Rerank(Rerank),
}

impl LogicalPlan {
    /// Command name as shown in plan output.
    pub fn command_name(&self) -> &'static str {
        match self {
            LogicalPlan::Retrieve(_) => "RETRIEVE",
            LogicalPlan::Relation(_) => "FROM",
            LogicalPlan::LocalRelation(_) => "ROW",
            LogicalPlan::Filter { .. } => "WHERE",
            LogicalPlan::OrderBy { .. } => "SORT",
            LogicalPlan::Limit { .. } => "LIMIT",
            LogicalPlan::Project { .. } => "KEEP",
            LogicalPlan::Fork(_) => "FORK",
            LogicalPlan::Merge(_) => "MERGE",
            LogicalPlan::Rerank(_) => "RERANK",
        }
    }

    /// Stable name of this node's wire form.
    pub fn writeable_name(&self) -> &'static str {
        match self {
            LogicalPlan::Retrieve(_) => "Retrieve",
            LogicalPlan::Relation(_) => "Relation",
            LogicalPlan::LocalRelation(_) => "LocalRelation",
            LogicalPlan::Filter { .. } => "Filter",
            LogicalPlan::OrderBy { .. } => "OrderBy",
            LogicalPlan::Limit { .. } => "Limit",
            LogicalPlan::Project { .. } => "Project",
            LogicalPlan::Fork(_) => "Fork",
            LogicalPlan::Merge(_) => "Merge",
            LogicalPlan::Rerank(_) => "Rerank",
        }
    }

    /// Direct inputs of this node.
    ///
    /// A `Fork` reports its shared input first, then every branch.
    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Retrieve(_) | LogicalPlan::Relation(_) | LogicalPlan::LocalRelation(_) => {
                vec![]
            }
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::OrderBy { input, .. }
            | LogicalPlan::Limit { input, .. }
            | LogicalPlan::Project { input, .. } => vec![input.as_ref()],
            LogicalPlan::Fork(fork) => std::iter::once(fork.input.as_ref())
                .chain(fork.branches.iter())
                .collect(),
            LogicalPlan::Merge(merge) => vec![merge.left.as_ref(), merge.right.as_ref()],
            LogicalPlan::Rerank(rerank) => vec![rerank.input.as_ref()],
        }
    }

    /// Rebuild this node with every child passed through `f`.
    pub fn map_children<F>(self, mut f: F) -> Result<LogicalPlan>
    where
        F: FnMut(LogicalPlan) -> Result<LogicalPlan>,
    {
        let mut boxed = |plan: Box<LogicalPlan>| -> Result<Box<LogicalPlan>> { Ok(Box::new(f(*plan)?)) };
        Ok(match self {
            leaf @ (LogicalPlan::Retrieve(_) | LogicalPlan::Relation(_) | LogicalPlan::LocalRelation(_)) => leaf,
            LogicalPlan::Filter { input, condition } => LogicalPlan::Filter {
                input: boxed(input)?,
                condition,
            },
            LogicalPlan::OrderBy { input, orders } => LogicalPlan::OrderBy {
                input: boxed(input)?,
                orders,
            },
            LogicalPlan::Limit { input, limit } => LogicalPlan::Limit {
                input: boxed(input)?,
                limit,
            },
            LogicalPlan::Project { input, columns } => LogicalPlan::Project {
                input: boxed(input)?,
                columns,
            },
            LogicalPlan::Fork(fork) => {
                let input = boxed(fork.input)?;
                let branches = fork
                    .branches
                    .into_iter()
                    .map(|b| boxed(Box::new(b)).map(|b| *b))
                    .collect::<Result<Vec<_>>>()?;
                LogicalPlan::Fork(Fork {
                    input,
                    branches,
                    discriminator: fork.discriminator,
                })
            }
            LogicalPlan::Merge(merge) => LogicalPlan::Merge(Merge {
                left: boxed(merge.left)?,
                right: boxed(merge.right)?,
                discriminator: merge.discriminator,
            }),
            LogicalPlan::Rerank(rerank) => LogicalPlan::Rerank(Rerank {
                input: boxed(rerank.input)?,
                ..rerank
            }),
        })
    }

    /// Rewrite bottom-up: children first, then the node itself.
    pub fn transform_up<F>(self, f: &mut F) -> Result<LogicalPlan>
    where
        F: FnMut(LogicalPlan) -> Result<LogicalPlan>,
    {
        let node = self.map_children(|child| child.transform_up(f))?;
        f(node)
    }

    /// Rewrite top-down: the node first, then its (possibly new) children.
    pub fn transform_down<F>(self, f: &mut F) -> Result<LogicalPlan>
    where
        F: FnMut(LogicalPlan) -> Result<LogicalPlan>,
    {
        f(self)?.map_children(|child| child.transform_down(f))
    }

    /// Visit every node bottom-up.
    pub fn for_each_up<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a LogicalPlan),
    {
        for child in self.children() {
            child.for_each_up(f);
        }
        f(self);
    }

    /// Whether any node satisfies `predicate`.
    pub fn any<F>(&self, mut predicate: F) -> bool
    where
        F: FnMut(&LogicalPlan) -> bool,
    {
        let mut found = false;
        self.for_each_up(&mut |node| found = found || predicate(node));
        found
    }

    /// Output columns of this node.
    pub fn output(&self) -> Vec<Attribute> {
        match self {
            LogicalPlan::Retrieve(retrieve) => retrieve.output(),
            LogicalPlan::Relation(relation) => relation.attributes.clone(),
            LogicalPlan::LocalRelation(local) => local.schema.clone(),
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::OrderBy { input, .. }
            | LogicalPlan::Limit { input, .. } => input.output(),
            LogicalPlan::Project { input, columns } => {
                let input_output = input.output();
                columns
                    .iter()
                    .map(|name| {
                        input_output
                            .iter()
                            .find(|a| &a.name == name)
                            .cloned()
                            .unwrap_or_else(|| Attribute::unresolved(name.clone()))
                    })
                    .collect()
            }
            LogicalPlan::Fork(fork) => fork.output(),
            LogicalPlan::Merge(merge) => merge.output(),
            LogicalPlan::Rerank(rerank) => rerank.input.output(),
        }
    }

    /// Whether this node and everything below it is resolved.
    pub fn resolved(&self) -> bool {
        match self {
            LogicalPlan::Retrieve(_) => false,
            LogicalPlan::Relation(relation) => relation.attributes.iter().all(Attribute::resolved),
            LogicalPlan::LocalRelation(local) => local.schema.iter().all(Attribute::resolved),
            LogicalPlan::Filter { input, condition } => {
                input.resolved() && condition.data_type(&input.output()).is_ok()
            }
            LogicalPlan::OrderBy { input, orders } => {
                let schema = input.output();
                input.resolved() && orders.iter().all(|o| o.expr.data_type(&schema).is_ok())
            }
            LogicalPlan::Limit { input, limit } => input.resolved() && limit.foldable(),
            LogicalPlan::Project { input, .. } => {
                input.resolved() && self.output().iter().all(Attribute::resolved)
            }
            LogicalPlan::Fork(fork) => fork.resolved(),
            LogicalPlan::Merge(merge) => merge.resolved(),
            LogicalPlan::Rerank(rerank) => rerank.resolved(),
        }
    }

    /// The Phased capability of this node, if it has one.
    pub fn as_phased(&self) -> Option<&dyn Phased> {
        match self {
            LogicalPlan::Rerank(rerank) => Some(rerank),
            _ => None,
        }
    }

    fn node_string(&self) -> String {
        match self {
            LogicalPlan::Retrieve(retrieve) => match &retrieve.query {
                Some(q) => format!("Retrieve[{}][{}:\"{}\"]", retrieve.index, q.field, q.query),
                None => format!("Retrieve[{}]", retrieve.index),
            },
            LogicalPlan::Relation(relation) => {
                let mut s = format!("Relation[{}]{}", relation.index, attribute_list(&relation.attributes));
                if let Some(q) = &relation.query {
                    s.push_str(&format!("[{}:\"{}\"]", q.field, q.query));
                }
                for q in &relation.filters {
                    s.push_str(&format!("[filter {}:\"{}\"]", q.field, q.query));
                }
                if let Some(docs) = &relation.ranked_docs {
                    s.push_str(&format!("[ranked={}]", docs.len()));
                }
                s
            }
            LogicalPlan::LocalRelation(local) => {
                format!("LocalRelation{}[rows={}]", attribute_list(&local.schema), local.rows.len())
            }
            LogicalPlan::Filter { condition, .. } => format!("Filter[{condition}]"),
            LogicalPlan::OrderBy { orders, .. } => {
                let keys: Vec<String> = orders.iter().map(ToString::to_string).collect();
                format!("OrderBy[{}]", keys.join(", "))
            }
            LogicalPlan::Limit { limit, .. } => format!("Limit[{limit}]"),
            LogicalPlan::Project { columns, .. } => format!("Project[{}]", columns.join(", ")),
            LogicalPlan::Fork(fork) => {
                format!("Fork[branches={}][{}]", fork.branches.len(), fork.discriminator)
            }
            LogicalPlan::Merge(merge) => format!("Merge[{}]", merge.discriminator),
            LogicalPlan::Rerank(rerank) => format!(
                "Rerank[{}][{} | {}]",
                rerank.limit, rerank.first_query, rerank.second_query
            ),
        }
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        if depth > 0 {
            write!(f, "{}\\_", "  ".repeat(depth - 1))?;
        }
        writeln!(f, "{}", self.node_string())?;
        match self {
            // the shared input is already part of every branch
            LogicalPlan::Fork(fork) => {
                for branch in &fork.branches {
                    branch.fmt_tree(f, depth + 1)?;
                }
            }
            _ => {
                for child in self.children() {
                    child.fmt_tree(f, depth + 1)?;
                }
            }
        }
        Ok(())
    }
}

fn attribute_list(attributes: &[Attribute]) -> String {
    let names: Vec<String> = attributes.iter().map(ToString::to_string).collect();
    format!("[{}]", names.join(", "))
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

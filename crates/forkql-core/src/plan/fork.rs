//! The FORK surrogate.

use forkql_proto::Attribute;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::merge::{branch_data_output, shared_columns, Merge};
use super::node::LogicalPlan;
use crate::error::{Error, Result};

/// Runs one input through several independent branch pipelines.
///
/// Each branch is a full plan whose leaf-most subtree is its own copy of
/// `input`. A fork is never executed; [`Fork::surrogate`] rewrites it into a
/// left-deep chain of [`Merge`] nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fork {
    /// Shared upstream input.
    pub input: Box<LogicalPlan>,
    /// Branch plans in declaration order.
    pub branches: Vec<LogicalPlan>,
    /// Keyword column tagging each row with its branch.
    pub discriminator: Attribute,
}

impl Fork {
    pub fn new(input: LogicalPlan, branches: Vec<LogicalPlan>, discriminator: Attribute) -> Self {
        Self {
            input: Box::new(input),
            branches,
            discriminator,
        }
    }

    /// Replace the shared input, and every branch's copy of it.
    pub fn replace_child(self, new_child: LogicalPlan) -> Result<Fork> {
        let old_child = *self.input;
        let branches = self
            .branches
            .into_iter()
            .map(|branch| replace_subtree(branch, &old_child, &new_child))
            .collect::<Result<Vec<_>>>()?;
        Ok(Fork {
            input: Box::new(new_child),
            branches,
            discriminator: self.discriminator,
        })
    }

    /// A fork is resolved once it has at least two branches, all of them
    /// resolved, and a resolved discriminator.
    pub fn resolved(&self) -> bool {
        self.branches.len() >= 2
            && self.input.resolved()
            && self.branches.iter().all(LogicalPlan::resolved)
            && self.discriminator.resolved()
    }

    /// Output of the merge this fork rewrites into.
    pub fn output(&self) -> Vec<Attribute> {
        if self.branches.len() < 2 {
            return vec![self.discriminator.clone()];
        }
        let mut output = self
            .branches
            .iter()
            .map(|branch| branch_data_output(branch, &self.discriminator))
            .reduce(|left, right| shared_columns(&left, right))
            .unwrap_or_default();
        output.push(self.discriminator.clone());
        output
    }

    /// Left-fold the branches into pairwise merges:
    /// `Merge(Merge(b0, b1), b2) ...`.
    pub fn surrogate(self) -> Result<LogicalPlan> {
        if self.branches.len() < 2 {
            return Err(Error::resolution(format!(
                "FORK requires at least two branches, found [{}]",
                self.branches.len()
            )));
        }
        let branch_count = self.branches.len();
        let discriminator = self.discriminator;
        let mut branches = self.branches.into_iter();
        let mut merged = branches
            .next()
            .ok_or_else(|| Error::resolution("FORK has no branches"))?;
        for branch in branches {
            merged = LogicalPlan::Merge(Merge::new(merged, branch, discriminator.clone()));
        }
        debug!(branches = branch_count, discriminator = %discriminator.name, "fork rewritten into merge");
        Ok(merged)
    }
}

fn replace_subtree(plan: LogicalPlan, old: &LogicalPlan, new: &LogicalPlan) -> Result<LogicalPlan> {
    if &plan == old {
        return Ok(new.clone());
    }
    plan.map_children(|child| replace_subtree(child, old, new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit, matches};
    use crate::plan::relation::Relation;
    use forkql_proto::DataType;

    fn relation(index: &str) -> LogicalPlan {
        LogicalPlan::Relation(Relation::new(
            index,
            vec![
                Attribute::new("id", DataType::Integer),
                Attribute::new("content", DataType::Text),
            ],
        ))
    }

    fn branch(input: &LogicalPlan, query: &str) -> LogicalPlan {
        LogicalPlan::Filter {
            input: Box::new(input.clone()),
            condition: matches("content", query),
        }
    }

    fn fork(branch_count: usize) -> Fork {
        let input = relation("test");
        let branches = (0..branch_count).map(|i| branch(&input, &format!("q{i}"))).collect();
        Fork::new(input, branches, Attribute::discriminator("_fork"))
    }

    #[test]
    fn test_surrogate_left_folds() {
        let plan = fork(3).surrogate().unwrap();
        let LogicalPlan::Merge(outer) = &plan else {
            panic!("expected merge, got {plan}");
        };
        assert!(matches!(outer.left.as_ref(), LogicalPlan::Merge(_)));
        assert_eq!(outer.branches().len(), 3);
        let names: Vec<String> = plan.output().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["id", "content", "_fork"]);
    }

    #[test]
    fn test_output_matches_surrogate() {
        let input = relation("test");
        let narrow = LogicalPlan::Project {
            input: Box::new(input.clone()),
            columns: vec!["content".to_string()],
        };
        let fork = Fork::new(
            input.clone(),
            vec![branch(&input, "a"), narrow, branch(&input, "b")],
            Attribute::discriminator("_fork"),
        );
        let names: Vec<String> = fork.output().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["content", "_fork"]);
        assert_eq!(fork.output(), fork.surrogate().unwrap().output());
    }

    #[test]
    fn test_single_branch_is_rejected() {
        let err = fork(1).surrogate().unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
        assert!(!fork(1).resolved());
        assert!(fork(2).resolved());
    }

    #[test]
    fn test_replace_child_updates_every_branch() {
        let new_input = LogicalPlan::Filter {
            input: Box::new(relation("test")),
            condition: col("id").gt(lit(2)),
        };
        let replaced = fork(2).replace_child(new_input.clone()).unwrap();
        assert_eq!(*replaced.input, new_input);
        for branch in &replaced.branches {
            assert_eq!(branch.children()[0], &new_input);
        }
    }

    #[test]
    fn test_replace_child_leaves_branches_independent() {
        let mut fork = fork(2);
        fork.branches[1] = LogicalPlan::Limit {
            input: Box::new(fork.branches[1].clone()),
            limit: lit(1),
        };
        let replaced = fork.replace_child(relation("other")).unwrap();
        assert_eq!(replaced.branches[0].command_name(), "WHERE");
        assert_eq!(replaced.branches[1].command_name(), "LIMIT");
    }
}

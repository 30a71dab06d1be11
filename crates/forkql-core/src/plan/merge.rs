//! Binary recombination of fork branches.

use forkql_proto::Attribute;
use serde::{Deserialize, Serialize};

use super::node::LogicalPlan;

/// Combines the rows of two branches and tags each row with the branch it
/// came from. Left-deep chains of merges represent n-ary forks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merge {
    pub left: Box<LogicalPlan>,
    pub right: Box<LogicalPlan>,
    /// Keyword column carrying `fork<N>` for each row.
    pub discriminator: Attribute,
}

impl Merge {
    pub fn new(left: LogicalPlan, right: LogicalPlan, discriminator: Attribute) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
            discriminator,
        }
    }

    /// Right-side columns that have a same-named, same-typed left column,
    /// in right-side order, followed by the discriminator.
    ///
    /// Nested merges on the left contribute their data columns but never
    /// their discriminator.
    pub fn output(&self) -> Vec<Attribute> {
        let left = branch_data_output(&self.left, &self.discriminator);
        let right = branch_data_output(&self.right, &self.discriminator);
        let mut output = shared_columns(&left, right);
        output.push(self.discriminator.clone());
        output
    }

    /// Data columns shared by both sides, without the discriminator.
    pub fn data_output(&self) -> Vec<Attribute> {
        let mut attrs = self.output();
        attrs.pop();
        attrs
    }

    /// Branch plans in branch order, flattening a left-deep chain.
    pub fn branches(&self) -> Vec<&LogicalPlan> {
        let mut branches = match self.left.as_ref() {
            LogicalPlan::Merge(inner) if inner.discriminator.name == self.discriminator.name => {
                inner.branches()
            }
            left => vec![left],
        };
        branches.push(self.right.as_ref());
        branches
    }

    pub fn resolved(&self) -> bool {
        self.left.resolved() && self.right.resolved() && self.discriminator.resolved()
    }
}

/// Output of one merged branch without the discriminator a nested merge of
/// the same chain adds.
pub(super) fn branch_data_output(plan: &LogicalPlan, discriminator: &Attribute) -> Vec<Attribute> {
    match plan {
        LogicalPlan::Merge(inner) if inner.discriminator.name == discriminator.name => {
            let mut attrs = inner.output();
            attrs.pop();
            attrs
        }
        other => other.output(),
    }
}

/// Columns of `right` that `left` has with the same name and type, in
/// `right` order.
pub(super) fn shared_columns(left: &[Attribute], right: Vec<Attribute>) -> Vec<Attribute> {
    right
        .into_iter()
        .filter(|ra| left.iter().any(|la| la.same_column(ra)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::relation::LocalRelation;
    use forkql_proto::DataType;

    fn local(attrs: Vec<Attribute>) -> LogicalPlan {
        LogicalPlan::LocalRelation(LocalRelation::empty(attrs))
    }

    #[test]
    fn test_output_intersects_in_right_order() {
        let left = local(vec![
            Attribute::new("id", DataType::Integer),
            Attribute::new("content", DataType::Text),
            Attribute::new("extra", DataType::Long),
        ]);
        let right = local(vec![
            Attribute::new("content", DataType::Text),
            Attribute::new("id", DataType::Integer),
        ]);
        let merge = Merge::new(left, right, Attribute::discriminator("_fork"));
        let names: Vec<String> = merge.output().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["content", "id", "_fork"]);
    }

    #[test]
    fn test_type_mismatch_is_excluded() {
        let left = local(vec![Attribute::new("id", DataType::Integer)]);
        let right = local(vec![Attribute::new("id", DataType::Keyword)]);
        let merge = Merge::new(left, right, Attribute::discriminator("_fork"));
        assert_eq!(merge.output(), vec![Attribute::discriminator("_fork")]);
    }

    #[test]
    fn test_nested_merge_branches() {
        let attrs = vec![Attribute::new("id", DataType::Integer)];
        let disc = Attribute::discriminator("_fork");
        let inner = Merge::new(local(attrs.clone()), local(attrs.clone()), disc.clone());
        let outer = Merge::new(LogicalPlan::Merge(inner), local(attrs), disc);
        assert_eq!(outer.branches().len(), 3);
        let names: Vec<String> = outer.output().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["id", "_fork"]);
    }
}

//! Resolution and verification of logical plans.

use forkql_proto::{Attribute, DataType, METADATA_ID, METADATA_INDEX};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::plan::{Fork, LogicalPlan, Merge, PlanState, Relation, Rerank, Retrieve};
use crate::retrieval::RetrievalService;

/// Resolves index references and planner-synthesized columns, then verifies
/// the whole tree.
pub struct Analyzer<'a> {
    service: &'a dyn RetrievalService,
    config: &'a EngineConfig,
}

impl<'a> Analyzer<'a> {
    pub fn new(service: &'a dyn RetrievalService, config: &'a EngineConfig) -> Self {
        Self { service, config }
    }

    /// Resolve and verify an unresolved plan.
    pub fn analyze(&self, state: PlanState) -> Result<PlanState> {
        let plan = state.plan().clone().transform_up(&mut |node| self.resolve(node))?;
        verify(&plan)?;
        debug!(root = plan.command_name(), "plan analyzed");
        Ok(state.analyzed(plan))
    }

    fn resolve(&self, node: LogicalPlan) -> Result<LogicalPlan> {
        Ok(match node {
            LogicalPlan::Retrieve(retrieve) => LogicalPlan::Relation(self.resolve_retrieve(retrieve)?),
            LogicalPlan::Fork(fork) if !fork.discriminator.resolved() => LogicalPlan::Fork(Fork {
                discriminator: Attribute::discriminator(self.config.discriminator.clone()),
                ..fork
            }),
            LogicalPlan::Rerank(rerank) if rerank.rank_constant.is_none() => {
                LogicalPlan::Rerank(rerank.with_rank_constant(self.config.rank_constant))
            }
            other => other,
        })
    }

    fn resolve_retrieve(&self, retrieve: Retrieve) -> Result<Relation> {
        let mut attributes = self.service.index_schema(&retrieve.index)?;
        for name in &retrieve.metadata {
            let attribute = Attribute::metadata(name).ok_or_else(|| {
                Error::resolution(format!("unknown metadata field [{name}] on index [{}]", retrieve.index))
            })?;
            if !attributes.iter().any(|a| a.name == attribute.name) {
                attributes.push(attribute);
            }
        }
        if let Some(query) = &retrieve.query {
            if !attributes.iter().any(|a| a.name == query.field && !a.synthetic) {
                return Err(Error::resolution(format!(
                    "Unknown column [{}] in retrieval on index [{}]",
                    query.field, retrieve.index
                )));
            }
        }
        Ok(Relation {
            index: retrieve.index,
            attributes,
            query: retrieve.query,
            filters: vec![],
            knn: retrieve.knn.unwrap_or_else(|| self.config.knn.clone()),
            ranked_docs: None,
        })
    }
}

/// Check every node, children first. The first failure aborts the query.
pub fn verify(plan: &LogicalPlan) -> Result<()> {
    for child in plan.children() {
        verify(child)?;
    }
    match plan {
        LogicalPlan::Retrieve(retrieve) => Err(Error::resolution(format!(
            "index [{}] is unresolved",
            retrieve.index
        ))),
        LogicalPlan::Relation(_) | LogicalPlan::LocalRelation(_) => Ok(()),
        LogicalPlan::Filter { input, condition } => {
            let data_type = condition.data_type(&input.output())?;
            if data_type != DataType::Boolean {
                return Err(Error::resolution(format!(
                    "condition [{condition}] must be [{}], found [{data_type}]",
                    DataType::Boolean
                )));
            }
            Ok(())
        }
        LogicalPlan::OrderBy { input, orders } => {
            let schema = input.output();
            for order in orders {
                order.expr.data_type(&schema)?;
            }
            Ok(())
        }
        LogicalPlan::Limit { limit, .. } => limit.fold_to_count().map(|_| ()),
        LogicalPlan::Project { input, columns } => {
            let schema = input.output();
            for column in columns {
                if !schema.iter().any(|a| &a.name == column) {
                    return Err(Error::resolution(format!("Unknown column [{column}] in KEEP")));
                }
            }
            Ok(())
        }
        LogicalPlan::Fork(fork) => verify_fork(fork),
        LogicalPlan::Merge(merge) => verify_merge(merge),
        LogicalPlan::Rerank(rerank) => verify_rerank(rerank),
    }
}

fn verify_discriminator(discriminator: &Attribute, branches: &[&LogicalPlan]) -> Result<()> {
    if discriminator.data_type != DataType::Keyword {
        return Err(Error::resolution(format!(
            "discriminator [{discriminator}] must be a keyword column"
        )));
    }
    for (index, branch) in branches.iter().enumerate() {
        if branch.output().iter().any(|a| a.name == discriminator.name) {
            return Err(Error::resolution(format!(
                "branch [{index}] already has a column named [{}]",
                discriminator.name
            )));
        }
    }
    Ok(())
}

fn verify_branch_types(branches: &[&LogicalPlan]) -> Result<()> {
    let outputs: Vec<Vec<Attribute>> = branches.iter().map(|b| b.output()).collect();
    let Some((first, rest)) = outputs.split_first() else {
        return Ok(());
    };
    for (offset, output) in rest.iter().enumerate() {
        for attr in output {
            if let Some(other) = first.iter().find(|a| a.name == attr.name && a.data_type != attr.data_type) {
                return Err(Error::resolution(format!(
                    "column [{}] has type [{}] in branch [0] and type [{}] in branch [{}]",
                    attr.name,
                    other.data_type,
                    attr.data_type,
                    offset + 1
                )));
            }
        }
    }
    Ok(())
}

fn verify_fork(fork: &Fork) -> Result<()> {
    if fork.branches.len() < 2 {
        return Err(Error::resolution(format!(
            "FORK requires at least two branches, found [{}]",
            fork.branches.len()
        )));
    }
    let branches: Vec<&LogicalPlan> = fork.branches.iter().collect();
    verify_discriminator(&fork.discriminator, &branches)?;
    verify_branch_types(&branches)
}

fn verify_merge(merge: &Merge) -> Result<()> {
    let branches = merge.branches();
    verify_discriminator(&merge.discriminator, &branches)?;
    verify_branch_types(&branches)
}

fn verify_rerank(rerank: &Rerank) -> Result<()> {
    rerank.limit.fold_to_count()?;
    let schema = rerank.input.output();
    for query in [&rerank.first_query, &rerank.second_query] {
        let data_type = query.data_type(&schema)?;
        if data_type != DataType::Boolean {
            return Err(Error::resolution(format!(
                "rerank query [{query}] must be [{}], found [{data_type}]",
                DataType::Boolean
            )));
        }
    }
    if !rerank.input.any(|n| matches!(n, LogicalPlan::Relation(_)))
        || rerank.input.any(|n| matches!(n, LogicalPlan::LocalRelation(_)))
    {
        return Err(Error::resolution(
            "RERANK can only restrict documents read from an index; its input has local rows",
        ));
    }
    for required in [METADATA_ID, METADATA_INDEX] {
        if !schema.iter().any(|a| a.name == required) {
            return Err(Error::resolution(format!(
                "RERANK requires the [{required}] metadata column on its input"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit, matches};
    use crate::plan::PlanBuilder;
    use crate::retrieval::MemoryIndex;

    fn service() -> MemoryIndex {
        let memory = MemoryIndex::new();
        memory.create_index(
            "test",
            vec![
                Attribute::new("id", DataType::Integer),
                Attribute::new("content", DataType::Text),
            ],
        );
        memory
    }

    fn analyze(plan: LogicalPlan) -> Result<LogicalPlan> {
        let service = service();
        let config = EngineConfig::default();
        Analyzer::new(&service, &config)
            .analyze(PlanState::new(plan))
            .map(PlanState::into_plan)
    }

    fn retrieve() -> PlanBuilder {
        PlanBuilder::retrieve(Retrieve::new("test").with_metadata(["_id", "_index"]))
    }

    #[test]
    fn test_retrieve_resolves_to_relation() {
        let plan = analyze(retrieve().build()).unwrap();
        let LogicalPlan::Relation(relation) = &plan else {
            panic!("expected relation, got {plan}");
        };
        let names: Vec<&str> = relation.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["id", "content", "_id", "_index"]);
        assert_eq!(relation.knn, EngineConfig::default().knn);
    }

    #[test]
    fn test_unknown_index_and_metadata() {
        let err = analyze(PlanBuilder::retrieve(Retrieve::new("nope")).build()).unwrap_err();
        assert!(err.to_string().contains("Unknown index [nope]"));
        let err = analyze(PlanBuilder::retrieve(Retrieve::new("test").with_metadata(["_version"])).build())
            .unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[test]
    fn test_fork_discriminator_synthesized() {
        let plan = retrieve()
            .fork(|input| vec![input.clone().filter(matches("content", "fox")), input])
            .keep(["id", "_fork"])
            .build();
        let plan = analyze(plan).unwrap();
        assert_eq!(
            plan.output(),
            vec![Attribute::new("id", DataType::Integer), Attribute::discriminator("_fork")]
        );
    }

    #[test]
    fn test_fork_needs_two_branches() {
        let plan = retrieve().fork(|input| vec![input]).build();
        let err = analyze(plan).unwrap_err();
        assert!(err.to_string().contains("at least two branches"));
    }

    #[test]
    fn test_fork_branch_type_mismatch() {
        let local = |data_type| {
            PlanBuilder::local(crate::plan::LocalRelation::empty(vec![Attribute::new("x", data_type)])).build()
        };
        let fork = Fork::new(
            local(DataType::Integer),
            vec![local(DataType::Integer), local(DataType::Keyword)],
            Attribute::discriminator("_fork"),
        );
        let err = analyze(LogicalPlan::Fork(fork)).unwrap_err();
        assert!(err.to_string().contains("column [x] has type"));
    }

    #[test]
    fn test_rerank_checks() {
        let plan = retrieve()
            .rerank(5, matches("content", "fox"), matches("content", "dog"))
            .build();
        let LogicalPlan::Rerank(rerank) = analyze(plan).unwrap() else {
            panic!("expected rerank");
        };
        assert_eq!(rerank.rank_constant, Some(60.0));

        let no_metadata = PlanBuilder::retrieve(Retrieve::new("test"))
            .rerank(5, matches("content", "fox"), matches("content", "dog"))
            .build();
        assert!(analyze(no_metadata).unwrap_err().to_string().contains("[_id]"));

        let LogicalPlan::Rerank(mut rerank) = retrieve()
            .rerank(5, matches("content", "fox"), matches("content", "dog"))
            .build()
        else {
            panic!("expected rerank");
        };
        rerank.limit = col("id");
        assert!(analyze(LogicalPlan::Rerank(rerank)).unwrap_err().to_string().contains("foldable"));
    }

    #[test]
    fn test_rerank_over_local_rows_is_rejected() {
        let local = crate::plan::LocalRelation::empty(vec![
            Attribute::metadata(METADATA_ID).unwrap(),
            Attribute::metadata(METADATA_INDEX).unwrap(),
            Attribute::new("content", DataType::Text),
        ]);
        let plan = PlanBuilder::local(local)
            .rerank(5, matches("content", "fox"), matches("content", "dog"))
            .build();
        let err = analyze(plan).unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
        assert!(err.to_string().contains("local rows"));
    }

    #[test]
    fn test_filter_must_be_boolean() {
        let err = analyze(retrieve().filter(col("id")).build()).unwrap_err();
        assert!(err.to_string().contains("must be [boolean]"));
        assert!(analyze(retrieve().filter(col("id").gt(lit(1))).build()).is_ok());
        assert!(analyze(retrieve().keep(["missing"]).build()).is_err());
    }
}

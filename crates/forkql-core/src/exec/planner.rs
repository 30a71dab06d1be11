//! Physical planning: turns an optimized logical plan into driver pipelines.

use std::sync::Arc;
use std::thread;

use forkql_proto::{Attribute, ColumnInfo, DataType, ResultSet};
use tracing::debug;

use super::driver::{Driver, DriverContext};
use super::filter::FilterOperator;
use super::limit::LimitOperator;
use super::merge::{BranchMergeOperator, LocalSupplier};
use super::operator::{source, Operator};
use super::project::ProjectOperator;
use super::sort::{SortKey, SortOperator};
use super::source::{LocalSource, RelationSource};
use crate::block::Page;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::plan::{LogicalPlan, Merge, PhaseResult, Relation};
use crate::retrieval::{RetrievalService, SearchQuery, SearchRequest};

/// Materialized output of a plan.
#[derive(Debug)]
pub struct QueryResult {
    /// Output columns, matching the plan's output.
    pub schema: Vec<Attribute>,
    /// Pages in production order.
    pub pages: Vec<Page>,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.pages.iter().map(Page::position_count).sum()
    }

    /// Copy the rows into a result set and release the pages.
    pub fn into_result_set(self) -> ResultSet {
        let mut result = ResultSet::new(
            self.schema
                .iter()
                .map(|a| ColumnInfo::new(a.name.clone(), a.data_type))
                .collect(),
        );
        for page in self.pages {
            for position in 0..page.position_count() {
                result.push_row(page.row(position));
            }
            page.release();
        }
        result
    }

    /// Hand the pages over as the result of a first phase.
    pub fn into_phase_result(self) -> PhaseResult {
        PhaseResult::new(self.schema, self.pages)
    }

    pub fn release(self) {
        for page in self.pages {
            page.release();
        }
    }
}

struct Pipeline {
    operators: Vec<Box<dyn Operator>>,
    layout: Vec<Attribute>,
}

impl Pipeline {
    fn push(mut self, operator: Box<dyn Operator>) -> Self {
        self.operators.push(operator);
        self
    }

    fn column_indices(&self, target: &[Attribute]) -> Result<Vec<usize>> {
        target
            .iter()
            .map(|attr| {
                self.layout.iter().position(|a| a.name == attr.name).ok_or_else(|| {
                    Error::execution(format!("column [{}] is missing from the pipeline layout", attr.name))
                })
            })
            .collect()
    }

    /// Reshape the output to exactly `target`, by column name.
    fn project_to(self, target: &[Attribute]) -> Result<Pipeline> {
        let same = self.layout.len() == target.len()
            && self.layout.iter().zip(target).all(|(a, b)| a.name == b.name);
        if same {
            return Ok(self);
        }
        let columns = self.column_indices(target)?;
        Ok(Pipeline {
            layout: target.to_vec(),
            ..self.push(Box::new(ProjectOperator::new(columns)))
        })
    }
}

/// Builds and runs pipelines on the local node.
pub struct LocalExecutionPlanner {
    service: Arc<dyn RetrievalService>,
    config: EngineConfig,
    context: DriverContext,
}

impl LocalExecutionPlanner {
    pub fn new(service: Arc<dyn RetrievalService>, config: EngineConfig, context: DriverContext) -> Self {
        Self {
            service,
            config,
            context,
        }
    }

    /// Run a plan to completion.
    ///
    /// The plan must be free of surrogate and Phased nodes.
    pub fn execute(&self, plan: &LogicalPlan) -> Result<QueryResult> {
        let schema = plan.output();
        let pipeline = self.plan(plan)?.project_to(&schema)?;
        let pages = Driver::new(self.context.clone(), pipeline.operators).run()?;
        Ok(QueryResult { schema, pages })
    }

    fn plan(&self, plan: &LogicalPlan) -> Result<Pipeline> {
        match plan {
            LogicalPlan::Relation(relation) => Ok(self.plan_relation(relation)),
            LogicalPlan::LocalRelation(local) => {
                let types: Vec<DataType> = local.schema.iter().map(|a| a.data_type).collect();
                let operator = LocalSource::new(
                    types,
                    local.rows.clone(),
                    self.context.factory.clone(),
                    self.config.page_size,
                );
                Ok(Pipeline {
                    operators: vec![source(operator)],
                    layout: local.schema.clone(),
                })
            }
            LogicalPlan::Filter { input, condition } => {
                let pipeline = self.plan(input)?;
                let bound = condition.bind(&pipeline.layout)?;
                Ok(pipeline.push(Box::new(FilterOperator::new(bound))))
            }
            LogicalPlan::OrderBy { input, orders } => {
                let pipeline = self.plan(input)?;
                let keys = orders
                    .iter()
                    .map(|order| {
                        Ok(SortKey {
                            expr: order.expr.bind(&pipeline.layout)?,
                            descending: order.descending,
                            nulls_first: order.nulls_first,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let operator = SortOperator::new(keys, self.context.factory.clone(), self.config.page_size);
                Ok(pipeline.push(Box::new(operator)))
            }
            LogicalPlan::Limit { input, limit } => {
                let count = limit.fold_to_count()?;
                Ok(self.plan(input)?.push(Box::new(LimitOperator::new(count))))
            }
            LogicalPlan::Project { input, .. } => self.plan(input)?.project_to(&plan.output()),
            LogicalPlan::Merge(merge) => self.plan_merge(merge),
            LogicalPlan::Retrieve(retrieve) => Err(Error::execution(format!(
                "index [{}] was never resolved",
                retrieve.index
            ))),
            LogicalPlan::Fork(_) => Err(Error::execution("FORK must be rewritten into MERGE before execution")),
            LogicalPlan::Rerank(_) => Err(Error::execution("RERANK must complete its phases before execution")),
        }
    }

    fn plan_relation(&self, relation: &Relation) -> Pipeline {
        let mut request = SearchRequest::all(relation.index.clone());
        if let Some(docs) = &relation.ranked_docs {
            request = request.with_ranked_docs(docs.clone());
        }
        if let Some(query) = &relation.query {
            request = request.with_query(SearchQuery::build(&query.field, &query.query, &relation.knn));
        }
        for filter in &relation.filters {
            request = request.with_filter(SearchQuery::build(&filter.field, &filter.query, &relation.knn));
        }
        let operator = RelationSource::new(
            Arc::clone(&self.service),
            request,
            relation.attributes.clone(),
            self.context.factory.clone(),
            self.config.page_size,
        );
        let mut layout = Vec::with_capacity(relation.attributes.len() + 1);
        layout.push(Attribute::doc());
        layout.extend(relation.attributes.iter().cloned());
        Pipeline {
            operators: vec![source(operator)],
            layout,
        }
    }

    fn plan_merge(&self, merge: &Merge) -> Result<Pipeline> {
        let branches = merge.branches();
        let data_output = merge.data_output();
        let Some((live, supplied)) = branches.split_first() else {
            return Err(Error::execution("MERGE without branches"));
        };

        let suppliers = self.materialize_branches(supplied, &data_output)?;
        let pipeline = self.plan(live)?;

        let doc_then_output = pipeline.layout.len() == data_output.len() + 1
            && pipeline.layout[0].data_type == DataType::Doc
            && pipeline.layout[1..].iter().zip(&data_output).all(|(a, b)| a.name == b.name);
        let projection = if doc_then_output {
            None
        } else {
            Some(pipeline.column_indices(&data_output)?)
        };

        let mut layout = data_output;
        layout.push(merge.discriminator.clone());
        let operator = BranchMergeOperator::new(suppliers, projection, self.context.factory.clone());
        Ok(Pipeline {
            layout,
            ..pipeline.push(Box::new(operator))
        })
    }

    /// Run branches `1..` to completion. Branch `i` of `branches` is fork
    /// branch `i + 1`.
    fn materialize_branches(&self, branches: &[&LogicalPlan], output: &[Attribute]) -> Result<Vec<LocalSupplier>> {
        let run = |offset: usize, branch: &LogicalPlan| -> Result<LocalSupplier> {
            let index = offset + 1;
            let pipeline = self.plan(branch)?.project_to(output)?;
            let pages = Driver::new(self.context.clone(), pipeline.operators).run()?;
            debug!(branch = index, pages = pages.len(), "branch materialized");
            Ok(LocalSupplier::new(index, pages))
        };

        let results: Vec<Result<LocalSupplier>> = if self.config.parallel_branches && branches.len() > 1 {
            let run = &run;
            thread::scope(|scope| {
                let handles: Vec<_> = branches
                    .iter()
                    .enumerate()
                    .map(|(offset, branch)| scope.spawn(move || run(offset, *branch)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                    .collect()
            })
        } else {
            branches
                .iter()
                .enumerate()
                .map(|(offset, branch)| run(offset, *branch))
                .collect()
        };
        // on error the suppliers built so far drop and release their pages
        results.into_iter().collect()
    }
}

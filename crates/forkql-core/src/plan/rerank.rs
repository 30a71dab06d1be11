//! Reciprocal rank fusion of two retrieval passes.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use forkql_proto::{Attribute, RankDoc, Value, METADATA_ID, METADATA_INDEX};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::node::LogicalPlan;
use super::phased::{PhaseResult, Phased};
use super::relation::FieldQuery;
use crate::config::DEFAULT_RANK_CONSTANT;
use crate::error::{Error, Result};
use crate::expr::Expr;

/// Runs two filtered, limited passes over `input` and restricts `input` to
/// the top `limit` documents by fused reciprocal rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rerank {
    pub input: Box<LogicalPlan>,
    /// Window size; must fold to a non-negative integer.
    pub limit: Expr,
    pub first_query: Expr,
    pub second_query: Expr,
    /// Fusion constant K. Filled from the engine configuration when unset.
    pub rank_constant: Option<f32>,
}

impl Rerank {
    pub fn new(input: LogicalPlan, limit: Expr, first_query: Expr, second_query: Expr) -> Self {
        Self {
            input: Box::new(input),
            limit,
            first_query,
            second_query,
            rank_constant: None,
        }
    }

    pub fn with_rank_constant(mut self, rank_constant: f32) -> Self {
        self.rank_constant = Some(rank_constant);
        self
    }

    /// Effective fusion constant.
    pub fn rank_constant(&self) -> f32 {
        self.rank_constant.unwrap_or(DEFAULT_RANK_CONSTANT)
    }

    pub fn resolved(&self) -> bool {
        let schema = self.input.output();
        self.input.resolved()
            && self.limit.foldable()
            && self.first_query.data_type(&schema).is_ok()
            && self.second_query.data_type(&schema).is_ok()
    }

    /// `Limit(limit, Filter(input, query))`. Row order is the ranking signal,
    /// so a match in `query` also becomes the ranking query of the index
    /// relation it filters.
    fn phase(&self, query: &Expr) -> LogicalPlan {
        let input = match ranking_query(&self.input, query) {
            Some(ranking) => rank_relation(self.input.as_ref().clone(), &ranking),
            None => self.input.as_ref().clone(),
        };
        LogicalPlan::Limit {
            input: Box::new(LogicalPlan::Filter {
                input: Box::new(input),
                condition: query.clone(),
            }),
            limit: self.limit.clone(),
        }
    }

    /// Fuse the ranked document lists of the phase results.
    ///
    /// Each result's row order is its relevance order. A document's score is
    /// the sum of `1 / (K + position + 1)` over the phases it appears in.
    pub fn fuse(&self, results: Vec<PhaseResult>) -> Result<Vec<RankDoc>> {
        let window = self.limit.fold_to_count()?;
        let k = self.rank_constant();

        let mut positions: HashMap<(String, String), BTreeMap<usize, usize>> = HashMap::new();
        for (phase, result) in results.into_iter().enumerate() {
            let id_column = column_index(&result.schema, METADATA_ID, phase)?;
            let index_column = column_index(&result.schema, METADATA_INDEX, phase)?;
            let mut position = 0;
            for page in result.pages {
                for row in 0..page.position_count() {
                    let id = identity_value(page.value(row, id_column));
                    let source = identity_value(page.value(row, index_column));
                    // a repeated document keeps its best position within a phase
                    positions
                        .entry((id, source))
                        .or_default()
                        .entry(phase)
                        .or_insert(position);
                    position += 1;
                }
                page.release();
            }
        }

        let unique = positions.len();
        let mut queue: BinaryHeap<Reverse<RankDoc>> = positions
            .into_iter()
            .map(|((id, source), by_phase)| {
                let score = by_phase
                    .values()
                    .map(|&position| 1.0 / (k + position as f32 + 1.0))
                    .sum();
                Reverse(RankDoc::new(id, source, score))
            })
            .collect();

        let mut ranked = Vec::with_capacity(window.min(unique));
        while ranked.len() < window {
            let Some(Reverse(doc)) = queue.pop() else {
                break;
            };
            let rank = ranked.len() as u32 + 1;
            ranked.push(doc.with_rank(rank));
        }
        debug!(unique_docs = unique, window, fused = ranked.len(), rank_constant = k, "rank fusion");
        Ok(ranked)
    }
}

/// First match conjunct of `query` on a field of the relation below `input`'s
/// filters.
fn ranking_query(input: &LogicalPlan, query: &Expr) -> Option<FieldQuery> {
    let mut node = input;
    let relation = loop {
        match node {
            LogicalPlan::Filter { input, .. } => node = input.as_ref(),
            LogicalPlan::Relation(relation) => break relation,
            _ => return None,
        }
    };
    query.conjuncts().into_iter().find_map(|part| match part {
        Expr::Match { field, query } if relation.attributes.iter().any(|a| &a.name == field && !a.synthetic) => {
            Some(FieldQuery::new(field.clone(), query.clone()))
        }
        _ => None,
    })
}

fn rank_relation(plan: LogicalPlan, ranking: &FieldQuery) -> LogicalPlan {
    match plan {
        LogicalPlan::Filter { input, condition } => LogicalPlan::Filter {
            input: Box::new(rank_relation(*input, ranking)),
            condition,
        },
        LogicalPlan::Relation(relation) => LogicalPlan::Relation(relation.rank_by(ranking.clone())),
        other => other,
    }
}

fn column_index(schema: &[Attribute], name: &str, phase: usize) -> Result<usize> {
    schema.iter().position(|a| a.name == name).ok_or_else(|| {
        Error::execution(format!("rerank phase [{phase}] output has no [{name}] column"))
    })
}

fn identity_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

impl Phased for Rerank {
    fn first_phases(&self) -> Option<Vec<LogicalPlan>> {
        Some(vec![self.phase(&self.first_query), self.phase(&self.second_query)])
    }

    fn next_phase(&self, results: Vec<PhaseResult>) -> Result<LogicalPlan> {
        assert_eq!(
            results.len(),
            2,
            "rerank expects results for exactly two first phases"
        );
        let ranked = self.fuse(results)?;
        self.input.as_ref().clone().transform_up(&mut |node| {
            Ok(match node {
                LogicalPlan::Relation(relation) => {
                    LogicalPlan::Relation(relation.with_ranked_docs(ranked.clone()))
                }
                other => other,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockFactory, Page};
    use crate::expr::{lit, matches};
    use crate::plan::relation::Relation;
    use forkql_proto::DataType;

    fn schema() -> Vec<Attribute> {
        vec![
            Attribute::new("content", DataType::Text),
            Attribute::metadata(METADATA_ID).unwrap(),
            Attribute::metadata(METADATA_INDEX).unwrap(),
        ]
    }

    fn rerank(limit: i32) -> Rerank {
        Rerank::new(
            LogicalPlan::Relation(Relation::new("docs", schema())),
            lit(limit),
            matches("content", "fox"),
            matches("content", "dog"),
        )
    }

    fn result(factory: &BlockFactory, ids: &[&str]) -> PhaseResult {
        let rows: Vec<Vec<Value>> = ids
            .iter()
            .map(|id| vec![Value::from("text"), Value::from(*id), Value::from("docs")])
            .collect();
        let types: Vec<DataType> = schema().iter().map(|a| a.data_type).collect();
        PhaseResult::new(schema(), vec![Page::from_rows(factory, &types, &rows)])
    }

    #[test]
    fn test_tied_scores_break_on_id() {
        let factory = BlockFactory::new();
        let ranked = rerank(2)
            .fuse(vec![
                result(&factory, &["d1", "d2", "d3"]),
                result(&factory, &["d2", "d1", "d4"]),
            ])
            .unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, "d1");
        assert_eq!(ranked[1].id, "d2");
        assert_eq!(ranked[0].rank, Some(1));
        assert_eq!(ranked[1].rank, Some(2));
        let expected = 1.0 / 61.0 + 1.0 / 62.0;
        assert!((ranked[0].score - expected).abs() < 1e-6);
        assert_eq!(ranked[0].score, ranked[1].score);
        assert_eq!(factory.live_blocks(), 0);
    }

    #[test]
    fn test_window_larger_than_unique_docs() {
        let factory = BlockFactory::new();
        let ranked = rerank(10)
            .fuse(vec![result(&factory, &["a", "b"]), result(&factory, &["b"])])
            .unwrap();
        let ids: Vec<&str> = ranked.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(ranked[1].rank, Some(2));
    }

    #[test]
    fn test_rank_constant_changes_scores() {
        let factory = BlockFactory::new();
        let ranked = rerank(1)
            .with_rank_constant(0.0)
            .fuse(vec![result(&factory, &["a"]), result(&factory, &[])])
            .unwrap();
        assert_eq!(ranked[0].score, 1.0);
    }

    #[test]
    fn test_first_phases_are_filtered_limits() {
        let phases = rerank(3).first_phases().unwrap();
        assert_eq!(phases.len(), 2);
        for phase in &phases {
            assert_eq!(phase.command_name(), "LIMIT");
            assert_eq!(phase.children()[0].command_name(), "WHERE");
        }
    }

    #[test]
    fn test_phase_ranks_by_its_own_match() {
        let mut relation = Relation::new("docs", schema());
        relation.query = Some(FieldQuery::new("content", "cat"));
        let rerank = Rerank::new(
            LogicalPlan::Filter {
                input: Box::new(LogicalPlan::Relation(relation)),
                condition: matches("content", "brown"),
            },
            lit(2),
            matches("content", "fox"),
            Expr::Literal(Value::Bool(true)),
        );
        let phases = rerank.first_phases().unwrap();

        let leaf = |phase: &LogicalPlan| -> Relation {
            let mut node = phase;
            loop {
                match node {
                    LogicalPlan::Relation(relation) => return relation.clone(),
                    other => node = other.children()[0],
                }
            }
        };
        let first = leaf(&phases[0]);
        assert_eq!(first.query, Some(FieldQuery::new("content", "fox")));
        assert_eq!(first.filters, vec![FieldQuery::new("content", "cat")]);
        let second = leaf(&phases[1]);
        assert_eq!(second.query, Some(FieldQuery::new("content", "cat")));
        assert!(second.filters.is_empty());
    }

    #[test]
    fn test_next_phase_restricts_relations() {
        let factory = BlockFactory::new();
        let plan = rerank(2)
            .next_phase(vec![result(&factory, &["x"]), result(&factory, &["y"])])
            .unwrap();
        let LogicalPlan::Relation(relation) = plan else {
            panic!("expected relation");
        };
        let docs = relation.ranked_docs.unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_missing_id_column() {
        let factory = BlockFactory::new();
        let bad = PhaseResult::new(
            vec![Attribute::new("content", DataType::Text)],
            vec![Page::from_rows(&factory, &[DataType::Text], &[vec![Value::from("x")]])],
        );
        let err = rerank(2).fuse(vec![bad, result(&factory, &[])]).unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
        assert!(err.to_string().contains("[_id]"));
        assert_eq!(factory.live_blocks(), 0);
    }

    #[test]
    #[should_panic(expected = "exactly two first phases")]
    fn test_next_phase_with_missing_results_panics() {
        let _ = rerank(2).next_phase(vec![]);
    }
}

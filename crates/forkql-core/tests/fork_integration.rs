//! Integration tests for FORK branching and the branch-merge operator.

use std::io::Write;
use std::sync::Arc;

use forkql_core::expr::{col, lit, matches};
use forkql_core::plan::{LogicalPlan, PlanBuilder, Retrieve, SortOrder};
use forkql_core::{EngineConfig, Error, MemoryIndex, QuerySession};
use forkql_proto::{Attribute, DataType, ResultSet, Value};

const DOCS: &[(i32, &str)] = &[
    (1, "This is a brown fox"),
    (2, "This is a brown dog"),
    (3, "This dog is really brown"),
    (4, "The dog is brown but this document is very very long"),
    (5, "There is also a white cat"),
    (6, "The quick brown fox jumps over the lazy dog"),
];

struct TestContext {
    session: QuerySession,
}

impl TestContext {
    fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    fn with_config(config: EngineConfig) -> Self {
        let index = MemoryIndex::new();
        index.create_index(
            "test",
            vec![
                Attribute::new("id", DataType::Integer),
                Attribute::new("content", DataType::Text),
            ],
        );
        for (id, content) in DOCS {
            index
                .add_document(
                    "test",
                    id.to_string(),
                    [("id", Value::Int32(*id)), ("content", Value::from(*content))],
                )
                .unwrap();
        }
        Self {
            session: QuerySession::with_config(Arc::new(index), config),
        }
    }

    fn run(&self, plan: LogicalPlan) -> ResultSet {
        let result = self.session.execute(plan).unwrap().into_result_set();
        assert_eq!(self.session.block_factory().live_blocks(), 0, "pages leaked");
        result
    }
}

fn from_test() -> PlanBuilder {
    PlanBuilder::retrieve(Retrieve::new("test"))
}

fn sorted_by_id_and_fork(plan: PlanBuilder) -> LogicalPlan {
    plan.keep(["id", "_fork", "content"])
        .sort(vec![SortOrder::asc(col("id")), SortOrder::asc(col("_fork"))])
        .build()
}

fn id_fork_rows(result: &ResultSet) -> Vec<(i64, String)> {
    (0..result.len())
        .map(|row| {
            let id = result.get(row, "id").and_then(Value::as_i64).unwrap();
            let fork = result.get(row, "_fork").and_then(Value::as_str).unwrap().to_string();
            (id, fork)
        })
        .collect()
}

fn expected(rows: &[(i64, &str)]) -> Vec<(i64, String)> {
    rows.iter().map(|(id, fork)| (*id, fork.to_string())).collect()
}

#[test]
fn test_fork_with_where_in_branches() {
    let ctx = TestContext::new();
    let plan = sorted_by_id_and_fork(from_test().filter(col("id").gt(lit(2))).fork(|input| {
        vec![
            input.clone().filter(matches("content", "fox")),
            input.filter(matches("content", "dog")),
        ]
    }));

    let result = ctx.run(plan);
    assert_eq!(result.column_names(), vec!["id", "_fork", "content"]);
    assert_eq!(
        id_fork_rows(&result),
        expected(&[(3, "fork1"), (4, "fork1"), (6, "fork0"), (6, "fork1")])
    );
    assert_eq!(
        result.get(2, "content"),
        Some(&Value::from("The quick brown fox jumps over the lazy dog"))
    );
}

#[test]
fn test_fork_with_sort_and_limit_in_one_branch() {
    let ctx = TestContext::new();
    let plan = sorted_by_id_and_fork(from_test().filter(col("id").gt(lit(0))).fork(|input| {
        vec![
            input
                .clone()
                .filter(matches("content", "fox"))
                .sort(vec![SortOrder::desc(col("id"))])
                .limit(1),
            input.filter(matches("content", "dog")),
        ]
    }));

    let result = ctx.run(plan);
    assert_eq!(
        id_fork_rows(&result),
        expected(&[(2, "fork1"), (3, "fork1"), (4, "fork1"), (6, "fork0"), (6, "fork1")])
    );
}

#[test]
fn test_stacked_filters_in_a_branch_combine() {
    let ctx = TestContext::new();
    let plan = sorted_by_id_and_fork(from_test().fork(|input| {
        vec![
            input
                .clone()
                .filter(col("id").lt(lit(2)))
                .filter(matches("content", "fox")),
            input.filter(col("id").gt(lit(2))).filter(matches("content", "dog")),
        ]
    }));

    let result = ctx.run(plan);
    assert_eq!(
        id_fork_rows(&result),
        expected(&[(1, "fork0"), (3, "fork1"), (4, "fork1"), (6, "fork1")])
    );
}

#[test]
fn test_empty_branch_contributes_no_rows() {
    let ctx = TestContext::new();
    let plan = sorted_by_id_and_fork(from_test().fork(|input| {
        vec![
            input.clone().filter(matches("content", "elephant")),
            input.filter(matches("content", "cat")),
        ]
    }));

    let result = ctx.run(plan);
    assert_eq!(id_fork_rows(&result), expected(&[(5, "fork1")]));
}

#[test]
fn test_all_branches_empty() {
    let ctx = TestContext::new();
    let plan = from_test()
        .fork(|input| {
            vec![
                input.clone().filter(col("id").gt(lit(100))),
                input.filter(col("id").lt(lit(0))),
            ]
        })
        .build();

    let result = ctx.run(plan);
    assert!(result.is_empty());
    assert_eq!(result.column_names(), vec!["id", "content", "_fork"]);
}

#[test]
fn test_rows_matching_several_branches_repeat() {
    let ctx = TestContext::new();
    let plan = sorted_by_id_and_fork(from_test().fork(|input| {
        vec![
            input.clone().filter(matches("content", "brown")),
            input.clone().filter(matches("content", "fox")),
            input.filter(matches("content", "cat")),
        ]
    }));

    let result = ctx.run(plan);
    assert_eq!(
        id_fork_rows(&result),
        expected(&[
            (1, "fork0"),
            (1, "fork1"),
            (2, "fork0"),
            (3, "fork0"),
            (4, "fork0"),
            (5, "fork2"),
            (6, "fork0"),
            (6, "fork1"),
        ])
    );
}

#[test]
fn test_branch_limit_does_not_affect_siblings() {
    let ctx = TestContext::new();
    let count = |limit: i32| {
        let plan = from_test()
            .fork(|input| vec![input.clone().limit(limit), input])
            .keep(["id", "_fork"])
            .build();
        let result = ctx.run(plan);
        let fork1 = (0..result.len())
            .filter(|&row| result.get(row, "_fork") == Some(&Value::from("fork1")))
            .count();
        (result.len(), fork1)
    };
    assert_eq!(count(1), (7, 6));
    assert_eq!(count(3), (9, 6));
}

#[test]
fn test_discriminator_stable_across_execution_modes() {
    let plan = || {
        sorted_by_id_and_fork(from_test().fork(|input| {
            vec![
                input.clone().filter(matches("content", "fox")),
                input.clone().filter(matches("content", "dog")),
                input.filter(matches("content", "cat")),
            ]
        }))
    };
    let parallel = TestContext::new().run(plan());
    let sequential = TestContext::with_config(EngineConfig::default().sequential().with_page_size(1)).run(plan());
    assert_eq!(id_fork_rows(&parallel), id_fork_rows(&sequential));
    assert_eq!(
        id_fork_rows(&parallel),
        expected(&[
            (1, "fork0"),
            (2, "fork1"),
            (3, "fork1"),
            (4, "fork1"),
            (5, "fork2"),
            (6, "fork0"),
            (6, "fork1"),
        ])
    );
}

#[test]
fn test_merge_keeps_columns_common_to_all_branches() {
    let ctx = TestContext::new();
    let plan = from_test()
        .fork(|input| vec![input.clone().keep(["content", "id"]), input.keep(["id"])])
        .sort(vec![SortOrder::asc(col("id")), SortOrder::asc(col("_fork"))])
        .limit(2)
        .build();

    let result = ctx.run(plan);
    assert_eq!(result.column_names(), vec!["id", "_fork"]);
    assert_eq!(id_fork_rows(&result), expected(&[(1, "fork0"), (1, "fork1")]));
}

#[test]
fn test_live_branch_with_reordered_columns() {
    let ctx = TestContext::new();
    let plan = from_test()
        .filter(col("id").eq(lit(5)))
        .fork(|input| vec![input.clone().keep(["content", "id"]), input.keep(["id", "content"])])
        .build();

    let result = ctx.run(plan);
    assert_eq!(result.column_names(), vec!["id", "content", "_fork"]);
    assert_eq!(result.len(), 2);
    for row in 0..2 {
        assert_eq!(result.get(row, "id"), Some(&Value::Int32(5)));
        assert_eq!(result.get(row, "content"), Some(&Value::from("There is also a white cat")));
    }
}

#[test]
fn test_single_branch_fork_is_rejected() {
    let ctx = TestContext::new();
    let plan = from_test().fork(|input| vec![input]).build();
    let err = ctx.session.execute(plan).unwrap_err();
    assert!(matches!(err, Error::Resolution(_)));
    assert_eq!(ctx.session.block_factory().live_blocks(), 0);
}

#[test]
fn test_discriminator_name_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"discriminator": "_branch", "page_size": 2}}"#).unwrap();
    let config = EngineConfig::from_json_file(file.path()).unwrap();
    let ctx = TestContext::with_config(config);

    let plan = from_test()
        .fork(|input| vec![input.clone().filter(matches("content", "cat")), input.limit(1)])
        .keep(["id", "_branch"])
        .sort(vec![SortOrder::asc(col("_branch"))])
        .build();
    let result = ctx.run(plan);
    assert_eq!(result.column_names(), vec!["id", "_branch"]);
    assert_eq!(result.get(0, "_branch"), Some(&Value::from("fork0")));
    assert_eq!(result.get(1, "_branch"), Some(&Value::from("fork1")));
}

#[test]
fn test_cancelled_session_fails_without_leaks() {
    let ctx = TestContext::new();
    ctx.session.cancel();
    let plan = from_test()
        .fork(|input| vec![input.clone(), input])
        .build();
    let err = ctx.session.execute(plan).unwrap_err();
    assert!(err.to_string().contains("cancelled"));
    assert_eq!(ctx.session.block_factory().live_blocks(), 0);
}

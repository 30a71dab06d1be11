//! Scalar expressions used by filters, sorts and limits.
//!
//! Logical expressions reference columns by name. Before execution they are
//! bound against an operator's input layout into [`BoundExpr`], which reads
//! columns by position.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use forkql_proto::{Attribute, DataType, Value};
use serde::{Deserialize, Serialize};

use crate::block::Page;
use crate::error::{Error, Result};
use crate::retrieval::parse_vector_literal;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn test(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering.is_eq(),
            CompareOp::Ne => ordering.is_ne(),
            CompareOp::Lt => ordering.is_lt(),
            CompareOp::Le => ordering.is_le(),
            CompareOp::Gt => ordering.is_gt(),
            CompareOp::Ge => ordering.is_ge(),
        }
    }
}

/// A logical expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A constant.
    Literal(Value),
    /// A column reference by name.
    Column(String),
    /// Binary comparison.
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Logical conjunction.
    And(Box<Expr>, Box<Expr>),
    /// Logical disjunction.
    Or(Box<Expr>, Box<Expr>),
    /// Logical negation.
    Not(Box<Expr>),
    /// Full-text match of `query` against a text field (`field:"query"`).
    Match { field: String, query: String },
}

/// Column reference.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

/// Literal value.
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

/// Full-text match predicate.
pub fn matches(field: impl Into<String>, query: impl Into<String>) -> Expr {
    Expr::Match {
        field: field.into(),
        query: query.into(),
    }
}

impl Expr {
    fn compare(self, op: CompareOp, other: Expr) -> Expr {
        Expr::Compare {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn eq(self, other: Expr) -> Expr {
        self.compare(CompareOp::Eq, other)
    }

    pub fn not_eq(self, other: Expr) -> Expr {
        self.compare(CompareOp::Ne, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        self.compare(CompareOp::Lt, other)
    }

    pub fn lt_eq(self, other: Expr) -> Expr {
        self.compare(CompareOp::Le, other)
    }

    pub fn gt(self, other: Expr) -> Expr {
        self.compare(CompareOp::Gt, other)
    }

    pub fn gt_eq(self, other: Expr) -> Expr {
        self.compare(CompareOp::Ge, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// Top-level `AND` operands, left to right.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(left, right) => {
                let mut parts = left.conjuncts();
                parts.extend(right.conjuncts());
                parts
            }
            other => vec![other],
        }
    }

    /// Column names referenced by this expression.
    pub fn references(&self) -> HashSet<&str> {
        let mut refs = HashSet::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut HashSet<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Column(name) => {
                refs.insert(name);
            }
            Expr::Match { field, .. } => {
                refs.insert(field);
            }
            Expr::Compare { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                left.collect_references(refs);
                right.collect_references(refs);
            }
            Expr::Not(inner) => inner.collect_references(refs),
        }
    }

    /// Whether the expression can be evaluated without any input row.
    pub fn foldable(&self) -> bool {
        match self {
            Expr::Literal(_) => true,
            Expr::Column(_) | Expr::Match { .. } => false,
            Expr::Compare { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                left.foldable() && right.foldable()
            }
            Expr::Not(inner) => inner.foldable(),
        }
    }

    /// Evaluate a foldable expression to a constant.
    pub fn fold(&self) -> Option<Value> {
        if !self.foldable() {
            return None;
        }
        self.bind(&[]).ok().map(|bound| bound.eval_row(&[]))
    }

    /// Fold the expression into a non-negative row count.
    pub fn fold_to_count(&self) -> Result<usize> {
        let value = self
            .fold()
            .ok_or_else(|| Error::resolution(format!("limit [{self}] must be a foldable literal")))?;
        value
            .as_i64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| {
                Error::resolution(format!(
                    "limit [{self}] must fold to a non-negative integer, got [{value}]"
                ))
            })
    }

    /// Result type of the expression against an input schema.
    pub fn data_type(&self, schema: &[Attribute]) -> Result<DataType> {
        match self {
            Expr::Literal(value) => Ok(value.data_type()),
            Expr::Column(name) => lookup(schema, name).map(|(_, attr)| attr.data_type),
            Expr::Match { field, query } => {
                let (_, attr) = lookup(schema, field)?;
                let vector_query =
                    attr.data_type == DataType::DenseVector && parse_vector_literal(query).is_some();
                if !attr.data_type.is_string() && !vector_query {
                    return Err(Error::resolution(format!(
                        "match requires a text or keyword field, [{field}] is [{}]",
                        attr.data_type
                    )));
                }
                Ok(DataType::Boolean)
            }
            Expr::Compare { left, right, .. } => {
                let l = left.data_type(schema)?;
                let r = right.data_type(schema)?;
                let comparable = l == r
                    || l == DataType::Null
                    || r == DataType::Null
                    || (l.is_numeric() && r.is_numeric())
                    || (l.is_string() && r.is_string());
                if !comparable {
                    return Err(Error::resolution(format!(
                        "cannot compare [{left}] of type [{l}] with [{right}] of type [{r}]"
                    )));
                }
                Ok(DataType::Boolean)
            }
            Expr::And(left, right) | Expr::Or(left, right) => {
                left.data_type(schema)?;
                right.data_type(schema)?;
                Ok(DataType::Boolean)
            }
            Expr::Not(inner) => {
                inner.data_type(schema)?;
                Ok(DataType::Boolean)
            }
        }
    }

    /// Bind column references to positions in `layout`.
    pub fn bind(&self, layout: &[Attribute]) -> Result<BoundExpr> {
        Ok(match self {
            Expr::Literal(value) => BoundExpr::Literal(value.clone()),
            Expr::Column(name) => BoundExpr::Column(lookup(layout, name)?.0),
            Expr::Match { field, query } => {
                let (column, attr) = lookup(layout, field)?;
                if attr.data_type == DataType::DenseVector {
                    return Err(Error::execution(format!(
                        "vector match [{self}] must run directly against its index"
                    )));
                }
                BoundExpr::Match {
                    column,
                    terms: tokenize(query),
                }
            }
            Expr::Compare { op, left, right } => BoundExpr::Compare {
                op: *op,
                left: Box::new(left.bind(layout)?),
                right: Box::new(right.bind(layout)?),
            },
            Expr::And(left, right) => {
                BoundExpr::And(Box::new(left.bind(layout)?), Box::new(right.bind(layout)?))
            }
            Expr::Or(left, right) => {
                BoundExpr::Or(Box::new(left.bind(layout)?), Box::new(right.bind(layout)?))
            }
            Expr::Not(inner) => BoundExpr::Not(Box::new(inner.bind(layout)?)),
        })
    }
}

fn lookup<'a>(schema: &'a [Attribute], name: &str) -> Result<(usize, &'a Attribute)> {
    schema
        .iter()
        .enumerate()
        .find(|(_, attr)| attr.name == name)
        .ok_or_else(|| Error::resolution(format!("Unknown column [{name}]")))
}

/// Lower-cased alphanumeric tokens.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::String(s)) => write!(f, "\"{s}\""),
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Column(name) => write!(f, "{name}"),
            Expr::Match { field, query } => write!(f, "{field}:\"{query}\""),
            Expr::Compare { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            Expr::And(left, right) => write!(f, "({left} AND {right})"),
            Expr::Or(left, right) => write!(f, "({left} OR {right})"),
            Expr::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}

/// An expression bound to column positions.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr {
    Literal(Value),
    Column(usize),
    Compare {
        op: CompareOp,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },
    And(Box<BoundExpr>, Box<BoundExpr>),
    Or(Box<BoundExpr>, Box<BoundExpr>),
    Not(Box<BoundExpr>),
    Match { column: usize, terms: Vec<String> },
}

impl BoundExpr {
    /// Evaluate against one row of a page.
    pub fn eval(&self, page: &Page, position: usize) -> Value {
        self.eval_with(&|column| page.value(position, column))
    }

    /// Evaluate against a materialized row.
    pub fn eval_row(&self, row: &[Value]) -> Value {
        self.eval_with(&|column| row.get(column).cloned().unwrap_or(Value::Null))
    }

    /// Evaluate as a predicate; null and non-boolean results are false.
    pub fn test(&self, page: &Page, position: usize) -> bool {
        matches!(self.eval(page, position), Value::Bool(true))
    }

    fn eval_with(&self, column_value: &dyn Fn(usize) -> Value) -> Value {
        match self {
            BoundExpr::Literal(value) => value.clone(),
            BoundExpr::Column(index) => column_value(*index),
            BoundExpr::Compare { op, left, right } => {
                let l = left.eval_with(column_value);
                let r = right.eval_with(column_value);
                match l.compare(&r) {
                    Some(ordering) => Value::Bool(op.test(ordering)),
                    None => Value::Null,
                }
            }
            BoundExpr::And(left, right) => {
                match (left.eval_with(column_value), right.eval_with(column_value)) {
                    (Value::Bool(false), _) | (_, Value::Bool(false)) => Value::Bool(false),
                    (Value::Bool(true), Value::Bool(true)) => Value::Bool(true),
                    _ => Value::Null,
                }
            }
            BoundExpr::Or(left, right) => {
                match (left.eval_with(column_value), right.eval_with(column_value)) {
                    (Value::Bool(true), _) | (_, Value::Bool(true)) => Value::Bool(true),
                    (Value::Bool(false), Value::Bool(false)) => Value::Bool(false),
                    _ => Value::Null,
                }
            }
            BoundExpr::Not(inner) => match inner.eval_with(column_value) {
                Value::Bool(b) => Value::Bool(!b),
                _ => Value::Null,
            },
            BoundExpr::Match { column, terms } => match column_value(*column) {
                Value::String(text) => {
                    let tokens = tokenize(&text);
                    Value::Bool(terms.iter().any(|t| tokens.contains(t)))
                }
                _ => Value::Null,
            },
        }
    }
}

//! Leaf relations: unresolved retrievals, resolved index relations and
//! pre-materialized local rows.

use forkql_proto::{Attribute, RankDoc, Value};
use serde::{Deserialize, Serialize};

use crate::config::KnnConfig;

/// A field-scoped search annotation: a text query or a vector literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldQuery {
    /// Field to search.
    pub field: String,
    /// Query string. A bracketed list of numbers selects k-NN search.
    pub query: String,
}

impl FieldQuery {
    pub fn new(field: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            query: query.into(),
        }
    }
}

/// An index reference that has not been resolved against a schema yet
/// (`RETRIEVE index [WHERE MATCH field, "q"] [KNN field, "[..]"] [METADATA ..]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retrieve {
    /// Index name.
    pub index: String,
    /// Requested metadata columns (`_id`, `_index`, `_score`).
    pub metadata: Vec<String>,
    /// Optional search annotation.
    pub query: Option<FieldQuery>,
    /// k-NN parameters used if the query turns out to be a vector. Falls
    /// back to the engine configuration when unset.
    pub knn: Option<KnnConfig>,
}

impl Retrieve {
    /// Retrieve every document of an index.
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            metadata: vec![],
            query: None,
            knn: None,
        }
    }

    /// Request metadata columns.
    pub fn with_metadata<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.extend(names.into_iter().map(Into::into));
        self
    }

    /// Attach a text or vector query against a field.
    pub fn with_query(mut self, field: impl Into<String>, query: impl Into<String>) -> Self {
        self.query = Some(FieldQuery::new(field, query));
        self
    }

    /// Override the k-NN parameters.
    pub fn with_knn(mut self, knn: KnnConfig) -> Self {
        self.knn = Some(knn);
        self
    }

    /// Metadata attributes are known before resolution; data fields are not.
    pub fn output(&self) -> Vec<Attribute> {
        self.metadata
            .iter()
            .map(|name| Attribute::metadata(name).unwrap_or_else(|| Attribute::unresolved(name.clone())))
            .collect()
    }
}

/// A resolved index relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Index name.
    pub index: String,
    /// Output columns: index fields followed by requested metadata.
    pub attributes: Vec<Attribute>,
    /// Search annotation pushed into the source. Ranks the output.
    pub query: Option<FieldQuery>,
    /// Further pushed annotations. They restrict the output without ranking it.
    #[serde(default)]
    pub filters: Vec<FieldQuery>,
    /// k-NN parameters.
    pub knn: KnnConfig,
    /// When set, the source returns exactly these documents in rank order.
    pub ranked_docs: Option<Vec<RankDoc>>,
}

impl Relation {
    pub fn new(index: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            index: index.into(),
            attributes,
            query: None,
            filters: vec![],
            knn: KnnConfig::default(),
            ranked_docs: None,
        }
    }

    /// Rank by `query`. A previous ranking query keeps restricting the output.
    pub fn rank_by(mut self, query: FieldQuery) -> Self {
        if let Some(previous) = self.query.replace(query) {
            self.restrict(previous);
        }
        self
    }

    /// Add a restricting annotation. Annotations already implied are skipped.
    pub fn restrict(&mut self, query: FieldQuery) {
        if self.query.as_ref() != Some(&query) && !self.filters.contains(&query) {
            self.filters.push(query);
        }
    }

    /// Copy of this relation restricted to fused documents, in fused order.
    /// A ranking query turns into a restriction.
    pub fn with_ranked_docs(&self, docs: Vec<RankDoc>) -> Self {
        let mut relation = Self {
            query: None,
            ranked_docs: Some(docs),
            ..self.clone()
        };
        if let Some(query) = self.query.clone() {
            relation.restrict(query);
        }
        relation
    }
}

/// Rows materialized ahead of execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRelation {
    /// Output columns.
    pub schema: Vec<Attribute>,
    /// Row-major values, one entry per schema column.
    pub rows: Vec<Vec<Value>>,
}

impl LocalRelation {
    pub fn new(schema: Vec<Attribute>, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// A relation with columns but no rows.
    pub fn empty(schema: Vec<Attribute>) -> Self {
        Self::new(schema, vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forkql_proto::DataType;

    #[test]
    fn test_rank_by_demotes_previous_query() {
        let relation = Relation::new("docs", vec![Attribute::new("content", DataType::Text)])
            .rank_by(FieldQuery::new("content", "cat"))
            .rank_by(FieldQuery::new("content", "fox"));
        assert_eq!(relation.query, Some(FieldQuery::new("content", "fox")));
        assert_eq!(relation.filters, vec![FieldQuery::new("content", "cat")]);
    }

    #[test]
    fn test_ranked_docs_keep_fused_order() {
        let relation =
            Relation::new("docs", vec![Attribute::new("content", DataType::Text)]).rank_by(FieldQuery::new("content", "cat"));
        let ranked = relation.with_ranked_docs(vec![RankDoc::new("d1", "docs", 0.5)]);
        assert_eq!(ranked.query, None);
        assert_eq!(ranked.filters, vec![FieldQuery::new("content", "cat")]);
        assert_eq!(ranked.ranked_docs.map(|docs| docs.len()), Some(1));
    }

    #[test]
    fn test_restrict_skips_implied_queries() {
        let mut relation =
            Relation::new("docs", vec![Attribute::new("content", DataType::Text)]).rank_by(FieldQuery::new("content", "fox"));
        relation.restrict(FieldQuery::new("content", "fox"));
        relation.restrict(FieldQuery::new("content", "cat"));
        relation.restrict(FieldQuery::new("content", "cat"));
        assert_eq!(relation.filters, vec![FieldQuery::new("content", "cat")]);
    }
}

//! The retrieval collaborator.
//!
//! Sources read documents through a [`RetrievalService`]. A request ranks by
//! at most one query (textual match or k-NN) and may be restricted by further
//! queries and by a ranked-document list.

mod memory;

pub use memory::MemoryIndex;

use std::collections::HashMap;

use forkql_proto::{Attribute, RankDoc, Value};

use crate::config::KnnConfig;
use crate::error::Result;

/// A query against one field.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchQuery {
    /// Full-text match.
    Match { field: String, text: String },
    /// k-nearest-neighbor similarity search.
    Knn {
        field: String,
        vector: Vec<f32>,
        num_candidates: usize,
        similarity: f32,
    },
}

impl SearchQuery {
    /// Build a k-NN query if `query` is a vector literal, a match query
    /// otherwise.
    pub fn build(field: &str, query: &str, knn: &KnnConfig) -> Self {
        match parse_vector_literal(query) {
            Some(vector) => SearchQuery::Knn {
                field: field.to_string(),
                vector,
                num_candidates: knn.num_candidates,
                similarity: knn.similarity,
            },
            None => SearchQuery::Match {
                field: field.to_string(),
                text: query.to_string(),
            },
        }
    }

    pub fn field(&self) -> &str {
        match self {
            SearchQuery::Match { field, .. } | SearchQuery::Knn { field, .. } => field,
        }
    }
}

/// Parse a bracketed list of numbers such as `[0.1, 0.2, 3]`.
///
/// Anything else, including an empty list, is not a vector literal.
pub fn parse_vector_literal(text: &str) -> Option<Vec<f32>> {
    let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;
    if inner.trim().is_empty() {
        return None;
    }
    inner
        .split(',')
        .map(|part| part.trim().parse::<f32>().ok().filter(|v| v.is_finite()))
        .collect()
}

/// One retrieval call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub index: String,
    /// Ranking query. `None` keeps candidate order.
    pub query: Option<SearchQuery>,
    /// Restricting queries; a document must hit every one.
    pub filters: Vec<SearchQuery>,
    /// When set, only these documents are candidates, in this order.
    pub ranked_docs: Option<Vec<RankDoc>>,
}

impl SearchRequest {
    pub fn all(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            query: None,
            filters: vec![],
            ranked_docs: None,
        }
    }

    pub fn with_query(mut self, query: SearchQuery) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_filter(mut self, filter: SearchQuery) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_ranked_docs(mut self, docs: Vec<RankDoc>) -> Self {
        self.ranked_docs = Some(docs);
        self
    }
}

/// A document returned by a retrieval call, in relevance order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    /// Position of the document within its index.
    pub ordinal: u64,
    pub id: String,
    pub index: String,
    pub score: f32,
    pub fields: HashMap<String, Value>,
}

/// Storage and search behind relation sources.
pub trait RetrievalService: Send + Sync {
    /// Field attributes of an index. Unknown indices are resolution errors.
    fn index_schema(&self, index: &str) -> Result<Vec<Attribute>>;

    /// Run a retrieval call. Documents come back best first.
    fn search(&self, request: &SearchRequest) -> Result<Vec<ScoredDocument>>;
}

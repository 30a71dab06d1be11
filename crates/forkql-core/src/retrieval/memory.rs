//! In-memory retrieval over small document sets.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use forkql_proto::{Attribute, DataType, Value};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::debug;

use super::{RetrievalService, ScoredDocument, SearchQuery, SearchRequest};
use crate::error::{Error, Result};
use crate::expr::tokenize;

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

#[derive(Debug, Clone)]
struct StoredDocument {
    id: String,
    fields: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
struct IndexData {
    schema: Vec<Attribute>,
    documents: Vec<StoredDocument>,
}

/// A thread-safe set of in-memory indices.
///
/// Match queries are scored with BM25 over lower-cased alphanumeric tokens.
/// k-NN queries use cosine similarity, keep candidates at or above the
/// similarity threshold and report `(1 + cosine) / 2` as the score.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    indices: RwLock<HashMap<String, IndexData>>,
}

#[derive(Deserialize)]
struct DataFile {
    indices: Vec<IndexFile>,
}

#[derive(Deserialize)]
struct IndexFile {
    name: String,
    fields: Vec<Attribute>,
    #[serde(default)]
    documents: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) an index with the given field attributes.
    pub fn create_index(&self, name: &str, schema: Vec<Attribute>) {
        self.indices.write().insert(
            name.to_string(),
            IndexData {
                schema,
                documents: vec![],
            },
        );
    }

    /// Add a document and return its ordinal.
    pub fn add_document<I, S>(&self, index: &str, id: impl Into<String>, fields: I) -> Result<u64>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let mut indices = self.indices.write();
        let data = indices
            .get_mut(index)
            .ok_or_else(|| Error::execution(format!("Unknown index [{index}]")))?;
        let mut values = HashMap::new();
        for (name, value) in fields {
            let name = name.into();
            let attr = data
                .schema
                .iter()
                .find(|a| a.name == name)
                .ok_or_else(|| Error::execution(format!("index [{index}] has no field [{name}]")))?;
            if !value.is_null() && value.data_type() != attr.data_type && !compatible(attr.data_type, &value) {
                return Err(Error::execution(format!(
                    "field [{name}] of index [{index}] is [{}], got [{}]",
                    attr.data_type,
                    value.data_type()
                )));
            }
            values.insert(name, value);
        }
        data.documents.push(StoredDocument {
            id: id.into(),
            fields: values,
        });
        Ok(data.documents.len() as u64 - 1)
    }

    /// Number of documents in an index.
    pub fn document_count(&self, index: &str) -> usize {
        self.indices.read().get(index).map_or(0, |d| d.documents.len())
    }

    /// Load indices from a JSON document:
    /// `{"indices": [{"name", "fields": [Attribute], "documents": [{..}]}]}`.
    ///
    /// A document's `_id` key is its identifier; without one the 1-based
    /// ordinal is used.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: DataFile = serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        let memory = Self::new();
        for index in file.indices {
            memory.create_index(&index.name, index.fields.clone());
            for (ordinal, document) in index.documents.into_iter().enumerate() {
                let mut id = (ordinal + 1).to_string();
                let mut fields = Vec::with_capacity(document.len());
                for (name, json) in document {
                    if name == forkql_proto::METADATA_ID {
                        id = match json {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        continue;
                    }
                    let attr = index.fields.iter().find(|a| a.name == name).ok_or_else(|| {
                        Error::Serialization(format!("index [{}] has no field [{name}]", index.name))
                    })?;
                    fields.push((name.clone(), json_to_value(attr.data_type, &name, json)?));
                }
                memory.add_document(&index.name, id, fields)?;
            }
        }
        Ok(memory)
    }

    /// Load indices from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

fn compatible(data_type: DataType, value: &Value) -> bool {
    match data_type {
        DataType::Keyword | DataType::Text => value.as_str().is_some(),
        DataType::Integer | DataType::Long => matches!(value, Value::Int32(_) | Value::Int64(_)),
        DataType::Float | DataType::Double => value.as_f64().is_some(),
        _ => false,
    }
}

fn json_to_value(data_type: DataType, name: &str, json: serde_json::Value) -> Result<Value> {
    if json.is_null() {
        return Ok(Value::Null);
    }
    let mismatch = || Error::Serialization(format!("field [{name}] expects [{data_type}]"));
    Ok(match data_type {
        DataType::Keyword | DataType::Text => Value::String(json.as_str().ok_or_else(mismatch)?.to_string()),
        DataType::Integer => {
            let n = json.as_i64().ok_or_else(mismatch)?;
            Value::Int32(i32::try_from(n).map_err(|_| mismatch())?)
        }
        DataType::Long => Value::Int64(json.as_i64().ok_or_else(mismatch)?),
        DataType::Float => Value::Float32(json.as_f64().ok_or_else(mismatch)? as f32),
        DataType::Double => Value::Float64(json.as_f64().ok_or_else(mismatch)?),
        DataType::Boolean => Value::Bool(json.as_bool().ok_or_else(mismatch)?),
        DataType::DenseVector => {
            let items = json.as_array().ok_or_else(mismatch)?;
            let vector = items
                .iter()
                .map(|v| v.as_f64().map(|f| f as f32))
                .collect::<Option<Vec<f32>>>()
                .ok_or_else(mismatch)?;
            Value::Float32Array(vector)
        }
        DataType::Doc | DataType::Null | DataType::Unresolved => return Err(mismatch()),
    })
}

impl IndexData {
    fn scored(&self, index: &str, ordinal: usize, score: f32) -> ScoredDocument {
        let doc = &self.documents[ordinal];
        ScoredDocument {
            ordinal: ordinal as u64,
            id: doc.id.clone(),
            index: index.to_string(),
            score,
            fields: doc.fields.clone(),
        }
    }

    fn field_type(&self, field: &str) -> Result<DataType> {
        self.schema
            .iter()
            .find(|a| a.name == field)
            .map(|a| a.data_type)
            .ok_or_else(|| Error::execution(format!("Unknown field [{field}]")))
    }

    fn match_scores(&self, field: &str, text: &str) -> Result<Vec<(usize, f32)>> {
        if !self.field_type(field)?.is_string() {
            return Err(Error::execution(format!("cannot run a text match on field [{field}]")));
        }
        let mut terms = tokenize(text);
        terms.sort();
        terms.dedup();
        let tokenized: Vec<Vec<String>> = self
            .documents
            .iter()
            .map(|d| d.fields.get(field).and_then(Value::as_str).map(tokenize).unwrap_or_default())
            .collect();
        let doc_count = tokenized.len() as f32;
        let avg_len = (tokenized.iter().map(Vec::len).sum::<usize>() as f32 / doc_count.max(1.0)).max(1.0);

        let idf: Vec<(&str, f32)> = terms
            .iter()
            .map(|term| {
                let df = tokenized.iter().filter(|doc| doc.contains(term)).count() as f32;
                (term.as_str(), (1.0 + (doc_count - df + 0.5) / (df + 0.5)).ln())
            })
            .collect();

        let mut scores = vec![];
        for (ordinal, tokens) in tokenized.iter().enumerate() {
            let mut score = 0.0;
            for &(term, idf) in &idf {
                let tf = tokens.iter().filter(|t| t.as_str() == term).count() as f32;
                if tf == 0.0 {
                    continue;
                }
                let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * tokens.len() as f32 / avg_len);
                score += idf * tf * (BM25_K1 + 1.0) / (tf + norm);
            }
            if score > 0.0 {
                scores.push((ordinal, score));
            }
        }
        Ok(scores)
    }

    /// Hits of a query, best first.
    fn query_scores(&self, query: &SearchQuery) -> Result<Vec<(usize, f32)>> {
        match query {
            SearchQuery::Match { field, text } => {
                let mut scores = self.match_scores(field, text)?;
                sort_by_score(&mut scores);
                Ok(scores)
            }
            SearchQuery::Knn {
                field,
                vector,
                num_candidates,
                similarity,
            } => self.knn_scores(field, vector, *num_candidates, *similarity),
        }
    }

    fn knn_scores(&self, field: &str, query: &[f32], num_candidates: usize, similarity: f32) -> Result<Vec<(usize, f32)>> {
        if self.field_type(field)? != DataType::DenseVector {
            return Err(Error::execution(format!("cannot run a k-NN search on field [{field}]")));
        }
        let mut scores = vec![];
        for (ordinal, doc) in self.documents.iter().enumerate() {
            let Some(vector) = doc.fields.get(field).and_then(Value::as_vector) else {
                continue;
            };
            if vector.len() != query.len() {
                return Err(Error::execution(format!(
                    "query vector has [{}] dimensions, field [{field}] has [{}]",
                    query.len(),
                    vector.len()
                )));
            }
            let cosine = cosine_similarity(query, vector);
            if cosine >= similarity {
                scores.push((ordinal, (1.0 + cosine) / 2.0));
            }
        }
        sort_by_score(&mut scores);
        scores.truncate(num_candidates);
        Ok(scores)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn sort_by_score(scores: &mut [(usize, f32)]) {
    scores.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
}

impl RetrievalService for MemoryIndex {
    fn index_schema(&self, index: &str) -> Result<Vec<Attribute>> {
        self.indices
            .read()
            .get(index)
            .map(|data| data.schema.clone())
            .ok_or_else(|| Error::resolution(format!("Unknown index [{index}]")))
    }

    fn search(&self, request: &SearchRequest) -> Result<Vec<ScoredDocument>> {
        let indices = self.indices.read();
        let index = request.index.as_str();
        let data = indices
            .get(index)
            .ok_or_else(|| Error::execution(format!("Unknown index [{index}]")))?;

        let mut candidates: Vec<(usize, f32)> = match &request.ranked_docs {
            Some(ranked) => {
                let by_id: HashMap<&str, usize> = data
                    .documents
                    .iter()
                    .enumerate()
                    .map(|(ordinal, doc)| (doc.id.as_str(), ordinal))
                    .collect();
                ranked
                    .iter()
                    .filter(|doc| doc.source == index)
                    .filter_map(|doc| by_id.get(doc.id.as_str()).map(|&o| (o, doc.score)))
                    .collect()
            }
            None => (0..data.documents.len()).map(|o| (o, 1.0)).collect(),
        };
        for filter in &request.filters {
            let hits: HashSet<usize> = data.query_scores(filter)?.into_iter().map(|(o, _)| o).collect();
            candidates.retain(|(o, _)| hits.contains(o));
        }
        if let Some(query) = &request.query {
            let allowed: HashSet<usize> = candidates.iter().map(|(o, _)| *o).collect();
            candidates = data
                .query_scores(query)?
                .into_iter()
                .filter(|(o, _)| allowed.contains(o))
                .collect();
        }

        let docs: Vec<ScoredDocument> = candidates
            .into_iter()
            .map(|(ordinal, score)| data.scored(index, ordinal, score))
            .collect();
        debug!(index, hits = docs.len(), "memory search");
        Ok(docs)
    }
}

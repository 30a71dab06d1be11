//! Leaf operators.

use std::collections::VecDeque;
use std::sync::Arc;

use forkql_proto::{Attribute, DataType, Value, METADATA_ID, METADATA_INDEX, METADATA_SCORE};
use tracing::debug;

use super::operator::SourceOperator;
use crate::block::{BlockFactory, Page};
use crate::error::Result;
use crate::retrieval::{RetrievalService, ScoredDocument, SearchRequest};

/// Reads an index through the retrieval service.
///
/// Output pages start with a doc block holding document ordinals, followed by
/// one block per relation attribute. The search runs on the first
/// `get_output` call.
pub struct RelationSource {
    service: Arc<dyn RetrievalService>,
    request: SearchRequest,
    attributes: Vec<Attribute>,
    factory: BlockFactory,
    page_size: usize,
    pending: Option<VecDeque<ScoredDocument>>,
    finished: bool,
}

impl RelationSource {
    pub fn new(
        service: Arc<dyn RetrievalService>,
        request: SearchRequest,
        attributes: Vec<Attribute>,
        factory: BlockFactory,
        page_size: usize,
    ) -> Self {
        Self {
            service,
            request,
            attributes,
            factory,
            page_size: page_size.max(1),
            pending: None,
            finished: false,
        }
    }

    fn column_value(attribute: &Attribute, doc: &ScoredDocument) -> Value {
        match attribute.name.as_str() {
            METADATA_ID if attribute.synthetic => Value::String(doc.id.clone()),
            METADATA_INDEX if attribute.synthetic => Value::String(doc.index.clone()),
            METADATA_SCORE if attribute.synthetic => Value::Float32(doc.score),
            name => doc.fields.get(name).cloned().unwrap_or(Value::Null),
        }
    }
}

impl SourceOperator for RelationSource {
    fn is_finished(&self) -> bool {
        self.finished
    }

    fn get_output(&mut self) -> Result<Option<Page>> {
        if self.finished {
            return Ok(None);
        }
        if self.pending.is_none() {
            let docs = self.service.search(&self.request)?;
            debug!(index = %self.request.index, docs = docs.len(), "relation source searched");
            self.pending = Some(docs.into());
        }
        let Some(pending) = self.pending.as_mut() else {
            return Ok(None);
        };
        let count = pending.len().min(self.page_size);
        let docs: Vec<ScoredDocument> = pending.drain(..count).collect();
        if pending.is_empty() {
            self.finished = true;
        }
        if docs.is_empty() {
            return Ok(None);
        }

        let mut blocks = Vec::with_capacity(self.attributes.len() + 1);
        blocks.push(self.factory.new_doc_block(docs.iter().map(|d| d.ordinal).collect()));
        for attribute in &self.attributes {
            let values = docs.iter().map(|doc| Self::column_value(attribute, doc)).collect();
            blocks.push(self.factory.new_vector_block(attribute.data_type, values));
        }
        Ok(Some(Page::with_positions(docs.len(), blocks)))
    }

    fn close(&mut self) {
        self.pending = None;
        self.finished = true;
    }

    fn name(&self) -> &'static str {
        "RelationSource"
    }
}

/// Emits pre-materialized rows in pages of at most `page_size` rows.
pub struct LocalSource {
    types: Vec<DataType>,
    rows: VecDeque<Vec<Value>>,
    factory: BlockFactory,
    page_size: usize,
}

impl LocalSource {
    pub fn new(types: Vec<DataType>, rows: Vec<Vec<Value>>, factory: BlockFactory, page_size: usize) -> Self {
        Self {
            types,
            rows: rows.into(),
            factory,
            page_size: page_size.max(1),
        }
    }
}

impl SourceOperator for LocalSource {
    fn is_finished(&self) -> bool {
        self.rows.is_empty()
    }

    fn get_output(&mut self) -> Result<Option<Page>> {
        if self.rows.is_empty() {
            return Ok(None);
        }
        let count = self.rows.len().min(self.page_size);
        let rows: Vec<Vec<Value>> = self.rows.drain(..count).collect();
        Ok(Some(Page::from_rows(&self.factory, &self.types, &rows)))
    }

    fn close(&mut self) {
        self.rows.clear();
    }

    fn name(&self) -> &'static str {
        "LocalSource"
    }
}

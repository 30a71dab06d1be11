//! SORT.

use std::cmp::Ordering;

use forkql_proto::{DataType, Value};

use super::operator::{Operator, OperatorState};
use crate::block::{BlockFactory, Page};
use crate::error::Result;
use crate::expr::BoundExpr;

/// A bound sort key.
#[derive(Debug, Clone)]
pub struct SortKey {
    pub expr: BoundExpr,
    pub descending: bool,
    pub nulls_first: bool,
}

impl SortKey {
    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if self.nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if self.nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ordering = a.compare(b).unwrap_or(Ordering::Equal);
                if self.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
        }
    }
}

/// Buffers every input page, then emits the rows in key order.
///
/// The sort is stable: rows with equal keys keep their arrival order.
pub struct SortOperator {
    keys: Vec<SortKey>,
    factory: BlockFactory,
    page_size: usize,
    input: Vec<Page>,
    output: Vec<Page>,
    state: OperatorState,
}

impl SortOperator {
    pub fn new(keys: Vec<SortKey>, factory: BlockFactory, page_size: usize) -> Self {
        Self {
            keys,
            factory,
            page_size: page_size.max(1),
            input: vec![],
            output: vec![],
            state: OperatorState::Running,
        }
    }

    fn sort_input(&mut self) {
        let pages = std::mem::take(&mut self.input);
        let Some(first) = pages.first() else {
            return;
        };
        let types: Vec<DataType> = first.blocks().iter().map(|b| b.data_type()).collect();
        let doc_columns: Vec<bool> = first.blocks().iter().map(|b| b.is_doc_block()).collect();

        let mut rows: Vec<(Vec<Value>, usize, usize)> = vec![];
        for (page_index, page) in pages.iter().enumerate() {
            for position in 0..page.position_count() {
                let key = self.keys.iter().map(|k| k.expr.eval(page, position)).collect();
                rows.push((key, page_index, position));
            }
        }
        rows.sort_by(|(a, _, _), (b, _, _)| {
            self.keys
                .iter()
                .zip(a.iter().zip(b))
                .map(|(key, (x, y))| key.compare(x, y))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });

        for chunk in rows.chunks(self.page_size) {
            let blocks = types
                .iter()
                .enumerate()
                .map(|(column, data_type)| {
                    if doc_columns[column] {
                        let docs = chunk
                            .iter()
                            .filter_map(|&(_, p, pos)| pages[p].block(column).doc(pos))
                            .collect();
                        self.factory.new_doc_block(docs)
                    } else {
                        let values = chunk.iter().map(|&(_, p, pos)| pages[p].value(pos, column)).collect();
                        self.factory.new_vector_block(*data_type, values)
                    }
                })
                .collect();
            self.output.push(Page::with_positions(chunk.len(), blocks));
        }
        // emitted front to back
        self.output.reverse();
        for page in pages {
            page.release();
        }
    }
}

impl Operator for SortOperator {
    fn needs_input(&self) -> bool {
        self.state == OperatorState::Running
    }

    fn add_input(&mut self, page: Page) {
        self.input.push(page);
    }

    fn finish(&mut self) {
        if self.state == OperatorState::Running {
            self.state = OperatorState::Finishing;
            self.sort_input();
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self.state, OperatorState::Finished | OperatorState::Closed)
            || (self.state == OperatorState::Finishing && self.output.is_empty())
    }

    fn get_output(&mut self) -> Result<Option<Page>> {
        if self.state != OperatorState::Finishing {
            return Ok(None);
        }
        let page = self.output.pop();
        if self.output.is_empty() {
            self.state = OperatorState::Finished;
        }
        Ok(page)
    }

    fn close(&mut self) {
        for page in self.input.drain(..).chain(self.output.drain(..)) {
            page.release();
        }
        self.state = OperatorState::Closed;
    }

    fn name(&self) -> &'static str {
        "SortOperator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::col;
    use forkql_proto::Attribute;

    fn key(descending: bool) -> SortKey {
        let layout = vec![Attribute::new("n", DataType::Integer), Attribute::new("s", DataType::Keyword)];
        SortKey {
            expr: col("n").bind(&layout).unwrap(),
            descending,
            nulls_first: false,
        }
    }

    fn page(factory: &BlockFactory, rows: &[(Value, &str)]) -> Page {
        let rows: Vec<Vec<Value>> = rows.iter().map(|(n, s)| vec![n.clone(), Value::from(*s)]).collect();
        Page::from_rows(factory, &[DataType::Integer, DataType::Keyword], &rows)
    }

    #[test]
    fn test_sort_across_pages_is_stable() {
        let factory = BlockFactory::new();
        let mut sort = SortOperator::new(vec![key(false)], factory.clone(), 10);
        sort.add_input(page(&factory, &[(Value::Int32(3), "a"), (Value::Null, "n")]));
        sort.add_input(page(&factory, &[(Value::Int32(1), "b"), (Value::Int32(3), "c")]));
        assert!(sort.get_output().unwrap().is_none());
        sort.finish();
        let out = sort.get_output().unwrap().unwrap();
        let tags: Vec<Value> = (0..out.position_count()).map(|p| out.value(p, 1)).collect();
        assert_eq!(tags, vec![Value::from("b"), Value::from("a"), Value::from("c"), Value::from("n")]);
        assert!(sort.is_finished());
        out.release();
        assert_eq!(factory.live_blocks(), 0);
    }

    #[test]
    fn test_sort_descending_in_pages() {
        let factory = BlockFactory::new();
        let mut sort = SortOperator::new(vec![key(true)], factory.clone(), 2);
        sort.add_input(page(&factory, &[(Value::Int32(1), "a"), (Value::Int32(2), "b"), (Value::Int32(3), "c")]));
        sort.finish();
        let first = sort.get_output().unwrap().unwrap();
        assert_eq!(first.position_count(), 2);
        assert_eq!(first.value(0, 0), Value::Int32(3));
        let second = sort.get_output().unwrap().unwrap();
        assert_eq!(second.value(0, 0), Value::Int32(1));
        assert!(sort.is_finished());
    }

    #[test]
    fn test_close_releases_buffers() {
        let factory = BlockFactory::new();
        let mut sort = SortOperator::new(vec![key(false)], factory.clone(), 1);
        sort.add_input(page(&factory, &[(Value::Int32(1), "a"), (Value::Int32(2), "b")]));
        sort.finish();
        sort.close();
        sort.close();
        assert_eq!(factory.live_blocks(), 0);
    }
}

//! WHERE.

use super::operator::Operator;
use crate::block::Page;
use crate::error::Result;
use crate::expr::BoundExpr;

/// Keeps the rows for which the condition is true.
pub struct FilterOperator {
    condition: BoundExpr,
    pending: Option<Page>,
    finishing: bool,
}

impl FilterOperator {
    pub fn new(condition: BoundExpr) -> Self {
        Self {
            condition,
            pending: None,
            finishing: false,
        }
    }
}

impl Operator for FilterOperator {
    fn needs_input(&self) -> bool {
        self.pending.is_none() && !self.finishing
    }

    fn add_input(&mut self, page: Page) {
        debug_assert!(self.pending.is_none(), "filter received a page while holding one");
        self.pending = Some(page);
    }

    fn finish(&mut self) {
        self.finishing = true;
    }

    fn is_finished(&self) -> bool {
        self.finishing && self.pending.is_none()
    }

    fn get_output(&mut self) -> Result<Option<Page>> {
        let Some(page) = self.pending.take() else {
            return Ok(None);
        };
        let positions: Vec<usize> = (0..page.position_count())
            .filter(|&p| self.condition.test(&page, p))
            .collect();
        if positions.is_empty() {
            page.release();
            return Ok(None);
        }
        Ok(Some(page.filter(&positions)))
    }

    fn close(&mut self) {
        if let Some(page) = self.pending.take() {
            page.release();
        }
    }

    fn name(&self) -> &'static str {
        "FilterOperator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockFactory;
    use crate::expr::{col, lit};
    use forkql_proto::{Attribute, DataType, Value};

    #[test]
    fn test_filter_rows() {
        let factory = BlockFactory::new();
        let layout = vec![Attribute::new("n", DataType::Integer)];
        let condition = col("n").gt(lit(1)).bind(&layout).unwrap();
        let mut filter = FilterOperator::new(condition);
        let rows: Vec<Vec<Value>> = (0..4).map(|n| vec![Value::Int32(n)]).collect();
        filter.add_input(Page::from_rows(&factory, &[DataType::Integer], &rows));
        let out = filter.get_output().unwrap().unwrap();
        assert_eq!(out.position_count(), 2);
        assert_eq!(out.value(0, 0), Value::Int32(2));
        out.release();

        filter.add_input(Page::from_rows(&factory, &[DataType::Integer], &rows[..1]));
        assert!(filter.get_output().unwrap().is_none());
        filter.finish();
        assert!(filter.is_finished());
        assert_eq!(factory.live_blocks(), 0);
    }

    #[test]
    fn test_close_releases_pending() {
        let factory = BlockFactory::new();
        let mut filter = FilterOperator::new(lit(true).bind(&[]).unwrap());
        filter.add_input(Page::from_rows(&factory, &[DataType::Integer], &[vec![Value::Int32(1)]]));
        filter.close();
        filter.close();
        assert_eq!(factory.live_blocks(), 0);
    }
}

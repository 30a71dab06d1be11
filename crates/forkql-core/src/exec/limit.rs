//! LIMIT.

use super::operator::Operator;
use crate::block::Page;
use crate::error::Result;

/// Passes through the first `limit` rows and releases everything after.
pub struct LimitOperator {
    remaining: usize,
    pending: Option<Page>,
    finishing: bool,
}

impl LimitOperator {
    pub fn new(limit: usize) -> Self {
        Self {
            remaining: limit,
            pending: None,
            finishing: false,
        }
    }
}

impl Operator for LimitOperator {
    fn needs_input(&self) -> bool {
        self.pending.is_none() && !self.finishing && self.remaining > 0
    }

    fn add_input(&mut self, page: Page) {
        if self.remaining == 0 {
            page.release();
            return;
        }
        self.pending = Some(page);
    }

    fn finish(&mut self) {
        self.finishing = true;
    }

    fn is_finished(&self) -> bool {
        self.pending.is_none() && (self.finishing || self.remaining == 0)
    }

    fn get_output(&mut self) -> Result<Option<Page>> {
        let Some(page) = self.pending.take() else {
            return Ok(None);
        };
        let rows = page.position_count();
        if rows <= self.remaining {
            self.remaining -= rows;
            return Ok(Some(page));
        }
        let positions: Vec<usize> = (0..self.remaining).collect();
        self.remaining = 0;
        Ok(Some(page.filter(&positions)))
    }

    fn close(&mut self) {
        if let Some(page) = self.pending.take() {
            page.release();
        }
    }

    fn name(&self) -> &'static str {
        "LimitOperator"
    }
}

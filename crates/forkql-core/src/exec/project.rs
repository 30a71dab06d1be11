//! KEEP and layout reshaping.

use super::operator::Operator;
use crate::block::Page;
use crate::error::Result;

/// Reorders and drops columns.
pub struct ProjectOperator {
    columns: Vec<usize>,
    pending: Option<Page>,
    finishing: bool,
}

impl ProjectOperator {
    /// `columns` are input column indices in output order.
    pub fn new(columns: Vec<usize>) -> Self {
        Self {
            columns,
            pending: None,
            finishing: false,
        }
    }
}

impl Operator for ProjectOperator {
    fn needs_input(&self) -> bool {
        self.pending.is_none() && !self.finishing
    }

    fn add_input(&mut self, page: Page) {
        self.pending = Some(page);
    }

    fn finish(&mut self) {
        self.finishing = true;
    }

    fn is_finished(&self) -> bool {
        self.finishing && self.pending.is_none()
    }

    fn get_output(&mut self) -> Result<Option<Page>> {
        Ok(self.pending.take().map(|page| page.project_blocks(&self.columns)))
    }

    fn close(&mut self) {
        if let Some(page) = self.pending.take() {
            page.release();
        }
    }

    fn name(&self) -> &'static str {
        "ProjectOperator"
    }
}

//! Branch-merge operator: interleaves pre-materialized branch output with
//! the live branch and tags every row with its branch.

use std::collections::VecDeque;

use forkql_proto::{DataType, Value};
use tracing::debug;

use super::operator::{Operator, OperatorState};
use crate::block::{BlockFactory, Page};
use crate::error::Result;

/// Discriminator value of a branch.
pub fn branch_tag(branch: usize) -> String {
    format!("fork{branch}")
}

/// Pages of one fully materialized branch.
#[derive(Debug)]
pub struct LocalSupplier {
    branch: usize,
    pages: VecDeque<Page>,
}

impl LocalSupplier {
    pub fn new(branch: usize, pages: Vec<Page>) -> Self {
        Self {
            branch,
            pages: pages.into(),
        }
    }

    pub fn branch(&self) -> usize {
        self.branch
    }

    fn release(&mut self) -> usize {
        let count = self.pages.len();
        for page in self.pages.drain(..) {
            page.release();
        }
        count
    }
}

/// Drains supplier pages first, in branch order, then passes through the
/// live branch (always `fork0`). Every page gets a constant keyword block
/// holding its branch tag appended as the last column.
///
/// Without an explicit projection a leading doc block is dropped before
/// stamping.
pub struct BranchMergeOperator {
    suppliers: VecDeque<LocalSupplier>,
    projection: Option<Vec<usize>>,
    factory: BlockFactory,
    pending: Option<Page>,
    state: OperatorState,
    emitted_pages: usize,
}

impl BranchMergeOperator {
    pub fn new(mut suppliers: Vec<LocalSupplier>, projection: Option<Vec<usize>>, factory: BlockFactory) -> Self {
        suppliers.sort_by_key(LocalSupplier::branch);
        Self {
            suppliers: suppliers.into(),
            projection,
            factory,
            pending: None,
            state: OperatorState::Running,
            emitted_pages: 0,
        }
    }

    fn stamp(&mut self, page: Page, branch: usize) -> Page {
        let page = match &self.projection {
            Some(columns) => page.project_blocks(columns),
            None if page.block_count() > 0 && page.block(0).is_doc_block() => {
                let columns: Vec<usize> = (1..page.block_count()).collect();
                page.project_blocks(&columns)
            }
            None => page,
        };
        let tag = self.factory.new_constant_block(
            DataType::Keyword,
            Value::String(branch_tag(branch)),
            page.position_count(),
        );
        self.emitted_pages += 1;
        page.append_block(tag)
    }

    fn next_supplied(&mut self) -> Option<(Page, usize)> {
        while let Some(supplier) = self.suppliers.front_mut() {
            if let Some(page) = supplier.pages.pop_front() {
                return Some((page, supplier.branch));
            }
            self.suppliers.pop_front();
        }
        None
    }
}

impl Operator for BranchMergeOperator {
    fn needs_input(&self) -> bool {
        self.state == OperatorState::Running && self.pending.is_none()
    }

    fn add_input(&mut self, page: Page) {
        debug_assert!(self.pending.is_none(), "branch merge received a page while holding one");
        self.pending = Some(page);
    }

    fn finish(&mut self) {
        if self.state == OperatorState::Running {
            self.state = OperatorState::Finishing;
        }
    }

    fn is_finished(&self) -> bool {
        match self.state {
            OperatorState::Finished | OperatorState::Closed => true,
            OperatorState::Finishing => {
                self.pending.is_none() && self.suppliers.iter().all(|s| s.pages.is_empty())
            }
            OperatorState::Running => false,
        }
    }

    fn get_output(&mut self) -> Result<Option<Page>> {
        if matches!(self.state, OperatorState::Finished | OperatorState::Closed) {
            return Ok(None);
        }
        if let Some((page, branch)) = self.next_supplied() {
            return Ok(Some(self.stamp(page, branch)));
        }
        if let Some(page) = self.pending.take() {
            return Ok(Some(self.stamp(page, 0)));
        }
        if self.state == OperatorState::Finishing {
            self.state = OperatorState::Finished;
            debug!(pages = self.emitted_pages, "branch merge finished");
        }
        Ok(None)
    }

    fn close(&mut self) {
        if self.state == OperatorState::Closed {
            return;
        }
        let mut released = self.suppliers.iter_mut().map(LocalSupplier::release).sum::<usize>();
        self.suppliers.clear();
        if let Some(page) = self.pending.take() {
            page.release();
            released += 1;
        }
        self.state = OperatorState::Closed;
        debug!(released_pages = released, "branch merge closed");
    }

    fn name(&self) -> &'static str {
        "BranchMergeOperator"
    }
}

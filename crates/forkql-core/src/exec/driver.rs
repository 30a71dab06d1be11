//! Single-threaded pull loop over one pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use super::operator::Operator;
use crate::block::{BlockFactory, Page};
use crate::error::{Error, Result};

/// Iterations without any page movement before a pipeline is declared stuck.
const MAX_IDLE_ITERATIONS: usize = 1024;

/// Shared state for every driver of a query.
#[derive(Debug, Clone, Default)]
pub struct DriverContext {
    pub factory: BlockFactory,
    cancelled: Arc<AtomicBool>,
}

impl DriverContext {
    pub fn new(factory: BlockFactory) -> Self {
        Self {
            factory,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ask every driver of the query to stop.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Moves pages from the first operator to the last until the last one is
/// finished. Output pages of the last operator are collected.
pub struct Driver {
    context: DriverContext,
    operators: Vec<Box<dyn Operator>>,
    output: Vec<Page>,
}

impl Driver {
    /// Create a driver. The first operator must be a source.
    ///
    /// # Panics
    ///
    /// If `operators` is empty.
    pub fn new(context: DriverContext, operators: Vec<Box<dyn Operator>>) -> Self {
        assert!(!operators.is_empty(), "a driver needs at least a source operator");
        Self {
            context,
            operators,
            output: vec![],
        }
    }

    /// Run to completion and return the collected pages.
    ///
    /// Every operator is closed on return, on success and on error. On error
    /// the pages collected so far are released.
    pub fn run(mut self) -> Result<Vec<Page>> {
        let result = self.run_loop();
        for operator in &mut self.operators {
            operator.close();
        }
        let output = std::mem::take(&mut self.output);
        match result {
            Ok(()) => {
                debug!(
                    pages = output.len(),
                    rows = output.iter().map(Page::position_count).sum::<usize>(),
                    "driver finished"
                );
                Ok(output)
            }
            Err(e) => {
                for page in output {
                    page.release();
                }
                Err(e)
            }
        }
    }

    fn run_loop(&mut self) -> Result<()> {
        let mut idle = 0;
        loop {
            if self.context.is_cancelled() {
                return Err(Error::execution("query cancelled"));
            }
            let moved = self.run_iteration()?;
            let last = self.operators.len() - 1;
            if self.operators[last].is_finished() {
                return Ok(());
            }
            if moved {
                idle = 0;
            } else {
                idle += 1;
                if idle > MAX_IDLE_ITERATIONS {
                    let stuck: Vec<&str> = self.operators.iter().map(|o| o.name()).collect();
                    return Err(Error::execution(format!(
                        "pipeline [{}] made no progress",
                        stuck.join(" -> ")
                    )));
                }
            }
        }
    }

    fn run_iteration(&mut self) -> Result<bool> {
        let mut moved = false;
        for i in 0..self.operators.len() - 1 {
            let (head, tail) = self.operators.split_at_mut(i + 1);
            let op = &mut head[i];
            let next = &mut tail[0];

            if !op.is_finished() && next.needs_input() {
                if let Some(page) = op.get_output()? {
                    trace!(from = op.name(), to = next.name(), rows = page.position_count(), "page moved");
                    next.add_input(page);
                    moved = true;
                }
            }
            if op.is_finished() {
                next.finish();
            }
        }

        let last = self.operators.len() - 1;
        if let Some(page) = self.operators[last].get_output()? {
            self.output.push(page);
            moved = true;
        }
        Ok(moved)
    }
}

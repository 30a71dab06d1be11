//! Physical operator traits.

use crate::block::Page;
use crate::error::Result;

/// The state of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    /// Accepting input or producing output.
    Running,
    /// No more input is accepted; buffered output may remain.
    Finishing,
    /// Every page has been handed out.
    Finished,
    /// Resources released.
    Closed,
}

/// A pipeline stage fed with pages and drained by its driver.
///
/// Operators never block: `get_output` returns `None` when nothing is
/// ready, letting the driver move other stages forward.
///
/// Pages passed to `add_input` become owned by the operator. Pages returned
/// from `get_output` become owned by the caller.
pub trait Operator: Send {
    /// Whether the operator can take another page now.
    fn needs_input(&self) -> bool;

    /// Hand a page to the operator.
    fn add_input(&mut self, page: Page);

    /// Signal that no more input will arrive. Idempotent.
    fn finish(&mut self);

    /// Whether every output page has been produced.
    fn is_finished(&self) -> bool;

    /// Take the next output page, if one is ready.
    fn get_output(&mut self) -> Result<Option<Page>>;

    /// Release every page still held. Idempotent; safe on any exit path.
    fn close(&mut self);

    /// Operator name for logs.
    fn name(&self) -> &'static str;
}

/// A pipeline stage that produces pages without input.
pub trait SourceOperator: Send {
    fn is_finished(&self) -> bool;

    fn get_output(&mut self) -> Result<Option<Page>>;

    fn close(&mut self);

    fn name(&self) -> &'static str;
}

/// Runs a [`SourceOperator`] as the first stage of a pipeline.
pub struct SourceAdapter<S> {
    source: S,
}

impl<S: SourceOperator> SourceAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: SourceOperator> Operator for SourceAdapter<S> {
    fn needs_input(&self) -> bool {
        false
    }

    fn add_input(&mut self, page: Page) {
        page.release();
        panic!("source operator [{}] does not accept input", self.source.name());
    }

    fn finish(&mut self) {}

    fn is_finished(&self) -> bool {
        self.source.is_finished()
    }

    fn get_output(&mut self) -> Result<Option<Page>> {
        self.source.get_output()
    }

    fn close(&mut self) {
        self.source.close();
    }

    fn name(&self) -> &'static str {
        self.source.name()
    }
}

/// Box a source as a pipeline operator.
pub fn source<S: SourceOperator + 'static>(source: S) -> Box<dyn Operator> {
    Box::new(SourceAdapter::new(source))
}

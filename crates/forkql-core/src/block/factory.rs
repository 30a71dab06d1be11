//! Block allocation and accounting.
//!
//! Every block created through a [`BlockFactory`] holds a reservation against
//! the factory's shared counters. The reservation is returned exactly once,
//! when the owning block is released or dropped. Drivers running on different
//! threads share one factory, so the counters sit behind a mutex.

use std::sync::Arc;

use forkql_proto::{DataType, Value};
use parking_lot::Mutex;

use super::{Block, BlockData};

#[derive(Debug, Default)]
struct Accounting {
    live_blocks: usize,
    live_bytes: usize,
    allocated_blocks: u64,
}

/// Creates blocks and tracks how many are still alive.
#[derive(Debug, Clone, Default)]
pub struct BlockFactory {
    accounting: Arc<Mutex<Accounting>>,
}

impl BlockFactory {
    /// Create a factory with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a block from one value per position.
    pub fn new_vector_block(&self, data_type: DataType, values: Vec<Value>) -> Block {
        let bytes = values.iter().map(Value::size_in_bytes).sum();
        Block::from_parts(data_type, BlockData::Vector(values), self.reserve(bytes))
    }

    /// Create a block that repeats one value for `positions` rows.
    pub fn new_constant_block(&self, data_type: DataType, value: Value, positions: usize) -> Block {
        let bytes = value.size_in_bytes();
        Block::from_parts(
            data_type,
            BlockData::Constant { value, positions },
            self.reserve(bytes),
        )
    }

    /// Create an execution-internal block of document ordinals.
    pub fn new_doc_block(&self, docs: Vec<u64>) -> Block {
        let bytes = docs.len() * std::mem::size_of::<u64>();
        Block::from_parts(DataType::Doc, BlockData::Doc(docs), self.reserve(bytes))
    }

    /// Number of blocks created by this factory and not yet released.
    pub fn live_blocks(&self) -> usize {
        self.accounting.lock().live_blocks
    }

    /// Approximate bytes held by live blocks.
    pub fn live_bytes(&self) -> usize {
        self.accounting.lock().live_bytes
    }

    /// Total blocks ever created.
    pub fn allocated_blocks(&self) -> u64 {
        self.accounting.lock().allocated_blocks
    }

    pub(crate) fn reserve(&self, bytes: usize) -> Reservation {
        let mut accounting = self.accounting.lock();
        accounting.live_blocks += 1;
        accounting.live_bytes += bytes;
        accounting.allocated_blocks += 1;
        Reservation {
            accounting: Arc::clone(&self.accounting),
            bytes,
        }
    }
}

/// A live block's claim on its factory's counters.
#[derive(Debug)]
pub(crate) struct Reservation {
    accounting: Arc<Mutex<Accounting>>,
    bytes: usize,
}

impl Reservation {
    pub(crate) fn factory(&self) -> BlockFactory {
        BlockFactory {
            accounting: Arc::clone(&self.accounting),
        }
    }

    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let mut accounting = self.accounting.lock();
        assert!(
            accounting.live_blocks > 0 && accounting.live_bytes >= self.bytes,
            "block released more often than it was allocated"
        );
        accounting.live_blocks -= 1;
        accounting.live_bytes -= self.bytes;
    }
}

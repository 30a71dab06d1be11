//! Columnar blocks and pages.
//!
//! A [`Block`] is one typed column; a [`Page`] is an ordered set of blocks of
//! equal length. Both are exclusively owned. Handing a page to the next
//! operator moves it; whoever holds a page last releases it.

mod factory;
mod page;

pub use factory::BlockFactory;
pub use page::Page;

use forkql_proto::{DataType, Value};

use factory::Reservation;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BlockData {
    Vector(Vec<Value>),
    Constant { value: Value, positions: usize },
    Doc(Vec<u64>),
}

/// A single typed column of values.
#[derive(Debug)]
pub struct Block {
    data_type: DataType,
    data: BlockData,
    reservation: Reservation,
}

impl Block {
    pub(crate) fn from_parts(data_type: DataType, data: BlockData, reservation: Reservation) -> Self {
        Self {
            data_type,
            data,
            reservation,
        }
    }

    /// Column type.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Number of positions (rows).
    pub fn position_count(&self) -> usize {
        match &self.data {
            BlockData::Vector(values) => values.len(),
            BlockData::Constant { positions, .. } => *positions,
            BlockData::Doc(docs) => docs.len(),
        }
    }

    /// Whether this is the internal doc-addressing block.
    pub fn is_doc_block(&self) -> bool {
        matches!(self.data, BlockData::Doc(_))
    }

    /// Whether every position carries the same value.
    pub fn is_constant(&self) -> bool {
        matches!(self.data, BlockData::Constant { .. })
    }

    /// Value at a position. Doc blocks expose their ordinal as a long.
    pub fn value(&self, position: usize) -> Value {
        match &self.data {
            BlockData::Vector(values) => values.get(position).cloned().unwrap_or(Value::Null),
            BlockData::Constant { value, positions } if position < *positions => value.clone(),
            BlockData::Constant { .. } => Value::Null,
            BlockData::Doc(docs) => docs
                .get(position)
                .map(|d| Value::Int64(*d as i64))
                .unwrap_or(Value::Null),
        }
    }

    /// Document ordinal at a position of a doc block.
    pub fn doc(&self, position: usize) -> Option<u64> {
        match &self.data {
            BlockData::Doc(docs) => docs.get(position).copied(),
            _ => None,
        }
    }

    /// Build a new block holding only the given positions, in the given order.
    pub fn filter(&self, positions: &[usize]) -> Block {
        let factory = self.reservation.factory();
        match &self.data {
            BlockData::Vector(values) => factory.new_vector_block(
                self.data_type,
                positions.iter().map(|&p| values[p].clone()).collect(),
            ),
            BlockData::Constant { value, .. } => {
                factory.new_constant_block(self.data_type, value.clone(), positions.len())
            }
            BlockData::Doc(docs) => factory.new_doc_block(positions.iter().map(|&p| docs[p]).collect()),
        }
    }

    /// Approximate bytes held by this block.
    pub fn size_in_bytes(&self) -> usize {
        self.reservation.bytes()
    }

    /// Give the block back to its factory.
    pub fn release(self) {
        drop(self);
    }
}

impl Clone for Block {
    fn clone(&self) -> Self {
        let reservation = self.reservation.factory().reserve(self.reservation.bytes());
        Self {
            data_type: self.data_type,
            data: self.data.clone(),
            reservation,
        }
    }
}

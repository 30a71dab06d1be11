//! Pages: equal-length collections of blocks.

use forkql_proto::{DataType, Value};

use super::{Block, BlockFactory};

/// An ordered collection of equal-length blocks.
#[derive(Debug, Clone)]
pub struct Page {
    blocks: Vec<Block>,
    position_count: usize,
}

impl Page {
    /// Create a page. Every block must have the same position count.
    pub fn new(blocks: Vec<Block>) -> Self {
        let position_count = blocks.first().map(Block::position_count).unwrap_or(0);
        Self::with_positions(position_count, blocks)
    }

    /// Create a page with an explicit position count, allowing zero blocks.
    pub fn with_positions(position_count: usize, blocks: Vec<Block>) -> Self {
        assert!(
            blocks.iter().all(|b| b.position_count() == position_count),
            "all blocks of a page must have {position_count} positions"
        );
        Self {
            blocks,
            position_count,
        }
    }

    /// Build a page from row-major values using `factory`.
    pub fn from_rows(factory: &BlockFactory, types: &[DataType], rows: &[Vec<Value>]) -> Self {
        let blocks = types
            .iter()
            .enumerate()
            .map(|(col, data_type)| {
                let values = rows
                    .iter()
                    .map(|row| row.get(col).cloned().unwrap_or(Value::Null))
                    .collect();
                factory.new_vector_block(*data_type, values)
            })
            .collect();
        Self::with_positions(rows.len(), blocks)
    }

    /// Number of rows.
    pub fn position_count(&self) -> usize {
        self.position_count
    }

    /// Number of columns.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Block at a column index.
    pub fn block(&self, index: usize) -> &Block {
        &self.blocks[index]
    }

    /// All blocks in column order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Value at a row and column.
    pub fn value(&self, position: usize, column: usize) -> Value {
        self.blocks[column].value(position)
    }

    /// All values of a row.
    pub fn row(&self, position: usize) -> Vec<Value> {
        self.blocks.iter().map(|b| b.value(position)).collect()
    }

    /// Append a block as the last column.
    pub fn append_block(mut self, block: Block) -> Page {
        assert_eq!(
            block.position_count(),
            self.position_count,
            "appended block has the wrong position count"
        );
        self.blocks.push(block);
        self
    }

    /// Keep only the given columns, in the given order. Unselected blocks are
    /// released; a column selected twice is copied.
    pub fn project_blocks(self, columns: &[usize]) -> Page {
        let position_count = self.position_count;
        let mut slots: Vec<Option<Block>> = self.blocks.into_iter().map(Some).collect();
        let mut projected = Vec::with_capacity(columns.len());
        for (i, &column) in columns.iter().enumerate() {
            let reused_later = columns[i + 1..].contains(&column);
            let block = if reused_later {
                slots[column].as_ref().map(Block::clone)
            } else {
                slots[column].take()
            };
            projected.push(block.expect("projected column index out of range"));
        }
        // remaining slots drop here
        Page::with_positions(position_count, projected)
    }

    /// Keep only the given rows, in the given order. Consumes and releases the input.
    pub fn filter(self, positions: &[usize]) -> Page {
        if positions.len() == self.position_count && positions.iter().enumerate().all(|(i, &p)| i == p) {
            return self;
        }
        let blocks = self.blocks.iter().map(|b| b.filter(positions)).collect();
        let filtered = Page::with_positions(positions.len(), blocks);
        self.release();
        filtered
    }

    /// Take ownership of the blocks.
    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    /// Release every block of this page.
    pub fn release(self) {
        for block in self.blocks {
            block.release();
        }
    }
}

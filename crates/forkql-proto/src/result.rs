//! Result set types returned to callers.

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::attribute::DataType;
use crate::value::Value;

/// Column descriptor of a result set.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Column type.
    pub data_type: DataType,
}

impl ColumnInfo {
    /// Create a column descriptor.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Column data within a result set.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct ColumnData {
    /// Column descriptor.
    pub info: ColumnInfo,
    /// Values for each row.
    pub values: Vec<Value>,
}

/// A complete, column-oriented query result.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct ResultSet {
    /// Columns, each with the same number of values.
    pub columns: Vec<ColumnData>,
}

impl ResultSet {
    /// Create an empty result set with the given columns.
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        Self {
            columns: columns
                .into_iter()
                .map(|info| ColumnData {
                    info,
                    values: vec![],
                })
                .collect(),
        }
    }

    /// Append a row. The row must have one value per column.
    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.values.push(value);
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    /// Check if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column descriptors in order.
    pub fn column_infos(&self) -> Vec<&ColumnInfo> {
        self.columns.iter().map(|c| &c.info).collect()
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.info.name.as_str()).collect()
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|c| c.info.name == name)
    }

    /// Get the value at a row and column.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        self.column(column).and_then(|c| c.values.get(row))
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&Value>> {
        (0..self.len()).map(move |i| self.columns.iter().map(|c| &c.values[i]).collect())
    }
}

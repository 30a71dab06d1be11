//! Runtime value types carried in columns, literals and result sets.

use std::cmp::Ordering;
use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::attribute::DataType;

/// A single runtime value.
///
/// Keyword and text columns both carry [`Value::String`]; the distinction lives
/// in the column's [`DataType`].
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 32-bit floating point.
    Float32(f32),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string (keyword or text).
    String(String),
    /// Dense vector of 32-bit floats.
    Float32Array(Vec<f32>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The natural data type of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Boolean,
            Value::Int32(_) => DataType::Integer,
            Value::Int64(_) => DataType::Long,
            Value::Float32(_) => DataType::Float,
            Value::Float64(_) => DataType::Double,
            Value::String(_) => DataType::Keyword,
            Value::Float32Array(_) => DataType::DenseVector,
        }
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64, widening integers.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::Int32(i) => Some(*i as i64),
            _ => None,
        }
    }

    /// Try to get as f64, widening any numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            Value::Float32(f) => Some(*f as f64),
            Value::Int64(i) => Some(*i as f64),
            Value::Int32(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as a dense vector.
    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            Value::Float32Array(v) => Some(v),
            _ => None,
        }
    }

    /// Approximate heap footprint, used for block accounting.
    pub fn size_in_bytes(&self) -> usize {
        let inline = std::mem::size_of::<Value>();
        match self {
            Value::String(s) => inline + s.len(),
            Value::Float32Array(v) => inline + v.len() * std::mem::size_of::<f32>(),
            _ => inline,
        }
    }

    /// Compare two values.
    ///
    /// Numbers compare across widths, strings lexicographically. Returns `None`
    /// for incomparable pairs, including anything compared with null.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Int32(_) | Value::Int64(_), Value::Int32(_) | Value::Int64(_)) => {
                Some(self.as_i64()?.cmp(&other.as_i64()?))
            }
            _ => {
                let a = self.as_f64()?;
                let b = other.as_f64()?;
                a.partial_cmp(&b)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int32(i) => write!(f, "{i}"),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Float32Array(v) => {
                write!(f, "[")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Value::Float32Array(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_compare_across_widths() {
        assert_eq!(Value::Int32(3).compare(&Value::Int64(3)), Some(Ordering::Equal));
        assert_eq!(Value::Int32(2).compare(&Value::Float64(2.5)), Some(Ordering::Less));
        assert_eq!(Value::Float32(1.0).compare(&Value::Int64(0)), Some(Ordering::Greater));
    }

    #[test]
    fn test_null_is_incomparable() {
        assert_eq!(Value::Null.compare(&Value::Int32(1)), None);
        assert_eq!(Value::String("a".into()).compare(&Value::Int32(1)), None);
    }

    #[test]
    fn test_display_vector() {
        let v = Value::from(vec![0.5f32, 1.0]);
        assert_eq!(v.to_string(), "[0.5, 1]");
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::String("x".into()));
    }
}

//! Column attributes and data types.

use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

/// Document identifier metadata column.
pub const METADATA_ID: &str = "_id";
/// Source index metadata column.
pub const METADATA_INDEX: &str = "_index";
/// Relevance score metadata column.
pub const METADATA_SCORE: &str = "_score";
/// Internal doc-addressing column emitted by relation sources.
pub const DOC_COLUMN: &str = "_doc";

/// Column data types understood by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum DataType {
    /// Exact-match string.
    Keyword,
    /// Analyzed full-text string.
    Text,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Boolean.
    Boolean,
    /// Dense float vector used for k-NN retrieval.
    DenseVector,
    /// Execution-internal document address. Never user visible.
    Doc,
    /// Type of the null literal.
    Null,
    /// Not yet resolved against a source schema.
    Unresolved,
}

impl DataType {
    /// Whether values of this type are strings.
    pub fn is_string(self) -> bool {
        matches!(self, DataType::Keyword | DataType::Text)
    }

    /// Whether values of this type are numeric.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            DataType::Integer | DataType::Long | DataType::Float | DataType::Double
        )
    }

    /// Lower-case type name as shown in result column descriptors.
    pub fn type_name(self) -> &'static str {
        match self {
            DataType::Keyword => "keyword",
            DataType::Text => "text",
            DataType::Integer => "integer",
            DataType::Long => "long",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::Boolean => "boolean",
            DataType::DenseVector => "dense_vector",
            DataType::Doc => "doc",
            DataType::Null => "null",
            DataType::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A named, typed column reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct Attribute {
    /// Column name.
    pub name: String,
    /// Column type, `Unresolved` until the analyzer binds it.
    pub data_type: DataType,
    /// Planner-synthesized columns (discriminators, metadata) are not user input fields.
    #[serde(default)]
    pub synthetic: bool,
}

impl Attribute {
    /// Create a resolved attribute.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            synthetic: false,
        }
    }

    /// Create an attribute that still needs resolution.
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Unresolved)
    }

    /// Create a planner-synthesized attribute.
    pub fn synthetic(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            synthetic: true,
        }
    }

    /// The keyword column that tags each row with the branch that produced it.
    pub fn discriminator(name: impl Into<String>) -> Self {
        Self::synthetic(name, DataType::Keyword)
    }

    /// Metadata attribute for one of the well-known metadata column names.
    pub fn metadata(name: &str) -> Option<Self> {
        match name {
            METADATA_ID | METADATA_INDEX => Some(Self::synthetic(name, DataType::Keyword)),
            METADATA_SCORE => Some(Self::synthetic(name, DataType::Float)),
            _ => None,
        }
    }

    /// The internal doc-addressing attribute.
    pub fn doc() -> Self {
        Self::synthetic(DOC_COLUMN, DataType::Doc)
    }

    /// Whether the type of this attribute is known.
    pub fn resolved(&self) -> bool {
        self.data_type != DataType::Unresolved
    }

    /// Same name and same data type.
    pub fn same_column(&self, other: &Attribute) -> bool {
        self.name == other.name && self.data_type == other.data_type
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{{}}}", self.name, self.data_type)
    }
}

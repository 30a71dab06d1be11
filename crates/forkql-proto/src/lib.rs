//! forkql protocol types.
//!
//! Values, attributes, fused ranking documents and result sets shared by the
//! planner, the executor and remote executors, plus the name-tagged frame codec
//! used to ship plan fragments.
//!
//! # Modules
//!
//! - [`value`] - Runtime values carried in columns and literals
//! - [`attribute`] - Column attributes and data types
//! - [`rank`] - Fused ranking documents
//! - [`result`] - Column-oriented result sets
//! - [`framing`] - Name-tagged frames
//! - [`error`] - Protocol error types
//!
//! All data types derive `rkyv::Archive` as well as serde's traits.

pub mod attribute;
pub mod error;
pub mod framing;
pub mod rank;
pub mod result;
pub mod value;

pub use attribute::{Attribute, DataType, DOC_COLUMN, METADATA_ID, METADATA_INDEX, METADATA_SCORE};
pub use error::Error;
pub use framing::{decode_named_frame, encode_named_frame, NamedFrame};
pub use rank::RankDoc;
pub use result::{ColumnData, ColumnInfo, ResultSet};
pub use value::Value;

/// Protocol version for wire compatibility of plan fragments.
pub const PROTOCOL_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version() {
        assert_eq!(PROTOCOL_VERSION, 1);
    }

    #[test]
    fn test_rank_doc_roundtrip() {
        let doc = RankDoc::new("42", "books", 0.032).with_rank(1);
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&doc).unwrap();
        let archived = rkyv::access::<rank::ArchivedRankDoc, rkyv::rancor::Error>(&bytes).unwrap();
        let deserialized: RankDoc =
            rkyv::deserialize::<RankDoc, rkyv::rancor::Error>(archived).unwrap();
        assert_eq!(deserialized, doc);
        assert_eq!(deserialized.rank, Some(1));
    }

    #[test]
    fn test_result_set_roundtrip() {
        let mut rs = ResultSet::new(vec![
            ColumnInfo::new("content", DataType::Text),
            ColumnInfo::new("_fork", DataType::Keyword),
        ]);
        rs.push_row(vec![Value::from("brown fox"), Value::from("fork0")]);

        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&rs).unwrap();
        let archived =
            rkyv::access::<result::ArchivedResultSet, rkyv::rancor::Error>(&bytes).unwrap();
        let deserialized: ResultSet =
            rkyv::deserialize::<ResultSet, rkyv::rancor::Error>(archived).unwrap();
        assert_eq!(deserialized, rs);
    }
}

//! Wire form of executable plans.
//!
//! A plan travels as a named frame: the root node's writeable name followed
//! by the protocol version and the node's JSON field list. Only executable
//! nodes register a name; a `Fork` must be rewritten into merges first.

use forkql_proto::{decode_named_frame, encode_named_frame, PROTOCOL_VERSION};

use super::node::LogicalPlan;
use crate::error::{Error, Result};

/// Writeable names a receiver can decode.
pub const WRITEABLE_NAMES: &[&str] = &[
    "Retrieve",
    "Relation",
    "LocalRelation",
    "Filter",
    "OrderBy",
    "Limit",
    "Project",
    "Merge",
    "Rerank",
];

const VERSION_SIZE: usize = 4;

/// Whether a node type has a registered wire form.
pub fn is_writeable(name: &str) -> bool {
    WRITEABLE_NAMES.contains(&name)
}

/// Encode a plan into a named frame.
pub fn encode_plan(plan: &LogicalPlan) -> Result<Vec<u8>> {
    let mut unwritable = None;
    plan.for_each_up(&mut |node| {
        if unwritable.is_none() && !is_writeable(node.writeable_name()) {
            unwritable = Some(node.writeable_name());
        }
    });
    if let Some(name) = unwritable {
        return Err(Error::Serialization(format!(
            "[{name}] has no wire form and must be rewritten before serialization"
        )));
    }

    let fields = serde_json::to_vec(plan).map_err(|e| Error::Serialization(e.to_string()))?;
    let mut payload = Vec::with_capacity(VERSION_SIZE + fields.len());
    payload.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    payload.extend_from_slice(&fields);
    Ok(encode_named_frame(plan.writeable_name(), &payload)?)
}

/// Decode a plan from a named frame.
pub fn decode_plan(data: &[u8]) -> Result<LogicalPlan> {
    let frame = decode_named_frame(data)?;
    if !is_writeable(frame.name) {
        return Err(forkql_proto::Error::UnknownWriteable(frame.name.to_string()).into());
    }
    if frame.payload.len() < VERSION_SIZE {
        return Err(forkql_proto::Error::InvalidMessage("plan payload has no version".into()).into());
    }
    let (version, fields) = frame.payload.split_at(VERSION_SIZE);
    let mut version_bytes = [0u8; VERSION_SIZE];
    version_bytes.copy_from_slice(version);
    let version = u32::from_be_bytes(version_bytes);
    if version != PROTOCOL_VERSION {
        return Err(forkql_proto::Error::VersionMismatch {
            expected: PROTOCOL_VERSION,
            actual: version,
        }
        .into());
    }

    let plan: LogicalPlan =
        serde_json::from_slice(fields).map_err(|e| Error::Serialization(e.to_string()))?;
    if plan.writeable_name() != frame.name {
        return Err(forkql_proto::Error::InvalidMessage(format!(
            "frame named [{}] carries a [{}]",
            frame.name,
            plan.writeable_name()
        ))
        .into());
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{lit, matches};
    use crate::plan::fork::Fork;
    use crate::plan::merge::Merge;
    use crate::plan::relation::Relation;
    use crate::plan::rerank::Rerank;
    use forkql_proto::{Attribute, DataType};

    fn relation() -> LogicalPlan {
        LogicalPlan::Relation(Relation::new(
            "docs",
            vec![
                Attribute::new("content", DataType::Text),
                Attribute::metadata("_id").unwrap(),
                Attribute::metadata("_index").unwrap(),
            ],
        ))
    }

    #[test]
    fn test_merge_and_rerank_travel() {
        let merge = LogicalPlan::Merge(Merge::new(relation(), relation(), Attribute::discriminator("_fork")));
        let decoded = decode_plan(&encode_plan(&merge).unwrap()).unwrap();
        assert_eq!(decoded, merge);

        let rerank = LogicalPlan::Rerank(
            Rerank::new(relation(), lit(5), matches("content", "fox"), matches("content", "dog"))
                .with_rank_constant(20.0),
        );
        let frame = encode_plan(&rerank).unwrap();
        assert_eq!(decode_named_frame(&frame).unwrap().name, "Rerank");
        assert_eq!(decode_plan(&frame).unwrap(), rerank);
    }

    #[test]
    fn test_fork_is_rejected() {
        let fork = LogicalPlan::Fork(Fork::new(
            relation(),
            vec![relation(), relation()],
            Attribute::discriminator("_fork"),
        ));
        let err = encode_plan(&fork).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.to_string().contains("[Fork]"));
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let frame = encode_named_frame("Fork", &PROTOCOL_VERSION.to_be_bytes()).unwrap();
        let err = decode_plan(&frame).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(forkql_proto::Error::UnknownWriteable(ref name)) if name == "Fork"
        ));
    }

    #[test]
    fn test_name_mismatch_is_rejected() {
        let valid = encode_plan(&relation()).unwrap();
        let payload = &valid[5 + "Relation".len()..];
        let renamed = encode_named_frame("Filter", payload).unwrap();
        let err = decode_plan(&renamed).unwrap_err();
        assert!(matches!(err, Error::Protocol(forkql_proto::Error::InvalidMessage(_))));
    }

    #[test]
    fn test_version_mismatch() {
        let mut payload = (PROTOCOL_VERSION + 1).to_be_bytes().to_vec();
        payload.extend_from_slice(b"{}");
        let frame = encode_named_frame("Relation", &payload).unwrap();
        assert!(matches!(
            decode_plan(&frame).unwrap_err(),
            Error::Protocol(forkql_proto::Error::VersionMismatch { .. })
        ));
    }
}

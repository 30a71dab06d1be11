//! Name-tagged frames for shipping plan fragments to remote executors.
//!
//! Layout: `[length (4 bytes BE)][name length (1 byte)][name (UTF-8)][payload]`.
//! The length covers everything after the length prefix. The name is the
//! writeable name a receiver uses to pick a decoder for the payload.

use crate::Error;

/// Maximum frame body size (16 MB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Longest writeable name a frame can carry.
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// A decoded frame borrowing from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedFrame<'a> {
    /// Writeable name of the payload.
    pub name: &'a str,
    /// Encoded fields.
    pub payload: &'a [u8],
}

/// Encode a payload under a writeable name.
pub fn encode_named_frame(name: &str, payload: &[u8]) -> Result<Vec<u8>, Error> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidMessage(format!(
            "writeable name length {} outside 1..={}",
            name.len(),
            MAX_NAME_LEN
        )));
    }

    let body_len = 1 + name.len() + payload.len();
    if body_len > MAX_FRAME_SIZE {
        return Err(Error::InvalidMessage(format!(
            "frame size {} exceeds maximum {}",
            body_len, MAX_FRAME_SIZE
        )));
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + body_len);
    frame.extend_from_slice(&(body_len as u32).to_be_bytes());
    frame.push(name.len() as u8);
    frame.extend_from_slice(name.as_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Return the total frame size if `data` holds a complete frame.
pub fn frame_complete(data: &[u8]) -> Option<usize> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return None;
    }
    let mut header = [0u8; LENGTH_PREFIX_SIZE];
    header.copy_from_slice(&data[..LENGTH_PREFIX_SIZE]);
    let total = LENGTH_PREFIX_SIZE + u32::from_be_bytes(header) as usize;
    (data.len() >= total).then_some(total)
}

/// Decode one frame from the start of `data`.
pub fn decode_named_frame(data: &[u8]) -> Result<NamedFrame<'_>, Error> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Err(Error::InvalidMessage(format!(
            "buffer too short for length prefix: {} < {}",
            data.len(),
            LENGTH_PREFIX_SIZE
        )));
    }

    let mut header = [0u8; LENGTH_PREFIX_SIZE];
    header.copy_from_slice(&data[..LENGTH_PREFIX_SIZE]);
    let body_len = u32::from_be_bytes(header) as usize;
    if body_len > MAX_FRAME_SIZE {
        return Err(Error::InvalidMessage(format!(
            "frame length {} exceeds maximum {}",
            body_len, MAX_FRAME_SIZE
        )));
    }

    let body = data
        .get(LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + body_len)
        .ok_or_else(|| {
            Error::InvalidMessage(format!(
                "frame incomplete: have {}, need {}",
                data.len(),
                LENGTH_PREFIX_SIZE + body_len
            ))
        })?;

    let (&name_len, rest) = body
        .split_first()
        .ok_or_else(|| Error::InvalidMessage("frame missing writeable name".to_string()))?;
    let name_len = name_len as usize;
    if name_len == 0 || rest.len() < name_len {
        return Err(Error::InvalidMessage(format!(
            "invalid writeable name length {}",
            name_len
        )));
    }

    let name = std::str::from_utf8(&rest[..name_len])
        .map_err(|e| Error::Deserialization(format!("writeable name is not UTF-8: {e}")))?;

    Ok(NamedFrame {
        name,
        payload: &rest[name_len..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = encode_named_frame("Merge", b"{}").unwrap();
        // body = 1 + 5 + 2
        assert_eq!(&frame[..4], &[0, 0, 0, 8]);
        assert_eq!(frame[4], 5);
        assert_eq!(&frame[5..10], b"Merge");
        assert_eq!(&frame[10..], b"{}");
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut frame = encode_named_frame("Rerank", b"abc").unwrap();
        frame.extend_from_slice(b"next");
        let decoded = decode_named_frame(&frame).unwrap();
        assert_eq!(decoded.name, "Rerank");
        assert_eq!(decoded.payload, b"abc");
        assert_eq!(frame_complete(&frame), Some(frame.len() - 4));
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(encode_named_frame("", b"x").is_err());
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let frame = encode_named_frame("Relation", b"payload").unwrap();
        assert!(decode_named_frame(&frame[..frame.len() - 1]).is_err());
        assert_eq!(frame_complete(&frame[..3]), None);
    }

    #[test]
    fn test_oversized_name_length_rejected() {
        // body claims a 9-byte name but only carries 2 bytes
        let data = [0, 0, 0, 3, 9, b'a', b'b'];
        assert!(decode_named_frame(&data).is_err());
    }
}

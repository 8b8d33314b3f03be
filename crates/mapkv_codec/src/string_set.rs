//! String-set payload codec.
//!
//! A set is stored as a concatenation of `varint32(len) | utf8 bytes` items
//! with no count prefix; the payload length bounds the sequence. An empty
//! set encodes to zero bytes.

use crate::error::{CodecError, CodecResult};
use std::collections::BTreeSet;

/// Encodes a string set.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode(set: &BTreeSet<String>) -> Vec<u8> {
    let size: usize = set.iter().map(|s| varint_len(s.len() as u32) + s.len()).sum();
    let mut out = Vec::with_capacity(size);
    for s in set {
        // Record values are bounded far below u32::MAX
        put_varint(&mut out, s.len() as u32);
        out.extend_from_slice(s.as_bytes());
    }
    out
}

/// Decodes a string set.
///
/// # Errors
///
/// Returns an error if a length prefix runs past the payload or an item is
/// not valid UTF-8.
pub fn decode(bytes: &[u8]) -> CodecResult<BTreeSet<String>> {
    let mut set = BTreeSet::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let (len, used) = get_varint(&bytes[pos..])?;
        pos += used;
        let end = pos
            .checked_add(len as usize)
            .filter(|end| *end <= bytes.len())
            .ok_or(CodecError::UnexpectedEof)?;
        let s = std::str::from_utf8(&bytes[pos..end]).map_err(|_| CodecError::InvalidUtf8)?;
        set.insert(s.to_string());
        pos = end;
    }
    Ok(set)
}

fn varint_len(mut v: u32) -> usize {
    let mut n = 1;
    while v >= 0x80 {
        v >>= 7;
        n += 1;
    }
    n
}

#[allow(clippy::cast_possible_truncation)]
fn put_varint(out: &mut Vec<u8>, mut v: u32) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

fn get_varint(bytes: &[u8]) -> CodecResult<(u32, usize)> {
    let mut result: u32 = 0;
    for (i, b) in bytes.iter().take(5).enumerate() {
        result |= u32::from(b & 0x7f) << (7 * i);
        if b & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }
    if bytes.len() < 5 {
        Err(CodecError::UnexpectedEof)
    } else {
        Err(CodecError::decoding_failed("varint longer than 5 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn empty_set_is_empty_payload() {
        assert!(encode(&BTreeSet::new()).is_empty());
        assert!(decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn layout_is_length_prefixed() {
        let bytes = encode(&set(&["ab", "c"]));
        assert_eq!(bytes, vec![2, b'a', b'b', 1, b'c']);
    }

    #[test]
    fn empty_string_member() {
        let s = set(&["", "x"]);
        assert_eq!(decode(&encode(&s)).unwrap(), s);
    }

    #[test]
    fn long_member_uses_multibyte_varint() {
        let long = "y".repeat(300);
        let s = set(&[long.as_str()]);
        let bytes = encode(&s);
        assert_eq!(&bytes[..2], &[0xac, 0x02]);
        assert_eq!(decode(&bytes).unwrap(), s);
    }

    #[test]
    fn truncated_member_fails() {
        assert_eq!(decode(&[3, b'a']), Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn truncated_varint_fails() {
        assert_eq!(decode(&[0x80]), Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn overlong_varint_fails() {
        assert!(matches!(
            decode(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    #[test]
    fn varint_len_boundaries() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(127), 1);
        assert_eq!(varint_len(128), 2);
        assert_eq!(varint_len(u32::MAX), 5);
    }
}

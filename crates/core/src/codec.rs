//! Key codec for vector-indexed regions.
//!
//! Keys of an index region embed the vector id as a trailing 8-byte
//! big-endian suffix so that lexicographic key order equals numeric id
//! order:
//!
//! ```text
//! [tag(1)] [partition prefix ...] [vector_id(8, BE)]
//! ```
//!
//! Vector payloads live under the `'v'` tag and per-vector scalar fields
//! under the `'s'` tag, side by side in the data column family. A region's
//! physics range therefore covers both tag spaces.

use crate::range::Range;

/// Leading tag byte for vector data keys.
pub const VECTOR_DATA_TAG: u8 = b'v';
/// Leading tag byte for vector scalar sidecar keys.
pub const VECTOR_SCALAR_TAG: u8 = b's';

/// Append the big-endian vector id to a partition prefix.
pub fn encode_vector_key(prefix: &[u8], vector_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&vector_id.to_be_bytes());
    key
}

/// Read the vector id from the trailing 8 bytes of a key.
///
/// Keys shorter than 8 bytes decode to 0 — the open-end convention: an
/// end key that carries no id means "unbounded above".
pub fn decode_vector_id(key: &[u8]) -> u64 {
    if key.len() < 8 {
        return 0;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&key[key.len() - 8..]);
    u64::from_be_bytes(buf)
}

/// Remap a vector data key onto the scalar sidecar key space.
pub fn scalar_key(key: &[u8]) -> Vec<u8> {
    let mut k = key.to_vec();
    if let Some(tag) = k.first_mut() {
        if *tag == VECTOR_DATA_TAG {
            *tag = VECTOR_SCALAR_TAG;
        }
    }
    k
}

/// The scalar sidecar range corresponding to a vector data range.
pub fn scalar_range(range: &Range) -> Range {
    Range {
        start_key: scalar_key(&range.start_key),
        end_key: scalar_key(&range.end_key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_key_roundtrip() {
        let key = encode_vector_key(b"vp1", 12345);
        assert_eq!(key.len(), 3 + 8);
        assert_eq!(decode_vector_id(&key), 12345);
    }

    #[test]
    fn test_key_order_follows_id_order() {
        let a = encode_vector_key(b"vp1", 1);
        let b = encode_vector_key(b"vp1", 2);
        let c = encode_vector_key(b"vp1", u64::MAX);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_short_key_decodes_to_zero() {
        assert_eq!(decode_vector_id(b"v"), 0);
        assert_eq!(decode_vector_id(b""), 0);
    }

    #[test]
    fn test_scalar_remap() {
        let data = encode_vector_key(b"vp1", 7);
        let scalar = scalar_key(&data);
        assert_eq!(scalar[0], VECTOR_SCALAR_TAG);
        assert_eq!(&scalar[1..], &data[1..]);
        // Non-vector keys pass through untouched.
        assert_eq!(scalar_key(b"d123"), b"d123".to_vec());
    }

    #[test]
    fn test_scalar_range() {
        let r = Range::new(encode_vector_key(b"vp", 0), encode_vector_key(b"vp", 100));
        let s = scalar_range(&r);
        assert_eq!(s.start_key[0], VECTOR_SCALAR_TAG);
        assert_eq!(s.end_key[0], VECTOR_SCALAR_TAG);
        assert_eq!(decode_vector_id(&s.end_key), 100);
    }
}

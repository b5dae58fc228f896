//! Half-open byte ranges `[start_key, end_key)`.
//!
//! All region and request ranges in Basalt are half-open over raw bytes.
//! Comparisons are plain lexicographic `Vec<u8>` ordering.

use serde::{Deserialize, Serialize};

use crate::util::to_hex;

/// A half-open key range `[start_key, end_key)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
}

impl Range {
    pub fn new(start_key: impl Into<Vec<u8>>, end_key: impl Into<Vec<u8>>) -> Self {
        Range {
            start_key: start_key.into(),
            end_key: end_key.into(),
        }
    }

    /// Both keys non-empty and `start_key < end_key`.
    pub fn is_valid(&self) -> bool {
        !self.start_key.is_empty() && !self.end_key.is_empty() && self.start_key < self.end_key
    }

    /// Half-open membership: `start_key <= key < end_key`.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.start_key.as_slice() <= key && key < self.end_key.as_slice()
    }

    /// Two half-open ranges overlap iff each starts before the other ends.
    pub fn intersects(&self, other: &Range) -> bool {
        self.start_key < other.end_key && other.start_key < self.end_key
    }

    /// `[start-end)` rendered in hex for log and error messages.
    pub fn to_hex_string(&self) -> String {
        format!("[{}-{})", to_hex(&self.start_key), to_hex(&self.end_key))
    }
}

/// The smallest key strictly greater than every key sharing `prefix`.
///
/// Increments the last non-0xFF byte and truncates; an all-0xFF prefix has
/// no upper bound, which is represented by the empty vec.
pub fn prefix_next(prefix: &[u8]) -> Vec<u8> {
    let mut next = prefix.to_vec();
    while let Some(last) = next.last_mut() {
        if *last == 0xFF {
            next.pop();
        } else {
            *last += 1;
            return next;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_range() {
        assert!(Range::new(vec![0x01], vec![0x03]).is_valid());
        assert!(!Range::new(vec![0x03], vec![0x01]).is_valid());
        assert!(!Range::new(vec![0x01], vec![0x01]).is_valid());
        assert!(!Range::new(vec![], vec![0x01]).is_valid());
        assert!(!Range::new(vec![0x01], vec![]).is_valid());
    }

    #[test]
    fn test_contains_key_half_open() {
        let r = Range::new(vec![0x01], vec![0x03]);
        assert!(r.contains_key(&[0x01]));
        assert!(r.contains_key(&[0x02]));
        assert!(r.contains_key(&[0x02, 0xFF]));
        assert!(!r.contains_key(&[0x03]));
        assert!(!r.contains_key(&[0x00]));
    }

    #[test]
    fn test_intersects() {
        let r = Range::new(vec![0x03], vec![0x05]);
        assert!(r.intersects(&Range::new(vec![0x00], vec![0x10])));
        assert!(r.intersects(&Range::new(vec![0x04], vec![0x06])));
        assert!(r.intersects(&Range::new(vec![0x00], vec![0x04])));
        // Touching at the boundary is not an overlap in half-open ranges.
        assert!(!r.intersects(&Range::new(vec![0x05], vec![0x10])));
        assert!(!r.intersects(&Range::new(vec![0x00], vec![0x03])));
    }

    #[test]
    fn test_prefix_next() {
        assert_eq!(prefix_next(&[0x01, 0x02]), vec![0x01, 0x03]);
        assert_eq!(prefix_next(&[0x01, 0xFF]), vec![0x02]);
        assert_eq!(prefix_next(&[0xFF, 0xFF]), Vec::<u8>::new());
        // prefix_next(p) is greater than any key with prefix p
        let p = vec![0x0A, 0x0B];
        let next = prefix_next(&p);
        assert!(next.as_slice() > [0x0A, 0x0B, 0xFF, 0xFF].as_slice());
    }

    #[test]
    fn test_hex_rendering() {
        let r = Range::new(vec![0x01, 0xAB], vec![0x03]);
        assert_eq!(r.to_hex_string(), "[01ab-03)");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prefix_next_bounds_every_extension(
                prefix in proptest::collection::vec(any::<u8>(), 1..8),
                suffix in proptest::collection::vec(any::<u8>(), 0..8),
            ) {
                let next = prefix_next(&prefix);
                // Empty means "no upper bound exists" (all-0xFF prefix).
                prop_assume!(!next.is_empty());
                let mut extended = prefix.clone();
                extended.extend_from_slice(&suffix);
                prop_assert!(next.as_slice() > extended.as_slice());
            }

            #[test]
            fn contains_key_matches_ordering(
                start in proptest::collection::vec(any::<u8>(), 1..6),
                end in proptest::collection::vec(any::<u8>(), 1..6),
                key in proptest::collection::vec(any::<u8>(), 0..6),
            ) {
                let range = Range::new(start.clone(), end.clone());
                let expected = start.as_slice() <= key.as_slice() && key.as_slice() < end.as_slice();
                prop_assert_eq!(range.contains_key(&key), expected);
            }
        }
    }
}

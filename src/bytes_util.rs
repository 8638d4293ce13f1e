//! Lexicographic key comparison and defensive copy helpers.

use std::cmp::Ordering;

/// Compares two keys as unsigned byte sequences.
pub fn compare_keys(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// Defensively copies a borrowed byte range into a fresh, owned buffer.
pub fn copy_bytes(src: &[u8]) -> Vec<u8> {
    src.to_vec()
}

/*
    hash.rs - 256-bit digests for the Merkle index

    Node digests are produced by a single SHA-256 compression step over
    the concatenation of two child digests (standard IV, no padding, no
    finalisation). Leaf digests pack the first 32 bytes of the entry's
    wire form into the left half and compress against an all-zero right
    sibling. The scheme is deterministic, which is all the diffing
    protocol needs; it is not a cryptographic commitment.
*/

use crate::core_store::{Entry, Timestamp};
use sha2::compress256;
use sha2::digest::generic_array::GenericArray;
use std::fmt;

pub const DIGEST_LEN: usize = 32;

/// SHA-256 initial hash values (FIPS 180-4 §5.3.3).
const SHA256_IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

/// A 256-bit node digest. The all-zero digest doubles as the empty-tree
/// sentinel on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest256([u8; DIGEST_LEN]);

impl Digest256 {
    pub const ZERO: Digest256 = Digest256([0u8; DIGEST_LEN]);

    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Digest256(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; DIGEST_LEN]
    }

    /// Lowercase 64-character hex form used on the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; DIGEST_LEN] = bytes.try_into().ok()?;
        Some(Digest256(arr))
    }
}

impl fmt::Debug for Digest256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest256({})", self.to_hex())
    }
}

impl fmt::Display for Digest256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// One SHA-256 compression step over `left || right`.
pub fn compress(left: &Digest256, right: &Digest256) -> Digest256 {
    let mut block = [0u8; 64];
    block[..DIGEST_LEN].copy_from_slice(left.as_bytes());
    block[DIGEST_LEN..].copy_from_slice(right.as_bytes());

    let mut state = SHA256_IV;
    compress256(&mut state, &[*GenericArray::from_slice(&block)]);

    let mut out = [0u8; DIGEST_LEN];
    for (chunk, word) in out.chunks_exact_mut(4).zip(state.iter()) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    Digest256(out)
}

/// Leaf digest for a store entry.
///
/// The leaf input is `key:value:timestamp`; its first 32 bytes (zero
/// padded) form the left half, compressed against an all-zero sibling.
pub fn leaf_digest(entry: &Entry) -> Digest256 {
    leaf_digest_parts(&entry.key, &entry.value, entry.timestamp)
}

pub fn leaf_digest_parts(key: &str, value: &str, timestamp: Timestamp) -> Digest256 {
    let input = format!("{}:{}:{}", key, value, timestamp);
    let mut left = [0u8; DIGEST_LEN];
    let take = input.len().min(DIGEST_LEN);
    left[..take].copy_from_slice(&input.as_bytes()[..take]);
    compress(&Digest256(left), &Digest256::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_digest() {
        assert!(Digest256::ZERO.is_zero());
        assert_eq!(Digest256::ZERO.to_hex(), "0".repeat(64));
    }

    #[test]
    fn test_hex_round_trip() {
        let d = leaf_digest_parts("a", "1", Timestamp::from_millis(42));
        let parsed = Digest256::from_hex(&d.to_hex()).unwrap();
        assert_eq!(parsed, d);
    }

    #[test]
    fn test_hex_rejects_bad_input() {
        assert!(Digest256::from_hex("zz").is_none());
        assert!(Digest256::from_hex(&"ab".repeat(16)).is_none());
        assert!(Digest256::from_hex(&"ab".repeat(33)).is_none());
    }

    #[test]
    fn test_compress_is_deterministic() {
        let a = leaf_digest_parts("x", "1", Timestamp::from_millis(1));
        let b = leaf_digest_parts("y", "2", Timestamp::from_millis(2));
        assert_eq!(compress(&a, &b), compress(&a, &b));
        assert_ne!(compress(&a, &b), compress(&b, &a));
    }

    #[test]
    fn test_leaf_digest_depends_on_all_parts() {
        let base = leaf_digest_parts("key", "val", Timestamp::from_millis(7));
        assert_ne!(base, leaf_digest_parts("key2", "val", Timestamp::from_millis(7)));
        assert_ne!(base, leaf_digest_parts("key", "val2", Timestamp::from_millis(7)));
        assert_ne!(base, leaf_digest_parts("key", "val", Timestamp::from_millis(8)));
        assert!(!base.is_zero());
    }

    #[test]
    fn test_leaf_digest_truncates_long_input() {
        // Inputs identical in their first 32 bytes collapse to one leaf.
        let long_a = "k".repeat(40);
        let long_b = format!("{}x", "k".repeat(40));
        let a = leaf_digest_parts(&long_a, "v", Timestamp::from_millis(1));
        let b = leaf_digest_parts(&long_b, "v", Timestamp::from_millis(1));
        assert_eq!(a, b);
    }
}

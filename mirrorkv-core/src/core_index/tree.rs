/*
    tree.rs - Merkle tree over leaf digests

    Append-only list of leaves with level-by-level parent derivation:
    paired nodes compress together, an unpaired trailing node is
    promoted to the next level unchanged. Inclusion paths carry the leaf
    digest plus the sibling spine and re-derive the root for
    verification.

    Path wire form (hex-encoded on the protocol layer):
      [leaf digest: 32 bytes]
      [element count: 1 byte]
      per element: [direction: 1 byte, 0 = sibling left, 1 = sibling right]
                   [sibling digest: 32 bytes]
*/

use crate::core_index::hash::{compress, Digest256, DIGEST_LEN};
use crate::core_index::IndexError;

const PATH_ELEMENT_LEN: usize = 1 + DIGEST_LEN;

/// Sibling hash on one level of a leaf-to-root spine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathElement {
    /// True when the sibling sits to the left of the running hash.
    pub sibling_on_left: bool,
    pub sibling: Digest256,
}

/// Inclusion path for one leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerklePath {
    pub leaf: Digest256,
    pub elements: Vec<PathElement>,
}

impl MerklePath {
    /// Re-derive the root from the leaf and sibling spine and compare.
    pub fn verify(&self, root: &Digest256) -> bool {
        let mut acc = self.leaf;
        for element in &self.elements {
            acc = if element.sibling_on_left {
                compress(&element.sibling, &acc)
            } else {
                compress(&acc, &element.sibling)
            };
        }
        acc == *root
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DIGEST_LEN + 1 + self.elements.len() * PATH_ELEMENT_LEN);
        out.extend_from_slice(self.leaf.as_bytes());
        out.push(self.elements.len() as u8);
        for element in &self.elements {
            out.push(element.sibling_on_left as u8);
            out.extend_from_slice(element.sibling.as_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < DIGEST_LEN + 1 {
            return Err(IndexError::MalformedPath(format!(
                "path too short: {} bytes",
                bytes.len()
            )));
        }
        let leaf = Digest256::from_bytes(bytes[..DIGEST_LEN].try_into().expect("sized slice"));
        let count = bytes[DIGEST_LEN] as usize;
        let body = &bytes[DIGEST_LEN + 1..];
        if body.len() != count * PATH_ELEMENT_LEN {
            return Err(IndexError::MalformedPath(format!(
                "expected {} path elements in {} bytes",
                count,
                body.len()
            )));
        }
        let mut elements = Vec::with_capacity(count);
        for chunk in body.chunks_exact(PATH_ELEMENT_LEN) {
            let sibling_on_left = match chunk[0] {
                0 => false,
                1 => true,
                other => {
                    return Err(IndexError::MalformedPath(format!(
                        "invalid direction byte {}",
                        other
                    )))
                }
            };
            let sibling =
                Digest256::from_bytes(chunk[1..].try_into().expect("sized slice"));
            elements.push(PathElement {
                sibling_on_left,
                sibling,
            });
        }
        Ok(MerklePath { leaf, elements })
    }
}

/// Merkle tree rebuilt from scratch on every store mutation.
#[derive(Debug, Default, Clone)]
pub struct MerkleTree {
    leaves: Vec<Digest256>,
}

impl MerkleTree {
    pub fn new() -> Self {
        MerkleTree { leaves: Vec::new() }
    }

    pub fn insert(&mut self, leaf: Digest256) {
        self.leaves.push(leaf);
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn num_leaves(&self) -> usize {
        self.leaves.len()
    }

    pub fn leaf(&self, index: usize) -> Option<Digest256> {
        self.leaves.get(index).copied()
    }

    /// Tree root; the all-zero sentinel when no leaves exist.
    pub fn root(&self) -> Digest256 {
        if self.leaves.is_empty() {
            return Digest256::ZERO;
        }
        let mut level = self.leaves.clone();
        while level.len() > 1 {
            level = Self::parent_level(&level);
        }
        level[0]
    }

    /// Inclusion path for the leaf at `index`.
    pub fn path(&self, index: usize) -> Option<MerklePath> {
        if index >= self.leaves.len() {
            return None;
        }
        let leaf = self.leaves[index];
        let mut elements = Vec::new();
        let mut level = self.leaves.clone();
        let mut position = index;
        while level.len() > 1 {
            if position % 2 == 0 {
                // Right sibling, unless this node trails unpaired.
                if position + 1 < level.len() {
                    elements.push(PathElement {
                        sibling_on_left: false,
                        sibling: level[position + 1],
                    });
                }
            } else {
                elements.push(PathElement {
                    sibling_on_left: true,
                    sibling: level[position - 1],
                });
            }
            level = Self::parent_level(&level);
            position /= 2;
        }
        Some(MerklePath { leaf, elements })
    }

    fn parent_level(level: &[Digest256]) -> Vec<Digest256> {
        level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => compress(left, right),
                [lone] => *lone,
                _ => unreachable!("chunks(2) yields one or two nodes"),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_index::hash::leaf_digest_parts;
    use crate::core_store::Timestamp;

    fn leaves(n: usize) -> Vec<Digest256> {
        (0..n)
            .map(|i| leaf_digest_parts(&format!("k{}", i), "v", Timestamp::from_millis(i as u64)))
            .collect()
    }

    fn tree_of(n: usize) -> MerkleTree {
        let mut tree = MerkleTree::new();
        for leaf in leaves(n) {
            tree.insert(leaf);
        }
        tree
    }

    #[test]
    fn test_empty_tree_root_is_zero() {
        assert!(MerkleTree::new().root().is_zero());
    }

    #[test]
    fn test_single_leaf_root_is_leaf() {
        let tree = tree_of(1);
        assert_eq!(tree.root(), leaves(1)[0]);
    }

    #[test]
    fn test_two_leaf_root_is_pair_compression() {
        let tree = tree_of(2);
        let l = leaves(2);
        assert_eq!(tree.root(), compress(&l[0], &l[1]));
    }

    #[test]
    fn test_odd_leaf_promotion() {
        // With three leaves the trailing leaf is promoted one level and
        // pairs with the first compression.
        let tree = tree_of(3);
        let l = leaves(3);
        assert_eq!(tree.root(), compress(&compress(&l[0], &l[1]), &l[2]));
    }

    #[test]
    fn test_root_changes_with_leaves() {
        let mut seen = std::collections::HashSet::new();
        for n in 0..9 {
            assert!(seen.insert(tree_of(n).root().to_hex()), "duplicate root at {}", n);
        }
    }

    #[test]
    fn test_paths_verify_for_all_sizes() {
        for n in 1..17 {
            let tree = tree_of(n);
            let root = tree.root();
            for i in 0..n {
                let path = tree.path(i).expect("leaf in range");
                assert!(path.verify(&root), "size {} leaf {}", n, i);
            }
        }
    }

    #[test]
    fn test_path_fails_against_other_root() {
        let tree = tree_of(4);
        let other = tree_of(5);
        let path = tree.path(2).unwrap();
        assert!(!path.verify(&other.root()));
    }

    #[test]
    fn test_path_out_of_range() {
        assert!(tree_of(3).path(3).is_none());
        assert!(MerkleTree::new().path(0).is_none());
    }

    #[test]
    fn test_path_serialisation_round_trip() {
        for n in 1..9 {
            let tree = tree_of(n);
            for i in 0..n {
                let path = tree.path(i).unwrap();
                let decoded = MerklePath::from_bytes(&path.to_bytes()).unwrap();
                assert_eq!(decoded, path);
                assert!(decoded.verify(&tree.root()));
            }
        }
    }

    #[test]
    fn test_path_decoding_rejects_garbage() {
        assert!(MerklePath::from_bytes(&[]).is_err());
        assert!(MerklePath::from_bytes(&[0u8; 16]).is_err());

        // Count byte promises more elements than present.
        let mut bytes = tree_of(2).path(0).unwrap().to_bytes();
        bytes[DIGEST_LEN] = 9;
        assert!(MerklePath::from_bytes(&bytes).is_err());

        // Direction byte outside {0, 1}.
        let mut bytes = tree_of(2).path(0).unwrap().to_bytes();
        bytes[DIGEST_LEN + 1] = 2;
        assert!(MerklePath::from_bytes(&bytes).is_err());
    }
}

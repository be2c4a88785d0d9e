/*
    merkle.rs - Merkle tree index over store snapshots

    Rebuilt in full on every store mutation. Rebuild is O(n), which is
    acceptable at the expected store sizes and sidesteps ordinal
    shifting when a deletion removes a middle leaf.
*/

use crate::core_index::hash::{leaf_digest, Digest256};
use crate::core_index::tree::{MerklePath, MerkleTree};
use crate::core_index::Index;
use crate::core_store::Entry;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::trace;

#[derive(Default)]
struct MerkleState {
    tree: MerkleTree,
    /// Leaf ordinal per key, in snapshot order. Only kept to answer
    /// path queries.
    ordinals: HashMap<String, usize>,
}

/// Merkle index over the store's entries.
pub struct MerkleIndex {
    state: RwLock<MerkleState>,
}

impl MerkleIndex {
    pub fn new() -> Self {
        MerkleIndex {
            state: RwLock::new(MerkleState::default()),
        }
    }
}

impl Default for MerkleIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Index for MerkleIndex {
    fn rebuild(&self, snapshot: &[Entry]) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.tree = MerkleTree::new();
        state.ordinals.clear();
        for (ordinal, entry) in snapshot.iter().enumerate() {
            state.tree.insert(leaf_digest(entry));
            state.ordinals.insert(entry.key.clone(), ordinal);
        }
        trace!(leaves = snapshot.len(), "rebuilt merkle index");
    }

    fn root(&self) -> Digest256 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tree
            .root()
    }

    fn paths(&self, keys: &[String]) -> Vec<(String, MerklePath)> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        keys.iter()
            .filter_map(|key| {
                let ordinal = *state.ordinals.get(key)?;
                let path = state.tree.path(ordinal)?;
                Some((key.clone(), path))
            })
            .collect()
    }

    fn find_differences(&self, remote: &[(String, MerklePath)]) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.tree.is_empty() {
            return remote.iter().map(|(key, _)| key.clone()).collect();
        }
        let local_root = state.tree.root();
        remote
            .iter()
            .filter(|(key, path)| {
                // A path that re-derives our root proves the peer holds
                // our exact tree along that spine.
                if path.verify(&local_root) {
                    return false;
                }
                // Otherwise the trees diverge somewhere; the key itself
                // differs only when its leaf digest does.
                match state.ordinals.get(key.as_str()) {
                    Some(&ordinal) => state.tree.leaf(ordinal) != Some(path.leaf),
                    None => true,
                }
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tree
            .is_empty()
    }

    fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tree
            .num_leaves()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::Timestamp;

    fn snapshot(entries: &[(&str, &str, u64)]) -> Vec<Entry> {
        entries
            .iter()
            .map(|(k, v, ts)| Entry::new(*k, *v, Timestamp::from_millis(*ts)))
            .collect()
    }

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_new_index_is_empty() {
        let index = MerkleIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
        assert!(index.root().is_zero());
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let index = MerkleIndex::new();
        let snap = snapshot(&[("a", "1", 10), ("b", "2", 20)]);
        index.rebuild(&snap);
        let first = index.root();
        index.rebuild(&snap);
        assert_eq!(index.root(), first);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_rebuild_discards_previous_state() {
        let index = MerkleIndex::new();
        index.rebuild(&snapshot(&[("a", "1", 10), ("b", "2", 20)]));
        index.rebuild(&snapshot(&[("c", "3", 30)]));
        assert_eq!(index.len(), 1);
        assert!(index.paths(&keys(&["a"])).is_empty());
        assert_eq!(index.paths(&keys(&["c"])).len(), 1);
    }

    #[test]
    fn test_root_matches_fresh_rebuild() {
        // The root after incremental mutations equals the root of a
        // from-scratch rebuild over the same snapshot.
        let snap = snapshot(&[("a", "1", 10), ("b", "2", 20), ("c", "3", 30)]);
        let left = MerkleIndex::new();
        left.rebuild(&snapshot(&[("a", "1", 10)]));
        left.rebuild(&snapshot(&[("a", "1", 10), ("b", "2", 20)]));
        left.rebuild(&snap);
        let right = MerkleIndex::new();
        right.rebuild(&snap);
        assert_eq!(left.root(), right.root());
    }

    #[test]
    fn test_paths_skips_absent_keys() {
        let index = MerkleIndex::new();
        index.rebuild(&snapshot(&[("a", "1", 10), ("b", "2", 20)]));
        let paths = index.paths(&keys(&["a", "missing", "b"]));
        let returned: Vec<_> = paths.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(returned, vec!["a", "b"]);
    }

    #[test]
    fn test_paths_verify_against_root() {
        let index = MerkleIndex::new();
        index.rebuild(&snapshot(&[("a", "1", 10), ("b", "2", 20), ("c", "3", 30)]));
        let root = index.root();
        for (_, path) in index.paths(&keys(&["a", "b", "c"])) {
            assert!(path.verify(&root));
        }
    }

    #[test]
    fn test_identical_indexes_report_no_differences() {
        let snap = snapshot(&[("a", "1", 10), ("b", "2", 20)]);
        let local = MerkleIndex::new();
        local.rebuild(&snap);
        let remote = MerkleIndex::new();
        remote.rebuild(&snap);

        let remote_paths = remote.paths(&keys(&["a", "b"]));
        assert!(local.find_differences(&remote_paths).is_empty());
    }

    #[test]
    fn test_differences_detect_divergent_value() {
        let local = MerkleIndex::new();
        local.rebuild(&snapshot(&[("a", "1", 10), ("b", "2", 20)]));
        let remote = MerkleIndex::new();
        remote.rebuild(&snapshot(&[("a", "1", 10), ("b", "9", 25)]));

        let remote_paths = remote.paths(&keys(&["a", "b"]));
        let differing = local.find_differences(&remote_paths);
        assert_eq!(differing, vec!["b".to_string()]);
    }

    #[test]
    fn test_differences_skip_matching_leaf_in_divergent_tree() {
        // "a" is identical on both sides; only "b" should be pulled even
        // though the roots (and therefore all sibling spines) differ.
        let local = MerkleIndex::new();
        local.rebuild(&snapshot(&[("a", "1", 10), ("b", "2", 20)]));
        let remote = MerkleIndex::new();
        remote.rebuild(&snapshot(&[("a", "1", 10), ("b", "9", 25), ("c", "3", 30)]));

        let remote_paths = remote.paths(&keys(&["a", "b", "c"]));
        let differing = local.find_differences(&remote_paths);
        assert_eq!(differing, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_empty_local_index_reports_everything() {
        let local = MerkleIndex::new();
        let remote = MerkleIndex::new();
        remote.rebuild(&snapshot(&[("a", "1", 10), ("b", "2", 20)]));
        let remote_paths = remote.paths(&keys(&["a", "b"]));
        assert_eq!(
            local.find_differences(&remote_paths),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}

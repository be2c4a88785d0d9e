/*
    null.rs - Always-empty index

    Selecting this index turns every reconciliation round into a full
    state exchange: the root is always the empty sentinel and every key
    is reported as differing.
*/

use crate::core_index::hash::Digest256;
use crate::core_index::tree::MerklePath;
use crate::core_index::Index;
use crate::core_store::Entry;

/// Index that indexes nothing.
pub struct NullIndex;

impl NullIndex {
    pub fn new() -> Self {
        NullIndex
    }
}

impl Default for NullIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Index for NullIndex {
    fn rebuild(&self, _snapshot: &[Entry]) {}

    fn root(&self) -> Digest256 {
        Digest256::ZERO
    }

    fn paths(&self, _keys: &[String]) -> Vec<(String, MerklePath)> {
        Vec::new()
    }

    fn find_differences(&self, remote: &[(String, MerklePath)]) -> Vec<String> {
        remote.iter().map(|(key, _)| key.clone()).collect()
    }

    fn is_empty(&self) -> bool {
        true
    }

    fn len(&self) -> usize {
        0
    }
}

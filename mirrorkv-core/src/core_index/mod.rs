/*
    core_index - Merkle summaries of store state

    The index observes every store mutation and answers the three
    reconciliation queries: root hash, per-key inclusion paths, and
    which keys differ given a peer's paths.
*/

pub mod hash;
pub mod merkle;
pub mod null;
pub mod tree;

use crate::core_store::Entry;
use thiserror::Error;

pub use hash::{leaf_digest, leaf_digest_parts, Digest256, DIGEST_LEN};
pub use merkle::MerkleIndex;
pub use null::NullIndex;
pub use tree::{MerklePath, MerkleTree, PathElement};

/// Errors raised while handling index material from the wire.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A serialised inclusion path failed to decode
    #[error("Malformed path: {0}")]
    MalformedPath(String),
}

/// Capability set shared by every index implementation.
///
/// The store drives `rebuild` from inside its own critical section;
/// the query methods are safe to call concurrently from the dispatcher
/// and the reconciler.
pub trait Index: Send + Sync {
    /// Replace all index state with leaves derived from `snapshot`,
    /// in snapshot order.
    fn rebuild(&self, snapshot: &[Entry]);

    /// Current root, or the all-zero sentinel when empty.
    fn root(&self) -> Digest256;

    /// Inclusion paths for the requested keys. Absent keys are skipped;
    /// the result preserves the request order of the present keys.
    fn paths(&self, keys: &[String]) -> Vec<(String, MerklePath)>;

    /// Keys whose peer-side binding differs from ours. With an empty
    /// local index every key differs.
    fn find_differences(&self, remote: &[(String, MerklePath)]) -> Vec<String>;

    fn is_empty(&self) -> bool;

    fn len(&self) -> usize;
}

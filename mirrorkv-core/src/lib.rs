//! mirrorkv-core - two-peer replicated key-value store
//!
//! Each node serves a line-oriented TCP protocol and keeps its peer
//! convergent through two mechanisms: accepted client writes are
//! eagerly pushed to the peer with bounded retry, and a background
//! reconciler periodically repairs drift by comparing Merkle tree
//! summaries and pulling only the divergent keys. Conflicts resolve
//! last-writer-wins on the timestamp minted at write origination.
//!
//! State lives in memory for the lifetime of the process; membership
//! is fixed at two peers.

pub mod config;
pub mod core_index;
pub mod core_net;
pub mod core_store;
pub mod core_sync;
pub mod logging;
pub mod node;
pub mod shutdown;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{ConfigError, NodeConfig};
pub use core_index::{Index, MerkleIndex, NullIndex};
pub use core_net::{PeerAddr, PeerClient};
pub use core_store::{Entry, KvStore, Timestamp};
pub use core_sync::{SyncConfig, SyncMode};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogLevel};
pub use node::{Node, NodeHandle};
pub use shutdown::ShutdownCoordinator;

//! Two-node loopback fixtures
//!
//! Spawns a mirrored pair of nodes on ephemeral ports with compressed
//! reconciliation intervals so tests converge in well under a second
//! per round.

use crate::config::NodeConfig;
use crate::core_net::{PeerAddr, PeerClient};
use crate::core_sync::{SyncConfig, SyncMode};
use crate::node::{Node, NodeHandle};
use std::net::SocketAddr;
use std::time::Duration;

/// Reconciliation settings used by the fixtures: 200ms rounds.
pub fn fast_sync(mode: SyncMode) -> SyncConfig {
    SyncConfig {
        interval: Duration::from_millis(200),
        pull_timeout: Duration::from_millis(500),
        mode,
    }
}

/// Sync config with reconciliation effectively parked, leaving only the
/// eager push path active. Used by tests that assert per-node state.
pub fn push_only_sync() -> SyncConfig {
    SyncConfig {
        interval: Duration::from_secs(3600),
        ..fast_sync(SyncMode::Merkle)
    }
}

fn fast_config(sync: SyncConfig, peer_port: u16) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.peer.host = "127.0.0.1".to_string();
    config.peer.port = peer_port;
    config.sync = sync;
    config.replication.initial_backoff = Duration::from_millis(10);
    config
}

/// A running two-node cluster.
pub struct NodePair {
    pub a: NodeHandle,
    pub b: NodeHandle,
}

impl NodePair {
    pub async fn shutdown(self) {
        self.a.shutdown().await;
        self.b.shutdown().await;
    }
}

/// Bind and start both nodes, each pointed at the other.
pub async fn spawn_pair(sync: SyncConfig) -> NodePair {
    let node_a = Node::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind node a");
    let node_b = Node::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind node b");

    let config_a = fast_config(sync.clone(), node_b.local_addr().port());
    let config_b = fast_config(sync, node_a.local_addr().port());

    NodePair {
        a: node_a.spawn(config_a),
        b: node_b.spawn(config_b),
    }
}

/// One-shot client request against a node, as a test client would
/// issue it.
pub async fn query(addr: SocketAddr, command: &str) -> String {
    let client = PeerClient::with_timeout(
        PeerAddr::new(addr.ip().to_string(), addr.port()),
        Duration::from_secs(2),
    );
    client
        .exchange(command)
        .await
        .unwrap_or_else(|e| panic!("query {:?} against {} failed: {}", command, addr, e))
}

//! Convergence integration tests
//!
//! Live two-node scenarios: eager propagation, last-writer-wins
//! conflicts, recovery of a peer that was down, and full-state mode.
//! Reconciliation runs every 200ms here, so "eventually" is a few
//! seconds at most.

use mirrorkv_core::config::NodeConfig;
use mirrorkv_core::core_sync::SyncMode;
use mirrorkv_core::node::Node;
use mirrorkv_core::test_utils::{fast_sync, push_only_sync, query, spawn_pair, wait_until};
use std::time::Duration;

const CONVERGE: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_eager_propagation_a_to_b() {
    let pair = spawn_pair(push_only_sync()).await;
    let (a, b) = (pair.a.local_addr(), pair.b.local_addr());

    assert_eq!(query(a, "SET A 1").await, "OK");
    wait_until(CONVERGE, "write visible on peer", || async move {
        query(b, "GET A").await == "1"
    })
    .await;

    pair.shutdown().await;
}

#[tokio::test]
async fn test_eager_propagation_both_directions() {
    let pair = spawn_pair(push_only_sync()).await;
    let (a, b) = (pair.a.local_addr(), pair.b.local_addr());

    assert_eq!(query(a, "SET A 1").await, "OK");
    assert_eq!(query(b, "SET B 2").await, "OK");

    wait_until(CONVERGE, "B's write visible on A", || async move {
        query(a, "GET B").await == "2"
    })
    .await;
    wait_until(CONVERGE, "A's write visible on B", || async move {
        query(b, "GET A").await == "1"
    })
    .await;

    // The original bindings survive the exchange.
    assert_eq!(query(a, "GET A").await, "1");
    assert_eq!(query(b, "GET B").await, "2");

    pair.shutdown().await;
}

#[tokio::test]
async fn test_eager_delete_propagates() {
    let pair = spawn_pair(push_only_sync()).await;
    let (a, b) = (pair.a.local_addr(), pair.b.local_addr());

    query(a, "SET doomed 1").await;
    wait_until(CONVERGE, "write visible on peer", || async move {
        query(b, "GET doomed").await == "1"
    })
    .await;

    assert_eq!(query(a, "DEL doomed").await, "OK");
    wait_until(CONVERGE, "delete visible on peer", || async move {
        query(b, "GET doomed").await.is_empty()
    })
    .await;

    pair.shutdown().await;
}

#[tokio::test]
async fn test_lww_conflict_resolves_to_later_write() {
    let pair = spawn_pair(fast_sync(SyncMode::Merkle)).await;
    let (a, b) = (pair.a.local_addr(), pair.b.local_addr());

    assert_eq!(query(a, "SET conflictkey value1").await, "OK");
    // Millisecond clocks need real separation for a strict ordering.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(query(b, "SET conflictkey value2").await, "OK");

    wait_until(CONVERGE, "both peers settle on the later write", || async move {
        query(a, "GET conflictkey").await == "value2" && query(b, "GET conflictkey").await == "value2"
    })
    .await;

    pair.shutdown().await;
}

#[tokio::test]
async fn test_reconciliation_recovers_downed_peer() {
    // Reserve a port for B, keep it dark while A takes writes.
    let probe = Node::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let b_addr = probe.local_addr();
    drop(probe);

    let node_a = Node::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let a_addr = node_a.local_addr();

    let mut config_a = NodeConfig::default();
    config_a.peer.host = "127.0.0.1".to_string();
    config_a.peer.port = b_addr.port();
    config_a.sync = fast_sync(SyncMode::Merkle);
    config_a.replication.initial_backoff = Duration::from_millis(10);
    let a = node_a.spawn(config_a);

    assert_eq!(query(a_addr, "SET x 1").await, "OK");
    // Outlive the push retry schedule so only reconciliation can repair.
    tokio::time::sleep(Duration::from_millis(700)).await;

    let node_b = Node::bind(b_addr).await.expect("rebind reserved port");
    let mut config_b = NodeConfig::default();
    config_b.peer.host = "127.0.0.1".to_string();
    config_b.peer.port = a_addr.port();
    config_b.sync = fast_sync(SyncMode::Merkle);
    let b = node_b.spawn(config_b);

    wait_until(CONVERGE, "late peer pulls the missed write", || async move {
        query(b_addr, "GET x").await == "1"
    })
    .await;

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_reconciliation_merges_divergent_stores() {
    let pair = spawn_pair(fast_sync(SyncMode::Merkle)).await;
    let (a, b) = (pair.a.local_addr(), pair.b.local_addr());

    // PROPAGATE writes are never pushed onward, so each store starts
    // with a key the other lacks and only reconciliation can merge.
    assert_eq!(query(a, "PROPAGATE SET only_a va 1000").await, "OK");
    assert_eq!(query(b, "PROPAGATE SET only_b vb 1001").await, "OK");

    wait_until(CONVERGE, "both stores hold both keys", || async move {
        query(a, "GET only_b").await == "vb" && query(b, "GET only_a").await == "va"
    })
    .await;

    // Reconciliation pulls carried the origin timestamps verbatim.
    assert_eq!(query(a, "GET_TS only_b").await, "vb:1001");
    assert_eq!(query(b, "GET_TS only_a").await, "va:1000");

    pair.shutdown().await;
}

#[tokio::test]
async fn test_full_state_mode_converges() {
    let pair = spawn_pair(fast_sync(SyncMode::FullState)).await;
    let (a, b) = (pair.a.local_addr(), pair.b.local_addr());

    assert_eq!(query(a, "GET_MERKLE_ROOT").await, "EMPTY");

    query(a, "PROPAGATE SET left 1 500").await;
    query(b, "PROPAGATE SET right 2 501").await;

    wait_until(CONVERGE, "full-state exchange converges", || async move {
        query(a, "GET right").await == "2" && query(b, "GET left").await == "1"
    })
    .await;

    pair.shutdown().await;
}

/*
    replicator.rs - Eager push of accepted mutations to the peer

    Each push runs in its own task: sleep, attempt one connect + write,
    and on failure retry with exponentially growing delay. Delay before
    attempt i is initial_backoff * 2^i; after max_retries attempts the
    push is dropped and convergence is left to the reconciler.

    A semaphore caps the number of in-flight push tasks so a write
    storm cannot explode the task count. The dispatcher thread that
    originated the push never waits on the pool.
*/

use crate::core_net::peer::{PeerAddr, PeerClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Retry/backoff policy for outbound pushes.
#[derive(Debug, Clone)]
pub struct PushPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_inflight: usize,
}

impl Default for PushPolicy {
    fn default() -> Self {
        PushPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_inflight: 32,
        }
    }
}

/// Fire-and-forget replication pushes to the peer.
pub struct Replicator {
    client: PeerClient,
    policy: PushPolicy,
    inflight: Arc<Semaphore>,
}

impl Replicator {
    pub fn new(peer: PeerAddr, policy: PushPolicy) -> Self {
        let inflight = Arc::new(Semaphore::new(policy.max_inflight.max(1)));
        Replicator {
            client: PeerClient::new(peer),
            policy,
            inflight,
        }
    }

    /// Enqueue one outbound delivery of `command`. Returns immediately;
    /// the command string is captured by value.
    pub fn push(&self, command: String) {
        let client = self.client.clone();
        let policy = self.policy.clone();
        let inflight = Arc::clone(&self.inflight);

        tokio::spawn(async move {
            let _permit = match inflight.acquire().await {
                Ok(permit) => permit,
                // Closed semaphore means shutdown; drop the push.
                Err(_) => return,
            };
            deliver(&client, &command, &policy).await;
        });
    }
}

async fn deliver(client: &PeerClient, command: &str, policy: &PushPolicy) {
    for attempt in 0..policy.max_retries {
        let delay = policy.initial_backoff * 2u32.saturating_pow(attempt);
        tokio::time::sleep(delay).await;

        match client.send(command).await {
            Ok(()) => {
                debug!(peer = %client.peer(), attempt, command, "push delivered");
                return;
            }
            Err(e) => {
                warn!(peer = %client.peer(), attempt, error = %e, "push attempt failed");
            }
        }
    }
    error!(
        peer = %client.peer(),
        attempts = policy.max_retries,
        command,
        "push exhausted, dropping; reconciliation will repair"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    async fn capture_listener() -> (std::net::SocketAddr, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    if socket.read_to_end(&mut buf).await.is_ok() {
                        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
                    }
                });
            }
        });
        (addr, rx)
    }

    #[tokio::test]
    async fn test_push_delivers_command() {
        let (addr, mut rx) = capture_listener().await;
        let replicator = Replicator::new(
            PeerAddr::new("127.0.0.1", addr.port()),
            PushPolicy {
                initial_backoff: Duration::from_millis(5),
                ..Default::default()
            },
        );

        replicator.push("PROPAGATE SET k v 1".to_string());
        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, "PROPAGATE SET k v 1");
    }

    #[tokio::test]
    async fn test_push_retries_until_peer_appears() {
        // Reserve a port, keep it dark for a while, then start listening.
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let replicator = Replicator::new(
            PeerAddr::new("127.0.0.1", port),
            PushPolicy {
                max_retries: 5,
                initial_backoff: Duration::from_millis(20),
                max_inflight: 4,
            },
        );
        replicator.push("PROPAGATE SET late v 9".to_string());

        // First attempts (20ms, 40ms) fail; bind before the later ones.
        tokio::time::sleep(Duration::from_millis(70)).await;
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let (mut socket, _) = tokio::time::timeout(Duration::from_secs(2), listener.accept())
            .await
            .unwrap()
            .unwrap();
        let mut buf = Vec::new();
        socket.read_to_end(&mut buf).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&buf), "PROPAGATE SET late v 9");
    }

    #[tokio::test]
    async fn test_pushes_are_concurrent_under_the_cap() {
        let (addr, mut rx) = capture_listener().await;
        let replicator = Replicator::new(
            PeerAddr::new("127.0.0.1", addr.port()),
            PushPolicy {
                initial_backoff: Duration::from_millis(5),
                max_inflight: 8,
                ..Default::default()
            },
        );

        for i in 0..20 {
            replicator.push(format!("PROPAGATE SET k{} v {}", i, i));
        }
        let mut seen = std::collections::HashSet::new();
        for _ in 0..20 {
            let command = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.insert(command);
        }
        assert_eq!(seen.len(), 20);
    }
}

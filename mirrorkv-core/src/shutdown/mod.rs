//! Graceful shutdown coordinator

use tokio::sync::broadcast;
use tracing::info;

/// Broadcast-based shutdown signal shared by the long-running tasks.
///
/// Each task holds a receiver and selects on it next to its main work;
/// `trigger` wakes all of them at once.
pub struct ShutdownCoordinator {
    tx: broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(4);
        Self { tx }
    }

    /// Subscribe before spawning the task that will listen.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Wake every subscriber. Idempotent; subsequent calls are no-ops
    /// for tasks that already exited.
    pub fn trigger(&self) {
        info!("shutdown signal broadcast");
        // Send only fails when no receiver is left, which is fine.
        let _ = self.tx.send(());
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_reaches_all_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx1 = coordinator.subscribe();
        let mut rx2 = coordinator.subscribe();
        coordinator.trigger();
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_trigger_without_subscribers_is_harmless() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.trigger();
    }

    #[tokio::test]
    async fn test_subscriber_blocks_until_trigger() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();
        let waited = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(waited.is_err());
        coordinator.trigger();
        assert!(rx.recv().await.is_ok());
    }
}

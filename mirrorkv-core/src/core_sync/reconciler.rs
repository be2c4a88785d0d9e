/*
    reconciler.rs - Periodic anti-entropy driver

    One round against the peer:
      1. empty local index               -> full pull
      2. fetch remote root; EMPTY/zero   -> full pull
      3. roots equal                     -> done
      4. the peer's key list (GET_ALL) becomes the candidate set, so
         keys we have never seen are candidates too
      5. fetch remote paths, diff        -> divergent keys
      6. pull each divergent key with its origin timestamp
      7. full pull doubles as the catch-all for any comparison error

    Rounds only pull; the peer's own rounds pull in the other
    direction, so neither side has to lead. Pulled values pass through
    the store's LWW gate carrying the peer's timestamp, so a newer
    local write survives the pull of an older remote value.
*/

use crate::core_index::Index;
use crate::core_net::protocol;
use crate::core_net::{PeerAddr, PeerClient, Request};
use crate::core_store::KvStore;
use crate::core_sync::{SyncConfig, SyncError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

enum RoundPlan {
    InSync,
    Pull(Vec<String>),
    FullPull,
}

/// Background anti-entropy driver for one node.
pub struct Reconciler {
    store: Arc<KvStore>,
    index: Arc<dyn Index>,
    client: PeerClient,
    interval: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<KvStore>,
        index: Arc<dyn Index>,
        peer: PeerAddr,
        config: &SyncConfig,
    ) -> Self {
        Reconciler {
            store,
            index,
            client: PeerClient::with_timeout(peer, config.pull_timeout),
            interval: config.interval,
        }
    }

    /// Round loop. Sleeps one interval before the first round and
    /// between rounds; exits on the shutdown signal.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval() fires immediately; consume that tick so the first
        // round runs a full interval after startup.
        tick.tick().await;
        info!(peer = %self.client.peer(), interval = ?self.interval, "reconciler started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("reconciler stopping");
                    break;
                }
                _ = tick.tick() => self.run_round().await,
            }
        }
    }

    /// One reconciliation round. Never returns an error: comparison
    /// failures downgrade to a full pull, pull failures are logged and
    /// left for the next round.
    pub async fn run_round(&self) {
        match self.compare_and_diff().await {
            Ok(RoundPlan::InSync) => debug!("roots match, stores in sync"),
            Ok(RoundPlan::Pull(keys)) if keys.is_empty() => {
                // Roots differ but nothing is pullable from here; the
                // peer's next round closes the gap.
                debug!("roots differ with no locally divergent keys");
            }
            Ok(RoundPlan::Pull(keys)) => {
                let pulled = self.pull_keys(&keys).await;
                info!(candidates = keys.len(), pulled, "targeted pull complete");
            }
            Ok(RoundPlan::FullPull) => self.full_pull_round().await,
            Err(e) => {
                warn!(error = %e, "comparison failed, falling back to full pull");
                self.full_pull_round().await;
            }
        }
    }

    async fn compare_and_diff(&self) -> Result<RoundPlan, SyncError> {
        if self.index.is_empty() {
            return Ok(RoundPlan::FullPull);
        }

        let reply = self.client.exchange(&Request::GetMerkleRoot.encode()).await?;
        let Some(remote_root) = protocol::parse_root(&reply)? else {
            return Ok(RoundPlan::FullPull);
        };

        let local_root = self.index.root();
        if remote_root == local_root {
            return Ok(RoundPlan::InSync);
        }
        debug!(%local_root, %remote_root, "roots differ");

        let reply = self.client.exchange(&Request::GetAll.encode()).await?;
        let candidates: Vec<String> = protocol::parse_key_timestamps(&reply)?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        let reply = self
            .client
            .exchange(&Request::GetPaths { keys: candidates }.encode())
            .await?;
        let remote_paths = protocol::parse_paths(&reply)?;

        Ok(RoundPlan::Pull(self.index.find_differences(&remote_paths)))
    }

    async fn pull_keys(&self, keys: &[String]) -> usize {
        let mut pulled = 0;
        for key in keys {
            match self.pull_key(key).await {
                Ok(true) => pulled += 1,
                Ok(false) => debug!(%key, "pull superseded by local state"),
                Err(e) => warn!(%key, error = %e, "pull failed"),
            }
        }
        pulled
    }

    /// Fetch one key from the peer and apply it with the peer's own
    /// timestamp. Returns whether the store accepted the write.
    async fn pull_key(&self, key: &str) -> Result<bool, SyncError> {
        let reply = self
            .client
            .exchange(&Request::GetTs { key: key.to_string() }.encode())
            .await?;
        let Some((value, timestamp)) = protocol::parse_value_timestamp(&reply)? else {
            return Ok(false);
        };
        Ok(self.store.set(key, &value, timestamp))
    }

    async fn full_pull_round(&self) {
        match self.full_pull().await {
            Ok(pulled) => info!(pulled, "full pull complete"),
            Err(e) => warn!(error = %e, "full pull failed, retrying next round"),
        }
    }

    async fn full_pull(&self) -> Result<usize, SyncError> {
        let reply = self.client.exchange(&Request::GetAll.encode()).await?;
        let remote = protocol::parse_key_timestamps(&reply)?;
        let mut pulled = 0;
        for (key, _) in &remote {
            match self.pull_key(key).await {
                Ok(true) => pulled += 1,
                Ok(false) => {}
                Err(e) => warn!(%key, error = %e, "pull failed"),
            }
        }
        Ok(pulled)
    }
}

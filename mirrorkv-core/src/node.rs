/*
    node.rs - Process assembly

    Wires one node together: store + index per the configured sync
    mode, the dispatcher on a pre-bound listener, the replicator, and
    the reconciler. Binding is split from spawning so callers (and the
    tests) can learn an ephemeral port before choosing peer addresses.
*/

use crate::config::NodeConfig;
use crate::core_index::{Index, MerkleIndex, NullIndex};
use crate::core_net::{Dispatcher, PeerAddr, PushPolicy, Replicator};
use crate::core_store::KvStore;
use crate::core_sync::{Reconciler, SyncMode};
use crate::shutdown::ShutdownCoordinator;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const TASK_EXIT_GRACE: Duration = Duration::from_secs(5);

/// A bound but not yet running node.
pub struct Node {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Node {
    /// Bind the listen socket. This is the only fatal bootstrap step;
    /// `addr` may use port 0 to take an ephemeral port.
    pub async fn bind(addr: SocketAddr) -> io::Result<Node> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Node {
            listener,
            local_addr,
        })
    }

    /// Address the listener actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start the dispatcher and reconciler tasks. The listener is
    /// already bound, so `config.server` is not consulted here.
    pub fn spawn(self, config: NodeConfig) -> NodeHandle {
        let index: Arc<dyn Index> = match config.sync.mode {
            SyncMode::Merkle => Arc::new(MerkleIndex::new()),
            SyncMode::FullState => Arc::new(NullIndex::new()),
        };
        let store = Arc::new(KvStore::new(Arc::clone(&index)));
        let peer = PeerAddr::new(config.peer.host.clone(), config.peer.port);

        let replicator = Replicator::new(peer.clone(), PushPolicy::from(&config.replication));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&index),
            replicator,
        ));
        let reconciler = Reconciler::new(Arc::clone(&store), index, peer.clone(), &config.sync);

        let shutdown = ShutdownCoordinator::new();
        let tasks = vec![
            tokio::spawn(dispatcher.run(self.listener, shutdown.subscribe())),
            tokio::spawn(reconciler.run(shutdown.subscribe())),
        ];

        info!(addr = %self.local_addr, %peer, mode = %config.sync.mode, "node started");
        NodeHandle {
            local_addr: self.local_addr,
            shutdown,
            tasks,
        }
    }
}

/// Handle to a running node.
pub struct NodeHandle {
    local_addr: SocketAddr,
    shutdown: ShutdownCoordinator,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal shutdown and wait for the long-running tasks to exit.
    /// Tasks still alive after the grace period are aborted.
    pub async fn shutdown(self) {
        self.shutdown.trigger();
        for mut task in self.tasks {
            if tokio::time::timeout(TASK_EXIT_GRACE, &mut task).await.is_err() {
                warn!("task did not exit in time, aborting");
                task.abort();
            }
        }
        info!(addr = %self.local_addr, "node stopped");
    }
}

/*
    dispatcher.rs - Inbound request handling

    Accepts TCP connections and serves exactly one request per
    connection: read to EOF, parse, route to the store or the index,
    write the raw reply, close. Client writes mint their timestamp here
    and hand the accepted mutation to the replicator; PROPAGATE traffic
    applies the origin's timestamp verbatim and is never pushed onward.
*/

use crate::core_index::Index;
use crate::core_net::protocol::{
    self, ProtocolError, Request, REPLY_INVALID_ARGUMENTS, REPLY_OK, REPLY_REJECTED_DEL,
    REPLY_STALE_SET, REPLY_UNKNOWN_COMMAND,
};
use crate::core_net::replicator::Replicator;
use crate::core_store::{KvStore, Timestamp};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Request router for one node.
pub struct Dispatcher {
    store: Arc<KvStore>,
    index: Arc<dyn Index>,
    replicator: Replicator,
}

impl Dispatcher {
    pub fn new(store: Arc<KvStore>, index: Arc<dyn Index>, replicator: Replicator) -> Self {
        Dispatcher {
            store,
            index,
            replicator,
        }
    }

    /// Accept loop. Runs until the shutdown signal arrives; each
    /// accepted connection is served on its own task so the acceptor
    /// never blocks.
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(addr = ?listener.local_addr().ok(), "dispatcher listening");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("dispatcher stopping");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((socket, remote)) => {
                        let dispatcher = Arc::clone(&self);
                        tokio::spawn(async move {
                            if let Err(e) = dispatcher.serve(socket).await {
                                debug!(%remote, error = %e, "connection dropped");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }
    }

    async fn serve(&self, mut socket: TcpStream) -> io::Result<()> {
        let mut request = Vec::new();
        socket.read_to_end(&mut request).await?;
        let line = String::from_utf8_lossy(&request);
        let reply = self.respond(&line);
        debug!(request = %line.trim(), reply = %reply, "served request");
        socket.write_all(reply.as_bytes()).await?;
        socket.shutdown().await?;
        Ok(())
    }

    /// Compose the reply for one request line.
    pub fn respond(&self, line: &str) -> String {
        match Request::parse(line) {
            Ok(request) => self.handle(request),
            Err(ProtocolError::InvalidArguments(reason)) => {
                debug!(request = %line.trim(), %reason, "bad arguments");
                REPLY_INVALID_ARGUMENTS.to_string()
            }
            Err(_) => REPLY_UNKNOWN_COMMAND.to_string(),
        }
    }

    fn handle(&self, request: Request) -> String {
        match request {
            Request::Get { key } => self.store.get(&key),

            Request::GetTs { key } => match self.store.value_with_timestamp(&key) {
                Some((value, timestamp)) => protocol::format_value_timestamp(&value, timestamp),
                None => String::new(),
            },

            Request::Set { key, value } => {
                let timestamp = Timestamp::now();
                if self.store.set(&key, &value, timestamp) {
                    self.replicator.push(
                        Request::PropagateSet {
                            key,
                            value,
                            timestamp,
                        }
                        .encode(),
                    );
                    REPLY_OK.to_string()
                } else {
                    REPLY_STALE_SET.to_string()
                }
            }

            Request::Del { key } => {
                let timestamp = Timestamp::now();
                if self.store.del(&key, timestamp) {
                    self.replicator
                        .push(Request::PropagateDel { key, timestamp }.encode());
                    REPLY_OK.to_string()
                } else {
                    REPLY_REJECTED_DEL.to_string()
                }
            }

            // Replicated writes: apply verbatim, never push onward.
            Request::PropagateSet {
                key,
                value,
                timestamp,
            } => {
                if self.store.set(&key, &value, timestamp) {
                    REPLY_OK.to_string()
                } else {
                    REPLY_STALE_SET.to_string()
                }
            }

            Request::PropagateDel { key, timestamp } => {
                if self.store.del(&key, timestamp) {
                    REPLY_OK.to_string()
                } else {
                    REPLY_REJECTED_DEL.to_string()
                }
            }

            Request::GetAll => protocol::format_key_timestamps(&self.store.keys_with_timestamps()),

            Request::GetMerkleRoot => {
                let root = self.index.root();
                if root.is_zero() {
                    protocol::REPLY_EMPTY_ROOT.to_string()
                } else {
                    root.to_hex()
                }
            }

            Request::GetPaths { keys } => protocol::format_paths(&self.index.paths(&keys)),
        }
    }
}

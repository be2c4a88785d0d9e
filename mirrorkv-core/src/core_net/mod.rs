/*
    core_net - Wire protocol, dispatch, and replication push

    Everything that touches a socket: the request dispatcher serving
    inbound connections, the one-shot peer client, and the retrying
    replicator for eager propagation.
*/

pub mod dispatcher;
pub mod peer;
pub mod protocol;
pub mod replicator;

use thiserror::Error;

pub use dispatcher::Dispatcher;
pub use peer::{PeerAddr, PeerClient};
pub use protocol::{ProtocolError, Request};
pub use replicator::{PushPolicy, Replicator};

/// Transport-level errors for outbound peer traffic.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Exchange timed out")]
    Timeout,
}

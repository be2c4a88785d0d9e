/*
    peer.rs - Peer descriptor and one-shot request client

    Every exchange is one connection: connect, write the request bytes,
    half-close the write side, read the reply to EOF. The descriptor is
    immutable after construction and cloned freely across subsystems.
*/

use crate::core_net::NetError;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Address of the other node in the two-node cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr {
    pub host: String,
    pub port: u16,
}

impl PeerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        PeerAddr {
            host: host.into(),
            port,
        }
    }

    /// `host:port` form accepted by the connectors.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One-request-per-connection client for peer traffic.
#[derive(Debug, Clone)]
pub struct PeerClient {
    peer: PeerAddr,
    timeout: Option<Duration>,
}

impl PeerClient {
    pub fn new(peer: PeerAddr) -> Self {
        PeerClient {
            peer,
            timeout: None,
        }
    }

    /// Bound the whole connect/write/read exchange. Reconciliation
    /// traffic uses this; client-facing sessions never do.
    pub fn with_timeout(peer: PeerAddr, timeout: Duration) -> Self {
        PeerClient {
            peer,
            timeout: Some(timeout),
        }
    }

    pub fn peer(&self) -> &PeerAddr {
        &self.peer
    }

    /// Send `request` and return the peer's reply.
    pub async fn exchange(&self, request: &str) -> Result<String, NetError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange_inner(request))
                .await
                .map_err(|_| NetError::Timeout)?,
            None => self.exchange_inner(request).await,
        }
    }

    /// Send `request` without waiting for a reply. Used by the
    /// replicator's fire-and-forget pushes.
    pub async fn send(&self, request: &str) -> Result<(), NetError> {
        let mut stream = self.connect().await?;
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| NetError::Io(e.to_string()))?;
        stream
            .shutdown()
            .await
            .map_err(|e| NetError::Io(e.to_string()))?;
        Ok(())
    }

    async fn exchange_inner(&self, request: &str) -> Result<String, NetError> {
        let mut stream = self.connect().await?;
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| NetError::Io(e.to_string()))?;
        // Half-close tells the peer the request is complete.
        stream
            .shutdown()
            .await
            .map_err(|e| NetError::Io(e.to_string()))?;

        let mut reply = Vec::new();
        stream
            .read_to_end(&mut reply)
            .await
            .map_err(|e| NetError::Io(e.to_string()))?;
        String::from_utf8(reply).map_err(|_| NetError::Io("non-UTF-8 reply".to_string()))
    }

    async fn connect(&self) -> Result<TcpStream, NetError> {
        TcpStream::connect(self.peer.endpoint())
            .await
            .map_err(|e| NetError::Connect(format!("{}: {}", self.peer, e)))
    }
}

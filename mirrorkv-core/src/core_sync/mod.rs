/*
    core_sync - Anti-entropy reconciliation

    Periodic repair of replica drift, independent of the eager push
    path. One round compares Merkle roots, narrows the difference with
    inclusion paths, and pulls only the divergent keys; anything that
    goes wrong downgrades the round to a full state pull.
*/

pub mod reconciler;

use crate::core_net::{NetError, ProtocolError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub use reconciler::Reconciler;

/// How a node summarises its state for reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Merkle index: roots compared, differences narrowed via paths.
    Merkle,
    /// No index: every round is a full state exchange.
    FullState,
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merkle" => Ok(SyncMode::Merkle),
            "full-state" => Ok(SyncMode::FullState),
            other => Err(format!("unknown sync mode {:?}", other)),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Merkle => f.write_str("merkle"),
            SyncMode::FullState => f.write_str("full-state"),
        }
    }
}

/// Reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Wall-clock pause between rounds
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Bound on each peer exchange within a round
    #[serde(with = "humantime_serde")]
    pub pull_timeout: Duration,

    pub mode: SyncMode,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            interval: Duration::from_secs(5),
            pull_timeout: Duration::from_secs(2),
            mode: SyncMode::Merkle,
        }
    }
}

/// Errors that abort a reconciliation phase. None of them terminate
/// the reconciler loop.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Peer exchange failed: {0}")]
    Transport(#[from] NetError),

    /// Undecodable reply material; treated exactly like a transport
    /// fault by the fallback logic.
    #[error("Reply decoding failed: {0}")]
    Decode(#[from] ProtocolError),
}

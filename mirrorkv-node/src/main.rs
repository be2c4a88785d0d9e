//! mirrorkv node daemon
//!
//! Binds the listener, starts the dispatcher and reconciler, and runs
//! until interrupted. Configuration comes from the environment
//! (`MIRRORKV_*`) with command-line flags taking precedence.

use anyhow::{Context, Result};
use clap::Parser;
use mirrorkv_core::{
    init_logging_with_config, LogConfig, LogLevel, Node, NodeConfig, SyncMode,
};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mirrorkv-node")]
#[command(author, version, about = "Two-peer replicated key-value store node", long_about = None)]
struct Args {
    /// Address to bind the listener on
    #[arg(long, default_value = "127.0.0.1")]
    listen_host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = 5008)]
    listen_port: u16,

    /// Peer host
    #[arg(long, default_value = "127.0.0.1")]
    peer_host: String,

    /// Peer port
    #[arg(long, default_value_t = 5009)]
    peer_port: u16,

    /// Reconciliation mode (merkle, full-state)
    #[arg(long, default_value = "merkle")]
    sync_mode: String,

    /// Milliseconds between reconciliation rounds
    #[arg(long)]
    sync_interval_ms: Option<u64>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn into_config(self) -> Result<NodeConfig> {
        let mut config = NodeConfig::from_env().context("environment configuration")?;
        config.server.listen_addr = SocketAddr::new(self.listen_host, self.listen_port);
        config.peer.host = self.peer_host;
        config.peer.port = self.peer_port;
        config.sync.mode = self
            .sync_mode
            .parse::<SyncMode>()
            .map_err(anyhow::Error::msg)?;
        if let Some(interval) = self.sync_interval_ms {
            config.sync.interval = Duration::from_millis(interval);
        }
        config.logging.level = self.log_level;
        config.logging.json_format = self.json_logs;
        config.validate().context("configuration validation")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = LogLevel::from_str(&args.log_level).unwrap_or_else(|| {
        eprintln!("Invalid log level '{}', using 'info'", args.log_level);
        LogLevel::Info
    });
    let log_config = LogConfig::new(log_level).json_format(args.json_logs);
    init_logging_with_config(log_config)?;

    let config = args.into_config()?;

    let node = Node::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.server.listen_addr))?;
    info!(addr = %node.local_addr(), "listener bound");

    let handle = node.spawn(config);

    tokio::signal::ctrl_c()
        .await
        .context("waiting for interrupt")?;
    info!("interrupt received, shutting down");
    handle.shutdown().await;

    Ok(())
}

//! # switchboard-hub
//!
//! Server binary: binds the Unix socket, wires the manager to the
//! built-in op handler, and turns Ctrl-C into a drain request.

#![deny(unsafe_code)]

mod handler;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use serde::{Deserialize, Serialize};
use tokio::net::UnixListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use switchboard_core::DEFAULT_SOCKET_PATH;
use switchboard_server::{ExitStatus, Manager, ServerConfig};

use crate::handler::OpsHandler;

/// Switchboard hub server.
#[derive(Parser, Debug)]
#[command(name = "switchboard-hub", about = "Switchboard hub server")]
struct Cli {
    /// Unix socket path to bind (overrides config file).
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Path to a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Drain grace period in seconds (overrides config file).
    #[arg(long)]
    grace_secs: Option<u64>,
}

/// Full hub configuration: socket placement plus the server knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct HubConfig {
    /// Where to bind the Unix socket.
    socket_path: PathBuf,
    /// Manager / relay configuration.
    server: ServerConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            server: ServerConfig::default(),
        }
    }
}

/// Layer defaults, the optional config file, environment, then CLI flags.
fn load_config(cli: &Cli) -> Result<HubConfig> {
    let mut figment = Figment::from(Serialized::defaults(HubConfig::default()));
    if let Some(path) = &cli.config {
        figment = figment.merge(Json::file(path));
    }
    let mut config: HubConfig = figment
        .merge(Env::prefixed("SWITCHBOARD_"))
        .extract()
        .context("invalid configuration")?;

    if let Some(socket) = &cli.socket {
        config.socket_path = socket.clone();
    }
    if let Some(grace_secs) = cli.grace_secs {
        config.server.drain_grace_secs = grace_secs;
    }
    Ok(config)
}

/// Bind the socket, clearing a stale file from an earlier run first.
fn bind_socket(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        warn!(path = %path.display(), "removing stale socket file");
        std::fs::remove_file(path)
            .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
    }
    UnixListener::bind(path)
        .with_context(|| format!("failed to bind {} (another hub running?)", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let listener = bind_socket(&config.socket_path)?;
    info!(socket = %config.socket_path.display(), "hub listening");

    let manager = Manager::with_config(OpsHandler::default(), config.server.clone());
    let handle = manager.handle();

    let _ = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; requesting shutdown");
            if handle.request_shutdown().await.is_err() {
                warn!("shutdown already under way");
            }
        }
    });

    let status = manager.run(listener).await;

    if let Err(err) = std::fs::remove_file(&config.socket_path) {
        warn!(error = %err, "could not remove socket file");
    }

    match status {
        ExitStatus::Drained => Ok(()),
        ExitStatus::DrainTimeout { abandoned } => {
            bail!("shutdown timed out; {abandoned} relay(s) abandoned")
        }
    }
}

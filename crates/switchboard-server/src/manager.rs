//! The connection-accepting supervisor.
//!
//! The manager bootstraps the channel fabric and the engine, provisions a
//! relay per accepted connection, and coordinates the multi-stage
//! shutdown: stop accepting, flip the shutdown token to draining, join
//! every relay bounded by a grace period, report the result. It never
//! touches domain state itself.

use std::fmt;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use switchboard_core::{ConnectionId, Error, ShutdownController};

use crate::acceptor::Acceptor;
use crate::config::ServerConfig;
use crate::engine::{Engine, EngineRequest, Handler};
use crate::relay::{self, ConnectionHandle};

/// How the manager's supervision ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every relay terminated within the grace period.
    Drained,
    /// The grace period expired; stragglers were abandoned, not killed.
    DrainTimeout {
        /// Number of relays still running when the grace period expired.
        abandoned: usize,
    },
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drained => write!(f, "drained cleanly"),
            Self::DrainTimeout { abandoned } => {
                write!(f, "drain timed out; {abandoned} relay(s) abandoned")
            }
        }
    }
}

/// Clonable control surface over a running [`Manager`].
#[derive(Clone, Debug)]
pub struct ManagerHandle {
    engine: mpsc::Sender<EngineRequest>,
    status: watch::Receiver<Option<ExitStatus>>,
}

impl ManagerHandle {
    /// Initiate draining, exactly as if a client had sent the shutdown
    /// frame.
    pub async fn request_shutdown(&self) -> Result<(), Error> {
        self.engine
            .send(EngineRequest::Shutdown)
            .await
            .map_err(|_| Error::ChannelBroken("engine inlet"))
    }

    /// Wait for supervision to end and return the final status.
    pub async fn shutdown_status(&mut self) -> Result<ExitStatus, Error> {
        let status = self
            .status
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::ChannelBroken("status channel"))?;
        match *status {
            Some(status) => Ok(status),
            None => Err(Error::ChannelBroken("status channel")),
        }
    }
}

/// The supervisor. Built around a [`Handler`], consumed by [`run`].
///
/// [`run`]: Manager::run
pub struct Manager<H> {
    config: ServerConfig,
    handler: H,
    engine_tx: mpsc::Sender<EngineRequest>,
    inlet_rx: mpsc::Receiver<EngineRequest>,
    shutdown: ShutdownController,
    status_tx: watch::Sender<Option<ExitStatus>>,
}

impl<H: Handler> Manager<H> {
    /// Manager with the default configuration.
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, ServerConfig::default())
    }

    /// Manager with an explicit configuration.
    pub fn with_config(handler: H, config: ServerConfig) -> Self {
        let (engine_tx, inlet_rx) = mpsc::channel(config.command_queue_capacity);
        let (status_tx, _) = watch::channel(None);
        Self {
            config,
            handler,
            engine_tx,
            inlet_rx,
            shutdown: ShutdownController::new(),
            status_tx,
        }
    }

    /// Control surface usable before, during and after [`run`].
    ///
    /// [`run`]: Manager::run
    #[must_use]
    pub fn handle(&self) -> ManagerHandle {
        ManagerHandle {
            engine: self.engine_tx.clone(),
            status: self.status_tx.subscribe(),
        }
    }

    /// Accept connections until the engine signals shutdown, then drain.
    ///
    /// The loop waits on exactly two sources: the acceptor and the
    /// engine's shutdown signal. Accept and provisioning failures are
    /// logged and skipped; they never stop the loop.
    pub async fn run<A: Acceptor>(self, mut acceptor: A) -> ExitStatus {
        let Self {
            config,
            handler,
            engine_tx,
            inlet_rx,
            shutdown,
            status_tx,
        } = self;

        // The keepalive subscription pins the fan-out open while no
        // relays are connected.
        let (fanout_tx, _keepalive) = broadcast::channel(config.fanout_capacity);
        let (control_tx, mut control_rx) = oneshot::channel();
        let engine_task = tokio::spawn(Engine::new(handler, inlet_rx, fanout_tx, control_tx).run());

        let mut relays: Vec<JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                accepted = acceptor.accept() => match accepted {
                    Ok(transport) => {
                        let id = ConnectionId::new();
                        let (sub_tx, sub_rx) = oneshot::channel();
                        let subscribe = EngineRequest::Subscribe {
                            connection: id.clone(),
                            reply: sub_tx,
                        };
                        if engine_tx.send(subscribe).await.is_err() {
                            warn!(connection_id = %id, "engine inlet closed; dropping connection");
                            continue;
                        }
                        let Ok(fanout) = sub_rx.await else {
                            warn!(connection_id = %id, "engine vanished while minting subscription");
                            continue;
                        };
                        info!(connection_id = %id, "connection accepted");
                        let handle = ConnectionHandle {
                            id,
                            engine: engine_tx.clone(),
                            fanout,
                            shutdown: shutdown.token(),
                        };
                        relays.push(tokio::spawn(relay::run(handle, transport, config.clone())));
                    }
                    Err(err) => warn!(error = %err, "accept failed; continuing"),
                },
                signal = &mut control_rx => {
                    if signal.is_err() {
                        error!("engine ended without signaling; draining anyway");
                    }
                    break;
                }
            }
        }

        info!(relay_count = relays.len(), grace = ?config.drain_grace(), "draining relays");
        let _ = shutdown.begin_drain();
        let status = drain_with_grace(&mut relays, config.drain_grace()).await;

        if let Err(err) = engine_task.await {
            error!(error = %err, "engine task panicked");
        }
        let _ = shutdown.terminate();
        let _ = status_tx.send(Some(status));
        info!(%status, "manager stopped");
        status
    }
}

/// Join every relay, bounded by the grace period. Relays that outlive it
/// keep running detached; they are counted and reported, never aborted.
async fn drain_with_grace(relays: &mut Vec<JoinHandle<()>>, grace: Duration) -> ExitStatus {
    let join_all = async {
        for relay in relays.iter_mut() {
            if let Err(err) = relay.await {
                warn!(error = %err, "relay panicked during drain");
            }
        }
    };

    if tokio::time::timeout(grace, join_all).await.is_ok() {
        ExitStatus::Drained
    } else {
        let abandoned = relays.iter().filter(|relay| !relay.is_finished()).count();
        warn!(abandoned, "grace period expired; abandoning relays");
        ExitStatus::DrainTimeout { abandoned }
    }
}

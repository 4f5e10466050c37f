//! The single-writer state-processing unit.
//!
//! The engine is the only task that touches mutable domain state. All
//! mutation funnels through one mpsc queue and is applied in arrival
//! order, globally across every connection, so the domain handler never
//! needs a lock.

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use switchboard_core::{Broadcast, Command, ConnectionId, DomainError, Reply};

use serde_json::Value;

/// Domain logic plugged into the engine.
///
/// `apply` has exclusive access to the implementation's state; the engine
/// guarantees calls are strictly serialized in global submission order.
/// A returned [`DomainError`] becomes an error reply and never stops the
/// processing loop, so implementations should prefer returning errors over
/// panicking.
pub trait Handler: Send + 'static {
    /// Apply one command, producing a reply payload and optionally a
    /// broadcast.
    fn apply(&mut self, command: Command) -> Result<Outcome, DomainError>;
}

/// What one successfully applied command produced.
#[derive(Clone, Debug)]
pub struct Outcome {
    /// Payload for the issuing connection's reply.
    pub reply: Value,
    /// Optional fan-out emitted alongside the reply.
    pub broadcast: Option<Broadcast>,
}

impl Outcome {
    /// An outcome that only replies.
    #[must_use]
    pub fn reply(payload: Value) -> Self {
        Self {
            reply: payload,
            broadcast: None,
        }
    }

    /// Attach a broadcast to this outcome.
    #[must_use]
    pub fn with_broadcast(mut self, broadcast: Broadcast) -> Self {
        self.broadcast = Some(broadcast);
        self
    }
}

/// One item on the engine's request inlet.
///
/// Subscription minting travels through the same inlet as commands but
/// answers over its own single-use channel, so recurring traffic never
/// touches the shutdown-signaling channel.
#[derive(Debug)]
pub(crate) enum EngineRequest {
    /// A command plus the sending half of its reply slot.
    Submit {
        command: Command,
        reply: oneshot::Sender<Reply>,
    },
    /// Mint a fan-out subscription for a newly accepted connection.
    Subscribe {
        connection: ConnectionId,
        reply: oneshot::Sender<broadcast::Receiver<Fanout>>,
    },
    /// Stop consuming, announce closure, signal the manager, exit.
    Shutdown,
}

/// One item on the fan-out channel feeding every relay.
#[derive(Clone, Debug)]
pub(crate) enum Fanout {
    /// A domain broadcast, possibly targeted.
    Broadcast(Broadcast),
    /// Terminal item: every relay should close its connection.
    Closing,
}

/// The engine task. Owns the handler (and through it the domain state),
/// the inlet receiver, the fan-out sender and the manager control channel.
pub(crate) struct Engine<H> {
    handler: H,
    inlet: mpsc::Receiver<EngineRequest>,
    fanout: broadcast::Sender<Fanout>,
    control: oneshot::Sender<()>,
}

impl<H: Handler> Engine<H> {
    pub(crate) fn new(
        handler: H,
        inlet: mpsc::Receiver<EngineRequest>,
        fanout: broadcast::Sender<Fanout>,
        control: oneshot::Sender<()>,
    ) -> Self {
        Self {
            handler,
            inlet,
            fanout,
            control,
        }
    }

    /// Process requests until a `Shutdown` arrives or every inlet sender
    /// is gone, then run the closing sequence.
    pub(crate) async fn run(mut self) {
        info!("engine started");
        while let Some(request) = self.inlet.recv().await {
            match request {
                EngineRequest::Submit { command, reply } => self.submit(command, reply),
                EngineRequest::Subscribe { connection, reply } => {
                    debug!(connection_id = %connection, "minting fan-out subscription");
                    if reply.send(self.fanout.subscribe()).is_err() {
                        warn!(connection_id = %connection, "subscription requester vanished");
                    }
                }
                EngineRequest::Shutdown => {
                    info!("shutdown command received");
                    break;
                }
            }
        }

        // Closing sequence: announce to relays first, then hand control to
        // the manager. Failures here mean the counterpart is already gone,
        // which is exactly the state we are moving toward.
        if self.fanout.send(Fanout::Closing).is_err() {
            debug!("no live subscribers for closing announcement");
        }
        if self.control.send(()).is_err() {
            warn!("manager control channel already closed");
        }
        info!("engine stopped");
    }

    /// Apply one command and resolve its reply slot exactly once.
    fn submit(&mut self, command: Command, reply: oneshot::Sender<Reply>) {
        let correlation = command.correlation;
        let issuer = command.issuer.clone();

        let (result, broadcast) = match self.handler.apply(command) {
            Ok(outcome) => (Ok(outcome.reply), outcome.broadcast),
            Err(err) => {
                debug!(%correlation, issuer = %issuer, code = %err.code, "command rejected");
                (Err(err), None)
            }
        };

        if reply
            .send(Reply {
                correlation,
                result,
            })
            .is_err()
        {
            // The issuing relay terminated while the command was queued.
            debug!(%correlation, issuer = %issuer, "reply slot dropped before resolution");
        }

        if let Some(broadcast) = broadcast {
            if self.fanout.send(Fanout::Broadcast(broadcast)).is_err() {
                debug!("broadcast emitted with no live subscribers");
            }
        }
    }
}

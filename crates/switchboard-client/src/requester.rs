//! The send path: writes commands, awaits replies.

use futures::SinkExt;
use serde_json::Value;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::FramedWrite;
use tracing::debug;

use switchboard_core::{CorrelationId, Error, Frame, FrameCodec};

use crate::distributor::Registration;

/// The send half of a client connection.
///
/// Owns the transport's write half outright: a request is written
/// directly, after registering its reply slot with the distributor, and
/// the call resolves once the matching reply arrives. Dropping the
/// requester leaves the receive half fully functional.
pub struct Requester {
    writer: FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, FrameCodec>,
    registrations: mpsc::Sender<Registration>,
    next_correlation: u64,
}

impl Requester {
    pub(crate) fn new(
        writer: FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, FrameCodec>,
        registrations: mpsc::Sender<Registration>,
    ) -> Self {
        Self {
            writer,
            registrations,
            next_correlation: 0,
        }
    }

    /// Send one command and wait for its reply.
    ///
    /// A domain rejection surfaces as [`Error::Domain`]; a vanished
    /// distributor or dead transport as [`Error::ChannelBroken`] /
    /// [`Error::Transport`].
    pub async fn request(&mut self, payload: Value) -> Result<Value, Error> {
        let correlation = CorrelationId::from(self.next_correlation);
        self.next_correlation += 1;

        // Register before writing so the reply can never miss its slot.
        let (slot_tx, slot_rx) = oneshot::channel();
        self.registrations
            .send(Registration {
                correlation,
                slot: slot_tx,
            })
            .await
            .map_err(|_| Error::ChannelBroken("distributor registrations"))?;

        debug!(%correlation, "sending command");
        self.writer
            .send(Frame::Command {
                correlation,
                payload,
            })
            .await?;

        let reply = slot_rx
            .await
            .map_err(|_| Error::ChannelBroken("reply slot"))?;
        reply.result.map_err(Error::Domain)
    }

    /// Ask the server to shut down. Fire-and-forget: the acknowledgement
    /// is the terminal broadcast every connection receives.
    pub async fn request_shutdown(&mut self) -> Result<(), Error> {
        self.writer.send(Frame::Shutdown).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requester")
            .field("next_correlation", &self.next_correlation)
            .finish_non_exhaustive()
    }
}

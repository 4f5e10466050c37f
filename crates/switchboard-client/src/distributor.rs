//! The distributor: sole reader of the inbound transport.
//!
//! Split into two units so each waits on a bounded number of sources: the
//! inbound pump owns the framed read half and feeds decoded frames into a
//! queue; the distributor proper owns the correlation map and waits on
//! that queue plus the registration queue from the send path.
//!
//! Lifetime is tracked through channel-endpoint liveness, never an
//! explicit handshake: a closed registration queue means the send half is
//! gone, a closed broadcast queue means the receive half is gone, and the
//! distributor stops once both are gone or the connection fails.

use std::collections::HashMap;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use switchboard_core::{Broadcast, CorrelationId, Frame, FrameCodec, Reply};

/// A pending request: the send path registers one per command before
/// writing the frame.
#[derive(Debug)]
pub(crate) struct Registration {
    pub(crate) correlation: CorrelationId,
    pub(crate) slot: oneshot::Sender<Reply>,
}

/// Inbound pump: reads frames off the transport and queues them for the
/// distributor. Terminates on transport close or failure, closing the
/// frame queue behind it.
pub(crate) async fn pump_inbound<R>(
    mut frames: FramedRead<R, FrameCodec>,
    queue: mpsc::Sender<Frame>,
) where
    R: AsyncRead + Unpin,
{
    while let Some(decoded) = frames.next().await {
        match decoded {
            Ok(frame) => {
                if queue.send(frame).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                debug!(error = %err, "inbound pump stopping: transport failed");
                return;
            }
        }
    }
    debug!("inbound pump stopping: transport closed");
}

/// Distributor proper: resolves replies by correlation id and forwards
/// broadcasts to the receive path.
pub(crate) async fn distribute(
    mut frames: mpsc::Receiver<Frame>,
    mut registrations: mpsc::Receiver<Registration>,
    broadcasts: mpsc::Sender<Broadcast>,
) {
    let mut pending: HashMap<CorrelationId, oneshot::Sender<Reply>> = HashMap::new();
    // A reply can race ahead of its registration: the send path registers
    // through one queue while frames arrive through another. Unclaimed
    // replies wait here for the registration to catch up.
    let mut unclaimed: HashMap<CorrelationId, Reply> = HashMap::new();
    let mut send_half_live = true;

    loop {
        tokio::select! {
            registration = registrations.recv(), if send_half_live => match registration {
                Some(Registration { correlation, slot }) => {
                    if let Some(reply) = unclaimed.remove(&correlation) {
                        let _ = slot.send(reply);
                    } else if pending.insert(correlation, slot).is_some() {
                        warn!(%correlation, "correlation id reused while in flight");
                    }
                }
                None => {
                    debug!("send half dropped");
                    send_half_live = false;
                    if broadcasts.is_closed() {
                        break;
                    }
                }
            },
            frame = frames.recv() => match frame {
                Some(Frame::Reply(reply)) => {
                    if let Some(slot) = pending.remove(&reply.correlation) {
                        // The requester may have given up; resolution is
                        // at-most-once either way.
                        let _ = slot.send(reply);
                    } else {
                        let _ = unclaimed.insert(reply.correlation, reply);
                    }
                }
                Some(Frame::Broadcast(broadcast)) => {
                    if broadcasts.is_closed() {
                        if !send_half_live {
                            break;
                        }
                        // Receive half gone: discard silently, keep
                        // resolving replies.
                    } else if broadcasts.send(broadcast).await.is_err() && !send_half_live {
                        break;
                    }
                }
                Some(Frame::Shutdown) => {
                    info!("server announced shutdown");
                    break;
                }
                Some(frame @ Frame::Command { .. }) => {
                    debug!(?frame, "ignoring unexpected frame from server");
                }
                None => {
                    debug!("distributor stopping: inbound pump gone");
                    break;
                }
            }
        }
    }
    // Dropping `pending` here resolves nothing; requesters still waiting
    // observe ChannelBroken.
}

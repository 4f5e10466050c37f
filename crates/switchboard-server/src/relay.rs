//! Per-connection relay between a duplex transport and the channel fabric.
//!
//! Four units, each blocking on a single source, so one direction can
//! never stall the other:
//!
//! - **reader**: sole owner of the framed read half; turns inbound
//!   command frames into engine submissions and hands each reply slot to
//!   the reply forwarder
//! - **writer**: sole owner of the framed write half; drains one local
//!   queue in arrival order and makes no admission decisions
//! - **broadcast forwarder**: filters the engine fan-out down to frames
//!   this connection should see
//! - **reply forwarder**: awaits each reply slot exactly once and queues
//!   the resulting frame
//!
//! Units unwind independently: a terminating unit closes the queues it
//! feeds and its consumers cascade to a stop. The one exception is the
//! broadcast forwarder, whose source (the fan-out) outlives a dead
//! transport; the relay nudges it with a connection-local cancellation
//! token once the reader is gone and pending replies are flushed.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use switchboard_core::{Command, ConnectionId, Frame, FrameCodec, Reply, ShutdownToken};

use crate::config::ServerConfig;
use crate::engine::{EngineRequest, Fanout};

/// Everything a relay needs to serve one connection, assembled by the
/// manager at accept time.
pub(crate) struct ConnectionHandle {
    pub(crate) id: ConnectionId,
    pub(crate) engine: mpsc::Sender<EngineRequest>,
    pub(crate) fanout: broadcast::Receiver<Fanout>,
    pub(crate) shutdown: ShutdownToken,
}

/// Serve one connection until all four units have terminated.
pub(crate) async fn run<T>(handle: ConnectionHandle, transport: T, config: ServerConfig)
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let ConnectionHandle {
        id,
        engine,
        fanout,
        shutdown,
    } = handle;
    info!(connection_id = %id, "relay started");

    let (read, write) = tokio::io::split(transport);
    let framed_read = FramedRead::new(read, FrameCodec::with_max_frame(config.max_frame_bytes));
    let framed_write = FramedWrite::new(write, FrameCodec::with_max_frame(config.max_frame_bytes));

    let (outbound_tx, outbound_rx) = mpsc::channel::<Frame>(config.relay_queue_capacity);
    let (slot_tx, slot_rx) = mpsc::channel::<oneshot::Receiver<Reply>>(config.relay_queue_capacity);
    let closed = CancellationToken::new();

    let writer = tokio::spawn(write_outbound(framed_write, outbound_rx));
    let replies = tokio::spawn(forward_replies(slot_rx, outbound_tx.clone()));
    let broadcasts = tokio::spawn(forward_broadcasts(
        fanout,
        id.clone(),
        outbound_tx,
        closed.clone(),
    ));

    read_inbound(framed_read, id.clone(), engine, slot_tx, shutdown.clone()).await;

    // Flush pending replies before deciding how the forwarders stop.
    join_unit(&id, "reply forwarder", replies).await;

    // When draining, the terminal fan-out item is already in flight and
    // the broadcast forwarder exits after passing it on to the peer.
    // Otherwise the transport itself went away and nothing more can be
    // delivered.
    if !shutdown.is_draining() {
        closed.cancel();
    }

    join_unit(&id, "broadcast forwarder", broadcasts).await;
    join_unit(&id, "writer", writer).await;
    info!(connection_id = %id, "relay stopped");
}

async fn join_unit(id: &ConnectionId, unit: &'static str, task: tokio::task::JoinHandle<()>) {
    if let Err(err) = task.await {
        warn!(connection_id = %id, unit, error = %err, "relay unit panicked");
    }
}

/// Reader unit: the relay's top-level loop, waiting on exactly two
/// sources: the transport and the shutdown token.
async fn read_inbound<R>(
    mut frames: FramedRead<ReadHalf<R>, FrameCodec>,
    id: ConnectionId,
    engine: mpsc::Sender<EngineRequest>,
    slots: mpsc::Sender<oneshot::Receiver<Reply>>,
    mut shutdown: ShutdownToken,
) where
    R: AsyncRead,
{
    loop {
        tokio::select! {
            () = shutdown.draining() => {
                debug!(connection_id = %id, "reader stopping: draining");
                break;
            }
            frame = frames.next() => match frame {
                None => {
                    debug!(connection_id = %id, "reader stopping: peer closed");
                    break;
                }
                Some(Err(err)) => {
                    debug!(connection_id = %id, error = %err, "reader stopping: transport failed");
                    break;
                }
                Some(Ok(Frame::Command { correlation, payload })) => {
                    let (reply_tx, reply_rx) = oneshot::channel();
                    let command = Command {
                        correlation,
                        issuer: id.clone(),
                        payload,
                    };
                    if engine
                        .send(EngineRequest::Submit { command, reply: reply_tx })
                        .await
                        .is_err()
                    {
                        debug!(connection_id = %id, "reader stopping: engine inlet closed");
                        break;
                    }
                    if slots.send(reply_rx).await.is_err() {
                        debug!(connection_id = %id, "reader stopping: reply forwarder gone");
                        break;
                    }
                }
                Some(Ok(Frame::Shutdown)) => {
                    info!(connection_id = %id, "client requested shutdown");
                    if engine.send(EngineRequest::Shutdown).await.is_err() {
                        break;
                    }
                }
                Some(Ok(frame)) => {
                    debug!(connection_id = %id, ?frame, "ignoring unexpected frame from client");
                }
            }
        }
    }
}

/// Writer unit: drains the local queue in arrival order.
async fn write_outbound<W>(
    mut frames: FramedWrite<WriteHalf<W>, FrameCodec>,
    mut outbound: mpsc::Receiver<Frame>,
) where
    W: AsyncWrite,
{
    while let Some(frame) = outbound.recv().await {
        if let Err(err) = frames.send(frame).await {
            debug!(error = %err, "writer stopping: transport failed");
            return;
        }
    }
    // Queue closed: both producers are gone. Best-effort close.
    let _ = frames.close().await;
}

/// Reply-forwarder bridge: awaits each slot exactly once, in the order
/// the reader registered them.
async fn forward_replies(
    mut slots: mpsc::Receiver<oneshot::Receiver<Reply>>,
    outbound: mpsc::Sender<Frame>,
) {
    while let Some(slot) = slots.recv().await {
        match slot.await {
            Ok(reply) => {
                if outbound.send(Frame::Reply(reply)).await.is_err() {
                    return;
                }
            }
            Err(_) => {
                // The engine dropped the slot unresolved, so it is
                // terminating. Unwind; never a panic.
                debug!("reply slot dropped by engine");
                return;
            }
        }
    }
}

/// Broadcast-forwarder bridge: passes through fan-out items meant for
/// this connection and drops the rest. The cancellation token fires when
/// the rest of the relay has already unwound under it.
async fn forward_broadcasts(
    mut fanout: broadcast::Receiver<Fanout>,
    id: ConnectionId,
    outbound: mpsc::Sender<Frame>,
    closed: CancellationToken,
) {
    loop {
        tokio::select! {
            () = closed.cancelled() => return,
            item = fanout.recv() => match item {
                Ok(Fanout::Broadcast(broadcast)) => {
                    if !broadcast.is_for(&id) {
                        continue;
                    }
                    if outbound.send(Frame::Broadcast(broadcast)).await.is_err() {
                        return;
                    }
                }
                Ok(Fanout::Closing) => {
                    let _ = outbound.send(Frame::Shutdown).await;
                    return;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(connection_id = %id, skipped, "fan-out receiver lagging");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_core::{Broadcast, CorrelationId, ShutdownController};

    fn test_config() -> ServerConfig {
        ServerConfig {
            relay_queue_capacity: 8,
            ..ServerConfig::default()
        }
    }

    /// A framed client view over the other end of a duplex pipe.
    struct TestPeer {
        read: FramedRead<ReadHalf<tokio::io::DuplexStream>, FrameCodec>,
        write: FramedWrite<WriteHalf<tokio::io::DuplexStream>, FrameCodec>,
    }

    impl TestPeer {
        async fn send(&mut self, frame: Frame) {
            self.write.send(frame).await.unwrap();
        }

        async fn recv(&mut self) -> Option<Frame> {
            self.read.next().await.transpose().unwrap()
        }
    }

    struct Fixture {
        peer: TestPeer,
        engine_rx: mpsc::Receiver<EngineRequest>,
        fanout: broadcast::Sender<Fanout>,
        controller: ShutdownController,
        relay: tokio::task::JoinHandle<()>,
    }

    fn spawn_relay(id: &str) -> Fixture {
        let (engine_tx, engine_rx) = mpsc::channel(16);
        let (fanout_tx, fanout_rx) = broadcast::channel(16);
        let controller = ShutdownController::new();
        let (server_end, client_end) = tokio::io::duplex(64 * 1024);

        let handle = ConnectionHandle {
            id: ConnectionId::from(id),
            engine: engine_tx,
            fanout: fanout_rx,
            shutdown: controller.token(),
        };
        let relay = tokio::spawn(run(handle, server_end, test_config()));

        let (read, write) = tokio::io::split(client_end);
        Fixture {
            peer: TestPeer {
                read: FramedRead::new(read, FrameCodec::new()),
                write: FramedWrite::new(write, FrameCodec::new()),
            },
            engine_rx,
            fanout: fanout_tx,
            controller,
            relay,
        }
    }

    #[tokio::test]
    async fn reader_stamps_issuer_and_submits() {
        let mut fixture = spawn_relay("conn-a");
        fixture
            .peer
            .send(Frame::Command {
                correlation: CorrelationId::from(5),
                payload: json!("ping"),
            })
            .await;

        let request = fixture.engine_rx.recv().await.unwrap();
        match request {
            EngineRequest::Submit { command, .. } => {
                assert_eq!(command.correlation, CorrelationId::from(5));
                assert_eq!(command.issuer, ConnectionId::from("conn-a"));
                assert_eq!(command.payload, json!("ping"));
            }
            other => panic!("expected Submit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resolved_slot_comes_back_as_reply_frame() {
        let mut fixture = spawn_relay("conn-a");
        fixture
            .peer
            .send(Frame::Command {
                correlation: CorrelationId::from(1),
                payload: json!("ping"),
            })
            .await;

        let EngineRequest::Submit { reply, .. } = fixture.engine_rx.recv().await.unwrap() else {
            panic!("expected Submit");
        };
        reply
            .send(Reply {
                correlation: CorrelationId::from(1),
                result: Ok(json!("pong")),
            })
            .unwrap();

        let frame = fixture.peer.recv().await.unwrap();
        assert_eq!(
            frame,
            Frame::Reply(Reply {
                correlation: CorrelationId::from(1),
                result: Ok(json!("pong")),
            })
        );
    }

    #[tokio::test]
    async fn untargeted_broadcast_is_forwarded() {
        let mut fixture = spawn_relay("conn-a");
        fixture
            .fanout
            .send(Fanout::Broadcast(Broadcast::to_all(json!("event"))))
            .unwrap();

        let frame = fixture.peer.recv().await.unwrap();
        assert_eq!(frame, Frame::Broadcast(Broadcast::to_all(json!("event"))));
    }

    #[tokio::test]
    async fn foreign_targeted_broadcast_is_dropped() {
        let mut fixture = spawn_relay("conn-a");
        fixture
            .fanout
            .send(Fanout::Broadcast(Broadcast::to_connection(
                ConnectionId::from("conn-b"),
                json!("secret"),
            )))
            .unwrap();
        fixture
            .fanout
            .send(Fanout::Broadcast(Broadcast::to_connection(
                ConnectionId::from("conn-a"),
                json!("mine"),
            )))
            .unwrap();

        // Only the matching broadcast arrives.
        let frame = fixture.peer.recv().await.unwrap();
        assert_eq!(
            frame,
            Frame::Broadcast(Broadcast::to_connection(
                ConnectionId::from("conn-a"),
                json!("mine"),
            ))
        );
    }

    #[tokio::test]
    async fn closing_fanout_sends_shutdown_frame() {
        let mut fixture = spawn_relay("conn-a");
        fixture.fanout.send(Fanout::Closing).unwrap();

        let frame = fixture.peer.recv().await.unwrap();
        assert_eq!(frame, Frame::Shutdown);
    }

    #[tokio::test]
    async fn peer_close_terminates_relay_locally() {
        let fixture = spawn_relay("conn-a");
        // No shutdown, no fan-out traffic: the dead transport alone must
        // unwind all four units.
        drop(fixture.peer);
        fixture.relay.await.unwrap();
    }

    #[tokio::test]
    async fn draining_stops_admissions_and_relay_terminates() {
        let mut fixture = spawn_relay("conn-a");
        let _ = fixture.controller.begin_drain();
        fixture.fanout.send(Fanout::Closing).unwrap();
        fixture.relay.await.unwrap();

        // Commands written after the drain are never submitted; the write
        // itself may already fail against the torn-down transport.
        let _ = fixture
            .peer
            .write
            .send(Frame::Command {
                correlation: CorrelationId::from(9),
                payload: json!("late"),
            })
            .await;
        assert!(fixture.engine_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn draining_relay_still_delivers_shutdown_frame() {
        let mut fixture = spawn_relay("conn-a");
        // Mirrors the real ordering: the closing item is broadcast before
        // the drain flag flips.
        fixture.fanout.send(Fanout::Closing).unwrap();
        let _ = fixture.controller.begin_drain();

        let frame = fixture.peer.recv().await.unwrap();
        assert_eq!(frame, Frame::Shutdown);
        fixture.relay.await.unwrap();
    }

    #[tokio::test]
    async fn engine_dropping_slot_unwinds_without_panic() {
        let mut fixture = spawn_relay("conn-a");
        fixture
            .peer
            .send(Frame::Command {
                correlation: CorrelationId::from(1),
                payload: json!("doomed"),
            })
            .await;

        let EngineRequest::Submit { reply, .. } = fixture.engine_rx.recv().await.unwrap() else {
            panic!("expected Submit");
        };
        drop(reply);

        // The relay survives until its own termination condition fires.
        drop(fixture.peer);
        fixture.relay.await.unwrap();
    }

    #[tokio::test]
    async fn client_shutdown_frame_reaches_engine() {
        let mut fixture = spawn_relay("conn-a");
        fixture.peer.send(Frame::Shutdown).await;

        let request = fixture.engine_rx.recv().await.unwrap();
        assert!(matches!(request, EngineRequest::Shutdown));
    }

    #[tokio::test]
    async fn replies_preserve_submission_order() {
        let mut fixture = spawn_relay("conn-a");
        for i in 0..3u64 {
            fixture
                .peer
                .send(Frame::Command {
                    correlation: CorrelationId::from(i),
                    payload: json!(i),
                })
                .await;
            let EngineRequest::Submit { command, reply } =
                fixture.engine_rx.recv().await.unwrap()
            else {
                panic!("expected Submit");
            };
            reply
                .send(Reply {
                    correlation: command.correlation,
                    result: Ok(command.payload),
                })
                .unwrap();
        }

        for i in 0..3u64 {
            let Some(Frame::Reply(reply)) = fixture.peer.recv().await else {
                panic!("expected reply frame");
            };
            assert_eq!(reply.correlation, CorrelationId::from(i));
        }
    }
}

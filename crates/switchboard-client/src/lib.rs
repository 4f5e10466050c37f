//! # switchboard-client
//!
//! Client library for the switchboard substrate, mirroring the server's
//! relay split on the peer side:
//!
//! - [`Requester`]: the send path: writes commands, awaits each reply
//!   synchronously from the caller's point of view
//! - [`Broadcasts`]: the receive path: a lazy, restartable sequence of
//!   server broadcasts
//! - the **distributor**: a background task, sole reader of the inbound
//!   transport, resolving replies by correlation id and forwarding
//!   broadcasts
//!
//! The two outward halves have independent lifetimes: drop either one and
//! the other keeps working; the distributor winds down once both are gone
//! or the connection fails. For one-shot tooling there is a synchronous
//! [`blocking::Connection`].

#![deny(unsafe_code)]

pub mod blocking;
mod broadcasts;
mod distributor;
mod requester;

use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use switchboard_core::{DEFAULT_SOCKET_PATH, Error, Frame, FrameCodec};

pub use broadcasts::Broadcasts;
pub use requester::Requester;

/// Capacity of the client's internal queues (inbound frames,
/// registrations, buffered broadcasts).
const QUEUE_CAPACITY: usize = 256;

/// Connect to a server over a Unix socket.
///
/// `path` defaults to [`DEFAULT_SOCKET_PATH`]. Must be called from within
/// a tokio runtime; the distributor is spawned onto it.
pub async fn connect(path: Option<&Path>) -> Result<(Requester, Broadcasts), Error> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_SOCKET_PATH));
    let stream = UnixStream::connect(path).await?;
    let (read, write) = stream.into_split();
    Ok(attach(read, write))
}

/// Attach the client to an already-split duplex transport.
///
/// Useful for in-memory transports in tests and for embedders that dial
/// their own connections. Must be called from within a tokio runtime.
pub fn attach<R, W>(read: R, write: W) -> (Requester, Broadcasts)
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let (frame_tx, frame_rx) = mpsc::channel::<Frame>(QUEUE_CAPACITY);
    let (registration_tx, registration_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (broadcast_tx, broadcast_rx) = mpsc::channel(QUEUE_CAPACITY);

    let frames = FramedRead::new(read, FrameCodec::new());
    let _ = tokio::spawn(distributor::pump_inbound(frames, frame_tx));
    let _ = tokio::spawn(distributor::distribute(
        frame_rx,
        registration_rx,
        broadcast_tx,
    ));

    let writer: FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, FrameCodec> =
        FramedWrite::new(Box::new(write), FrameCodec::new());
    (
        Requester::new(writer, registration_tx),
        Broadcasts::new(broadcast_rx),
    )
}

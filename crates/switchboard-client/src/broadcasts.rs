//! The receive path: a lazy, restartable sequence of broadcasts.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use switchboard_core::Broadcast;

/// The receive half of a client connection.
///
/// Nothing is consumed until [`recv`] is polled; while unpolled,
/// broadcasts buffer in the connection's bounded queue, and consumption
/// can stop and resume at any time. Yields `None` once the distributor is
/// gone, because the server closed or both outward halves were dropped.
///
/// [`recv`]: Broadcasts::recv
#[derive(Debug)]
pub struct Broadcasts {
    queue: mpsc::Receiver<Broadcast>,
}

impl Broadcasts {
    pub(crate) fn new(queue: mpsc::Receiver<Broadcast>) -> Self {
        Self { queue }
    }

    /// Wait for the next broadcast.
    pub async fn recv(&mut self) -> Option<Broadcast> {
        self.queue.recv().await
    }

    /// Adapt into a [`futures::Stream`](futures::Stream) of broadcasts.
    #[must_use]
    pub fn into_stream(self) -> ReceiverStream<Broadcast> {
        ReceiverStream::new(self.queue)
    }
}

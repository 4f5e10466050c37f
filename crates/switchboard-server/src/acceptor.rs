//! Connection sources for the manager.
//!
//! Anything that can hand out duplex byte streams can feed the manager;
//! the shipped implementations cover Unix and TCP listeners.

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tracing::debug;

/// A source of accepted duplex connections.
pub trait Acceptor: Send {
    /// The accepted stream type.
    type Transport: AsyncRead + AsyncWrite + Send + 'static;

    /// Wait for the next connection.
    fn accept(&mut self) -> impl Future<Output = io::Result<Self::Transport>> + Send;
}

impl Acceptor for UnixListener {
    type Transport = tokio::net::UnixStream;

    fn accept(&mut self) -> impl Future<Output = io::Result<Self::Transport>> + Send {
        async {
            let (stream, addr) = UnixListener::accept(self).await?;
            debug!(?addr, "accepted unix connection");
            Ok(stream)
        }
    }
}

impl Acceptor for TcpListener {
    type Transport = tokio::net::TcpStream;

    fn accept(&mut self) -> impl Future<Output = io::Result<Self::Transport>> + Send {
        async {
            let (stream, addr) = TcpListener::accept(self).await?;
            debug!(%addr, "accepted tcp connection");
            Ok(stream)
        }
    }
}

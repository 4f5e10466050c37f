//! Error taxonomy for the routing substrate.
//!
//! Four failure classes with distinct recovery policies:
//!
//! - [`Error::Domain`]: a command failed domain validation; resolved as an
//!   error reply, never fatal.
//! - [`Error::Transport`]: the peer disconnected or the byte stream
//!   failed; terminates only the affected relay.
//! - [`Error::ShutdownTimeout`]: the drain grace period expired; surfaced,
//!   never hidden, but the process still terminates.
//! - [`Error::ChannelBroken`]: an internal channel's counterpart vanished;
//!   terminal for the observing task, never silently retried.
//!
//! [`Error::Codec`] covers malformed frames and is treated like a transport
//! failure for the affected connection.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type shared by the server and client crates.
#[derive(Debug, Error)]
pub enum Error {
    /// A command was rejected by the domain handler.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The underlying byte stream failed or the peer disconnected.
    #[error("transport closed: {0}")]
    Transport(#[from] std::io::Error),

    /// Draining relays did not finish within the grace period.
    #[error("shutdown grace period of {0:?} expired")]
    ShutdownTimeout(Duration),

    /// An internal channel's counterpart has vanished.
    #[error("internal channel closed: {0}")]
    ChannelBroken(&'static str),

    /// A frame could not be encoded or decoded.
    #[error("codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Wire-visible rejection of one command by the domain handler.
///
/// Carried inside an error [`Reply`](crate::Reply); the engine keeps
/// processing after producing one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("[{code}] {message}")]
pub struct DomainError {
    /// Machine-readable code (e.g. `UNKNOWN_COMMAND`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl DomainError {
    /// Build a domain error from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

//! Wire frames and the server-side command envelope.
//!
//! Every decoded transport unit classifies as exactly one [`Frame`]
//! variant. The internal [`Command`] envelope is assembled by a relay
//! reader, which stamps the issuing connection id the manager assigned at
//! accept time; clients never choose their own id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DomainError;
use crate::ids::{ConnectionId, CorrelationId};

/// One decoded transport unit, in either direction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Client → server: a state-affecting or query request.
    Command {
        /// Client-minted id echoed in the matching reply.
        correlation: CorrelationId,
        /// Opaque domain payload.
        payload: Value,
    },
    /// Server → client: the unique response to one command.
    Reply(Reply),
    /// Server → client: fan-out message independent of any command.
    Broadcast(Broadcast),
    /// Either direction: request (client →) or announce (→ client) the end
    /// of the session.
    Shutdown,
}

/// The unique, exactly-once response to a [`Command`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Correlation id echoed from the originating command.
    pub correlation: CorrelationId,
    /// Domain result, or the domain error that rejected the command.
    pub result: Result<Value, DomainError>,
}

/// A fan-out message to some or all connections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    /// Delivery scope: `None` reaches every live connection, `Some` only
    /// the matching one (silently dropped elsewhere).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ConnectionId>,
    /// Opaque domain payload.
    pub payload: Value,
}

impl Broadcast {
    /// Broadcast to every live connection.
    #[must_use]
    pub fn to_all(payload: Value) -> Self {
        Self {
            target: None,
            payload,
        }
    }

    /// Broadcast to a single connection.
    #[must_use]
    pub fn to_connection(target: ConnectionId, payload: Value) -> Self {
        Self {
            target: Some(target),
            payload,
        }
    }

    /// Whether this broadcast should be delivered to `connection`.
    #[must_use]
    pub fn is_for(&self, connection: &ConnectionId) -> bool {
        self.target.as_ref().is_none_or(|t| t == connection)
    }
}

/// The command envelope processed by the engine.
///
/// Created by a relay reader per inbound [`Frame::Command`]; consumed
/// exactly once by the engine; resolved through exactly one reply slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    /// Client-minted correlation id.
    pub correlation: CorrelationId,
    /// Issuing connection, assigned by the manager at accept time.
    pub issuer: ConnectionId,
    /// Opaque domain payload.
    pub payload: Value,
}

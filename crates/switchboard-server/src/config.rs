//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard_core::DEFAULT_MAX_FRAME_BYTES;

/// Configuration for the manager and everything it spawns.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Capacity of the global command queue into the engine.
    pub command_queue_capacity: usize,
    /// Capacity of the broadcast fan-out channel.
    pub fanout_capacity: usize,
    /// Capacity of each relay's local queues (outbound frames, reply
    /// slots).
    pub relay_queue_capacity: usize,
    /// Grace period in seconds for draining relays at shutdown.
    pub drain_grace_secs: u64,
    /// Max size of a single wire frame in bytes.
    pub max_frame_bytes: usize,
}

impl ServerConfig {
    /// The drain grace period as a [`Duration`].
    #[must_use]
    pub fn drain_grace(&self) -> Duration {
        Duration::from_secs(self.drain_grace_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command_queue_capacity: 1024,
            fanout_capacity: 1024,
            relay_queue_capacity: 64,
            drain_grace_secs: 5,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

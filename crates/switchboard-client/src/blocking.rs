//! Synchronous facade for one-shot tooling.
//!
//! Owns a current-thread runtime and delegates to the async client. Only
//! suitable for sequential request/reply use: the receive half is dropped
//! at connect time, so broadcasts are discarded. Anything that needs to
//! consume broadcasts concurrently must use the async API.

use std::path::Path;

use serde_json::Value;

use switchboard_core::Error;

use crate::Requester;

/// A blocking client connection.
pub struct Connection {
    runtime: tokio::runtime::Runtime,
    requester: Requester,
}

impl Connection {
    /// Connect over a Unix socket; `path` defaults to
    /// [`DEFAULT_SOCKET_PATH`](switchboard_core::DEFAULT_SOCKET_PATH).
    pub fn connect(path: Option<&Path>) -> Result<Self, Error> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (requester, broadcasts) = runtime.block_on(crate::connect(path))?;
        // No way to consume broadcasts synchronously; dropping the receive
        // half keeps replies flowing while broadcasts are discarded.
        drop(broadcasts);
        Ok(Self { runtime, requester })
    }

    /// Send one command and block until its reply arrives.
    pub fn request(&mut self, payload: Value) -> Result<Value, Error> {
        self.runtime.block_on(self.requester.request(payload))
    }

    /// Ask the server to shut down.
    pub fn request_shutdown(&mut self) -> Result<(), Error> {
        self.runtime.block_on(self.requester.request_shutdown())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

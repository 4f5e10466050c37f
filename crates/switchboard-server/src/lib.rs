//! # switchboard-server
//!
//! The authoritative side of the switchboard substrate:
//!
//! - **Engine**: sole owner of the domain state; consumes the global
//!   command queue in strict FIFO order and resolves every command's reply
//!   slot exactly once
//! - **Manager**: accepts connections, provisions a relay per connection,
//!   and supervises the multi-stage shutdown with a bounded grace period
//! - **Relay**: four cooperating units per connection (reader, writer,
//!   and two forwarder bridges) so a blocked read never stalls a write
//!
//! The domain itself is pluggable: implement [`Handler`] and hand it to
//! [`Manager::new`].

#![deny(unsafe_code)]

pub mod acceptor;
pub mod config;
pub mod engine;
pub mod manager;
mod relay;

pub use acceptor::Acceptor;
pub use config::ServerConfig;
pub use engine::{Handler, Outcome};
pub use manager::{ExitStatus, Manager, ManagerHandle};

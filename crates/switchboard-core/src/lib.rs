//! # switchboard-core
//!
//! Foundation types for the switchboard message-routing substrate.
//!
//! This crate provides the shared vocabulary the server and client crates
//! depend on:
//!
//! - **Ids**: [`ConnectionId`] (minted by the manager at accept time) and
//!   [`CorrelationId`] (minted by the client per in-flight request)
//! - **Wire frames**: the [`Frame`] enum; every decoded transport unit is
//!   exactly one of `Command`, `Reply`, `Broadcast`, `Shutdown`
//! - **Framing**: [`FrameCodec`], length-delimited JSON frames for any
//!   byte-stream transport
//! - **Errors**: the [`Error`] taxonomy via `thiserror`, plus the
//!   wire-visible [`DomainError`]
//! - **Shutdown**: the [`ShutdownToken`] phase state
//!   (`Running → Draining → Terminated`) observed by every task

#![deny(unsafe_code)]

mod codec;
mod errors;
mod ids;
mod shutdown;
mod wire;

pub use codec::{DEFAULT_MAX_FRAME_BYTES, FrameCodec};
pub use errors::{DomainError, Error};
pub use ids::{ConnectionId, CorrelationId};
pub use shutdown::{Phase, ShutdownController, ShutdownToken};
pub use wire::{Broadcast, Command, Frame, Reply};

/// Conventional Unix socket path used when no explicit address is given.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/switchboard.sock";

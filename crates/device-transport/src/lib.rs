//! device-transport: blocking byte-stream transports for remote devices
//!
//! This crate provides the traits and types used to open a raw, bidirectional byte
//! stream to a device, with feature-gated backends. The default build enables the
//! `tcp` backend and an in-process `mock` backend so that device logic can be
//! exercised without a network peer.

mod types;
pub use types::Endpoint;

mod error;
pub use error::{Result, TransportError};

mod env;
pub use env::{AlwaysAvailable, Environment, FlagEnvironment};

mod traits;
pub use traits::{Stream, Transport};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockBehavior, MockStream, MockTransport};

#[cfg(feature = "tcp")]
mod tcp;

#[cfg(feature = "tcp")]
pub use tcp::TcpTransport;

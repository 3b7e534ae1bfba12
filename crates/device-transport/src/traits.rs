use crate::{Endpoint, Result};
use std::io::{Read, Write};
use std::time::Duration;

/// A minimal blocking transport able to open byte streams to an endpoint.
pub trait Transport: Send + Sync {
    type Stream: Stream;

    /// Short backend name used in logs (e.g., "tcp", "mock").
    fn kind(&self) -> &'static str;

    /// Whether the transport medium can be used right now.
    fn available(&self) -> bool;

    /// Hook invoked when a device could not be prepared on this transport.
    fn notify_unavailable(&self, _device: &str) {}

    /// Open a stream, blocking for at most `timeout`.
    fn open(&self, endpoint: &Endpoint, timeout: Duration) -> Result<Self::Stream>;
}

/// One open, bidirectional byte stream.
pub trait Stream: Read + Write + Send + Sized + 'static {
    /// Disable latency buffering so small writes go out immediately.
    fn set_nodelay(&self, nodelay: bool) -> Result<()>;

    /// Independent handle to the same underlying stream.
    fn try_clone(&self) -> Result<Self>;

    /// Shut down both directions; pending and future reads see end of stream.
    fn shutdown(&self) -> Result<()>;
}

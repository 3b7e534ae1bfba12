use crate::ConnectionState;
use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed descriptor: {0}")]
    Format(String),
    #[error("field `{field}` cannot be encoded: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("connection to {device} failed: {reason}")]
    Connection { device: String, reason: String },
    #[error("stream requested before the connection was established")]
    NotConnected,
    #[error("`{operation}` is not valid in state {state}")]
    InvalidState {
        state: ConnectionState,
        operation: &'static str,
    },
    #[error("registry persistence failed: {0}")]
    Persistence(String),
    #[error("registry source is corrupt: {0}")]
    Corrupt(String),
    #[error("cannot reconstruct `{type_name}`: {reason}")]
    Reconstruction { type_name: String, reason: String },
}

impl Error {
    /// Whether the caller may retry the failed operation on the same device.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }
}

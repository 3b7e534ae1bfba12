use thiserror::Error;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport medium unavailable: {0}")]
    Unavailable(String),
    #[error("operation not supported on this backend: {0}")]
    Unsupported(&'static str),
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("timeout")]
    Timeout,
}

impl TransportError {
    /// Classify an I/O error raised while opening or using a stream.
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Self::Timeout,
            std::io::ErrorKind::ConnectionRefused => Self::Refused(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

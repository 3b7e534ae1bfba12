use crate::{Error, Result};
use device_transport::{Endpoint, Stream, Transport};
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Default bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ConnectionState {
    New,
    Prepared,
    Connecting,
    Connected,
    /// Terminal. A closed device is discarded, never reused.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::New => "new",
            ConnectionState::Prepared => "prepared",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConnectOptions {
    pub connect_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Cached reading half of a connected device.
#[derive(Clone)]
pub struct InputStream(Arc<Mutex<Box<dyn Read + Send>>>);

/// Cached writing half of a connected device.
#[derive(Clone)]
pub struct OutputStream(Arc<Mutex<Box<dyn Write + Send>>>);

impl InputStream {
    fn new(reader: impl Read + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(reader))))
    }

    /// True if both values refer to the same underlying handle.
    pub fn same_handle(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl OutputStream {
    fn new(writer: impl Write + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(writer))))
    }

    pub fn same_handle(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "stream handle lock poisoned")
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.lock().map_err(|_| poisoned())?.read(buf)
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().map_err(|_| poisoned())?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().map_err(|_| poisoned())?.flush()
    }
}

struct Inner<S> {
    state: ConnectionState,
    /// Bumped on every connect attempt and on close, so a connect that returns
    /// after a concurrent close can tell its result is stale.
    generation: u64,
    stream: Option<S>,
    input: Option<InputStream>,
    output: Option<OutputStream>,
}

/// Connection state machine for one device over one transport.
///
/// `New -> Prepared -> Connecting -> Connected -> Closed`; a failed connect falls
/// back to `Prepared`, and `close` reaches `Closed` from anywhere. All methods take
/// `&self` so that `close` can run on another thread while `connect` blocks.
pub struct Lifecycle<T: Transport> {
    transport: T,
    endpoint: Endpoint,
    options: ConnectOptions,
    inner: Mutex<Inner<T::Stream>>,
}

impl<T: Transport> Lifecycle<T> {
    pub fn new(transport: T, endpoint: Endpoint, options: ConnectOptions) -> Self {
        Self {
            transport,
            endpoint,
            options,
            inner: Mutex::new(Inner {
                state: ConnectionState::New,
                generation: 0,
                stream: None,
                input: None,
                output: None,
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn options(&self) -> ConnectOptions {
        self.options
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T::Stream>> {
        // A panic while holding the lock leaves the state consistent enough to close
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Check the transport environment. On failure the state is left untouched
    /// and the transport's unavailable hook is invoked.
    pub fn prepare(&self, device: &str) -> bool {
        let mut inner = self.lock();
        let state = inner.state;
        match state {
            ConnectionState::Closed => {
                tracing::warn!(device, "prepare on a closed device");
                false
            }
            ConnectionState::Connecting | ConnectionState::Connected => true,
            ConnectionState::New | ConnectionState::Prepared => {
                if !self.transport.available() {
                    drop(inner);
                    tracing::info!(device, transport = self.transport.kind(), "transport unavailable");
                    self.transport.notify_unavailable(device);
                    return false;
                }
                inner.state = ConnectionState::Prepared;
                tracing::debug!(device, state = %inner.state, "prepared");
                true
            }
        }
    }

    /// Open the transport. Valid only from `Prepared`; blocks for at most the
    /// configured timeout. On failure the device stays `Prepared` for a retry.
    pub fn connect(&self, device: &str) -> Result<()> {
        let generation = {
            let mut inner = self.lock();
            if inner.state != ConnectionState::Prepared {
                return Err(Error::InvalidState {
                    state: inner.state,
                    operation: "connect",
                });
            }
            inner.state = ConnectionState::Connecting;
            inner.generation += 1;
            inner.generation
        };
        tracing::debug!(device, endpoint = %self.endpoint, "connecting");

        let opened = self
            .transport
            .open(&self.endpoint, self.options.connect_timeout);

        let mut inner = self.lock();
        if inner.generation != generation || inner.state != ConnectionState::Connecting {
            // Closed while we were blocked; do not leave an orphaned stream behind
            if let Ok(stream) = opened {
                let _ = stream.shutdown();
            }
            return Err(Error::Connection {
                device: device.to_string(),
                reason: "closed while connecting".into(),
            });
        }

        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                inner.state = ConnectionState::Prepared;
                tracing::warn!(device, endpoint = %self.endpoint, error = %e, "connect failed");
                return Err(Error::Connection {
                    device: device.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            let _ = stream.shutdown();
            inner.state = ConnectionState::Prepared;
            return Err(Error::Connection {
                device: device.to_string(),
                reason: format!("disabling latency buffering: {e}"),
            });
        }
        inner.stream = Some(stream);
        inner.state = ConnectionState::Connected;
        tracing::debug!(device, endpoint = %self.endpoint, "connected");
        Ok(())
    }

    pub fn input_stream(&self) -> Result<InputStream> {
        let mut inner = self.lock();
        if let Some(input) = &inner.input {
            return Ok(input.clone());
        }
        let reader = self.clone_connected(&inner)?;
        let input = InputStream::new(reader);
        inner.input = Some(input.clone());
        Ok(input)
    }

    pub fn output_stream(&self) -> Result<OutputStream> {
        let mut inner = self.lock();
        if let Some(output) = &inner.output {
            return Ok(output.clone());
        }
        let writer = self.clone_connected(&inner)?;
        let output = OutputStream::new(writer);
        inner.output = Some(output.clone());
        Ok(output)
    }

    fn clone_connected(&self, inner: &Inner<T::Stream>) -> Result<T::Stream> {
        match (&inner.state, &inner.stream) {
            (ConnectionState::Connected, Some(stream)) => {
                stream.try_clone().map_err(|e| Error::Connection {
                    device: self.endpoint.to_string(),
                    reason: format!("duplicating stream handle: {e}"),
                })
            }
            _ => Err(Error::NotConnected),
        }
    }

    /// Idempotent teardown. Stream handles are released before the transport
    /// stream is shut down; shutdown errors are logged and swallowed.
    /// Returns true if this call performed the transition to `Closed`.
    pub fn close(&self, device: &str) -> bool {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Closed {
            return false;
        }
        let previous = inner.state;
        inner.generation += 1;
        inner.input = None;
        inner.output = None;
        if let Some(stream) = inner.stream.take() {
            if let Err(e) = stream.shutdown() {
                tracing::debug!(device, error = %e, "ignoring error while shutting down stream");
            }
        }
        inner.state = ConnectionState::Closed;
        tracing::debug!(device, from = %previous, "closed");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_transport::{FlagEnvironment, MockBehavior, MockTransport};
    use std::sync::Arc;

    fn lifecycle(behavior: MockBehavior) -> Lifecycle<MockTransport> {
        Lifecycle::new(
            MockTransport::new(behavior),
            Endpoint::new("mock", 13110),
            ConnectOptions::default(),
        )
    }

    #[test]
    fn happy_path_and_stable_handles() {
        let lc = lifecycle(MockBehavior::Accept);
        assert_eq!(lc.state(), ConnectionState::New);
        assert!(matches!(lc.input_stream(), Err(Error::NotConnected)));
        assert!(lc.prepare("dev"));
        assert_eq!(lc.state(), ConnectionState::Prepared);
        assert!(matches!(lc.output_stream(), Err(Error::NotConnected)));
        lc.connect("dev").unwrap();
        assert_eq!(lc.state(), ConnectionState::Connected);

        let a = lc.input_stream().unwrap();
        let b = lc.input_stream().unwrap();
        assert!(a.same_handle(&b));
        let mut out = lc.output_stream().unwrap();
        assert!(out.same_handle(&lc.output_stream().unwrap()));

        out.write_all(b"OPDI").unwrap();
        let mut buf = [0u8; 4];
        let mut input = a;
        input.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"OPDI");
    }

    #[test]
    fn state_display_names() {
        let names: Vec<String> = [
            ConnectionState::New,
            ConnectionState::Prepared,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Closed,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(
            names,
            vec!["new", "prepared", "connecting", "connected", "closed"]
        );
    }

    #[test]
    fn connect_requires_prepared() {
        let lc = lifecycle(MockBehavior::Accept);
        assert!(matches!(
            lc.connect("dev"),
            Err(Error::InvalidState {
                state: ConnectionState::New,
                operation: "connect"
            })
        ));
    }

    #[test]
    fn failed_connect_stays_prepared_for_retry() {
        let lc = lifecycle(MockBehavior::Refuse);
        assert!(lc.prepare("dev"));
        let err = lc.connect("dev").unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(lc.state(), ConnectionState::Prepared);

        lc.transport().set_behavior(MockBehavior::Timeout);
        assert!(matches!(lc.connect("dev"), Err(Error::Connection { .. })));
        assert_eq!(lc.state(), ConnectionState::Prepared);

        lc.transport().set_behavior(MockBehavior::Accept);
        lc.connect("dev").unwrap();
        assert_eq!(lc.state(), ConnectionState::Connected);
    }

    #[test]
    fn prepare_fails_when_medium_unavailable() {
        let env = Arc::new(FlagEnvironment::new(false));
        let lc = Lifecycle::new(
            MockTransport::with_env(MockBehavior::Accept, env.clone()),
            Endpoint::new("mock", 1),
            ConnectOptions::default(),
        );
        assert!(!lc.prepare("dev"));
        assert_eq!(lc.state(), ConnectionState::New);
        assert!(env.was_notified());
        env.set_available(true);
        assert!(lc.prepare("dev"));
    }

    #[test]
    fn close_is_idempotent_and_terminal() {
        let lc = lifecycle(MockBehavior::Accept);
        assert!(lc.prepare("dev"));
        lc.connect("dev").unwrap();
        let input = lc.input_stream().unwrap();
        assert!(lc.close("dev"));
        assert!(!lc.close("dev"));
        assert_eq!(lc.state(), ConnectionState::Closed);
        assert!(matches!(lc.input_stream(), Err(Error::NotConnected)));
        assert!(!lc.prepare("dev"));
        assert!(matches!(lc.connect("dev"), Err(Error::InvalidState { .. })));

        // Handles still held by callers see end of stream
        let mut input = input;
        let mut buf = [0u8; 1];
        assert_eq!(input.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn close_from_new_is_allowed() {
        let lc = lifecycle(MockBehavior::Accept);
        assert!(lc.close("dev"));
        assert_eq!(lc.state(), ConnectionState::Closed);
    }

    #[test]
    fn close_during_connect_fails_the_connect() {
        let lc = Arc::new(lifecycle(MockBehavior::Delay(Duration::from_millis(200))));
        assert!(lc.prepare("dev"));
        let worker = {
            let lc = Arc::clone(&lc);
            std::thread::spawn(move || lc.connect("dev"))
        };
        // Wait until the worker is blocked inside open()
        while lc.state() != ConnectionState::Connecting {
            std::thread::yield_now();
        }
        assert!(lc.close("dev"));
        let res = worker.join().unwrap();
        assert!(matches!(res, Err(Error::Connection { .. })));
        assert_eq!(lc.state(), ConnectionState::Closed);
    }
}

use crate::{AlwaysAvailable, Endpoint, Environment, Result, Stream, Transport, TransportError};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// How a [`MockTransport`] answers `open`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MockBehavior {
    Accept,
    Refuse,
    Timeout,
    /// Accept after sleeping; behaves like `Timeout` if the delay exceeds the timeout.
    Delay(Duration),
}

/// An in-process transport. Each opened stream is a loopback: bytes written to it
/// can be read back from it, as if the peer echoed everything.
pub struct MockTransport {
    behavior: Mutex<MockBehavior>,
    env: Arc<dyn Environment>,
    opened: AtomicUsize,
}

impl MockTransport {
    pub fn new(behavior: MockBehavior) -> Self {
        Self::with_env(behavior, Arc::new(AlwaysAvailable))
    }

    pub fn with_env(behavior: MockBehavior, env: Arc<dyn Environment>) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            env,
            opened: AtomicUsize::new(0),
        }
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        if let Ok(mut b) = self.behavior.lock() {
            *b = behavior;
        }
    }

    /// Number of streams successfully opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn behavior(&self) -> MockBehavior {
        self.behavior
            .lock()
            .map(|b| *b)
            .unwrap_or(MockBehavior::Refuse)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new(MockBehavior::Accept)
    }
}

impl Transport for MockTransport {
    type Stream = MockStream;

    fn kind(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        self.env.medium_available()
    }

    fn notify_unavailable(&self, device: &str) {
        self.env.notify_unavailable(device);
    }

    fn open(&self, endpoint: &Endpoint, timeout: Duration) -> Result<MockStream> {
        match self.behavior() {
            MockBehavior::Accept => {}
            MockBehavior::Refuse => return Err(TransportError::Refused(endpoint.to_string())),
            MockBehavior::Timeout => return Err(TransportError::Timeout),
            MockBehavior::Delay(d) => {
                std::thread::sleep(d.min(timeout));
                if d > timeout {
                    return Err(TransportError::Timeout);
                }
            }
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockStream::new())
    }
}

#[derive(Default)]
struct Loopback {
    buf: VecDeque<u8>,
    closed: bool,
}

/// Loopback stream handed out by [`MockTransport`].
pub struct MockStream {
    shared: Arc<(Mutex<Loopback>, Condvar)>,
    nodelay: Arc<AtomicBool>,
    read_timeout: Duration,
}

impl MockStream {
    fn new() -> Self {
        Self {
            shared: Arc::new((Mutex::new(Loopback::default()), Condvar::new())),
            nodelay: Arc::new(AtomicBool::new(false)),
            read_timeout: Duration::from_millis(1_000),
        }
    }

    pub fn nodelay(&self) -> bool {
        self.nodelay.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.0.lock().map(|l| l.closed).unwrap_or(true)
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "mock stream lock poisoned")
}

impl Read for MockStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let (lock, cvar) = &*self.shared;
        let guard = lock.lock().map_err(|_| poisoned())?;
        let (mut guard, res) = cvar
            .wait_timeout_while(guard, self.read_timeout, |l| l.buf.is_empty() && !l.closed)
            .map_err(|_| poisoned())?;
        if guard.buf.is_empty() {
            if guard.closed {
                return Ok(0);
            }
            if res.timed_out() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "mock read timed out"));
            }
        }
        let n = out.len().min(guard.buf.len());
        for (slot, byte) in out.iter_mut().zip(guard.buf.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockStream {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let (lock, cvar) = &*self.shared;
        let mut guard = lock.lock().map_err(|_| poisoned())?;
        if guard.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock stream shut down"));
        }
        guard.buf.extend(data);
        cvar.notify_all();
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for MockStream {
    fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.nodelay.store(nodelay, Ordering::SeqCst);
        Ok(())
    }

    fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            shared: Arc::clone(&self.shared),
            nodelay: Arc::clone(&self.nodelay),
            read_timeout: self.read_timeout,
        })
    }

    fn shutdown(&self) -> Result<()> {
        let (lock, cvar) = &*self.shared;
        let mut guard = lock
            .lock()
            .map_err(|_| TransportError::Io("mock stream lock poisoned".into()))?;
        guard.closed = true;
        cvar.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FlagEnvironment;

    fn endpoint() -> Endpoint {
        Endpoint::new("mock", 13110)
    }

    #[test]
    fn loopback_echoes_writes() -> anyhow::Result<()> {
        let transport = MockTransport::default();
        let mut stream = transport.open(&endpoint(), Duration::from_millis(100))?;
        let mut reader = stream.try_clone()?;
        stream.write_all(b"hello")?;
        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf)?;
        assert_eq!(&buf, b"hello");
        assert_eq!(transport.opened(), 1);
        Ok(())
    }

    #[test]
    fn shutdown_ends_reads_and_rejects_writes() -> anyhow::Result<()> {
        let transport = MockTransport::default();
        let mut stream = transport.open(&endpoint(), Duration::from_millis(100))?;
        stream.shutdown()?;
        assert!(stream.is_shut_down());
        let mut buf = [0u8; 1];
        assert_eq!(stream.read(&mut buf)?, 0);
        assert!(stream.write(b"x").is_err());
        Ok(())
    }

    #[test]
    fn scripted_failures() {
        let transport = MockTransport::new(MockBehavior::Refuse);
        assert!(matches!(
            transport.open(&endpoint(), Duration::from_millis(10)),
            Err(TransportError::Refused(_))
        ));
        transport.set_behavior(MockBehavior::Timeout);
        assert!(matches!(
            transport.open(&endpoint(), Duration::from_millis(10)),
            Err(TransportError::Timeout)
        ));
        transport.set_behavior(MockBehavior::Delay(Duration::from_millis(50)));
        assert!(matches!(
            transport.open(&endpoint(), Duration::from_millis(5)),
            Err(TransportError::Timeout)
        ));
        assert_eq!(transport.opened(), 0);
    }

    #[test]
    fn availability_follows_environment() {
        let env = Arc::new(FlagEnvironment::new(false));
        let transport = MockTransport::with_env(MockBehavior::Accept, env.clone());
        assert!(!transport.available());
        transport.notify_unavailable("bench");
        assert!(env.was_notified());
        env.set_available(true);
        assert!(transport.available());
    }
}

use crate::{AlwaysAvailable, Endpoint, Environment, Result, Stream, Transport, TransportError};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// TCP/IP transport over std sockets.
pub struct TcpTransport {
    env: Arc<dyn Environment>,
}

impl TcpTransport {
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self { env }
    }

    fn resolve(endpoint: &Endpoint) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(|e| TransportError::Io(format!("resolving {endpoint}: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::Io(format!(
                "resolving {endpoint}: no addresses"
            )));
        }
        Ok(addrs)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Arc::new(AlwaysAvailable))
    }
}

impl Transport for TcpTransport {
    type Stream = TcpStream;

    fn kind(&self) -> &'static str {
        "tcp"
    }

    fn available(&self) -> bool {
        self.env.medium_available()
    }

    fn notify_unavailable(&self, device: &str) {
        self.env.notify_unavailable(device);
    }

    /// `timeout` bounds the whole call, shared across every resolved address.
    fn open(&self, endpoint: &Endpoint, timeout: Duration) -> Result<TcpStream> {
        let deadline = Instant::now() + timeout;
        let addrs = Self::resolve(endpoint)?;
        let stream = connect_any(endpoint, &addrs, deadline)?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::from_io(&e))?;
        Ok(stream)
    }
}

/// Try each address in turn, giving each attempt only what is left until `deadline`.
fn connect_any(endpoint: &Endpoint, addrs: &[SocketAddr], deadline: Instant) -> Result<TcpStream> {
    let mut last_err = TransportError::Io(format!("no route to {endpoint}"));
    for addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            tracing::debug!(%endpoint, %addr, "connect deadline reached");
            return Err(TransportError::Timeout);
        }
        match TcpStream::connect_timeout(addr, remaining) {
            Ok(stream) => {
                tracing::debug!(%endpoint, %addr, "tcp stream open");
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(%endpoint, %addr, error = %e, "tcp connect attempt failed");
                last_err = TransportError::from_io(&e);
            }
        }
    }
    Err(last_err)
}

impl Stream for TcpStream {
    fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        TcpStream::set_nodelay(self, nodelay).map_err(|e| TransportError::from_io(&e))
    }

    fn try_clone(&self) -> Result<Self> {
        TcpStream::try_clone(self).map_err(|e| TransportError::from_io(&e))
    }

    fn shutdown(&self) -> Result<()> {
        TcpStream::shutdown(self, Shutdown::Both).map_err(|e| TransportError::from_io(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    #[test]
    fn open_sets_nodelay_and_exchanges_bytes() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let server = std::thread::spawn(move || -> std::io::Result<Vec<u8>> {
            let (mut peer, _) = listener.accept()?;
            let mut buf = [0u8; 4];
            peer.read_exact(&mut buf)?;
            peer.write_all(b"pong")?;
            Ok(buf.to_vec())
        });

        let transport = TcpTransport::default();
        let mut stream = transport.open(
            &Endpoint::new("127.0.0.1", port),
            Duration::from_millis(2_000),
        )?;
        assert!(stream.nodelay()?);
        stream.write_all(b"ping")?;
        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply)?;
        assert_eq!(&reply, b"pong");

        let received = server
            .join()
            .map_err(|_| anyhow::anyhow!("server thread panicked"))??;
        assert_eq!(received, b"ping");
        Ok(())
    }

    #[test]
    fn open_refused_port_fails() -> anyhow::Result<()> {
        // Bind then drop to get a port nothing is listening on
        let port = TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
        let transport = TcpTransport::default();
        let res = transport.open(
            &Endpoint::new("127.0.0.1", port),
            Duration::from_millis(2_000),
        );
        assert!(res.is_err());
        Ok(())
    }

    #[test]
    fn later_address_connects_after_earlier_refusal() -> anyhow::Result<()> {
        let dead = TcpListener::bind("127.0.0.1:0")?.local_addr()?;
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let live = listener.local_addr()?;
        let endpoint = Endpoint::new("multi", live.port());
        let deadline = Instant::now() + Duration::from_millis(2_000);
        let stream = connect_any(&endpoint, &[dead, live], deadline)?;
        assert_eq!(stream.peer_addr()?, live);
        Ok(())
    }

    #[test]
    fn spent_deadline_stops_before_remaining_addresses() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let live = listener.local_addr()?;
        let endpoint = Endpoint::new("multi", live.port());
        let res = connect_any(&endpoint, &[live, live, live], Instant::now());
        assert!(matches!(res, Err(TransportError::Timeout)));
        Ok(())
    }

    #[test]
    fn unresolvable_host_is_io_error() {
        let transport = TcpTransport::default();
        let res = transport.open(
            &Endpoint::new("host.invalid", 80),
            Duration::from_millis(500),
        );
        assert!(matches!(res, Err(TransportError::Io(_))));
    }
}

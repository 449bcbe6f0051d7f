//! Raw-socket TCP writes to network peripherals.
//!
//! Network printers, displays and drawer controllers all speak the same
//! "open port 9100, write bytes, close" protocol. One shot per write: POS
//! peripherals drop idle connections aggressively, so a persistent stream
//! buys nothing.

use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{HardwareError, TransportKind};

/// TCP connect timeout for peripherals on the local network.
const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// TCP write timeout.
const TCP_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// A network peripheral endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpTarget {
    pub host: String,
    pub port: u16,
}

impl TcpTarget {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }

    fn resolve(&self) -> Result<SocketAddr, HardwareError> {
        let addr_str = format!("{}:{}", self.host, self.port);
        // Accept hostnames as well as literal IPs.
        addr_str
            .to_socket_addrs()
            .map_err(|e| {
                HardwareError::Io(TransportKind::Network, format!("resolve {addr_str}: {e}"))
            })?
            .next()
            .ok_or_else(|| {
                HardwareError::Io(TransportKind::Network, format!("no address for {addr_str}"))
            })
    }

    /// Connect, write all bytes, flush, close.
    pub fn send(&self, data: &[u8]) -> Result<(), HardwareError> {
        let addr = self.resolve()?;

        let stream = TcpStream::connect_timeout(&addr, TCP_CONNECT_TIMEOUT).map_err(|e| {
            HardwareError::Io(TransportKind::Network, format!("connect {addr}: {e}"))
        })?;
        stream
            .set_write_timeout(Some(TCP_WRITE_TIMEOUT))
            .map_err(|e| {
                HardwareError::Io(TransportKind::Network, format!("set_write_timeout: {e}"))
            })?;

        let mut writer = std::io::BufWriter::new(stream);
        writer
            .write_all(data)
            .map_err(|e| HardwareError::Io(TransportKind::Network, format!("write {addr}: {e}")))?;
        writer
            .flush()
            .map_err(|e| HardwareError::Io(TransportKind::Network, format!("flush {addr}: {e}")))?;

        debug!(addr = %addr, bytes = data.len(), "TCP peripheral write");
        Ok(())
    }

    /// Probe reachability without writing anything.
    pub fn probe(&self) -> bool {
        match self.resolve() {
            Ok(addr) => TcpStream::connect_timeout(&addr, TCP_CONNECT_TIMEOUT).is_ok(),
            Err(_) => false,
        }
    }
}

impl std::fmt::Display for TcpTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    /// Spin up a TCP listener on an ephemeral port and return (listener, port).
    fn tcp_test_server() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral TCP port for test");
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn test_send_delivers_exact_bytes() {
        let (listener, port) = tcp_test_server();

        let handle = std::thread::spawn(move || {
            let (mut stream, _addr) = listener.accept().expect("accept");
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).expect("read");
            buf
        });

        let target = TcpTarget::new("127.0.0.1", port);
        target.send(&[0x1B, 0x40, b'H', b'I']).expect("send");

        let received = handle.join().expect("server thread");
        assert_eq!(received, vec![0x1B, 0x40, b'H', b'I']);
    }

    #[test]
    fn test_send_to_closed_port_fails() {
        let (listener, port) = tcp_test_server();
        drop(listener); // Refuse future connects

        let target = TcpTarget::new("127.0.0.1", port);
        let err = target.send(b"x").unwrap_err();
        assert!(matches!(err, HardwareError::Io(TransportKind::Network, _)));
    }

    #[test]
    fn test_send_invalid_host_fails() {
        let target = TcpTarget::new("this-host-does-not-exist.invalid", 9100);
        assert!(target.send(b"x").is_err());
    }

    #[test]
    fn test_probe() {
        let (listener, port) = tcp_test_server();
        let target = TcpTarget::new("127.0.0.1", port);
        assert!(target.probe());
        drop(listener);

        let (listener2, port2) = tcp_test_server();
        drop(listener2);
        assert!(!TcpTarget::new("127.0.0.1", port2).probe());
    }

    #[test]
    fn test_display_format() {
        assert_eq!(TcpTarget::new("192.168.1.50", 9100).to_string(), "192.168.1.50:9100");
    }
}

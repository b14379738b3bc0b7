use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::BusStream;

/// RS485-to-Ethernet gateway transport.
///
/// Gateways of this kind forward the serial line verbatim over a TCP
/// connection, so the stream carries the same bytes as a local adapter.
pub struct TcpGateway;

impl TcpGateway {
    /// Default connect timeout.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Connect to a gateway (blocking).
    pub fn connect(addr: &str) -> Result<BusStream> {
        Self::connect_timeout(addr, Self::DEFAULT_CONNECT_TIMEOUT)
    }

    /// Connect to a gateway with an explicit connect timeout.
    pub fn connect_timeout(addr: &str, timeout: Duration) -> Result<BusStream> {
        let resolved = addr
            .to_socket_addrs()
            .map_err(|source| TransportError::Connect {
                addr: addr.to_string(),
                source,
            })?
            .next()
            .ok_or_else(|| TransportError::InvalidAddress(addr.to_string()))?;

        let stream =
            TcpStream::connect_timeout(&resolved, timeout).map_err(|source| {
                TransportError::Connect {
                    addr: addr.to_string(),
                    source,
                }
            })?;
        // Packets are small and latency-sensitive.
        if let Err(err) = stream.set_nodelay(true) {
            debug!(%err, "failed to disable nagle");
        }

        info!(%resolved, "connected to tcp gateway");
        Ok(BusStream::from_tcp(stream))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use super::*;
    use crate::traits::PacketSink;

    #[test]
    fn connect_and_exchange_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&[0xB0, 0x41, 0x00, 0x71]).unwrap();
            buf
        });

        let mut bus = TcpGateway::connect(&addr).unwrap();
        assert_eq!(bus.transport_name(), "tcp");
        bus.write_packet(&[0xAA, 0x01, 0x02, 0x55]).unwrap();

        let mut reply = [0u8; 4];
        bus.read_exact(&mut reply).unwrap();
        assert_eq!(reply, [0xB0, 0x41, 0x00, 0x71]);
        assert_eq!(server.join().unwrap(), [0xAA, 0x01, 0x02, 0x55]);
    }

    #[test]
    fn connect_refused_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = TcpGateway::connect_timeout(&addr, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[test]
    fn cloned_stream_shares_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 2];
            stream.read_exact(&mut buf).unwrap();
            buf
        });

        let bus = TcpGateway::connect(&addr).unwrap();
        let mut writer = bus.try_clone().unwrap();
        writer.write_packet(&[0x01, 0x02]).unwrap();
        assert_eq!(server.join().unwrap(), [0x01, 0x02]);
    }
}

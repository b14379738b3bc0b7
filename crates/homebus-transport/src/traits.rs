use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::{Result, TransportError};

/// Transmission side of a bus: something that accepts complete packets.
///
/// No response is expected synchronously; acknowledgements arrive later on
/// the receive path.
pub trait PacketSink {
    /// Write one complete packet to the line.
    fn write_packet(&mut self, packet: &[u8]) -> Result<()>;
}

impl<S: PacketSink + ?Sized> PacketSink for Box<S> {
    fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        (**self).write_packet(packet)
    }
}

/// A connected bus stream. Implements Read + Write.
///
/// This is the fundamental I/O type returned by transport operations. It
/// wraps either a serial device or a TCP connection to a gateway.
pub struct BusStream {
    inner: BusStreamInner,
}

enum BusStreamInner {
    Serial(Box<dyn serialport::SerialPort>),
    Tcp(TcpStream),
}

impl Read for BusStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            BusStreamInner::Serial(port) => port.read(buf),
            BusStreamInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for BusStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            BusStreamInner::Serial(port) => port.write(buf),
            BusStreamInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            BusStreamInner::Serial(port) => port.flush(),
            BusStreamInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl PacketSink for BusStream {
    fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        write_whole(self, packet)
    }
}

/// Write and flush `packet`; a peer that stops accepting bytes is a shutdown.
fn write_whole(writer: &mut impl Write, packet: &[u8]) -> Result<()> {
    writer
        .write_all(packet)
        .and_then(|()| writer.flush())
        .map_err(|err| match err.kind() {
            ErrorKind::WriteZero => TransportError::Shutdown,
            _ => TransportError::Io(err),
        })
}

impl BusStream {
    pub(crate) fn from_serial(port: Box<dyn serialport::SerialPort>) -> Self {
        Self {
            inner: BusStreamInner::Serial(port),
        }
    }

    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: BusStreamInner::Tcp(stream),
        }
    }

    /// Set read timeout on the underlying stream.
    ///
    /// Serial devices have no "block forever" mode, so `None` maps to a long
    /// poll interval there.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            BusStreamInner::Serial(port) => port
                .set_timeout(timeout.unwrap_or(Duration::from_secs(3600)))
                .map_err(Into::into),
            BusStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream so reads and writes can live on different threads.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            BusStreamInner::Serial(port) => Ok(Self::from_serial(port.try_clone()?)),
            BusStreamInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            BusStreamInner::Serial(_) => "serial",
            BusStreamInner::Tcp(_) => "tcp",
        }
    }
}

impl std::fmt::Debug for BusStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            BusStreamInner::Serial(port) => f
                .debug_struct("BusStream")
                .field("type", &"serial")
                .field("name", &port.name())
                .finish(),
            BusStreamInner::Tcp(stream) => f
                .debug_struct("BusStream")
                .field("type", &"tcp")
                .field("peer", &stream.peer_addr().ok())
                .finish(),
        }
    }
}

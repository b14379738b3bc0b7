use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::time::Duration;

use homebus_transport::{BusStream, TransportError};

use crate::config::PacketDefaults;
use crate::error::{FrameError, Result};
use crate::framer::{LengthEvaluator, PacketFramer};
use crate::packet::RawPacket;

const READ_CHUNK_SIZE: usize = 1024;

/// Reads complete packets from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete packets.
pub struct PacketReader<T> {
    inner: T,
    framer: PacketFramer,
    pending: VecDeque<RawPacket>,
}

impl<T: Read> PacketReader<T> {
    /// Create a reader framing the receive side of `defaults`.
    pub fn new(inner: T, defaults: &PacketDefaults) -> Result<Self> {
        Ok(Self::with_framer(inner, PacketFramer::new(defaults)?))
    }

    /// Create a reader around an already-configured framer.
    pub fn with_framer(inner: T, framer: PacketFramer) -> Self {
        Self {
            inner,
            framer,
            pending: VecDeque::new(),
        }
    }

    /// Attach a length evaluator to the underlying framer.
    pub fn with_length_evaluator(
        mut self,
        evaluator: impl LengthEvaluator + 'static,
    ) -> Result<Self> {
        self.framer = self.framer.with_length_evaluator(evaluator)?;
        Ok(self)
    }

    /// Read the next complete packet (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached. A
    /// read timeout on the stream surfaces as `FrameError::Io` with
    /// `ErrorKind::TimedOut` or `WouldBlock`; buffered bytes are kept and the
    /// call can simply be retried.
    pub fn read_packet(&mut self) -> Result<RawPacket> {
        loop {
            if let Some(packet) = self.pending.pop_front() {
                return Ok(packet);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.pending.extend(self.framer.feed(&chunk[..read]));
        }
    }

    /// Borrow the framer, e.g. to inspect its statistics.
    pub fn framer(&self) -> &PacketFramer {
        &self.framer
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl PacketReader<BusStream> {
    /// Create a packet reader for a bus stream and apply a read timeout.
    pub fn with_timeout_bus(
        mut inner: BusStream,
        defaults: &PacketDefaults,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        inner
            .set_read_timeout(timeout)
            .map_err(transport_to_frame_error)?;
        Self::new(inner, defaults)
    }
}

pub(crate) fn transport_to_frame_error(err: TransportError) -> FrameError {
    match err {
        TransportError::Io(io) | TransportError::Connect { source: io, .. } => FrameError::Io(io),
        TransportError::Shutdown => FrameError::ConnectionClosed,
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

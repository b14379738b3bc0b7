use std::fmt;
use std::ops::Deref;

use bytes::Bytes;

/// A complete packet carved out of the byte stream.
///
/// Immutable once framed; cloning shares the underlying storage.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RawPacket(Bytes);

impl RawPacket {
    /// Wrap already-framed bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// The packet bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the packet and return its storage.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Deref for RawPacket {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for RawPacket {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for RawPacket {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for RawPacket {
    fn from(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }
}

/// Uppercase hex with a space between bytes, the way bus captures are
/// usually written down.
impl fmt::Display for RawPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for RawPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawPacket[{self}]")
    }
}

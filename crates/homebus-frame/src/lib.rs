//! Packet framing for RS485 home-automation buses.
//!
//! Devices on these buses talk in short packets with no length prefix:
//! - An optional header that marks a packet start
//! - A body of device-specific bytes
//! - An optional 1- or 2-byte checksum
//! - An optional footer
//!
//! [`PacketFramer`] turns an unstructured byte stream into those packets.
//! Receive and transmit layouts come from [`PacketDefaults`].

#[cfg(feature = "async")]
pub mod async_codec;
pub mod checksum;
pub mod codec;
pub mod config;
pub mod error;
pub mod framer;
pub mod packet;
pub mod pattern;
pub mod reader;

#[cfg(feature = "async")]
pub use async_codec::PacketCodec;
pub use checksum::Integrity;
pub use codec::{encode_command, encode_command_into, payload, verify_packet};
pub use config::{
    Checksum2Kind, ChecksumKind, PacketDefaults, PacketOverride, DEFAULT_BUFFER_CAPACITY,
};
pub use error::{FrameError, Result};
pub use framer::{FramerState, FramerStats, LengthEvaluator, PacketFramer};
pub use packet::RawPacket;
pub use pattern::{matches, ByteSchema, Mask};
pub use reader::PacketReader;

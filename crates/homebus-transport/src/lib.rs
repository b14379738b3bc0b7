//! Byte-channel transports for RS485 home-automation buses.
//!
//! A bus is reached either through a local serial adapter or through an
//! RS485-to-Ethernet gateway that exposes the line as a raw TCP stream.
//! Both are surfaced as a [`BusStream`]; everything above this crate only
//! sees bytes going in and out.

pub mod address;
pub mod error;
pub mod serial;
pub mod tcp;
pub mod traits;

pub use address::BusAddress;
pub use error::{Result, TransportError};
pub use serial::{Parity, SerialPortDevice, SerialSettings};
pub use tcp::TcpGateway;
pub use traits::{BusStream, PacketSink};

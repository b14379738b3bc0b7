//! RS485 home-automation bus toolkit.
//!
//! homebus turns the raw byte stream of a wallpad bus into packets, reads
//! device values out of them and sends commands back with retry and
//! acknowledgement tracking.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial adapters and RS485-to-Ethernet gateways
//! - [`frame`]: packet framing, checksums and byte-pattern matching
//! - [`codec`]: schema-driven value decoding (behind `codec` feature)
//! - [`dispatch`]: command queueing, acknowledgements and retry (behind
//!   `dispatch` feature)

/// Re-export transport types.
pub mod transport {
    pub use homebus_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use homebus_frame::*;
}

/// Re-export value codec types (requires `codec` feature).
#[cfg(feature = "codec")]
pub mod codec {
    pub use homebus_codec::*;
}

/// Re-export dispatch types (requires `dispatch` feature).
#[cfg(feature = "dispatch")]
pub mod dispatch {
    pub use homebus_dispatch::*;
}

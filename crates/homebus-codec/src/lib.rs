//! Schema-driven device values.
//!
//! A [`NumericSchema`] locates a value window inside a packet and says how
//! to read it: plain integers of either byte order, BCD, ASCII text, or the
//! half-degree temperature byte several thermostat dialects use.

pub mod error;
pub mod numeric;
pub mod schema;
pub mod value;

pub use error::{CodecError, Result};
pub use numeric::{decode, decode_at, encode, encode_into};
pub use schema::{DecodeMode, Endian, NumericSchema};
pub use value::Value;

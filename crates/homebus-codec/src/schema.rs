use std::collections::BTreeMap;
use std::fmt;

use homebus_frame::ByteSchema;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Byte order of a multi-byte value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// How the bytes of a value window are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeMode {
    /// Plain integer, optionally two's-complement signed.
    #[default]
    None,
    /// Two decimal digits per byte.
    Bcd,
    /// Characters up to a NUL terminator.
    Ascii,
    /// One byte carrying whole degrees plus a half-degree flag in bit 7.
    SignedByteHalfDegree,
}

impl DecodeMode {
    /// Configuration identifier of this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            DecodeMode::None => "none",
            DecodeMode::Bcd => "bcd",
            DecodeMode::Ascii => "ascii",
            DecodeMode::SignedByteHalfDegree => "signed_byte_half_degree",
        }
    }
}

impl fmt::Display for DecodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location and interpretation of a value inside a packet.
///
/// Placement comes from the embedded [`ByteSchema`]; only its `offset` is
/// used by the codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericSchema {
    #[serde(flatten)]
    pub pattern: ByteSchema,
    /// Width of the value window in bytes.
    pub length: usize,
    /// Number of implied decimal places.
    pub precision: u32,
    pub signed: bool,
    pub endian: Endian,
    pub decode: DecodeMode,
    /// Numeric value to label substitution.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_mapping"
    )]
    pub mapping: Option<BTreeMap<i64, String>>,
    /// Extra scale applied when encoding commands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiply_factor: Option<f64>,
}

impl Default for NumericSchema {
    fn default() -> Self {
        Self {
            pattern: ByteSchema::default(),
            length: 1,
            precision: 0,
            signed: false,
            endian: Endian::Big,
            decode: DecodeMode::None,
            mapping: None,
            multiply_factor: None,
        }
    }
}

impl NumericSchema {
    /// A value of `length` bytes at a fixed offset.
    pub fn at(offset: usize, length: usize) -> Self {
        Self {
            pattern: ByteSchema {
                offset: Some(offset),
                ..ByteSchema::default()
            },
            length,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Offset of the value window, preferring the schema's own offset.
    pub fn effective_offset(&self, base_offset: usize) -> usize {
        self.pattern.offset.unwrap_or(base_offset)
    }

    pub(crate) fn label_for(&self, key: i64) -> Option<&str> {
        self.mapping.as_ref()?.get(&key).map(String::as_str)
    }

    pub(crate) fn key_for(&self, label: &str) -> Option<i64> {
        self.mapping
            .as_ref()?
            .iter()
            .find_map(|(key, value)| (value == label).then_some(*key))
    }
}

/// JSON object keys are strings; parse them as integers here since the
/// flattened pattern fields stop serde_json from doing it itself.
fn deserialize_mapping<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<BTreeMap<i64, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<BTreeMap<String, String>>::deserialize(deserializer)? else {
        return Ok(None);
    };
    raw.into_iter()
        .map(|(key, label)| {
            key.trim()
                .parse::<i64>()
                .map(|key| (key, label))
                .map_err(|_| de::Error::custom(format!("mapping key '{key}' is not an integer")))
        })
        .collect::<std::result::Result<_, _>>()
        .map(Some)
}

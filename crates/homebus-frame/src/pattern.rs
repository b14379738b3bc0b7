//! Masked byte-pattern matching.
//!
//! The same comparison serves packet-to-state matching, acknowledgement
//! correlation and footer detection in the framer.

use serde::{Deserialize, Serialize};

/// Bit mask applied before comparing bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Mask {
    /// One mask for every position.
    All(u8),
    /// Per-position masks; positions past the end use `0xFF`.
    PerByte(Vec<u8>),
}

impl Mask {
    /// Mask for position `index`.
    pub fn at(&self, index: usize) -> u8 {
        match self {
            Mask::All(mask) => *mask,
            Mask::PerByte(masks) => masks.get(index).copied().unwrap_or(0xFF),
        }
    }
}

/// A literal byte pattern with optional masking, placement and inversion.
///
/// A schema without `data` places no constraint and always matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ByteSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<Mask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub inverted: bool,
}

impl ByteSchema {
    /// A schema matching `data` exactly.
    pub fn literal(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::default()
        }
    }

    /// Pin the schema to an absolute offset.
    pub fn at_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Apply a mask to every compared byte.
    pub fn with_mask(mut self, mask: Mask) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Succeed exactly when the underlying comparison fails.
    pub fn inverted(mut self) -> Self {
        self.inverted = true;
        self
    }

    /// True when the schema places no constraint.
    pub fn is_vacuous(&self) -> bool {
        self.data.is_none()
    }

    /// See [`matches`].
    pub fn matches(&self, buf: &[u8], base_offset: usize) -> bool {
        matches(self, buf, base_offset)
    }
}

/// Compare `schema` against `buf`.
///
/// The schema's own offset wins over `base_offset`, which lets callers skip a
/// fixed header transparently. Reading past the end of `buf` is a non-match.
/// The final result is flipped when the schema is inverted.
pub fn matches(schema: &ByteSchema, buf: &[u8], base_offset: usize) -> bool {
    let Some(data) = schema.data.as_deref() else {
        return true;
    };
    let offset = schema.offset.unwrap_or(base_offset);
    let window = offset
        .checked_add(data.len())
        .and_then(|end| buf.get(offset..end));

    let hit = match window {
        Some(window) => window
            .iter()
            .zip(data)
            .enumerate()
            .all(|(i, (&actual, &expected))| {
                let mask = schema.mask.as_ref().map_or(0xFF, |mask| mask.at(i));
                actual & mask == expected & mask
            }),
        None => false,
    };

    hit != schema.inverted
}

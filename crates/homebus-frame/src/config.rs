use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::checksum::Integrity;
use crate::error::{FrameError, Result};

/// Default ceiling for the framer's accumulation buffer: 16 KiB.
pub const DEFAULT_BUFFER_CAPACITY: usize = 16 * 1024;

/// 1-byte checksum algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumKind {
    #[default]
    None,
    Add,
    Xor,
    AddNoHeader,
    XorNoHeader,
    SamsungRx,
    SamsungTx,
}

impl ChecksumKind {
    /// Configuration identifier of this algorithm.
    pub fn as_str(self) -> &'static str {
        match self {
            ChecksumKind::None => "none",
            ChecksumKind::Add => "add",
            ChecksumKind::Xor => "xor",
            ChecksumKind::AddNoHeader => "add_no_header",
            ChecksumKind::XorNoHeader => "xor_no_header",
            ChecksumKind::SamsungRx => "samsung_rx",
            ChecksumKind::SamsungTx => "samsung_tx",
        }
    }
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumKind {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(ChecksumKind::None),
            "add" => Ok(ChecksumKind::Add),
            "xor" => Ok(ChecksumKind::Xor),
            "add_no_header" => Ok(ChecksumKind::AddNoHeader),
            "xor_no_header" => Ok(ChecksumKind::XorNoHeader),
            "samsung_rx" => Ok(ChecksumKind::SamsungRx),
            "samsung_tx" => Ok(ChecksumKind::SamsungTx),
            other => Err(FrameError::InvalidConfig(format!(
                "unknown checksum '{other}'"
            ))),
        }
    }
}

/// 2-byte checksum algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checksum2Kind {
    XorAdd,
}

impl Checksum2Kind {
    /// Configuration identifier of this algorithm.
    pub fn as_str(self) -> &'static str {
        match self {
            Checksum2Kind::XorAdd => "xor_add",
        }
    }
}

impl fmt::Display for Checksum2Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Checksum2Kind {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "xor_add" => Ok(Checksum2Kind::XorAdd),
            other => Err(FrameError::InvalidConfig(format!(
                "unknown 2-byte checksum '{other}'"
            ))),
        }
    }
}

/// Per-channel packet layout and transmission policy.
///
/// Durations are stored in milliseconds so the persisted form stays
/// bit-exact with existing channel configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacketDefaults {
    pub rx_header: Vec<u8>,
    pub rx_footer: Vec<u8>,
    pub tx_header: Vec<u8>,
    pub tx_footer: Vec<u8>,
    pub rx_checksum: ChecksumKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_checksum2: Option<Checksum2Kind>,
    pub tx_checksum: ChecksumKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_checksum2: Option<Checksum2Kind>,
    /// Fixed number of bytes following the header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_length: Option<usize>,
    /// Source of the length-determining expression; evaluated externally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_length_expr: Option<String>,
    /// Upper bound on bytes following the header before the header is
    /// considered a false sync.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_max_length: Option<usize>,
    pub rx_buffer_capacity: usize,
    pub tx_delay: u64,
    pub tx_retry_cnt: u32,
    pub tx_timeout: u64,
    pub tx_retry_interval: u64,
}

impl Default for PacketDefaults {
    fn default() -> Self {
        Self {
            rx_header: Vec::new(),
            rx_footer: Vec::new(),
            tx_header: Vec::new(),
            tx_footer: Vec::new(),
            rx_checksum: ChecksumKind::None,
            rx_checksum2: None,
            tx_checksum: ChecksumKind::None,
            tx_checksum2: None,
            rx_length: None,
            rx_length_expr: None,
            rx_max_length: None,
            rx_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            tx_delay: 50,
            tx_retry_cnt: 3,
            tx_timeout: 100,
            tx_retry_interval: 20,
        }
    }
}

impl PacketDefaults {
    /// Parse and validate channel defaults from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let defaults: Self = serde_json::from_str(json)?;
        defaults.validate()?;
        Ok(defaults)
    }

    /// Load and validate channel defaults from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            FrameError::InvalidConfig(format!("failed reading {}: {err}", path.display()))
        })?;
        Self::from_json_str(&content)
    }

    /// Reject contradictory or unusable framing configuration.
    pub fn validate(&self) -> Result<()> {
        if self.rx_checksum != ChecksumKind::None && self.rx_checksum2.is_some() {
            return Err(FrameError::InvalidConfig(
                "rx_checksum and rx_checksum2 are mutually exclusive".to_string(),
            ));
        }
        if self.tx_checksum != ChecksumKind::None && self.tx_checksum2.is_some() {
            return Err(FrameError::InvalidConfig(
                "tx_checksum and tx_checksum2 are mutually exclusive".to_string(),
            ));
        }
        if self.rx_length.is_some() && self.rx_length_expr.is_some() {
            return Err(FrameError::InvalidConfig(
                "rx_length and rx_length_expr are mutually exclusive".to_string(),
            ));
        }
        if self.rx_length == Some(0) {
            return Err(FrameError::InvalidConfig(
                "rx_length must be greater than zero".to_string(),
            ));
        }
        if self.rx_buffer_capacity == 0 {
            return Err(FrameError::InvalidConfig(
                "rx_buffer_capacity must be greater than zero".to_string(),
            ));
        }
        if self.rx_length.is_none()
            && self.rx_length_expr.is_none()
            && self.rx_footer.is_empty()
            && self.rx_integrity() == Integrity::None
        {
            return Err(FrameError::InvalidConfig(
                "no framing strategy: set rx_length, rx_length_expr, rx_footer or an rx checksum"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Integrity check applied to received packets.
    pub fn rx_integrity(&self) -> Integrity {
        Integrity::select(self.rx_checksum, self.rx_checksum2)
    }

    /// Integrity code appended to transmitted packets.
    pub fn tx_integrity(&self) -> Integrity {
        Integrity::select(self.tx_checksum, self.tx_checksum2)
    }

    pub fn tx_delay(&self) -> Duration {
        Duration::from_millis(self.tx_delay)
    }

    pub fn tx_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_timeout)
    }

    pub fn tx_retry_interval(&self) -> Duration {
        Duration::from_millis(self.tx_retry_interval)
    }

    /// Apply a per-entity override on top of these defaults.
    ///
    /// Only fields the override sets replace the channel values. The result
    /// is validated again since an override can introduce a contradiction.
    pub fn merge(&self, over: &PacketOverride) -> Result<Self> {
        let mut merged = self.clone();
        macro_rules! take {
            ($($field:ident),*) => {
                $(if let Some(value) = &over.$field {
                    merged.$field = value.clone();
                })*
            };
        }
        take!(
            rx_header,
            rx_footer,
            tx_header,
            tx_footer,
            rx_checksum,
            tx_checksum,
            rx_buffer_capacity,
            tx_delay,
            tx_retry_cnt,
            tx_timeout,
            tx_retry_interval
        );
        if over.rx_checksum2.is_some() {
            merged.rx_checksum2 = over.rx_checksum2;
        }
        if over.tx_checksum2.is_some() {
            merged.tx_checksum2 = over.tx_checksum2;
        }
        if over.rx_length.is_some() {
            merged.rx_length = over.rx_length;
            merged.rx_length_expr = None;
        }
        if over.rx_length_expr.is_some() {
            merged.rx_length_expr = over.rx_length_expr.clone();
            merged.rx_length = None;
        }
        if over.rx_max_length.is_some() {
            merged.rx_max_length = over.rx_max_length;
        }
        merged.validate()?;
        Ok(merged)
    }
}

/// Sparse per-entity override of [`PacketDefaults`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacketOverride {
    pub rx_header: Option<Vec<u8>>,
    pub rx_footer: Option<Vec<u8>>,
    pub tx_header: Option<Vec<u8>>,
    pub tx_footer: Option<Vec<u8>>,
    pub rx_checksum: Option<ChecksumKind>,
    pub rx_checksum2: Option<Checksum2Kind>,
    pub tx_checksum: Option<ChecksumKind>,
    pub tx_checksum2: Option<Checksum2Kind>,
    pub rx_length: Option<usize>,
    pub rx_length_expr: Option<String>,
    pub rx_max_length: Option<usize>,
    pub rx_buffer_capacity: Option<usize>,
    pub tx_delay: Option<u64>,
    pub tx_retry_cnt: Option<u32>,
    pub tx_timeout: Option<u64>,
    pub tx_retry_interval: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep_defaults() -> PacketDefaults {
        PacketDefaults {
            rx_header: vec![0xAA],
            rx_footer: vec![0x55],
            rx_checksum: ChecksumKind::Add,
            ..PacketDefaults::default()
        }
    }

    #[test]
    fn parses_channel_json() {
        let defaults = PacketDefaults::from_json_str(
            r#"{
                "rx_header": [247],
                "rx_checksum": "xor_add",
                "tx_checksum2": "xor_add",
                "tx_delay": 80
            }"#,
        );
        // `xor_add` is a 2-byte algorithm, not a valid rx_checksum.
        assert!(matches!(defaults, Err(FrameError::Json(_))));

        let defaults = PacketDefaults::from_json_str(
            r#"{
                "rx_header": [247],
                "rx_checksum2": "xor_add",
                "tx_header": [247],
                "tx_checksum2": "xor_add",
                "tx_delay": 80,
                "tx_retry_cnt": 5
            }"#,
        )
        .unwrap();
        assert_eq!(defaults.rx_header, vec![0xF7]);
        assert_eq!(defaults.rx_checksum2, Some(Checksum2Kind::XorAdd));
        assert_eq!(defaults.tx_delay(), Duration::from_millis(80));
        assert_eq!(defaults.tx_retry_cnt, 5);
        assert_eq!(defaults.rx_buffer_capacity, DEFAULT_BUFFER_CAPACITY);
    }

    #[test]
    fn rejects_unknown_identifiers_and_fields() {
        assert!(PacketDefaults::from_json_str(r#"{"rx_checksum": "crc16"}"#).is_err());
        assert!(PacketDefaults::from_json_str(r#"{"rx_footer": [13], "bogus": 1}"#).is_err());
    }

    #[test]
    fn rejects_both_checksum_widths() {
        let defaults = PacketDefaults {
            rx_checksum2: Some(Checksum2Kind::XorAdd),
            ..sweep_defaults()
        };
        assert!(matches!(
            defaults.validate(),
            Err(FrameError::InvalidConfig(_))
        ));

        let defaults = PacketDefaults {
            tx_checksum: ChecksumKind::Xor,
            tx_checksum2: Some(Checksum2Kind::XorAdd),
            ..sweep_defaults()
        };
        assert!(defaults.validate().is_err());
    }

    #[test]
    fn rejects_fixed_length_with_expression() {
        let defaults = PacketDefaults {
            rx_length: Some(8),
            rx_length_expr: Some("data[2] + 4".to_string()),
            ..sweep_defaults()
        };
        assert!(defaults.validate().is_err());
    }

    #[test]
    fn rejects_missing_framing_strategy() {
        let defaults = PacketDefaults {
            rx_header: vec![0xAA],
            ..PacketDefaults::default()
        };
        assert!(defaults.validate().is_err());
        assert!(sweep_defaults().validate().is_ok());
    }

    #[test]
    fn override_replaces_only_set_fields() {
        let base = sweep_defaults();
        let over = PacketOverride {
            rx_length: Some(6),
            tx_retry_cnt: Some(0),
            ..PacketOverride::default()
        };
        let merged = base.merge(&over).unwrap();
        assert_eq!(merged.rx_header, vec![0xAA]);
        assert_eq!(merged.rx_length, Some(6));
        assert_eq!(merged.tx_retry_cnt, 0);
        assert_eq!(merged.tx_delay, base.tx_delay);
    }

    #[test]
    fn override_can_introduce_contradiction() {
        let over = PacketOverride {
            rx_checksum2: Some(Checksum2Kind::XorAdd),
            ..PacketOverride::default()
        };
        assert!(sweep_defaults().merge(&over).is_err());
    }

    #[test]
    fn checksum_identifiers_round_trip() {
        for kind in [
            ChecksumKind::None,
            ChecksumKind::Add,
            ChecksumKind::Xor,
            ChecksumKind::AddNoHeader,
            ChecksumKind::XorNoHeader,
            ChecksumKind::SamsungRx,
            ChecksumKind::SamsungTx,
        ] {
            assert_eq!(kind.as_str().parse::<ChecksumKind>().unwrap(), kind);
        }
        assert_eq!(
            "xor_add".parse::<Checksum2Kind>().unwrap(),
            Checksum2Kind::XorAdd
        );
        assert!("crc8".parse::<ChecksumKind>().is_err());
    }
}

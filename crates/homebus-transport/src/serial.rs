use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TransportError};
use crate::traits::BusStream;

/// Parity bit setting of a serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// Line settings for an RS485 serial adapter.
///
/// Most wallpad buses run at 9600 baud 8N1; a few vendors use even parity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    /// Read poll interval in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            read_timeout_ms: 100,
        }
    }
}

/// Serial device transport.
pub struct SerialPortDevice;

impl SerialPortDevice {
    /// Open a serial device with the given line settings (blocking).
    pub fn open(path: impl AsRef<Path>, settings: &SerialSettings) -> Result<BusStream> {
        let path = path.as_ref();
        let data_bits = match settings.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(TransportError::InvalidAddress(format!(
                    "unsupported data bits: {other}"
                )))
            }
        };
        let stop_bits = match settings.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => {
                return Err(TransportError::InvalidAddress(format!(
                    "unsupported stop bits: {other}"
                )))
            }
        };
        let parity = match settings.parity {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
        };

        let port = serialport::new(path.to_string_lossy(), settings.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(settings.read_timeout_ms.max(1)))
            .open()
            .map_err(|source| TransportError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        info!(?path, baud = settings.baud_rate, "opened serial device");
        Ok(BusStream::from_serial(port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_9600_8n1() {
        let settings = SerialSettings::default();
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.data_bits, 8);
        assert_eq!(settings.parity, Parity::None);
        assert_eq!(settings.stop_bits, 1);
    }

    #[test]
    fn settings_deserialize_with_partial_fields() {
        let settings: SerialSettings =
            serde_json::from_str(r#"{"baud_rate": 19200, "parity": "even"}"#).unwrap();
        assert_eq!(settings.baud_rate, 19200);
        assert_eq!(settings.parity, Parity::Even);
        assert_eq!(settings.data_bits, 8);
    }

    #[test]
    fn rejects_unsupported_data_bits() {
        let settings = SerialSettings {
            data_bits: 9,
            ..SerialSettings::default()
        };
        let err = SerialPortDevice::open("/dev/null-homebus", &settings).unwrap_err();
        assert!(matches!(err, TransportError::InvalidAddress(_)));
    }

    #[test]
    fn open_missing_device_fails() {
        let err =
            SerialPortDevice::open("/dev/homebus-does-not-exist", &SerialSettings::default())
                .unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }
}

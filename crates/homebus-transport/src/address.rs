use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, TransportError};
use crate::serial::{SerialPortDevice, SerialSettings};
use crate::tcp::TcpGateway;
use crate::traits::BusStream;

/// Where a bus is reachable.
///
/// Parsed from `tcp://host:port` for gateways or a device path such as
/// `/dev/ttyUSB0` for local adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusAddress {
    Serial(PathBuf),
    Tcp(String),
}

impl BusAddress {
    /// Open the bus this address points at.
    pub fn open(&self, serial: &SerialSettings) -> Result<BusStream> {
        match self {
            BusAddress::Serial(path) => SerialPortDevice::open(path, serial),
            BusAddress::Tcp(addr) => TcpGateway::connect(addr),
        }
    }
}

impl FromStr for BusAddress {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(addr) = s.strip_prefix("tcp://") {
            if addr.is_empty() || !addr.contains(':') {
                return Err(TransportError::InvalidAddress(format!(
                    "tcp address needs host:port: {s}"
                )));
            }
            return Ok(BusAddress::Tcp(addr.to_string()));
        }
        if s.is_empty() {
            return Err(TransportError::InvalidAddress("empty address".to_string()));
        }
        Ok(BusAddress::Serial(PathBuf::from(s)))
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusAddress::Serial(path) => write!(f, "{}", path.display()),
            BusAddress::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_and_serial() {
        assert_eq!(
            "tcp://192.168.0.10:8899".parse::<BusAddress>().unwrap(),
            BusAddress::Tcp("192.168.0.10:8899".to_string())
        );
        assert_eq!(
            "/dev/ttyUSB0".parse::<BusAddress>().unwrap(),
            BusAddress::Serial(PathBuf::from("/dev/ttyUSB0"))
        );
    }

    #[test]
    fn rejects_incomplete_tcp_address() {
        assert!("tcp://".parse::<BusAddress>().is_err());
        assert!("tcp://gateway".parse::<BusAddress>().is_err());
        assert!("  ".parse::<BusAddress>().is_err());
    }

    #[test]
    fn display_round_trips() {
        let addr: BusAddress = "tcp://10.0.0.2:502".parse().unwrap();
        assert_eq!(addr.to_string(), "tcp://10.0.0.2:502");
    }
}

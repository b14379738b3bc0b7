use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use homebus_frame::PacketDefaults;
use homebus_transport::SerialSettings;

use crate::exit::{frame_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod checksum;
pub mod decode;
pub mod send;
pub mod sniff;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print packets framed from a bus.
    Sniff(SniffArgs),
    /// Transmit a command with retry.
    Send(SendArgs),
    /// Compute a packet checksum.
    Checksum(ChecksumArgs),
    /// Decode a device value from packet bytes.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Sniff(args) => sniff::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Checksum(args) => checksum::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Options shared by commands that talk to a bus.
#[derive(Args, Debug)]
pub struct BusArgs {
    /// Channel configuration (JSON packet defaults).
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,
    /// Serial baud rate; ignored for tcp:// gateways.
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,
}

impl BusArgs {
    pub fn load_defaults(&self) -> CliResult<PacketDefaults> {
        load_defaults(&self.config)
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            baud_rate: self.baud,
            ..SerialSettings::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct SniffArgs {
    /// Serial device path or tcp://host:port.
    pub source: String,
    #[command(flatten)]
    pub bus: BusArgs,
    /// Exit after printing N packets.
    #[arg(long)]
    pub count: Option<usize>,
    /// Only print packets whose checksum verifies.
    #[arg(long)]
    pub valid_only: bool,
    /// Frame on a worker thread instead of the reading thread.
    #[arg(long)]
    pub background: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Serial device path or tcp://host:port.
    pub target: String,
    #[command(flatten)]
    pub bus: BusArgs,
    /// Command body in hex; header, checksum and footer are added.
    #[arg(long)]
    pub hex: String,
    /// Wait for a received packet starting with these bytes (after the
    /// receive header) before the command counts as delivered.
    #[arg(long, value_name = "PATTERN")]
    pub ack_hex: Option<String>,
    /// Queue at low priority.
    #[arg(long)]
    pub low: bool,
    /// Per-attempt acknowledgement timeout (e.g. 500ms, 2s).
    #[arg(long)]
    pub timeout: Option<String>,
    /// Retry budget (`tx_retry_cnt`); an unacknowledged send goes out this many times plus two.
    #[arg(long)]
    pub retries: Option<u32>,
}

#[derive(Args, Debug)]
pub struct ChecksumArgs {
    /// Algorithm: add, add_no_header, xor, xor_no_header, samsung_rx,
    /// samsung_tx or xor_add.
    #[arg(long)]
    pub kind: String,
    /// Packet header in hex.
    #[arg(long, default_value = "")]
    pub header: String,
    /// Packet body in hex.
    #[arg(long)]
    pub hex: String,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Numeric schema as inline JSON or @path to a JSON file.
    #[arg(long)]
    pub schema: String,
    /// Packet bytes in hex.
    #[arg(long)]
    pub hex: String,
    /// Offset used when the schema has none of its own.
    #[arg(long, default_value_t = 0)]
    pub base_offset: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn load_defaults(path: &Path) -> CliResult<PacketDefaults> {
    PacketDefaults::from_json_file(path)
        .map_err(|err| frame_error(&format!("bad config {}", path.display()), err))
}

/// Parse hex bytes, tolerating whitespace and `:` separators.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);
    hex::decode(digits).map_err(|err| CliError::new(USAGE, format!("invalid hex '{input}': {err}")))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use homebus_codec::Value;
use homebus_dispatch::Settlement;
use homebus_frame::RawPacket;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    source: &'a str,
    length: usize,
    packet: String,
    checksum_ok: bool,
    timestamp: String,
}

pub fn print_packet(packet: &RawPacket, source: &str, checksum_ok: bool, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                source,
                length: packet.len(),
                packet: packet.to_string(),
                checksum_ok,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            print_table(
                vec!["SOURCE", "LEN", "CHECKSUM", "PACKET"],
                vec![
                    source.to_string(),
                    packet.len().to_string(),
                    checksum_label(checksum_ok).to_string(),
                    packet.to_string(),
                ],
            );
        }
        OutputFormat::Pretty => {
            println!(
                "source={source} len={} checksum={} packet={packet}",
                packet.len(),
                checksum_label(checksum_ok)
            );
        }
        OutputFormat::Raw => print_raw(packet.as_bytes()),
    }
}

#[derive(Serialize)]
struct SettlementOutput<'a> {
    target: &'a str,
    packet: String,
    #[serde(flatten)]
    settlement: Settlement,
}

pub fn print_settlement(
    target: &str,
    packet: &[u8],
    settlement: Settlement,
    format: OutputFormat,
) {
    let packet_hex = spaced_hex(packet);
    match format {
        OutputFormat::Json => print_json(&SettlementOutput {
            target,
            packet: packet_hex,
            settlement,
        }),
        OutputFormat::Table => {
            let (status, attempts) = settlement_parts(settlement);
            print_table(
                vec!["TARGET", "PACKET", "STATUS", "ATTEMPTS"],
                vec![target.to_string(), packet_hex, status.to_string(), attempts],
            );
        }
        OutputFormat::Pretty => {
            let (status, attempts) = settlement_parts(settlement);
            println!("target={target} packet={packet_hex} status={status} attempts={attempts}");
        }
        OutputFormat::Raw => print_raw(packet),
    }
}

#[derive(Serialize)]
struct ChecksumOutput<'a> {
    kind: &'a str,
    checksum: String,
}

pub fn print_checksum(kind: &str, code: &[u8], format: OutputFormat) {
    let checksum = hex::encode_upper(code);
    match format {
        OutputFormat::Json => print_json(&ChecksumOutput { kind, checksum }),
        OutputFormat::Table => {
            print_table(vec!["KIND", "CHECKSUM"], vec![kind.to_string(), checksum]);
        }
        OutputFormat::Pretty => println!("{checksum}"),
        OutputFormat::Raw => print_raw(code),
    }
}

#[derive(Serialize)]
struct ValueOutput<'a> {
    value: Option<&'a Value>,
}

pub fn print_value(value: Option<&Value>, format: OutputFormat) {
    let shown = value.map_or_else(|| "-".to_string(), Value::to_string);
    match format {
        OutputFormat::Json => print_json(&ValueOutput { value }),
        OutputFormat::Table => print_table(vec!["VALUE"], vec![shown]),
        OutputFormat::Pretty | OutputFormat::Raw => println!("{shown}"),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn print_table(header: Vec<&str>, row: Vec<String>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header)
        .add_row(row);
    println!("{table}");
}

fn settlement_parts(settlement: Settlement) -> (&'static str, String) {
    match settlement {
        Settlement::Sent => ("sent", "1".to_string()),
        Settlement::Acknowledged { attempts } => ("acknowledged", attempts.to_string()),
        Settlement::Exhausted { attempts } => ("exhausted", attempts.to_string()),
        Settlement::Abandoned => ("abandoned", "0".to_string()),
    }
}

fn checksum_label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "bad"
    }
}

fn spaced_hex(bytes: &[u8]) -> String {
    RawPacket::from(bytes.to_vec()).to_string()
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settlement_json_is_flat() {
        let out = SettlementOutput {
            target: "tcp://gw:8899",
            packet: spaced_hex(&[0xF7, 0x01]),
            settlement: Settlement::Acknowledged { attempts: 2 },
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["packet"], "F7 01");
        assert_eq!(json["status"], "acknowledged");
        assert_eq!(json["attempts"], 2);
    }

    #[test]
    fn missing_value_serializes_as_null() {
        let json = serde_json::to_string(&ValueOutput { value: None }).unwrap();
        assert_eq!(json, r#"{"value":null}"#);
        let value = Value::Decimal(21.5);
        let json = serde_json::to_string(&ValueOutput { value: Some(&value) }).unwrap();
        assert_eq!(json, r#"{"value":21.5}"#);
    }
}

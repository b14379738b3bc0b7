//! Replay example: frames a recorded bus capture and reads a thermostat
//! temperature out of every matching packet.
//!
//! Run with:
//!   cargo run --example replay-capture --features codec

use homebus::codec::{decode_at, NumericSchema};
use homebus::frame::{
    encode_command, verify_packet, ByteSchema, ChecksumKind, PacketDefaults, PacketFramer,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let defaults = PacketDefaults {
        rx_header: vec![0xF7],
        rx_footer: vec![0xEE],
        rx_checksum: ChecksumKind::Xor,
        tx_header: vec![0xF7],
        tx_footer: vec![0xEE],
        tx_checksum: ChecksumKind::Xor,
        ..PacketDefaults::default()
    };

    // Two thermostat reports and a light state, with line noise in between.
    let mut capture = vec![0x00, 0x3F];
    capture.extend_from_slice(&encode_command(&defaults, &[0x36, 0x11, 0x81, 0x17]));
    capture.extend_from_slice(&encode_command(&defaults, &[0x0E, 0x1F, 0x81, 0x01]));
    capture.push(0xEE);
    capture.extend_from_slice(&encode_command(&defaults, &[0x36, 0x11, 0x81, 0x18]));

    let thermostat = ByteSchema::literal([0x36, 0x11]);
    let temperature = NumericSchema {
        length: 1,
        ..NumericSchema::default()
    };

    let mut framer = PacketFramer::new(&defaults)?;
    // Serial reads rarely line up with packet boundaries.
    for chunk in capture.chunks(3) {
        for packet in framer.feed(chunk) {
            if !verify_packet(&defaults, &packet) {
                eprintln!("[replay] bad packet {packet}");
                continue;
            }
            if !thermostat.matches(&packet, defaults.rx_header.len()) {
                eprintln!("[replay] skipped {packet}");
                continue;
            }
            // The reading sits after the header and the 3-byte device address.
            match decode_at(&temperature, &packet, defaults.rx_header.len() + 3) {
                Some(value) => eprintln!("[replay] {packet} -> {value}"),
                None => eprintln!("[replay] {packet} too short"),
            }
        }
    }

    let stats = framer.stats();
    eprintln!(
        "[replay] packets={} discarded={} resyncs={}",
        stats.packets, stats.discarded_bytes, stats.resyncs
    );
    Ok(())
}

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::PacketDefaults;

/// Build an outgoing packet around a command body.
///
/// Wire format:
/// ```text
/// ┌─────────────┬──────────────┬────────────────┬─────────────┐
/// │ tx_header   │ body         │ checksum       │ tx_footer   │
/// │ (0..n B)    │ (encoded)    │ (0, 1 or 2 B)  │ (0..n B)    │
/// └─────────────┴──────────────┴────────────────┴─────────────┘
/// ```
pub fn encode_command(defaults: &PacketDefaults, body: &[u8]) -> Bytes {
    let mut dst = BytesMut::new();
    encode_command_into(defaults, body, &mut dst);
    dst.freeze()
}

/// Append an outgoing packet to `dst`.
pub fn encode_command_into(defaults: &PacketDefaults, body: &[u8], dst: &mut BytesMut) {
    let integrity = defaults.tx_integrity();
    dst.reserve(
        defaults.tx_header.len() + body.len() + integrity.width() + defaults.tx_footer.len(),
    );
    dst.put_slice(&defaults.tx_header);
    dst.put_slice(body);
    integrity.append(&defaults.tx_header, body, dst);
    dst.put_slice(&defaults.tx_footer);
}

/// Validate header, footer and checksum of a received packet.
///
/// Fixed-length and expression-length framing hand packets over without a
/// checksum check; this is where the decode stage catches corrupt ones.
pub fn verify_packet(defaults: &PacketDefaults, packet: &[u8]) -> bool {
    let header_len = defaults.rx_header.len();
    let footer_len = defaults.rx_footer.len();
    let integrity = defaults.rx_integrity();
    if packet.len() < header_len + integrity.width() + footer_len {
        return false;
    }
    if !packet.starts_with(&defaults.rx_header) || !packet.ends_with(&defaults.rx_footer) {
        return false;
    }
    let body_end = packet.len() - footer_len - integrity.width();
    integrity.verify_range(packet, header_len, body_end)
}

/// The body of a received packet: everything between the header and the
/// checksum/footer trailer.
pub fn payload<'a>(defaults: &PacketDefaults, packet: &'a [u8]) -> Option<&'a [u8]> {
    let start = defaults.rx_header.len();
    let trailer = defaults.rx_integrity().width() + defaults.rx_footer.len();
    let end = packet.len().checked_sub(trailer)?;
    packet.get(start..end)
}

//! Packet integrity codes.
//!
//! All algorithms are pure functions over a header slice and a body slice.
//! The `_range` variants read both directly out of a larger buffer, which is
//! what the framer uses while sweeping candidate packet ends.

use bytes::{BufMut, BytesMut};

use crate::config::{Checksum2Kind, ChecksumKind};

/// Seed of the `samsung_rx` algorithm.
const SAMSUNG_RX_SEED: u8 = 0xB0;
/// Seed of the `samsung_tx` algorithm.
const SAMSUNG_TX_SEED: u8 = 0x00;
/// Body bytes below this value flip bit 7 of the samsung checksums.
const SAMSUNG_FLIP_BELOW: u8 = 0x7C;

/// Compute a 1-byte checksum.
///
/// `ChecksumKind::None` has no code; callers must not ask for one.
pub fn compute(kind: ChecksumKind, header: &[u8], body: &[u8]) -> u8 {
    debug_assert!(
        kind != ChecksumKind::None,
        "checksum requested for the `none` algorithm"
    );
    match kind {
        ChecksumKind::None => 0,
        ChecksumKind::Add => sum(header).wrapping_add(sum(body)),
        ChecksumKind::AddNoHeader => sum(body),
        ChecksumKind::Xor => xor(header) ^ xor(body),
        ChecksumKind::XorNoHeader => xor(body),
        ChecksumKind::SamsungRx => samsung(SAMSUNG_RX_SEED, body),
        ChecksumKind::SamsungTx => samsung(SAMSUNG_TX_SEED, body),
    }
}

/// Compute a 2-byte checksum.
pub fn compute2(kind: Checksum2Kind, header: &[u8], body: &[u8]) -> [u8; 2] {
    match kind {
        Checksum2Kind::XorAdd => {
            let mut acc_sum = 0u8;
            let mut acc_xor = 0u8;
            for &byte in header.iter().chain(body) {
                acc_sum = acc_sum.wrapping_add(byte);
                acc_xor ^= byte;
            }
            acc_sum = acc_sum.wrapping_add(acc_xor);
            [acc_xor, acc_sum]
        }
    }
}

/// Compute a 1-byte checksum over `buf[..header_len]` and
/// `buf[header_len..body_end]`.
pub fn compute_range(kind: ChecksumKind, buf: &[u8], header_len: usize, body_end: usize) -> u8 {
    compute(kind, &buf[..header_len], &buf[header_len..body_end])
}

/// Compute a 2-byte checksum over `buf[..header_len]` and
/// `buf[header_len..body_end]`.
pub fn compute2_range(
    kind: Checksum2Kind,
    buf: &[u8],
    header_len: usize,
    body_end: usize,
) -> [u8; 2] {
    compute2(kind, &buf[..header_len], &buf[header_len..body_end])
}

fn sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

fn xor(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

fn samsung(seed: u8, body: &[u8]) -> u8 {
    let mut crc = body.iter().fold(seed, |acc, &b| acc ^ b);
    if body.first().is_some_and(|&first| first < SAMSUNG_FLIP_BELOW) {
        crc ^= 0x80;
    }
    crc
}

/// The integrity check selected for one direction of a channel.
///
/// 1-byte and 2-byte algorithms are mutually exclusive, so a direction
/// carries at most one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrity {
    None,
    Single(ChecksumKind),
    Double(Checksum2Kind),
}

impl Integrity {
    /// Pick the active check from the two configuration selectors.
    pub fn select(single: ChecksumKind, double: Option<Checksum2Kind>) -> Self {
        match (single, double) {
            (_, Some(kind)) => Integrity::Double(kind),
            (ChecksumKind::None, None) => Integrity::None,
            (kind, None) => Integrity::Single(kind),
        }
    }

    /// Number of code bytes appended to a packet.
    pub fn width(self) -> usize {
        match self {
            Integrity::None => 0,
            Integrity::Single(_) => 1,
            Integrity::Double(_) => 2,
        }
    }

    /// Check `code` against the header and body.
    pub fn verify(self, header: &[u8], body: &[u8], code: &[u8]) -> bool {
        match self {
            Integrity::None => code.is_empty(),
            Integrity::Single(kind) => code == [compute(kind, header, body)],
            Integrity::Double(kind) => code == compute2(kind, header, body),
        }
    }

    /// Check the code stored right after `buf[header_len..body_end]`.
    ///
    /// Returns false when the buffer is too short to hold the code.
    pub fn verify_range(self, buf: &[u8], header_len: usize, body_end: usize) -> bool {
        let code_end = body_end + self.width();
        if header_len > body_end || code_end > buf.len() {
            return false;
        }
        match self {
            Integrity::None => true,
            Integrity::Single(kind) => {
                buf[body_end] == compute_range(kind, buf, header_len, body_end)
            }
            Integrity::Double(kind) => {
                buf[body_end..code_end] == compute2_range(kind, buf, header_len, body_end)
            }
        }
    }

    /// Append the code for `header` and `body` to `dst`.
    pub fn append(self, header: &[u8], body: &[u8], dst: &mut BytesMut) {
        match self {
            Integrity::None => {}
            Integrity::Single(kind) => dst.put_u8(compute(kind, header, body)),
            Integrity::Double(kind) => dst.put_slice(&compute2(kind, header, body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &[u8] = &[0xAA, 0x10];
    const BODY: &[u8] = &[0x01, 0x7F, 0x80, 0xFE, 0x33];

    #[test]
    fn add_sums_header_and_body() {
        let cs = compute(ChecksumKind::Add, &[0xAA], &[0x01, 0x55, 0x02]);
        assert_eq!(cs, 0x02); // 0xAA + 0x01 + 0x55 + 0x02 = 0x102

        // Subtracting the code from the running sum always lands on zero.
        let cs = compute(ChecksumKind::Add, HEADER, BODY);
        let total = HEADER
            .iter()
            .chain(BODY)
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        assert_eq!(total.wrapping_sub(cs), 0);
    }

    #[test]
    fn no_header_variants_ignore_header() {
        assert_eq!(
            compute(ChecksumKind::AddNoHeader, HEADER, BODY),
            compute(ChecksumKind::Add, &[], BODY)
        );
        assert_eq!(
            compute(ChecksumKind::XorNoHeader, HEADER, BODY),
            compute(ChecksumKind::Xor, &[], BODY)
        );
        assert_ne!(
            compute(ChecksumKind::Add, HEADER, BODY),
            compute(ChecksumKind::AddNoHeader, HEADER, BODY)
        );
    }

    #[test]
    fn xor_is_self_cancelling() {
        let cs = compute(ChecksumKind::Xor, HEADER, BODY);
        let folded = HEADER
            .iter()
            .chain(BODY)
            .chain(std::iter::once(&cs))
            .fold(0u8, |acc, &b| acc ^ b);
        assert_eq!(folded, 0);
    }

    #[test]
    fn samsung_rx_flips_for_small_first_byte() {
        assert_eq!(compute(ChecksumKind::SamsungRx, &[0xB0], &[0x41, 0x00]), 0x71);
        // First body byte at or above 0x7C: no flip.
        assert_eq!(compute(ChecksumKind::SamsungRx, &[0xB0], &[0x7C]), 0xB0 ^ 0x7C);
        assert_eq!(compute(ChecksumKind::SamsungRx, &[0xB0], &[]), 0xB0);
    }

    #[test]
    fn samsung_tx_uses_zero_seed() {
        assert_eq!(compute(ChecksumKind::SamsungTx, &[0xB0], &[0x41, 0x00]), 0x41 ^ 0x80);
        assert_eq!(compute(ChecksumKind::SamsungTx, &[0xB0], &[0x90, 0x01]), 0x91);
    }

    #[test]
    fn xor_add_emits_xor_then_sum() {
        // sum = 0xF7 + 0x01 + 0x02 = 0xFA, xor = 0xF4, sum + xor = 0x1EE
        assert_eq!(
            compute2(Checksum2Kind::XorAdd, &[0xF7], &[0x01, 0x02]),
            [0xF4, 0xEE]
        );
    }

    #[test]
    fn range_variants_match_slice_variants() {
        let mut buf = HEADER.to_vec();
        buf.extend_from_slice(BODY);
        buf.extend_from_slice(&[0xDE, 0xAD]);
        let body_end = HEADER.len() + BODY.len();

        for kind in [
            ChecksumKind::Add,
            ChecksumKind::Xor,
            ChecksumKind::AddNoHeader,
            ChecksumKind::XorNoHeader,
            ChecksumKind::SamsungRx,
            ChecksumKind::SamsungTx,
        ] {
            assert_eq!(
                compute_range(kind, &buf, HEADER.len(), body_end),
                compute(kind, HEADER, BODY)
            );
        }
        assert_eq!(
            compute2_range(Checksum2Kind::XorAdd, &buf, HEADER.len(), body_end),
            compute2(Checksum2Kind::XorAdd, HEADER, BODY)
        );
    }

    #[test]
    fn integrity_selection_and_width() {
        assert_eq!(Integrity::select(ChecksumKind::None, None), Integrity::None);
        assert_eq!(
            Integrity::select(ChecksumKind::Xor, None),
            Integrity::Single(ChecksumKind::Xor)
        );
        assert_eq!(
            Integrity::select(ChecksumKind::None, Some(Checksum2Kind::XorAdd)).width(),
            2
        );
    }

    #[test]
    fn verify_range_checks_stored_code() {
        let integrity = Integrity::Double(Checksum2Kind::XorAdd);
        let mut packet = BytesMut::from(&[0xF7, 0x01, 0x02][..]);
        integrity.append(&[0xF7], &[0x01, 0x02], &mut packet);
        assert!(integrity.verify_range(&packet, 1, 3));

        packet[4] ^= 0x01;
        assert!(!integrity.verify_range(&packet, 1, 3));
        // Too short to hold the code.
        assert!(!integrity.verify_range(&packet[..4], 1, 3));
    }
}

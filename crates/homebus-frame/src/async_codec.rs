//! `tokio_util::codec` adapter around [`PacketFramer`].

use std::collections::VecDeque;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::encode_command_into;
use crate::config::PacketDefaults;
use crate::error::{FrameError, Result};
use crate::framer::{LengthEvaluator, PacketFramer};
use crate::packet::RawPacket;

/// Framed-stream codec for one bus channel.
///
/// Decoding moves every received byte into the framer, which owns its own
/// bounded buffer, so `src` is always left empty. Encoding wraps command
/// bodies with the transmit header, checksum and footer.
#[derive(Debug)]
pub struct PacketCodec {
    defaults: PacketDefaults,
    framer: PacketFramer,
    pending: VecDeque<RawPacket>,
}

impl PacketCodec {
    pub fn new(defaults: PacketDefaults) -> Result<Self> {
        let framer = PacketFramer::new(&defaults)?;
        Ok(Self {
            defaults,
            framer,
            pending: VecDeque::new(),
        })
    }

    pub fn with_length_evaluator(
        mut self,
        evaluator: impl LengthEvaluator + 'static,
    ) -> Result<Self> {
        self.framer = self.framer.with_length_evaluator(evaluator)?;
        Ok(self)
    }

    pub fn defaults(&self) -> &PacketDefaults {
        &self.defaults
    }

    pub fn framer(&self) -> &PacketFramer {
        &self.framer
    }
}

impl Decoder for PacketCodec {
    type Item = RawPacket;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawPacket>> {
        if self.pending.is_empty() && !src.is_empty() {
            let chunk = src.split();
            self.pending.extend(self.framer.feed(&chunk));
        }
        Ok(self.pending.pop_front())
    }
}

impl Encoder<&[u8]> for PacketCodec {
    type Error = FrameError;

    fn encode(&mut self, body: &[u8], dst: &mut BytesMut) -> Result<()> {
        encode_command_into(&self.defaults, body, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::config::ChecksumKind;

    fn defaults() -> PacketDefaults {
        PacketDefaults {
            rx_header: vec![0xB0],
            rx_checksum: ChecksumKind::SamsungRx,
            tx_header: vec![0xB0],
            tx_checksum: ChecksumKind::SamsungRx,
            ..PacketDefaults::default()
        }
    }

    #[tokio::test]
    async fn framed_read_yields_packets_in_order() {
        let wire: &[u8] = &[0x00, 0xB0, 0x41, 0x00, 0x71, 0xB0, 0x41, 0x00, 0x71, 0xB0];
        let mut framed = FramedRead::new(wire, PacketCodec::new(defaults()).unwrap());

        let first = framed.next().await.unwrap().unwrap();
        let second = framed.next().await.unwrap().unwrap();
        assert_eq!(first.as_bytes(), &[0xB0, 0x41, 0x00, 0x71]);
        assert_eq!(second, first);
        assert!(framed.next().await.is_none());
        assert_eq!(framed.decoder().framer().buffered(), &[0xB0]);
    }

    #[tokio::test]
    async fn framed_write_encodes_commands() {
        let mut framed = FramedWrite::new(Vec::new(), PacketCodec::new(defaults()).unwrap());
        framed.send(&[0x41, 0x00][..]).await.unwrap();
        assert_eq!(framed.get_ref().as_slice(), &[0xB0, 0x41, 0x00, 0x71]);
    }
}

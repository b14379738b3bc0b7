//! Streaming packet framer.
//!
//! Consumes arbitrary chunks from a bus and carves out complete packets using
//! one of three strategies, chosen by the channel configuration:
//!
//! 1. Fixed length: header plus `rx_length` bytes.
//! 2. Length expression: an external evaluator derives the total length from
//!    the buffered bytes; when it cannot, the checksum sweep takes over.
//! 3. Checksum sweep: every candidate end position is tested until one where
//!    the footer and the checksum both validate.
//!
//! The accumulation buffer has a hard ceiling. Bytes that never become part
//! of a packet are dropped from the front once the ceiling is exceeded.

use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use crate::checksum::Integrity;
use crate::config::PacketDefaults;
use crate::error::{FrameError, Result};
use crate::packet::RawPacket;
use crate::pattern::{matches, ByteSchema};

/// Derives a total packet length from the bytes buffered so far.
///
/// Returning `None` or zero means the length is not known yet and the
/// checksum sweep should be used for the current buffer state.
pub trait LengthEvaluator: Send {
    fn evaluate(&self, buffered: &[u8]) -> Option<u32>;
}

impl<F> LengthEvaluator for F
where
    F: Fn(&[u8]) -> Option<u32> + Send,
{
    fn evaluate(&self, buffered: &[u8]) -> Option<u32> {
        self(buffered)
    }
}

/// Where the framer stands with respect to the next packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// Buffer empty, or still looking for a header.
    Idle,
    /// Header found, waiting for the rest of the packet.
    Accumulating,
}

/// Running counters, mostly useful for diagnosing a noisy line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    pub packets: u64,
    pub discarded_bytes: u64,
    pub checksum_mismatches: u64,
    pub resyncs: u64,
}

enum Step {
    Packet(usize),
    Wait,
    /// Drop this many leading bytes; the front header was a false match.
    Resync(usize),
}

/// Receive-side layout extracted from [`PacketDefaults`].
#[derive(Debug, Clone)]
struct RxLayout {
    header: ByteSchema,
    header_len: usize,
    footer: Option<ByteSchema>,
    footer_len: usize,
    integrity: Integrity,
    fixed_length: Option<usize>,
    max_length: Option<usize>,
    capacity: usize,
}

/// Stateful packet framer for one channel.
///
/// Owns its buffer exclusively; nothing else reads or writes it.
pub struct PacketFramer {
    layout: RxLayout,
    evaluator: Option<Box<dyn LengthEvaluator>>,
    buf: BytesMut,
    state: FramerState,
    /// First candidate end not yet tested against the current buffer front.
    sweep_from: usize,
    stats: FramerStats,
}

impl PacketFramer {
    /// Create a framer for the receive side of `defaults`.
    pub fn new(defaults: &PacketDefaults) -> Result<Self> {
        defaults.validate()?;
        let layout = RxLayout {
            header: ByteSchema::literal(defaults.rx_header.clone()),
            header_len: defaults.rx_header.len(),
            footer: (!defaults.rx_footer.is_empty())
                .then(|| ByteSchema::literal(defaults.rx_footer.clone())),
            footer_len: defaults.rx_footer.len(),
            integrity: defaults.rx_integrity(),
            fixed_length: defaults.rx_length,
            max_length: defaults.rx_max_length,
            capacity: defaults.rx_buffer_capacity,
        };
        Ok(Self {
            buf: BytesMut::with_capacity(layout.capacity.min(4096)),
            layout,
            evaluator: None,
            state: FramerState::Idle,
            sweep_from: 0,
            stats: FramerStats::default(),
        })
    }

    /// Attach the evaluator behind `rx_length_expr`.
    ///
    /// A fixed `rx_length` already governs framing, so combining the two is
    /// rejected.
    pub fn with_length_evaluator(mut self, evaluator: impl LengthEvaluator + 'static) -> Result<Self> {
        if self.layout.fixed_length.is_some() {
            return Err(FrameError::InvalidConfig(
                "length evaluator cannot be combined with rx_length".to_string(),
            ));
        }
        self.evaluator = Some(Box::new(evaluator));
        Ok(self)
    }

    /// Feed a chunk and collect every packet it completes.
    ///
    /// Large chunks are consumed in capacity-sized pieces so the buffer never
    /// holds much more than its ceiling.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawPacket> {
        let mut packets = Vec::new();
        self.feed_each(chunk, |packet| packets.push(packet));
        packets
    }

    /// Like [`feed`](Self::feed), handing each packet to `on_packet` as soon
    /// as it is framed.
    pub fn feed_each(&mut self, chunk: &[u8], mut on_packet: impl FnMut(RawPacket)) {
        for piece in chunk.chunks(self.layout.capacity) {
            self.buf.extend_from_slice(piece);
            self.drain_with(&mut on_packet);
            if self.enforce_capacity() {
                self.drain_with(&mut on_packet);
            }
        }
    }

    /// Frame the next packet from already-buffered bytes, if one is complete.
    pub fn next_packet(&mut self) -> Option<RawPacket> {
        loop {
            if self.buf.is_empty() || !self.sync_header() {
                self.state = FramerState::Idle;
                return None;
            }
            self.state = FramerState::Accumulating;

            match self.frame_at_front() {
                Step::Packet(len) => return Some(self.emit(len)),
                Step::Wait => return None,
                Step::Resync(skip) => {
                    self.stats.resyncs += 1;
                    debug!(skip, buffered = self.buf.len(), "false header; resyncing");
                    self.discard(skip);
                }
            }
        }
    }

    /// Current framing state.
    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Bytes buffered but not yet framed.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Configured buffer ceiling.
    pub fn capacity(&self) -> usize {
        self.layout.capacity
    }

    /// Counters since creation.
    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    /// Drop all buffered bytes.
    pub fn reset(&mut self) {
        let len = self.buf.len();
        self.discard(len);
        self.state = FramerState::Idle;
    }

    fn drain_with(&mut self, on_packet: &mut impl FnMut(RawPacket)) {
        while let Some(packet) = self.next_packet() {
            on_packet(packet);
        }
    }

    /// Align the buffer front with a header.
    ///
    /// Garbage before the first header candidate is dropped; a partial header
    /// at the tail is kept. Returns true when a full header sits at the front.
    fn sync_header(&mut self) -> bool {
        let header_len = self.layout.header_len;
        if header_len == 0 {
            return true;
        }

        let start = {
            let header = self.layout.header.data.as_deref().unwrap_or_default();
            (0..self.buf.len()).find(|&i| {
                if self.buf.len() - i >= header_len {
                    matches(&self.layout.header, &self.buf, i)
                } else {
                    self.buf[i..] == header[..self.buf.len() - i]
                }
            })
        };

        match start {
            Some(0) => {}
            Some(skip) => {
                trace!(skip, "skipping bytes before header");
                self.discard(skip);
            }
            None => {
                let len = self.buf.len();
                self.discard(len);
            }
        }
        self.buf.len() >= header_len
    }

    fn frame_at_front(&mut self) -> Step {
        if let Some(length) = self.layout.fixed_length {
            return self.take_length(self.layout.header_len + length);
        }

        if let Some(evaluator) = &self.evaluator {
            match evaluator.evaluate(&self.buf) {
                Some(total) if total as usize > self.layout.header_len => {
                    return self.take_length(total as usize);
                }
                _ => {}
            }
        }

        self.sweep()
    }

    fn take_length(&self, total: usize) -> Step {
        if self.buf.len() >= total {
            Step::Packet(total)
        } else {
            Step::Wait
        }
    }

    /// Test candidate end positions until footer and checksum both hold.
    ///
    /// A footer match with a bad checksum is only payload that happens to look
    /// like a footer, so the sweep keeps going past it. When the front header
    /// frames nothing, a later header that does frame a packet wins and the
    /// stray prefix is dropped.
    fn sweep(&mut self) -> Step {
        let width = self.layout.integrity.width();
        if self.layout.footer.is_none() && width == 0 {
            return Step::Wait;
        }

        let start = self.sweep_from;
        let limit = self.sweep_limit(self.buf.len());
        let (found, mismatches) = self.find_end(&self.buf, start, limit);
        self.stats.checksum_mismatches += mismatches;
        if let Some(end) = found {
            return Step::Packet(end);
        }

        let overrun = self
            .layout
            .max_length
            .is_some_and(|max| self.buf.len() > self.layout.header_len + max);
        if overrun {
            return Step::Resync(1);
        }
        if let Some(anchor) = self.later_anchor(start) {
            return Step::Resync(anchor);
        }
        self.sweep_from = start.max(limit + 1);
        Step::Wait
    }

    /// First end in `from..=limit` that closes a packet starting at `window[0]`.
    ///
    /// Also returns how many footer matches failed the checksum.
    fn find_end(&self, window: &[u8], from: usize, limit: usize) -> (Option<usize>, u64) {
        let layout = &self.layout;
        let width = layout.integrity.width();
        // Without a header there is nothing to anchor an empty body to.
        let min_body = usize::from(layout.header_len == 0);
        let min_end = layout.header_len + min_body + width + layout.footer_len;

        let mut mismatches = 0u64;
        for end in from.max(min_end)..=limit {
            if let Some(footer) = &layout.footer {
                if !matches(footer, &window[..end], end - layout.footer_len) {
                    continue;
                }
            }
            let body_end = end - layout.footer_len - width;
            if width > 0
                && !layout
                    .integrity
                    .verify_range(window, layout.header_len, body_end)
            {
                mismatches += 1;
                continue;
            }
            return (Some(end), mismatches);
        }
        (None, mismatches)
    }

    fn sweep_limit(&self, len: usize) -> usize {
        match self.layout.max_length {
            Some(max) => (self.layout.header_len + max).min(len),
            None => len,
        }
    }

    /// Offset of the first later header candidate that frames a packet.
    ///
    /// Every end below `from` was already rejected for each of these anchors on
    /// an earlier pass, so only the newly buffered ends are tested.
    fn later_anchor(&self, from: usize) -> Option<usize> {
        let layout = &self.layout;
        if layout.header_len == 0 {
            return None;
        }
        let min_len = layout.header_len + layout.integrity.width() + layout.footer_len;
        (1..=self.buf.len().saturating_sub(min_len))
            .filter(|&anchor| matches(&layout.header, &self.buf, anchor))
            .find(|&anchor| {
                let window = &self.buf[anchor..];
                let limit = self.sweep_limit(window.len());
                self.find_end(window, from.saturating_sub(anchor), limit)
                    .0
                    .is_some()
            })
    }

    fn emit(&mut self, len: usize) -> RawPacket {
        let packet = RawPacket::new(self.buf.split_to(len).freeze());
        self.sweep_from = 0;
        self.stats.packets += 1;
        debug!(len, %packet, "framed packet");
        packet
    }

    fn discard(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.buf.advance(count);
        self.sweep_from = 0;
        self.stats.discarded_bytes += count as u64;
    }

    /// Drop the oldest bytes once the buffer exceeds its ceiling.
    ///
    /// A real header is more likely to show up late in a flood, so the newest
    /// bytes are kept. Returns true when bytes were dropped.
    fn enforce_capacity(&mut self) -> bool {
        let len = self.buf.len();
        if len <= self.layout.capacity {
            return false;
        }
        let excess = len - self.layout.capacity;
        warn!(
            dropped = excess,
            capacity = self.layout.capacity,
            "framer buffer over capacity; dropping oldest bytes"
        );
        self.discard(excess);
        true
    }
}

impl std::fmt::Debug for PacketFramer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketFramer")
            .field("layout", &self.layout)
            .field("has_evaluator", &self.evaluator.is_some())
            .field("buffered", &self.buf.len())
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish()
    }
}

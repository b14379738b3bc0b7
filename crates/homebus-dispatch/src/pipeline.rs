//! Framing executor for one channel.
//!
//! Framing can run inline on the reading thread or on a dedicated worker
//! thread, so checksum sweeps over a noisy line do not stall I/O. Packets
//! always come out in the order their bytes went in. When the worker cannot
//! be started or stops, the pipeline takes the framer back and continues
//! inline. Chunks the worker never started are framed again inline, so a
//! dead worker loses nothing.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use bytes::Bytes;
use homebus_frame::{FramerStats, PacketFramer, RawPacket};
use tracing::{debug, warn};

/// Default number of chunks queued for the worker before `push` blocks.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

enum Input {
    Chunk(u64, Bytes),
    Flush,
}

enum Output {
    /// The worker took chunk `seq` and began feeding it.
    Started(u64),
    Packet(RawPacket),
    Flushed,
}

struct Worker {
    input: SyncSender<Input>,
    output: Receiver<Output>,
    handle: JoinHandle<()>,
}

/// Runs a [`PacketFramer`] inline or on a background thread.
pub struct FramePipeline {
    framer: Arc<Mutex<PacketFramer>>,
    worker: Option<Worker>,
    next_seq: u64,
    /// Chunks handed to the worker that it has not started yet.
    pending: VecDeque<(u64, Bytes)>,
}

impl FramePipeline {
    /// Frame on the calling thread.
    pub fn inline(framer: PacketFramer) -> Self {
        Self {
            framer: Arc::new(Mutex::new(framer)),
            worker: None,
            next_seq: 0,
            pending: VecDeque::new(),
        }
    }

    /// Frame on a worker thread fed through a queue of `queue_depth` chunks.
    ///
    /// Falls back to inline framing when the thread cannot be spawned.
    pub fn background(framer: PacketFramer, queue_depth: usize) -> Self {
        let mut pipeline = Self::inline(framer);
        let (input, inbox) = mpsc::sync_channel(queue_depth.max(1));
        let (outbox, output) = mpsc::channel();
        let framer = Arc::clone(&pipeline.framer);

        let spawned = std::thread::Builder::new()
            .name("homebus-framer".to_string())
            .spawn(move || run_worker(&framer, &inbox, &outbox));
        match spawned {
            Ok(handle) => {
                pipeline.worker = Some(Worker {
                    input,
                    output,
                    handle,
                });
            }
            Err(err) => warn!(error = %err, "framer worker unavailable; framing inline"),
        }
        pipeline
    }

    /// True while a worker thread does the framing.
    pub fn is_background(&self) -> bool {
        self.worker.is_some()
    }

    /// Hand a chunk to the framer and collect the packets available now.
    ///
    /// Inline this returns every packet the chunk completes. In background
    /// mode packets arrive as the worker produces them; use
    /// [`flush`](Self::flush) to wait for everything pushed so far.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<RawPacket> {
        let mut packets = Vec::new();
        let Some(worker) = &self.worker else {
            packets.extend(self.lock_framer().feed(chunk));
            return packets;
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        let chunk = Bytes::copy_from_slice(chunk);
        let delivered = match worker.input.try_send(Input::Chunk(seq, chunk.clone())) {
            Ok(()) => true,
            // Backpressure: wait for room rather than drop or reorder.
            Err(TrySendError::Full(input)) => worker.input.send(input).is_ok(),
            Err(TrySendError::Disconnected(_)) => false,
        };
        self.pending.push_back((seq, chunk));
        self.collect_ready(&mut packets);

        if !delivered {
            self.fall_back(&mut packets);
        }
        packets
    }

    /// Wait until every pushed chunk is framed and return the remaining
    /// packets.
    pub fn flush(&mut self) -> Vec<RawPacket> {
        let mut packets = Vec::new();
        let Some(worker) = &self.worker else {
            return packets;
        };

        if worker.input.send(Input::Flush).is_ok() {
            loop {
                match worker.output.recv() {
                    Ok(Output::Flushed) => return packets,
                    Ok(output) => accept(&mut self.pending, output, &mut packets),
                    Err(_) => break,
                }
            }
        }
        self.fall_back(&mut packets);
        packets
    }

    /// Stop the worker, if any, and return the remaining packets.
    pub fn finish(mut self) -> Vec<RawPacket> {
        let mut packets = self.flush();
        self.fall_back(&mut packets);
        packets
    }

    /// Counters of the underlying framer.
    pub fn stats(&self) -> FramerStats {
        self.lock_framer().stats()
    }

    fn collect_ready(&mut self, packets: &mut Vec<RawPacket>) {
        if let Some(worker) = &self.worker {
            for output in worker.output.try_iter() {
                accept(&mut self.pending, output, packets);
            }
        }
    }

    /// Retire the worker, keeping every packet it already produced.
    ///
    /// Bytes of the chunk the worker was feeding are already in the framer's
    /// buffer; chunks it never started are fed again here, in order.
    fn fall_back(&mut self, packets: &mut Vec<RawPacket>) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        drop(worker.input);
        let joined = worker.handle.join();
        for output in worker.output.try_iter() {
            accept(&mut self.pending, output, packets);
        }
        if joined.is_err() {
            warn!(
                requeued = self.pending.len(),
                "framer worker stopped unexpectedly; framing inline"
            );
        } else {
            debug!("framer worker stopped");
        }

        let pending = std::mem::take(&mut self.pending);
        let mut framer = self.lock_framer();
        while let Some(packet) = framer.next_packet() {
            packets.push(packet);
        }
        for (_, chunk) in pending {
            packets.extend(framer.feed(&chunk));
        }
    }

    fn lock_framer(&self) -> std::sync::MutexGuard<'_, PacketFramer> {
        self.framer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            drop(worker.input);
            let _ = worker.handle.join();
        }
    }
}

/// Route one worker message, forgetting chunks the worker has started.
fn accept(pending: &mut VecDeque<(u64, Bytes)>, output: Output, packets: &mut Vec<RawPacket>) {
    match output {
        Output::Started(seq) => {
            while pending.front().is_some_and(|(queued, _)| *queued <= seq) {
                pending.pop_front();
            }
        }
        Output::Packet(packet) => packets.push(packet),
        Output::Flushed => {}
    }
}

fn run_worker(
    framer: &Mutex<PacketFramer>,
    inbox: &Receiver<Input>,
    outbox: &mpsc::Sender<Output>,
) {
    for input in inbox {
        match input {
            Input::Chunk(seq, chunk) => {
                if outbox.send(Output::Started(seq)).is_err() {
                    return;
                }
                // Each packet leaves as soon as it is framed, so a panic later
                // in the chunk cannot take earlier packets with it.
                framer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .feed_each(&chunk, |packet| {
                        let _ = outbox.send(Output::Packet(packet));
                    });
            }
            Input::Flush => {
                if outbox.send(Output::Flushed).is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use homebus_frame::{encode_command, ChecksumKind, PacketDefaults};

    use super::*;

    fn defaults() -> PacketDefaults {
        PacketDefaults {
            rx_header: vec![0xAA],
            rx_footer: vec![0x55],
            rx_checksum: ChecksumKind::Add,
            tx_header: vec![0xAA],
            tx_footer: vec![0x55],
            tx_checksum: ChecksumKind::Add,
            ..PacketDefaults::default()
        }
    }

    fn stream(count: u8) -> (Vec<u8>, Vec<Vec<u8>>) {
        let defaults = defaults();
        let packets: Vec<Vec<u8>> = (0..count)
            .map(|i| encode_command(&defaults, &[i, 0x55, i.wrapping_mul(3)]).to_vec())
            .collect();
        (packets.concat(), packets)
    }

    fn bytes(packets: Vec<RawPacket>) -> Vec<Vec<u8>> {
        packets.iter().map(|p| p.to_vec()).collect()
    }

    #[test]
    fn inline_frames_immediately() {
        let (wire, expected) = stream(3);
        let mut pipeline = FramePipeline::inline(PacketFramer::new(&defaults()).unwrap());
        assert!(!pipeline.is_background());
        assert_eq!(bytes(pipeline.push(&wire)), expected);
        assert!(pipeline.flush().is_empty());
    }

    #[test]
    fn background_preserves_order() {
        let (wire, expected) = stream(40);
        let mut pipeline = FramePipeline::background(PacketFramer::new(&defaults()).unwrap(), 2);
        assert!(pipeline.is_background());

        let mut packets = Vec::new();
        for chunk in wire.chunks(7) {
            packets.extend(pipeline.push(chunk));
        }
        packets.extend(pipeline.flush());
        assert_eq!(bytes(packets), expected);
        assert_eq!(pipeline.stats().packets, 40);
    }

    #[test]
    fn finish_returns_remaining_packets() {
        let (wire, expected) = stream(5);
        let mut pipeline = FramePipeline::background(PacketFramer::new(&defaults()).unwrap(), 4);
        let mut packets = pipeline.push(&wire);
        packets.extend(pipeline.finish());
        assert_eq!(bytes(packets), expected);
    }

    #[test]
    fn dead_worker_falls_back_inline_without_loss() {
        // The evaluator panics once, taking the worker thread down mid-chunk.
        let tripped = Arc::new(AtomicBool::new(false));
        let evaluator = {
            let tripped = Arc::clone(&tripped);
            move |buf: &[u8]| -> Option<u32> {
                if buf.get(1) == Some(&0x99) && !tripped.swap(true, Ordering::SeqCst) {
                    panic!("evaluator failure");
                }
                None
            }
        };
        let framer = PacketFramer::new(&defaults())
            .unwrap()
            .with_length_evaluator(evaluator)
            .unwrap();
        let mut pipeline = FramePipeline::background(framer, 4);

        let defaults = defaults();
        let first = encode_command(&defaults, &[0x01]).to_vec();
        let poisoned = encode_command(&defaults, &[0x99]).to_vec();
        let last = encode_command(&defaults, &[0x02]).to_vec();

        let mut packets = pipeline.push(&first);
        packets.extend(pipeline.flush());
        packets.extend(pipeline.push(&poisoned));
        packets.extend(pipeline.flush());
        assert!(!pipeline.is_background());

        packets.extend(pipeline.push(&last));
        assert_eq!(bytes(packets), vec![first, poisoned, last]);
    }

    #[test]
    fn chunks_queued_behind_a_dead_worker_are_framed_on_flush() {
        // The worker stalls on the first packet long enough for later chunks
        // to queue up behind it, then dies.
        let tripped = Arc::new(AtomicBool::new(false));
        let evaluator = {
            let tripped = Arc::clone(&tripped);
            move |buf: &[u8]| -> Option<u32> {
                if buf.get(1) == Some(&0x99) && !tripped.swap(true, Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(100));
                    panic!("evaluator failure");
                }
                None
            }
        };
        let framer = PacketFramer::new(&defaults())
            .unwrap()
            .with_length_evaluator(evaluator)
            .unwrap();
        let mut pipeline = FramePipeline::background(framer, 4);

        let defaults = defaults();
        let poisoned = encode_command(&defaults, &[0x99]).to_vec();
        let second = encode_command(&defaults, &[0x01]).to_vec();
        let third = encode_command(&defaults, &[0x02, 0x03]).to_vec();

        let mut packets = pipeline.push(&poisoned);
        packets.extend(pipeline.push(&second));
        packets.extend(pipeline.push(&third));
        packets.extend(pipeline.flush());
        assert!(!pipeline.is_background());
        packets.extend(pipeline.finish());

        assert_eq!(bytes(packets), vec![poisoned, second, third]);
    }
}

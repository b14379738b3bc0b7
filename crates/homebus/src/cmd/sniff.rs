use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use homebus_dispatch::{FramePipeline, DEFAULT_QUEUE_DEPTH};
use homebus_frame::{
    verify_packet, FrameError, PacketDefaults, PacketFramer, PacketReader, RawPacket,
};
use homebus_transport::{BusAddress, BusStream};
use tracing::{debug, info};

use crate::cmd::SniffArgs;
use crate::exit::{frame_error, io_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_packet, OutputFormat};

/// How long a read blocks before the stop flag is checked again.
const READ_POLL: Duration = Duration::from_millis(100);
const READ_CHUNK: usize = 512;

pub fn run(args: SniffArgs, format: OutputFormat) -> CliResult<i32> {
    let defaults = args.bus.load_defaults()?;
    let address: BusAddress = args
        .source
        .parse()
        .map_err(|err| transport_error("bad source", err))?;
    let stream = address
        .open(&args.bus.serial_settings())
        .map_err(|err| transport_error("open failed", err))?;
    info!(source = %address, transport = stream.transport_name(), "sniffing");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printer = Printer {
        source: &args.source,
        defaults: &defaults,
        format,
        valid_only: args.valid_only,
        remaining: args.count,
    };
    if args.background {
        sniff_pipelined(stream, &defaults, &running, &mut printer)?;
    } else {
        sniff_inline(stream, &defaults, &running, &mut printer)?;
    }
    Ok(SUCCESS)
}

fn sniff_inline(
    stream: BusStream,
    defaults: &PacketDefaults,
    running: &AtomicBool,
    printer: &mut Printer<'_>,
) -> CliResult<()> {
    let mut reader = PacketReader::with_timeout_bus(stream, defaults, Some(READ_POLL))
        .map_err(|err| frame_error("reader setup failed", err))?;

    while running.load(Ordering::SeqCst) {
        let packet = match reader.read_packet() {
            Ok(packet) => packet,
            Err(FrameError::Io(err)) if is_poll_timeout(err.kind()) => continue,
            Err(FrameError::ConnectionClosed) => {
                info!("bus closed");
                break;
            }
            Err(err) => return Err(frame_error("read failed", err)),
        };
        if printer.print(&packet) {
            break;
        }
    }

    let stats = reader.framer().stats();
    debug!(
        packets = stats.packets,
        discarded = stats.discarded_bytes,
        resyncs = stats.resyncs,
        "sniff finished"
    );
    Ok(())
}

fn sniff_pipelined(
    mut stream: BusStream,
    defaults: &PacketDefaults,
    running: &AtomicBool,
    printer: &mut Printer<'_>,
) -> CliResult<()> {
    stream
        .set_read_timeout(Some(READ_POLL))
        .map_err(|err| transport_error("open failed", err))?;
    let framer = PacketFramer::new(defaults).map_err(|err| frame_error("bad config", err))?;
    let mut pipeline = FramePipeline::background(framer, DEFAULT_QUEUE_DEPTH);
    let mut buf = [0u8; READ_CHUNK];

    'read: while running.load(Ordering::SeqCst) {
        let n = match stream.read(&mut buf) {
            Ok(0) => {
                info!("bus closed");
                break;
            }
            Ok(n) => n,
            Err(err) if is_poll_timeout(err.kind()) => continue,
            Err(err) => return Err(io_error("read failed", err)),
        };
        for packet in pipeline.push(&buf[..n]) {
            if printer.print(&packet) {
                break 'read;
            }
        }
    }

    if !printer.is_done() {
        for packet in pipeline.flush() {
            if printer.print(&packet) {
                break;
            }
        }
    }
    let stats = pipeline.stats();
    debug!(
        packets = stats.packets,
        discarded = stats.discarded_bytes,
        resyncs = stats.resyncs,
        "sniff finished"
    );
    Ok(())
}

struct Printer<'a> {
    source: &'a str,
    defaults: &'a PacketDefaults,
    format: OutputFormat,
    valid_only: bool,
    remaining: Option<usize>,
}

impl Printer<'_> {
    /// Print one packet. Returns true once `--count` packets were printed.
    fn print(&mut self, packet: &RawPacket) -> bool {
        let checksum_ok = verify_packet(self.defaults, packet);
        if self.valid_only && !checksum_ok {
            debug!(%packet, "skipping packet with bad checksum");
            return false;
        }
        print_packet(packet, self.source, checksum_ok, self.format);
        if let Some(remaining) = &mut self.remaining {
            *remaining = remaining.saturating_sub(1);
        }
        self.is_done()
    }

    fn is_done(&self) -> bool {
        self.remaining == Some(0)
    }
}

fn is_poll_timeout(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use homebus_frame::ChecksumKind;

    use super::*;

    fn defaults() -> PacketDefaults {
        PacketDefaults {
            rx_header: vec![0xAA],
            rx_footer: vec![0x55],
            rx_checksum: ChecksumKind::Add,
            ..PacketDefaults::default()
        }
    }

    #[test]
    fn printer_counts_down_only_printed_packets() {
        let defaults = defaults();
        let mut printer = Printer {
            source: "test",
            defaults: &defaults,
            format: OutputFormat::Pretty,
            valid_only: true,
            remaining: Some(1),
        };

        let bad = RawPacket::from(vec![0xAA, 0x01, 0x00, 0x55]);
        assert!(!printer.print(&bad));
        assert!(!printer.is_done());

        let good = RawPacket::from(vec![0xAA, 0x01, 0x55, 0x02, 0x02, 0x55]);
        assert!(printer.print(&good));
        assert!(printer.is_done());
    }

    #[test]
    fn unlimited_printer_never_finishes() {
        let defaults = defaults();
        let mut printer = Printer {
            source: "test",
            defaults: &defaults,
            format: OutputFormat::Pretty,
            valid_only: false,
            remaining: None,
        };
        let bad = RawPacket::from(vec![0xAA, 0x01, 0x00, 0x55]);
        assert!(!printer.print(&bad));
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use homebus_dispatch::{AckKey, CommandChannel, Priority, Settlement};
use homebus_frame::{
    encode_command, verify_packet, ByteSchema, FrameError, PacketDefaults, PacketReader,
};
use homebus_transport::{BusAddress, BusStream};
use tracing::{debug, warn};

use crate::cmd::{parse_duration, parse_hex, SendArgs};
use crate::exit::{
    dispatch_error, frame_error, io_error, transport_error, CliError, CliResult, FAILURE,
    NOT_ACKNOWLEDGED, SUCCESS, USAGE,
};
use crate::output::{print_settlement, OutputFormat};

/// How long the acknowledgement reader blocks before checking for stop.
const ACK_POLL: Duration = Duration::from_millis(50);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let defaults = resolve_defaults(&args)?;
    let body = parse_hex(&args.hex)?;
    if body.is_empty() {
        return Err(CliError::new(USAGE, "--hex must contain at least one byte"));
    }
    let ack = args
        .ack_hex
        .as_deref()
        .map(parse_hex)
        .transpose()?
        .map(|pattern| AckKey::Pattern(ByteSchema::literal(pattern)));
    let priority = if args.low {
        Priority::Low
    } else {
        Priority::Normal
    };

    let address: BusAddress = args
        .target
        .parse()
        .map_err(|err| transport_error("bad target", err))?;
    let stream = address
        .open(&args.bus.serial_settings())
        .map_err(|err| transport_error("open failed", err))?;

    let stop = Arc::new(AtomicBool::new(false));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;

    let packet = encode_command(&defaults, &body);
    let settlement = runtime.block_on(async {
        let reader_stream = match &ack {
            Some(_) => Some(
                stream
                    .try_clone()
                    .map_err(|err| transport_error("open failed", err))?,
            ),
            None => None,
        };
        let channel = CommandChannel::spawn(stream, defaults.clone())
            .map_err(|err| dispatch_error("bad config", err))?;
        let reader = reader_stream
            .map(|s| spawn_ack_reader(s, &defaults, channel.clone(), Arc::clone(&stop)))
            .transpose()?;

        let result = channel
            .send(&body, ack, priority)
            .await
            .map_err(|err| dispatch_error("send failed", err));

        stop.store(true, Ordering::SeqCst);
        if let Some(reader) = reader {
            if reader.join().is_err() {
                warn!("acknowledgement reader panicked");
            }
        }
        if let Err(err) = channel.shutdown().await {
            debug!(error = %err, "command channel already stopped");
        }
        result
    })?;

    print_settlement(&args.target, &packet, settlement, format);
    Ok(exit_code(settlement))
}

/// Channel configuration with command-line overrides applied.
fn resolve_defaults(args: &SendArgs) -> CliResult<PacketDefaults> {
    let mut defaults = args.bus.load_defaults()?;
    if let Some(timeout) = &args.timeout {
        let timeout = parse_duration(timeout)?;
        defaults.tx_timeout = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    }
    if let Some(retries) = args.retries {
        defaults.tx_retry_cnt = retries;
    }
    Ok(defaults)
}

/// Read packets off the bus and offer them to waiting acknowledgements.
fn spawn_ack_reader(
    stream: BusStream,
    defaults: &PacketDefaults,
    channel: CommandChannel,
    stop: Arc<AtomicBool>,
) -> CliResult<JoinHandle<()>> {
    let mut reader = PacketReader::with_timeout_bus(stream, defaults, Some(ACK_POLL))
        .map_err(|err| frame_error("reader setup failed", err))?;
    let defaults = defaults.clone();

    std::thread::Builder::new()
        .name("homebus-ack".to_string())
        .spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                match reader.read_packet() {
                    Ok(packet) if verify_packet(&defaults, &packet) => {
                        let fired = channel.packet_received(&packet);
                        debug!(%packet, fired, "received packet");
                    }
                    Ok(packet) => debug!(%packet, "ignoring packet with bad checksum"),
                    Err(FrameError::Io(err))
                        if matches!(
                            err.kind(),
                            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                        ) => {}
                    Err(err) => {
                        warn!(error = %err, "acknowledgement reader stopped");
                        break;
                    }
                }
            }
        })
        .map_err(|err| io_error("failed to start acknowledgement reader", err))
}

fn exit_code(settlement: Settlement) -> i32 {
    match settlement {
        Settlement::Sent | Settlement::Acknowledged { .. } => SUCCESS,
        Settlement::Exhausted { .. } => NOT_ACKNOWLEDGED,
        Settlement::Abandoned => FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::cmd::BusArgs;

    fn write_config(tag: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "homebus-send-{tag}-{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"{"rx_header": [247], "rx_length": 4, "tx_header": [247], "tx_checksum": "xor"}"#,
        )
        .unwrap();
        path
    }

    fn send_args(config: PathBuf) -> SendArgs {
        SendArgs {
            target: "tcp://127.0.0.1:1".to_string(),
            bus: BusArgs { config, baud: 9600 },
            hex: "01".to_string(),
            ack_hex: None,
            low: false,
            timeout: None,
            retries: None,
        }
    }

    #[test]
    fn command_line_overrides_config() {
        let config = write_config("overrides");
        let mut args = send_args(config.clone());
        args.timeout = Some("250ms".to_string());
        args.retries = Some(0);

        let defaults = resolve_defaults(&args).unwrap();
        assert_eq!(defaults.tx_timeout, 250);
        assert_eq!(defaults.tx_retry_cnt, 0);
        assert_eq!(defaults.tx_header, vec![0xF7]);
        let _ = std::fs::remove_file(config);
    }

    #[test]
    fn unacknowledged_send_has_its_own_exit_code() {
        assert_eq!(exit_code(Settlement::Sent), SUCCESS);
        assert_eq!(exit_code(Settlement::Acknowledged { attempts: 2 }), SUCCESS);
        assert_eq!(exit_code(Settlement::Exhausted { attempts: 4 }), NOT_ACKNOWLEDGED);
        assert_eq!(exit_code(Settlement::Abandoned), FAILURE);
    }
}

#![cfg(feature = "cli")]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::Duration;

fn write_config(tag: &str, json: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "homebus-cli-{tag}-{}-{}.json",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::write(&path, json).expect("config should be writable");
    path
}

fn gateway() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr");
    (listener, format!("tcp://{addr}"))
}

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect()
}

#[test]
fn sniff_frames_gateway_stream() {
    let config = write_config(
        "sniff",
        r#"{"rx_header": [170], "rx_footer": [85], "rx_checksum": "add"}"#,
    );
    let (listener, url) = gateway();

    let server = thread::spawn(move || {
        let (mut conn, _) = listener.accept().expect("accept should succeed");
        // Line noise, then two packets split across writes.
        conn.write_all(&[0x00, 0xFF, 0xAA, 0x10]).unwrap();
        thread::sleep(Duration::from_millis(20));
        conn.write_all(&[0x20, 0xDA, 0x55, 0xAA, 0x30, 0x01, 0xDB, 0x55])
            .unwrap();
        thread::sleep(Duration::from_millis(500));
    });

    let output = Command::new(env!("CARGO_BIN_EXE_homebus"))
        .args(["--log-level", "error", "--format", "json", "sniff"])
        .arg(&url)
        .arg("--config")
        .arg(&config)
        .args(["--count", "2"])
        .output()
        .expect("sniff should run");
    server.join().expect("server thread");
    let _ = std::fs::remove_file(&config);

    assert_eq!(output.status.code(), Some(0), "{output:?}");
    let lines = json_lines(&output.stdout);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["packet"], "AA 10 20 DA 55");
    assert_eq!(lines[0]["checksum_ok"], true);
    assert_eq!(lines[1]["packet"], "AA 30 01 DB 55");
    assert_eq!(lines[1]["length"], 5);
}

#[test]
fn sniff_on_worker_thread_stops_when_gateway_closes() {
    let config = write_config(
        "sniff-bg",
        r#"{"rx_header": [247], "rx_length": 3}"#,
    );
    let (listener, url) = gateway();

    let server = thread::spawn(move || {
        let (mut conn, _) = listener.accept().expect("accept should succeed");
        conn.write_all(&[0xF7, 0x01, 0x02, 0x03, 0xF7, 0x04, 0x05, 0x06])
            .unwrap();
    });

    let output = Command::new(env!("CARGO_BIN_EXE_homebus"))
        .args(["--log-level", "error", "--format", "json", "sniff"])
        .arg(&url)
        .arg("--config")
        .arg(&config)
        .arg("--background")
        .output()
        .expect("sniff should run");
    server.join().expect("server thread");
    let _ = std::fs::remove_file(&config);

    assert_eq!(output.status.code(), Some(0), "{output:?}");
    let packets: Vec<_> = json_lines(&output.stdout)
        .into_iter()
        .map(|line| line["packet"].clone())
        .collect();
    assert_eq!(packets, vec!["F7 01 02 03", "F7 04 05 06"]);
}

const SEND_CONFIG: &str = r#"{
    "rx_header": [247],
    "rx_length": 4,
    "tx_header": [247],
    "tx_checksum": "xor",
    "tx_retry_cnt": 1,
    "tx_timeout": 300,
    "tx_retry_interval": 10
}"#;

#[test]
fn send_is_acknowledged_by_matching_reply() {
    let config = write_config("send-ack", SEND_CONFIG);
    let (listener, url) = gateway();

    let server = thread::spawn(move || {
        let (mut conn, _) = listener.accept().expect("accept should succeed");
        let mut command = [0u8; 4];
        conn.read_exact(&mut command).unwrap();
        conn.write_all(&[0xF7, 0x81, 0x01, 0x00, 0x00]).unwrap();
        // Hold the line open until the client is done.
        let mut rest = Vec::new();
        let _ = conn.read_to_end(&mut rest);
        command
    });

    let output = Command::new(env!("CARGO_BIN_EXE_homebus"))
        .args(["--log-level", "error", "--format", "json", "send"])
        .arg(&url)
        .arg("--config")
        .arg(&config)
        .args(["--hex", "01 02", "--ack-hex", "81"])
        .output()
        .expect("send should run");
    let command = server.join().expect("server thread");
    let _ = std::fs::remove_file(&config);

    assert_eq!(command, [0xF7, 0x01, 0x02, 0xF4]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");
    let lines = json_lines(&output.stdout);
    assert_eq!(lines[0]["status"], "acknowledged");
    assert_eq!(lines[0]["attempts"], 1);
    assert_eq!(lines[0]["packet"], "F7 01 02 F4");
}

#[test]
fn send_without_reply_exhausts_retries() {
    let config = write_config("send-exhaust", SEND_CONFIG);
    let (listener, url) = gateway();

    let server = thread::spawn(move || {
        let (mut conn, _) = listener.accept().expect("accept should succeed");
        let mut received = Vec::new();
        let _ = conn.read_to_end(&mut received);
        received
    });

    let output = Command::new(env!("CARGO_BIN_EXE_homebus"))
        .args(["--log-level", "error", "--format", "json", "send"])
        .arg(&url)
        .arg("--config")
        .arg(&config)
        .args(["--hex", "01 02", "--ack-hex", "81", "--timeout", "50ms"])
        .output()
        .expect("send should run");
    let received = server.join().expect("server thread");
    let _ = std::fs::remove_file(&config);

    assert_eq!(output.status.code(), Some(4), "{output:?}");
    assert_eq!(received, [0xF7, 0x01, 0x02, 0xF4].repeat(3));
    let lines = json_lines(&output.stdout);
    assert_eq!(lines[0]["status"], "exhausted");
    assert_eq!(lines[0]["attempts"], 3);
}

#[test]
fn send_rejects_config_without_framing() {
    let config = write_config("send-bad", r#"{"tx_header": [247]}"#);
    let output = Command::new(env!("CARGO_BIN_EXE_homebus"))
        .args(["--log-level", "error", "send", "tcp://127.0.0.1:9"])
        .arg("--config")
        .arg(&config)
        .args(["--hex", "01"])
        .output()
        .expect("send should run");
    let _ = std::fs::remove_file(&config);

    assert_eq!(output.status.code(), Some(78), "{output:?}");
}

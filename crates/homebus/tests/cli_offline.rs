#![cfg(feature = "cli")]

use std::process::{Command, Output};

fn homebus(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_homebus"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("homebus should run")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("stdout should be JSON")
}

#[test]
fn samsung_rx_checksum_in_pretty_format() {
    let output = homebus(&[
        "--format",
        "pretty",
        "checksum",
        "--kind",
        "samsung_rx",
        "--header",
        "B0",
        "--hex",
        "41 00",
    ]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "71");
}

#[test]
fn two_byte_checksum_as_json() {
    let output = homebus(&[
        "--format", "json", "checksum", "--kind", "xor_add", "--header", "F7", "--hex", "0102",
    ]);
    assert_eq!(output.status.code(), Some(0));
    let json = stdout_json(&output);
    assert_eq!(json["kind"], "xor_add");
    assert_eq!(json["checksum"], "F4EE");
}

#[test]
fn unknown_checksum_kind_is_a_usage_error() {
    let output = homebus(&["checksum", "--kind", "crc16", "--hex", "01"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("crc16"));
}

#[test]
fn decodes_bcd_value() {
    let output = homebus(&[
        "--format",
        "json",
        "decode",
        "--schema",
        r#"{"offset": 1, "length": 2, "decode": "bcd"}"#,
        "--hex",
        "F7 12 34",
    ]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_json(&output)["value"], 1234);
}

#[test]
fn decodes_mapped_label_with_base_offset() {
    let output = homebus(&[
        "--format",
        "json",
        "decode",
        "--schema",
        r#"{"length": 1, "mapping": {"0": "off", "1": "on"}}"#,
        "--hex",
        "F7 0E 01",
        "--base-offset",
        "2",
    ]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_json(&output)["value"], "on");
}

#[test]
fn window_outside_packet_reports_invalid_data() {
    let output = homebus(&[
        "--format",
        "json",
        "decode",
        "--schema",
        r#"{"offset": 4, "length": 2}"#,
        "--hex",
        "F7 12",
    ]);
    assert_eq!(output.status.code(), Some(60));
    assert!(stdout_json(&output)["value"].is_null());
}

#[test]
fn version_prints_name() {
    let output = homebus(&["version"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("homebus "), "{stdout}");

    let output = homebus(&["version", "--extended"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("features: dispatch=true, codec=true"), "{stdout}");
}

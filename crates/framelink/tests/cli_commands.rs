#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

fn framelink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_framelink"))
        .args(args)
        .env_remove("FRAMELINK_CONFIG")
        .output()
        .expect("framelink should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn unique_temp_file(tag: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "framelink-{tag}-{}-{}.json",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::write(&path, contents).expect("temp file should be writable");
    path
}

#[test]
fn encode_default_link() {
    let output = framelink(&["encode", "--type", "16", "--hex", "0102", "--format", "pretty"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "01 80 02 10 01 02");
}

#[test]
fn encode_response_as_slave_without_sof() {
    let output = framelink(&[
        "encode", "--type", "3", "--id", "5", "--peer", "slave", "--no-sof", "--format", "pretty",
    ]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "05 00 03");
}

#[test]
fn encode_json_reports_sizes() {
    let output = framelink(&[
        "encode", "--type", "1", "--data", "hi", "--checksum", "xor", "--format", "json",
    ]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("\"frame_id\":128"));
    assert!(out.contains("\"payload_size\":2"));
    // SOF, ID, LEN, TYPE, head checksum, 2 data bytes, body checksum.
    assert!(out.contains("\"wire_size\":8"));
}

#[test]
fn encode_rejects_oversized_payload() {
    let payload = "ab".repeat(256);
    let output = framelink(&["encode", "--type", "1", "--hex", &payload]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn encode_rejects_type_wider_than_field() {
    let output = framelink(&["encode", "--type", "300", "--data", "x"]);
    assert_eq!(output.status.code(), Some(60));
    assert!(output.stdout.is_empty());
}

#[test]
fn encode_rejects_bad_hex() {
    let output = framelink(&["encode", "--type", "1", "--hex", "0g"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn decode_round_trip_through_hex() {
    let encoded = framelink(&[
        "encode", "--type", "34", "--data", "ping", "--checksum", "crc16", "--format", "pretty",
    ]);
    assert!(encoded.status.success());
    let wire = stdout(&encoded);

    let output = framelink(&[
        "decode", "--hex", wire.trim(), "--checksum", "crc16", "--format", "pretty",
    ]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("id=0x80 type=0x22 size=4 payload=\"ping\""));
}

#[test]
fn decode_reports_corruption() {
    // Second frame's payload byte flipped; xor checksum catches it.
    let good = "01 80 01 10 6F 41 BE";
    let bad = "01 81 01 10 6E 42 BE";
    let input = format!("{good} {bad}");
    let output = framelink(&[
        "decode", "--hex", &input, "--checksum", "xor", "--format", "json",
    ]);
    assert_eq!(output.status.code(), Some(60));
    let out = stdout(&output);
    assert!(out.contains("\"messages\":1"));
    assert!(out.contains("body_checksum_mismatch"));
}

#[test]
fn decode_reads_stdin_and_flags_trailing_bytes() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_framelink"))
        .args(["decode", "--format", "pretty"])
        .env_remove("FRAMELINK_CONFIG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("framelink should spawn");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(&[0x01, 0x80, 0x00, 0x07, 0x01, 0x81, 0x03])
        .expect("stdin should accept input");
    let output = child.wait_with_output().expect("framelink should exit");

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("id=0x80 type=0x07 size=0"));
    assert!(out.contains("incomplete frame at end of input"));
}

#[test]
fn config_file_is_applied() {
    let path = unique_temp_file(
        "config",
        r#"{"frame":{"id_bytes":2,"sof_byte":null,"peer":"slave"}}"#,
    );
    let output = framelink(&[
        "encode",
        "--type",
        "9",
        "--config",
        path.to_str().expect("utf-8 path"),
        "--format",
        "pretty",
    ]);
    let _ = std::fs::remove_file(&path);

    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "00 00 00 09");
}

#[test]
fn invalid_config_is_usage_error() {
    let path = unique_temp_file("invalid", r#"{"frame":{"id_bytes":3}}"#);
    let output = framelink(&[
        "config",
        "--config",
        path.to_str().expect("utf-8 path"),
    ]);
    let _ = std::fs::remove_file(&path);

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_reports_package() {
    let output = framelink(&["version"]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output).trim(),
        format!("framelink {}", env!("CARGO_PKG_VERSION"))
    );
}

#![cfg(feature = "cli")]

use std::io::Write;
use std::net::TcpListener;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::Duration;

use uartlink::cmd::{encode_response, CommandPacket, RequestBuilder};
use uartlink::frame::FrameReader;

fn uartlink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_uartlink"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("uartlink should run")
}

#[test]
fn version_prints_package_version() {
    let output = uartlink(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));

    let output = uartlink(&["version", "--extended"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("target_os:"));
    assert!(stdout.contains("features: bridge=true"));
}

#[test]
fn send_dry_run_prints_wire_bytes() {
    let output = uartlink(&[
        "--format", "json", "send", "--dry-run", "--cmd", "1", "--value", "5",
    ]);
    assert!(output.status.success());

    let expected = RequestBuilder::new(1).value(5).to_wire().expect("request encodes");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&format!("\"wire\":\"{}\"", hex(&expected))));
    assert!(stdout.contains(&format!("\"len\":{}", expected.len())));
}

#[test]
fn send_with_bad_hex_argument_is_usage_error() {
    let output = uartlink(&["send", "--dry-run", "--cmd", "40", "--arg", "zz"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--arg"));
}

#[test]
fn send_without_target_is_usage_error() {
    let output = uartlink(&["send", "--cmd", "1"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn send_waits_for_matching_response() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr");

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = FrameReader::new(stream.try_clone().expect("clone"));
        let packet = reader.read_packet().expect("request packet");
        let request = CommandPacket::parse(&packet).expect("valid request");
        let header = request.header;

        let mut stream = stream;
        // A stale response for another callback first.
        stream
            .write_all(&encode_response(header.cmd, 1, 0, &[]).expect("response encodes"))
            .expect("write");
        stream
            .write_all(&encode_response(header.cmd, header.value, 77, &[&b"pong"[..]]).expect("response encodes"))
            .expect("write");
        header
    });

    let output = uartlink(&[
        "--format",
        "json",
        "send",
        "--tcp",
        &addr.to_string(),
        "--cmd",
        "40",
        "--value",
        "9",
        "--arg",
        "0102",
        "--wait",
    ]);
    let header = server.join().expect("server thread");
    assert_eq!(header.cmd, 40);
    assert_eq!(header.argc, 1);

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"callback\":9"));
    assert!(stdout.contains("\"ret\":77"));
    assert!(stdout.contains("706f6e67"));
}

#[test]
fn send_wait_timeout_returns_124() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr");
    thread::spawn(move || {
        if let Ok((_stream, _)) = listener.accept() {
            thread::sleep(Duration::from_secs(3));
        }
    });

    let output = uartlink(&[
        "send",
        "--tcp",
        &addr.to_string(),
        "--cmd",
        "2",
        "--value",
        "3",
        "--wait",
        "--wait-timeout",
        "300ms",
    ]);
    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn decode_reads_hex_capture_from_stdin() {
    let mut capture = b"hello\n".to_vec();
    capture.extend_from_slice(&RequestBuilder::new(2).value(4).to_wire().expect("request encodes"));
    capture.extend_from_slice(&encode_response(2, 4, 1, &[]).expect("response encodes"));

    let mut child = Command::new(env!("CARGO_BIN_EXE_uartlink"))
        .args(["--format", "json", "decode", "--hex"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("decode should start");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(hex(&capture).as_bytes())
        .expect("write capture");
    let output = child.wait_with_output().expect("decode should finish");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"kind\":\"console\""));
    assert!(stdout.contains("\"name\":\"is_ready\""));
    assert!(stdout.contains("\"kind\":\"response\""));
    assert!(stdout.contains("\"requests\":1"));
    assert!(stdout.contains("\"dropped\":0"));
}

#[test]
fn decode_rejects_invalid_hex() {
    let dir = std::env::temp_dir().join(format!("uartlink-decode-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    let path = dir.join("capture.hex");
    std::fs::write(&path, "c0 0g c0").expect("write capture");

    let output = uartlink(&["decode", "--hex", path.to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(60));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn serve_print_config_shows_defaults() {
    let output = uartlink(&[
        "--format",
        "json",
        "serve",
        "--device",
        "/dev/null",
        "--print-config",
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"device\":\"/dev/null\""));
    assert!(stdout.contains("\"baud\":115200"));
    assert!(stdout.contains("\"port\":23"));
    assert!(stdout.contains("\"programming_port\":2323"));
    assert!(stdout.contains("\"max_sessions\":4"));
    assert!(stdout.contains("\"overflow_timeout\":10000"));
}

#[test]
fn serve_rejects_bad_duration() {
    let output = uartlink(&[
        "serve",
        "--device",
        "/dev/null",
        "--overflow-timeout",
        "soon",
        "--print-config",
    ]);
    assert_eq!(output.status.code(), Some(64));
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use uartlink_cmd::{RequestBuilder, ResponseFrame};
use uartlink_frame::{FrameError, FrameReader};
use uartlink_transport::{SerialConfig, SerialUart};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{
    cmd_error, frame_error, io_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT,
    USAGE,
};
use crate::output::{print_json, print_response, print_table, OutputFormat};

const TCP_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    if args.wait && args.value == 0 {
        return Err(CliError::new(
            USAGE,
            "--wait needs a non-zero --value; requests without a callback get no response",
        ));
    }
    let wire = encode(&args)?;

    if args.dry_run {
        print_encoded(&args, &wire, format);
        return Ok(SUCCESS);
    }

    let wait_timeout = parse_duration(&args.wait_timeout)?;
    if let Some(addr) = args.tcp {
        let mut stream = TcpStream::connect_timeout(&addr, wait_timeout)
            .map_err(|err| io_error("connect failed", err))?;
        stream
            .write_all(&wire)
            .map_err(|err| io_error("send failed", err))?;
        tracing::debug!(%addr, len = wire.len(), "packet sent");
        if args.wait {
            stream
                .set_read_timeout(Some(TCP_POLL_INTERVAL))
                .map_err(|err| io_error("socket setup failed", err))?;
            let frame = wait_for_response(stream, args.value, wait_timeout)?;
            print_response(&frame, format);
        }
        return Ok(SUCCESS);
    }

    let Some(device) = &args.device else {
        return Err(CliError::new(
            USAGE,
            "one of --device, --tcp or --dry-run is required",
        ));
    };
    let config = SerialConfig::new(device.clone()).with_line(args.line.settings()?);
    let mut uart = SerialUart::open(&config).map_err(|err| transport_error("open failed", err))?;
    uart.write_all(&wire)
        .and_then(|()| uart.flush())
        .map_err(|err| io_error("send failed", err))?;
    tracing::debug!(device = %device, len = wire.len(), "packet sent");
    if args.wait {
        let reader = uart
            .reader()
            .map_err(|err| transport_error("serial clone failed", err))?;
        let frame = wait_for_response(reader, args.value, wait_timeout)?;
        print_response(&frame, format);
    }
    Ok(SUCCESS)
}

fn encode(args: &SendArgs) -> CliResult<Bytes> {
    let mut builder = RequestBuilder::new(args.cmd).value(args.value);
    for arg in &args.args {
        builder = builder.arg(parse_hex(arg)?);
    }
    builder.to_wire().map_err(|err| cmd_error("encode request", err))
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let compact: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let compact = compact.strip_prefix("0x").unwrap_or(&compact);
    hex::decode(compact).map_err(|err| CliError::new(USAGE, format!("--arg {input:?}: {err}")))
}

/// Read frames until the response carrying `callback` arrives.
///
/// The reader's own timeout is the poll interval; `timeout` bounds the wait.
fn wait_for_response<R: Read>(
    reader: R,
    callback: u32,
    timeout: Duration,
) -> CliResult<ResponseFrame> {
    let deadline = Instant::now() + timeout;
    let mut frames = FrameReader::new(reader);
    loop {
        if Instant::now() >= deadline {
            return Err(CliError::new(
                TIMEOUT,
                format!("no response within {timeout:?}"),
            ));
        }
        match frames.read_packet() {
            Ok(packet) => match ResponseFrame::parse(&packet) {
                Ok(frame) if frame.callback == callback => return Ok(frame),
                Ok(frame) => {
                    tracing::debug!(callback = frame.callback, "response for another callback")
                }
                Err(err) => tracing::debug!(error = %err, "ignoring undecodable packet"),
            },
            Err(FrameError::Io(err))
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                ) => {}
            Err(err) => return Err(frame_error("receive failed", err)),
        }
    }
}

#[derive(Serialize)]
struct EncodedOutput {
    cmd: u16,
    value: u32,
    argc: usize,
    len: usize,
    wire: String,
}

fn print_encoded(args: &SendArgs, wire: &[u8], format: OutputFormat) {
    let hex = hex::encode(wire);
    match format {
        OutputFormat::Json => print_json(&EncodedOutput {
            cmd: args.cmd,
            value: args.value,
            argc: args.args.len(),
            len: wire.len(),
            wire: hex,
        }),
        OutputFormat::Table => print_table(
            &["CMD", "VALUE", "ARGC", "WIRE"],
            vec![vec![
                args.cmd.to_string(),
                format!("{:#x}", args.value),
                args.args.len().to_string(),
                hex,
            ]],
        ),
        OutputFormat::Pretty => {
            let spaced: Vec<String> = wire.iter().map(|b| format!("{b:02x}")).collect();
            println!("{}", spaced.join(" "));
        }
    }
}

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use serde::Serialize;
use uartlink_cmd::{core_table, ids, CommandPacket, CommandTable, ResponseFrame};
use uartlink_frame::{Framer, FramerConfig, FramerEvent};

use crate::cmd::DecodeArgs;
use crate::exit::{cmd_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_json, print_table, text_preview, OutputFormat};

/// One decoded element of a capture, in stream order.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Item {
    Console {
        text: String,
    },
    Request {
        cmd: u16,
        name: String,
        argc: u16,
        value: u32,
        args: Vec<String>,
        /// `ok`, or `unknown_command` when no core handler has the id.
        status: &'static str,
    },
    Response {
        cmd: u16,
        callback: u32,
        ret: u32,
        bodies: Vec<String>,
    },
    Dropped {
        len: usize,
        reason: &'static str,
        raw: String,
    },
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    console: usize,
    requests: usize,
    responses: usize,
    dropped: usize,
}

#[derive(Serialize)]
struct DecodeOutput {
    items: Vec<Item>,
    summary: Summary,
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let raw = read_input(&args.input)?;
    let data = if args.hex { parse_capture_hex(&raw)? } else { raw };

    let config = FramerConfig::default().with_console_sniff(!args.no_console_sniff);
    let table = core_table().map_err(|err| cmd_error("command table", err))?;
    let items = decode(&data, config, &table);
    let summary = summarize(&items);
    tracing::debug!(
        bytes = data.len(),
        items = items.len(),
        dropped = summary.dropped,
        "capture decoded"
    );

    match format {
        OutputFormat::Json => print_json(&DecodeOutput { items, summary }),
        OutputFormat::Table => print_table(&["KIND", "DETAIL"], items.iter().map(row).collect()),
        OutputFormat::Pretty => {
            for item in &items {
                let cols = row(item);
                println!("{:<9} {}", cols[0], cols[1]);
            }
            println!(
                "-- {} console, {} requests, {} responses, {} dropped",
                summary.console, summary.requests, summary.responses, summary.dropped
            );
        }
    }
    Ok(SUCCESS)
}

fn read_input(path: &Path) -> CliResult<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .map_err(|err| io_error("read stdin", err))?;
        return Ok(buf);
    }
    fs::read(path).map_err(|err| io_error(&format!("read {}", path.display()), err))
}

fn parse_capture_hex(raw: &[u8]) -> CliResult<Vec<u8>> {
    let compact: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    hex::decode(compact).map_err(|err| CliError::new(DATA_INVALID, format!("invalid hex: {err}")))
}

fn decode(data: &[u8], config: FramerConfig, table: &CommandTable) -> Vec<Item> {
    let mut framer = Framer::new(config);
    framer
        .feed_buf(data)
        .into_iter()
        .map(|event| match event {
            FramerEvent::ConsoleBytes(text) => Item::Console {
                text: text_preview(&text),
            },
            FramerEvent::PacketReady(packet) => classify_packet(&packet, table),
        })
        .collect()
}

/// Requests are tried first, then responses.
fn classify_packet(packet: &[u8], table: &CommandTable) -> Item {
    let request_err = match CommandPacket::parse(packet) {
        Ok(request) => {
            let header = request.header;
            let mut cursor = request.args();
            let args = (0..header.argc)
                .map_while(|_| cursor.pop_arg_bytes().ok())
                .map(hex::encode)
                .collect();
            let (name, status) = match table.name(header.cmd) {
                Some(name) => (name.to_string(), "ok"),
                None => (ids::range_name(header.cmd).to_string(), "unknown_command"),
            };
            return Item::Request {
                cmd: header.cmd,
                name,
                argc: header.argc,
                value: header.value,
                args,
                status,
            };
        }
        Err(reason) => reason,
    };

    match ResponseFrame::parse(packet) {
        Ok(frame) => Item::Response {
            cmd: frame.cmd,
            callback: frame.callback,
            ret: frame.ret,
            bodies: frame.bodies.iter().map(hex::encode).collect(),
        },
        Err(_) => Item::Dropped {
            len: packet.len(),
            reason: request_err.as_str(),
            raw: hex::encode(packet),
        },
    }
}

fn summarize(items: &[Item]) -> Summary {
    let mut summary = Summary::default();
    for item in items {
        match item {
            Item::Console { .. } => summary.console += 1,
            Item::Request { .. } => summary.requests += 1,
            Item::Response { .. } => summary.responses += 1,
            Item::Dropped { .. } => summary.dropped += 1,
        }
    }
    summary
}

fn row(item: &Item) -> Vec<String> {
    match item {
        Item::Console { text } => vec!["console".into(), format!("{text:?}")],
        Item::Request {
            cmd,
            name,
            value,
            args,
            status,
            ..
        } => vec![
            "request".into(),
            format!("cmd={cmd} ({name}) value={value:#x} args=[{}] {status}", args.join(" ")),
        ],
        Item::Response {
            cmd,
            callback,
            ret,
            bodies,
        } => vec![
            "response".into(),
            format!("cmd={cmd} callback={callback:#x} ret={ret} bodies=[{}]", bodies.join(" ")),
        ],
        Item::Dropped { len, reason, raw } => {
            vec!["dropped".into(), format!("{len} bytes, {reason}: {raw}")]
        }
    }
}

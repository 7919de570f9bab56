use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use uartlink_cmd::ResponseFrame;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_table(header: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

#[derive(Serialize)]
struct ResponseOutput {
    cmd: u16,
    callback: u32,
    ret: u32,
    bodies: Vec<String>,
    crc: String,
}

pub fn print_response(frame: &ResponseFrame, format: OutputFormat) {
    let bodies: Vec<String> = frame.bodies.iter().map(|b| hex::encode(b)).collect();
    match format {
        OutputFormat::Json => print_json(&ResponseOutput {
            cmd: frame.cmd,
            callback: frame.callback,
            ret: frame.ret,
            bodies,
            crc: format!("{:04x}", frame.crc),
        }),
        OutputFormat::Table => print_table(
            &["CMD", "CALLBACK", "RET", "BODIES"],
            vec![vec![
                frame.cmd.to_string(),
                format!("{:#x}", frame.callback),
                frame.ret.to_string(),
                bodies.join(" "),
            ]],
        ),
        OutputFormat::Pretty => {
            println!(
                "cmd={} callback={:#x} ret={} bodies={}",
                frame.cmd,
                frame.callback,
                frame.ret,
                bodies.len()
            );
            for (i, body) in bodies.iter().enumerate() {
                println!("  [{i}] {body}");
            }
        }
    }
}

/// Console text as a printable string.
pub fn text_preview(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use uartlink_transport::{DataBits, LineSettings, ModemLine, Parity, StopBits};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod ports;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the serial bridge on a device.
    Serve(ServeArgs),
    /// Encode a command packet and send it to the MCU link.
    Send(SendArgs),
    /// Decode a captured UART byte stream.
    Decode(DecodeArgs),
    /// List serial ports.
    Ports(PortsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Ports(args) => ports::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ParityArg {
    None,
    Odd,
    Even,
}

impl From<ParityArg> for Parity {
    fn from(arg: ParityArg) -> Self {
        match arg {
            ParityArg::None => Parity::None,
            ParityArg::Odd => Parity::Odd,
            ParityArg::Even => Parity::Even,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum PinLine {
    Dtr,
    Rts,
    None,
}

impl From<PinLine> for ModemLine {
    fn from(arg: PinLine) -> Self {
        match arg {
            PinLine::Dtr => ModemLine::Dtr,
            PinLine::Rts => ModemLine::Rts,
            PinLine::None => ModemLine::None,
        }
    }
}

/// Serial line options shared by `serve` and `send`.
#[derive(Args, Debug, Clone)]
pub struct LineArgs {
    /// Baud rate.
    #[arg(long, env = "UARTLINK_BAUD", default_value_t = 115_200)]
    pub baud: u32,
    /// Data bits (5-8).
    #[arg(long, env = "UARTLINK_DATA_BITS", default_value_t = 8)]
    pub data_bits: u8,
    #[arg(long, env = "UARTLINK_PARITY", value_enum, default_value = "none")]
    pub parity: ParityArg,
    /// Stop bits (1 or 2).
    #[arg(long, env = "UARTLINK_STOP_BITS", default_value_t = 1)]
    pub stop_bits: u8,
}

impl LineArgs {
    pub fn settings(&self) -> CliResult<LineSettings> {
        let data_bits = DataBits::from_bits(self.data_bits).ok_or_else(|| {
            CliError::new(USAGE, format!("unsupported data bits: {}", self.data_bits))
        })?;
        let stop_bits = match self.stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            other => {
                return Err(CliError::new(
                    USAGE,
                    format!("unsupported stop bits: {other}"),
                ))
            }
        };
        Ok(LineSettings {
            baud: self.baud,
            data_bits,
            parity: self.parity.into(),
            stop_bits,
        })
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Serial device attached to the MCU.
    #[arg(long, short = 'd', env = "UARTLINK_DEVICE")]
    pub device: String,
    #[command(flatten)]
    pub line: LineArgs,
    /// Address to listen on.
    #[arg(long, env = "UARTLINK_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,
    /// Transparent/telnet port.
    #[arg(long, env = "UARTLINK_PORT", default_value_t = 23)]
    pub port: u16,
    /// Port whose sessions reset the MCU into its bootloader.
    #[arg(long, env = "UARTLINK_PROGRAMMING_PORT", default_value_t = 2323)]
    pub programming_port: u16,
    /// Maximum simultaneous TCP sessions.
    #[arg(long, env = "UARTLINK_MAX_SESSIONS", default_value_t = 4)]
    pub max_sessions: usize,
    /// Per-session output queue size in bytes.
    #[arg(long, env = "UARTLINK_TX_BUFFER_SIZE", default_value_t = 2048)]
    pub tx_buffer_size: usize,
    /// How long a session may stay overflowed before it is closed (e.g. 10s).
    #[arg(long, env = "UARTLINK_OVERFLOW_TIMEOUT", default_value = "10s")]
    pub overflow_timeout: String,
    /// Treat all UART input as console text (no SLIP command protocol).
    #[arg(long, env = "UARTLINK_NO_SLIP")]
    pub no_slip: bool,
    /// Do not switch back to console mode on printable text after a stray delimiter.
    #[arg(long, env = "UARTLINK_NO_CONSOLE_SNIFF")]
    pub no_console_sniff: bool,
    /// Longest SLIP packet accepted from the MCU.
    #[arg(long, env = "UARTLINK_MAX_PACKET_LEN", default_value_t = 1024)]
    pub max_packet_len: usize,
    /// Modem line wired to the MCU reset pin.
    #[arg(long, env = "UARTLINK_RESET_LINE", value_enum, default_value = "dtr")]
    pub reset_line: PinLine,
    /// Modem line wired to the MCU ISP/program-select pin.
    #[arg(long, env = "UARTLINK_ISP_LINE", value_enum, default_value = "rts")]
    pub isp_line: PinLine,
    /// Reset hold time of the bootloader entry sequence.
    #[arg(long, env = "UARTLINK_RESET_HOLD", default_value = "1ms")]
    pub reset_hold: String,
    /// ISP hold time before reset is released.
    #[arg(long, env = "UARTLINK_ISP_HOLD", default_value = "1ms")]
    pub isp_hold: String,
    /// Wait after reset release before forwarding bytes.
    #[arg(long, env = "UARTLINK_SETTLE", default_value = "1ms")]
    pub settle: String,
    /// Print the resolved configuration and exit without opening the device.
    #[arg(long)]
    pub print_config: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Serial device to write the packet to.
    #[arg(long, short = 'd', conflicts_with_all = ["tcp", "dry_run"])]
    pub device: Option<String>,
    /// TCP endpoint (host:port) to write the packet to.
    #[arg(long, conflicts_with_all = ["device", "dry_run"])]
    pub tcp: Option<SocketAddr>,
    /// Print the encoded packet instead of sending it.
    #[arg(long)]
    pub dry_run: bool,
    #[command(flatten)]
    pub line: LineArgs,
    /// Command id.
    #[arg(long)]
    pub cmd: u16,
    /// Callback token; non-zero asks for a response.
    #[arg(long, default_value_t = 0)]
    pub value: u32,
    /// Argument as hex bytes; repeat for more arguments.
    #[arg(long = "arg", value_name = "HEX")]
    pub args: Vec<String>,
    /// Wait for the response frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture file; `-` reads stdin.
    #[arg(default_value = "-")]
    pub input: PathBuf,
    /// Input is hex text rather than raw bytes.
    #[arg(long)]
    pub hex: bool,
    /// Do not switch back to console mode on printable text after a stray delimiter.
    #[arg(long)]
    pub no_console_sniff: bool,
}

#[derive(Args, Debug, Default)]
pub struct PortsArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

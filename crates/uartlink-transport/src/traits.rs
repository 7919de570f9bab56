use std::fmt;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            5 => Some(Self::Five),
            6 => Some(Self::Six),
            7 => Some(Self::Seven),
            8 => Some(Self::Eight),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

/// Parity mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    Two,
}

/// Line settings of the UART shared with the MCU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSettings {
    pub baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            baud: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl fmt::Display for LineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        let stop = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        write!(
            f,
            "{} {}{}{}",
            self.baud,
            self.data_bits.bits(),
            parity,
            stop
        )
    }
}

/// The transmit side of the UART attached to the MCU.
///
/// Writes are expected to complete synchronously; the bridge never queues
/// bytes towards the UART.
pub trait UartPort: Write + Send {
    /// Current line settings.
    fn line(&self) -> LineSettings;

    /// Apply new line settings.
    fn set_line(&mut self, line: LineSettings) -> Result<()>;

    /// Change only the baud rate.
    fn set_baud(&mut self, baud: u32) -> Result<()> {
        let line = LineSettings {
            baud,
            ..self.line()
        };
        self.set_line(line)
    }
}

/// In-memory UART that records everything written to it.
///
/// Used for dry runs (encoding a packet without a device) and in tests.
#[derive(Debug, Default, Clone)]
pub struct CaptureUart {
    written: Vec<u8>,
    line: LineSettings,
}

impl CaptureUart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line(line: LineSettings) -> Self {
        Self {
            written: Vec::new(),
            line,
        }
    }

    /// Bytes written so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Take and clear the written bytes.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }
}

impl Write for CaptureUart {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl UartPort for CaptureUart {
    fn line(&self) -> LineSettings {
        self.line
    }

    fn set_line(&mut self, line: LineSettings) -> Result<()> {
        self.line = line;
        Ok(())
    }
}

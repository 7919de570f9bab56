use std::io::{self, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::SerialPort;

use crate::error::{Result, TransportError};
use crate::pins::{ModemLine, ModemLinePins};
use crate::traits::{DataBits, LineSettings, Parity, StopBits, UartPort};

/// Default read timeout of the UART reader thread.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Serial device configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path (`/dev/ttyUSB0`, `COM3`).
    pub device: String,
    pub line: LineSettings,
    /// Modem line wired to the MCU reset pin.
    pub reset_line: ModemLine,
    /// Modem line wired to the MCU ISP/program-select pin.
    pub isp_line: ModemLine,
    /// Poll interval of blocking reads.
    #[serde(with = "crate::duration_ms")]
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            line: LineSettings::default(),
            reset_line: ModemLine::Dtr,
            isp_line: ModemLine::Rts,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl SerialConfig {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }

    pub fn with_line(mut self, line: LineSettings) -> Self {
        self.line = line;
        self
    }
}

/// A `serialport`-backed UART.
pub struct SerialUart {
    port: Box<dyn SerialPort>,
    line: LineSettings,
    config: SerialConfig,
}

impl SerialUart {
    /// Open the device described by `config`.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let line = config.line;
        let port = serialport::new(&config.device, line.baud)
            .data_bits(line.data_bits.into())
            .parity(line.parity.into())
            .stop_bits(line.stop_bits.into())
            .flow_control(serialport::FlowControl::None)
            .timeout(config.read_timeout)
            .open()
            .map_err(|source| TransportError::Open {
                device: config.device.clone(),
                source,
            })?;

        tracing::debug!(device = %config.device, %line, "serial device opened");
        Ok(Self {
            port,
            line,
            config: config.clone(),
        })
    }

    /// A second handle on the same device for the blocking reader thread.
    pub fn reader(&self) -> Result<Box<dyn SerialPort>> {
        Ok(self.port.try_clone()?)
    }

    /// Reset/ISP pins driven through this device's modem lines.
    pub fn pins(&self) -> Result<ModemLinePins> {
        Ok(ModemLinePins::new(
            self.port.try_clone()?,
            self.config.reset_line,
            self.config.isp_line,
        ))
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl std::fmt::Debug for SerialUart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialUart")
            .field("device", &self.config.device)
            .field("line", &self.line)
            .finish()
    }
}

impl Write for SerialUart {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl UartPort for SerialUart {
    fn line(&self) -> LineSettings {
        self.line
    }

    fn set_line(&mut self, line: LineSettings) -> Result<()> {
        if let Err(err) = apply_line(&mut self.port, &mut self.line, line) {
            tracing::warn!(
                device = %self.config.device,
                requested = %line,
                applied = %self.line,
                error = %err,
                "line settings partly applied"
            );
            return Err(err);
        }
        tracing::info!(device = %self.config.device, %line, "line settings changed");
        Ok(())
    }
}

/// The line setters of a serial device.
trait LineControl {
    fn set_baud_rate(&mut self, baud: u32) -> serialport::Result<()>;
    fn set_data_bits(&mut self, bits: serialport::DataBits) -> serialport::Result<()>;
    fn set_parity(&mut self, parity: serialport::Parity) -> serialport::Result<()>;
    fn set_stop_bits(&mut self, stop: serialport::StopBits) -> serialport::Result<()>;
}

impl LineControl for Box<dyn SerialPort> {
    fn set_baud_rate(&mut self, baud: u32) -> serialport::Result<()> {
        SerialPort::set_baud_rate(self.as_mut(), baud)
    }

    fn set_data_bits(&mut self, bits: serialport::DataBits) -> serialport::Result<()> {
        SerialPort::set_data_bits(self.as_mut(), bits)
    }

    fn set_parity(&mut self, parity: serialport::Parity) -> serialport::Result<()> {
        SerialPort::set_parity(self.as_mut(), parity)
    }

    fn set_stop_bits(&mut self, stop: serialport::StopBits) -> serialport::Result<()> {
        SerialPort::set_stop_bits(self.as_mut(), stop)
    }
}

/// Change each field of `current` that differs from `line`.
///
/// `current` follows the device: a field is updated as soon as its setter
/// succeeds, so after a failure it still describes what the port runs at.
fn apply_line<C: LineControl>(
    port: &mut C,
    current: &mut LineSettings,
    line: LineSettings,
) -> Result<()> {
    if line.baud != current.baud {
        port.set_baud_rate(line.baud)?;
        current.baud = line.baud;
    }
    if line.data_bits != current.data_bits {
        port.set_data_bits(line.data_bits.into())?;
        current.data_bits = line.data_bits;
    }
    if line.parity != current.parity {
        port.set_parity(line.parity.into())?;
        current.parity = line.parity;
    }
    if line.stop_bits != current.stop_bits {
        port.set_stop_bits(line.stop_bits.into())?;
        current.stop_bits = line.stop_bits;
    }
    Ok(())
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(stop: StopBits) -> Self {
        match stop {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

use serde::{Deserialize, Serialize};
use serialport::SerialPort;

use crate::error::Result;

/// Electrical level of an MCU control output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    High,
}

/// Reset and ISP (program-select) outputs wired to the MCU.
///
/// Both lines are active-low: `Level::Low` on reset holds the MCU in reset,
/// `Level::Low` on ISP selects the bootloader.
pub trait McuPins: Send {
    fn set_reset(&mut self, level: Level) -> Result<()>;
    fn set_isp(&mut self, level: Level) -> Result<()>;
}

/// Modem-control output of a serial adapter that can drive an MCU pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModemLine {
    Dtr,
    Rts,
    /// Not wired.
    None,
}

/// Drives reset and ISP through the DTR/RTS outputs of a serial adapter.
///
/// This is the usual USB-serial auto-reset wiring: an asserted modem line
/// pulls the MCU pin low.
pub struct ModemLinePins {
    port: Box<dyn SerialPort>,
    reset: ModemLine,
    isp: ModemLine,
}

impl ModemLinePins {
    /// Wrap a (usually cloned) serial handle.
    pub fn new(port: Box<dyn SerialPort>, reset: ModemLine, isp: ModemLine) -> Self {
        Self { port, reset, isp }
    }

    fn drive(&mut self, line: ModemLine, level: Level) -> Result<()> {
        let asserted = level == Level::Low;
        match line {
            ModemLine::Dtr => self.port.write_data_terminal_ready(asserted)?,
            ModemLine::Rts => self.port.write_request_to_send(asserted)?,
            ModemLine::None => {}
        }
        Ok(())
    }
}

impl std::fmt::Debug for ModemLinePins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModemLinePins")
            .field("port", &self.port.name())
            .field("reset", &self.reset)
            .field("isp", &self.isp)
            .finish()
    }
}

impl McuPins for ModemLinePins {
    fn set_reset(&mut self, level: Level) -> Result<()> {
        tracing::trace!(?level, line = ?self.reset, "reset line");
        self.drive(self.reset, level)
    }

    fn set_isp(&mut self, level: Level) -> Result<()> {
        tracing::trace!(?level, line = ?self.isp, "isp line");
        self.drive(self.isp, level)
    }
}

/// Pins that are not wired to anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPins;

impl McuPins for NoPins {
    fn set_reset(&mut self, _level: Level) -> Result<()> {
        Ok(())
    }

    fn set_isp(&mut self, _level: Level) -> Result<()> {
        Ok(())
    }
}

/// A single pin transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "pin", content = "level", rename_all = "lowercase")]
pub enum PinEvent {
    Reset(Level),
    Isp(Level),
}

/// Pins that record every transition in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingPins {
    events: Vec<PinEvent>,
}

impl RecordingPins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[PinEvent] {
        &self.events
    }

    pub fn take(&mut self) -> Vec<PinEvent> {
        std::mem::take(&mut self.events)
    }
}

impl McuPins for RecordingPins {
    fn set_reset(&mut self, level: Level) -> Result<()> {
        self.events.push(PinEvent::Reset(level));
        Ok(())
    }

    fn set_isp(&mut self, level: Level) -> Result<()> {
        self.events.push(PinEvent::Isp(level));
        Ok(())
    }
}

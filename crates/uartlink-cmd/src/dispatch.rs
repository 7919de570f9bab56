use std::io::Write;

use serde::Serialize;

use crate::callbacks::CallbackRegistry;
use crate::error::{wire_u16, CmdError, Result};
use crate::handlers::register_core;
use crate::packet::{CommandPacket, Request};
use crate::response::{body_len_field, response_body, response_end, response_start};
use crate::table::CommandTable;

/// Why a packet never reached a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Shorter than the header plus CRC.
    TooShort,
    /// CRC16 mismatch.
    BadChecksum,
    /// The declared arguments run past the end of the packet.
    ArgOverrun,
    /// No handler registered for the command id.
    UnknownCommand,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TooShort => "too_short",
            Self::BadChecksum => "bad_checksum",
            Self::ArgOverrun => "arg_overrun",
            Self::UnknownCommand => "unknown_command",
        }
    }
}

/// Result of dispatching one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Executed { cmd: u16, ret: u32, responded: bool },
    Dropped { reason: DropReason },
}

impl DispatchOutcome {
    pub fn dropped(reason: DropReason) -> Self {
        Self::Dropped { reason }
    }
}

/// Runs request packets against a command table.
///
/// Dispatch is synchronous: the handler runs to completion and its response
/// is written before `dispatch` returns.
#[derive(Debug, Default)]
pub struct Dispatcher {
    table: CommandTable,
    callbacks: CallbackRegistry,
}

impl Dispatcher {
    pub fn new(table: CommandTable) -> Self {
        Self {
            table,
            callbacks: CallbackRegistry::new(),
        }
    }

    /// A dispatcher with the built-in core commands registered.
    pub fn with_core_commands() -> Result<Self> {
        let mut table = CommandTable::new();
        register_core(&mut table)?;
        Ok(Self::new(table))
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Register further commands.
    pub fn table_mut(&mut self) -> &mut CommandTable {
        &mut self.table
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Validate and execute one packet (CRC attached, as the framer emits it).
    ///
    /// A response is written to `uart` when the packet's value field is
    /// non-zero. Dropped packets produce no output.
    pub fn dispatch<W: Write + ?Sized>(&mut self, packet: &[u8], uart: &mut W) -> DispatchOutcome {
        let parsed = match CommandPacket::parse(packet) {
            Ok(parsed) => parsed,
            Err(reason) => {
                tracing::debug!(len = packet.len(), reason = reason.as_str(), "packet dropped");
                return DispatchOutcome::dropped(reason);
            }
        };
        let header = parsed.header;

        let Some(entry) = self.table.get_mut(header.cmd) else {
            tracing::debug!(cmd = header.cmd, "unknown command");
            return DispatchOutcome::dropped(DropReason::UnknownCommand);
        };

        let mut req = Request {
            header,
            args: parsed.args(),
            callbacks: &mut self.callbacks,
        };
        let ret = entry.call(&mut req);
        tracing::debug!(cmd = header.cmd, name = %entry.name, argc = header.argc, ret, "command executed");

        let mut responded = false;
        if header.wants_response() {
            match write_response(uart, header.cmd, header.value, ret, &[]) {
                Ok(()) => responded = true,
                Err(err) => tracing::warn!(cmd = header.cmd, error = %err, "response write failed"),
            }
        }

        DispatchOutcome::Executed {
            cmd: header.cmd,
            ret,
            responded,
        }
    }

    /// Push an unsolicited response to the callback the MCU registered as
    /// `name`.
    pub fn notify_named<W: Write + ?Sized>(
        &self,
        name: &str,
        cmd: u16,
        ret: u32,
        bodies: &[&[u8]],
        uart: &mut W,
    ) -> Result<()> {
        let token = self
            .callbacks
            .get(name)
            .ok_or_else(|| CmdError::UnknownCallback(name.to_owned()))?;
        write_response(uart, cmd, token, ret, bodies)
    }
}

/// Write a complete response frame with the given body chunks.
pub fn write_response<W: Write + ?Sized>(
    uart: &mut W,
    cmd: u16,
    callback: u32,
    ret: u32,
    bodies: &[&[u8]],
) -> Result<()> {
    let argc = wire_u16("response body count", bodies.len())?;
    for body in bodies {
        body_len_field(body)?;
    }
    let mut crc = response_start(uart, cmd, callback, ret, argc)?;
    for body in bodies {
        crc = response_body(uart, crc, body)?;
    }
    response_end(uart, crc)
}

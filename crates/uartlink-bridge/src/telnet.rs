//! Telnet (RFC 854) unwrapping and RFC 2217 COM-PORT-OPTION handling.

use bytes::{BufMut, Bytes, BytesMut};
use uartlink_transport::{DataBits, Level, LineSettings, McuPins, Parity, StopBits, UartPort};

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;

pub const OPT_BINARY: u8 = 0;
pub const OPT_SGA: u8 = 3;
pub const OPT_COM_PORT: u8 = 44;

pub const SET_BAUDRATE: u8 = 1;
pub const SET_DATASIZE: u8 = 2;
pub const SET_PARITY: u8 = 3;
pub const SET_STOPSIZE: u8 = 4;
pub const SET_CONTROL: u8 = 5;
pub const PURGE_DATA: u8 = 12;

/// Server replies use the client command code plus this offset.
pub const SERVER_OFFSET: u8 = 100;

const CONTROL_DTR_ON: u8 = 8;
const CONTROL_DTR_OFF: u8 = 9;
const CONTROL_RTS_ON: u8 = 11;
const CONTROL_RTS_OFF: u8 = 12;

/// Parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnetState {
    Normal,
    Iac,
    Nego,
    Sb,
    ComPort,
    Baudrate,
    Datasize,
    Parity,
    Stopsize,
    Control,
    Purge,
    /// Skipping to the `IAC SE` that ends a sub-negotiation.
    WaitIac,
    /// IAC seen while skipping. `SE` ends the sub-negotiation, a second IAC
    /// is an escaped data byte and skipping goes on.
    SbIac,
}

/// A decoded COM-PORT-OPTION command. A zero value asks for the current
/// setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComPortRequest {
    SetBaud(u32),
    SetDataSize(u8),
    SetParity(u8),
    SetStopSize(u8),
    SetControl(u8),
    Purge(u8),
}

impl ComPortRequest {
    /// Client command code.
    pub fn command(self) -> u8 {
        match self {
            Self::SetBaud(_) => SET_BAUDRATE,
            Self::SetDataSize(_) => SET_DATASIZE,
            Self::SetParity(_) => SET_PARITY,
            Self::SetStopSize(_) => SET_STOPSIZE,
            Self::SetControl(_) => SET_CONTROL,
            Self::Purge(_) => PURGE_DATA,
        }
    }
}

/// Output of the parser, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetEvent {
    /// Payload bytes for the UART.
    Data(Bytes),
    /// Bytes to send back to the telnet client.
    Reply(Bytes),
    ComPort(ComPortRequest),
}

/// Byte-at-a-time telnet parser owned by a telnet session.
#[derive(Debug)]
pub struct TelnetParser {
    state: TelnetState,
    verb: u8,
    baud: [u8; 4],
    baud_len: usize,
    data: BytesMut,
}

impl Default for TelnetParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TelnetParser {
    pub fn new() -> Self {
        Self {
            state: TelnetState::Normal,
            verb: 0,
            baud: [0; 4],
            baud_len: 0,
            data: BytesMut::new(),
        }
    }

    pub fn state(&self) -> TelnetState {
        self.state
    }

    /// Parse one TCP payload.
    pub fn feed(&mut self, input: &[u8]) -> Vec<TelnetEvent> {
        let mut events = Vec::new();
        for &byte in input {
            self.step(byte, &mut events);
        }
        self.flush_data(&mut events);
        events
    }

    fn step(&mut self, byte: u8, events: &mut Vec<TelnetEvent>) {
        use TelnetState::*;

        self.state = match self.state {
            Normal => {
                if byte == IAC {
                    Iac
                } else {
                    self.data.put_u8(byte);
                    Normal
                }
            }
            Iac => match byte {
                IAC => {
                    self.data.put_u8(IAC);
                    Normal
                }
                WILL | WONT | DO | DONT => {
                    self.verb = byte;
                    Nego
                }
                SB => Sb,
                _ => Normal,
            },
            Nego => {
                if let Some(reply) = negotiation_reply(self.verb, byte) {
                    self.flush_data(events);
                    events.push(TelnetEvent::Reply(Bytes::copy_from_slice(&reply)));
                }
                Normal
            }
            Sb => {
                if byte == OPT_COM_PORT {
                    ComPort
                } else {
                    WaitIac
                }
            }
            ComPort => match byte {
                SET_BAUDRATE => {
                    self.baud_len = 0;
                    Baudrate
                }
                SET_DATASIZE => Datasize,
                SET_PARITY => Parity,
                SET_STOPSIZE => Stopsize,
                SET_CONTROL => Control,
                PURGE_DATA => Purge,
                _ => WaitIac,
            },
            Baudrate => {
                self.baud[self.baud_len] = byte;
                self.baud_len += 1;
                if self.baud_len < self.baud.len() {
                    Baudrate
                } else {
                    let baud = u32::from_be_bytes(self.baud);
                    self.push_request(ComPortRequest::SetBaud(baud), events);
                    WaitIac
                }
            }
            Datasize => self.leaf(ComPortRequest::SetDataSize(byte), events),
            Parity => self.leaf(ComPortRequest::SetParity(byte), events),
            Stopsize => self.leaf(ComPortRequest::SetStopSize(byte), events),
            Control => self.leaf(ComPortRequest::SetControl(byte), events),
            Purge => self.leaf(ComPortRequest::Purge(byte), events),
            WaitIac => {
                if byte == IAC {
                    SbIac
                } else {
                    WaitIac
                }
            }
            SbIac => {
                if byte == SE {
                    Normal
                } else {
                    WaitIac
                }
            }
        };
    }

    fn leaf(&mut self, request: ComPortRequest, events: &mut Vec<TelnetEvent>) -> TelnetState {
        self.push_request(request, events);
        TelnetState::WaitIac
    }

    fn push_request(&mut self, request: ComPortRequest, events: &mut Vec<TelnetEvent>) {
        self.flush_data(events);
        events.push(TelnetEvent::ComPort(request));
    }

    fn flush_data(&mut self, events: &mut Vec<TelnetEvent>) {
        if !self.data.is_empty() {
            events.push(TelnetEvent::Data(self.data.split().freeze()));
        }
    }
}

fn is_supported_option(option: u8) -> bool {
    matches!(option, OPT_BINARY | OPT_SGA | OPT_COM_PORT)
}

/// Answer to `IAC <verb> <option>`. Enabling is agreed to for supported
/// options only; disabling is always acknowledged.
pub fn negotiation_reply(verb: u8, option: u8) -> Option<[u8; 3]> {
    let known = is_supported_option(option);
    let answer = match verb {
        DO if known => WILL,
        DO => WONT,
        WILL if known => DO,
        WILL => DONT,
        DONT => WONT,
        WONT => DONT,
        _ => return None,
    };
    Some([IAC, answer, option])
}

/// `IAC SB COM-PORT <command+100> <value> IAC SE`, with IAC doubled in the
/// value.
pub fn comport_reply(command: u8, value: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(value.len() * 2 + 6);
    out.put_slice(&[IAC, SB, OPT_COM_PORT, command + SERVER_OFFSET]);
    escape_iac_into(value, &mut out);
    out.put_slice(&[IAC, SE]);
    out.freeze()
}

/// Double every IAC so UART output cannot be read as a telnet command.
pub fn escape_iac(data: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(data.len() + 8);
    escape_iac_into(data, &mut out);
    out.freeze()
}

fn escape_iac_into(data: &[u8], out: &mut BytesMut) {
    for &byte in data {
        if byte == IAC {
            out.put_slice(&[IAC, IAC]);
        } else {
            out.put_u8(byte);
        }
    }
}

fn parity_code(parity: Parity) -> u8 {
    match parity {
        Parity::None => 1,
        Parity::Odd => 2,
        Parity::Even => 3,
    }
}

fn stop_code(stop: StopBits) -> u8 {
    match stop {
        StopBits::One => 1,
        StopBits::Two => 2,
    }
}

/// Carry out a COM-PORT request and build the acknowledgement.
///
/// Values the UART cannot take (mark/space parity, 1.5 stop bits, odd data
/// sizes) are answered with the current setting.
pub fn apply_comport<U, P>(request: ComPortRequest, uart: &mut U, pins: &mut P) -> Bytes
where
    U: UartPort + ?Sized,
    P: McuPins + ?Sized,
{
    let current = uart.line();
    let wanted = match request {
        ComPortRequest::SetBaud(baud) if baud != 0 => Some(LineSettings { baud, ..current }),
        ComPortRequest::SetDataSize(bits) => {
            DataBits::from_bits(bits).map(|data_bits| LineSettings { data_bits, ..current })
        }
        ComPortRequest::SetParity(code) => {
            let parity = match code {
                1 => Some(Parity::None),
                2 => Some(Parity::Odd),
                3 => Some(Parity::Even),
                _ => None,
            };
            parity.map(|parity| LineSettings { parity, ..current })
        }
        ComPortRequest::SetStopSize(code) => {
            let stop_bits = match code {
                1 => Some(StopBits::One),
                2 => Some(StopBits::Two),
                _ => None,
            };
            stop_bits.map(|stop_bits| LineSettings { stop_bits, ..current })
        }
        _ => None,
    };

    if let Some(line) = wanted {
        if line != current {
            if let Err(err) = uart.set_line(line) {
                tracing::warn!(error = %err, %line, "rfc2217 line change failed");
            }
        }
    }

    let line = uart.line();
    match request {
        ComPortRequest::SetBaud(_) => comport_reply(SET_BAUDRATE, &line.baud.to_be_bytes()),
        ComPortRequest::SetDataSize(_) => comport_reply(SET_DATASIZE, &[line.data_bits.bits()]),
        ComPortRequest::SetParity(_) => comport_reply(SET_PARITY, &[parity_code(line.parity)]),
        ComPortRequest::SetStopSize(_) => {
            comport_reply(SET_STOPSIZE, &[stop_code(line.stop_bits)])
        }
        ComPortRequest::SetControl(code) => {
            let result = match code {
                CONTROL_DTR_ON => pins.set_reset(Level::Low),
                CONTROL_DTR_OFF => pins.set_reset(Level::High),
                CONTROL_RTS_ON => pins.set_isp(Level::Low),
                CONTROL_RTS_OFF => pins.set_isp(Level::High),
                _ => Ok(()),
            };
            if let Err(err) = result {
                tracing::warn!(error = %err, code, "rfc2217 control failed");
            }
            comport_reply(SET_CONTROL, &[code])
        }
        ComPortRequest::Purge(code) => comport_reply(PURGE_DATA, &[code]),
    }
}

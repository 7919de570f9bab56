use crate::session::ConnectionMode;
use crate::telnet::{DO, DONT, IAC, SB, WILL, WONT};

/// First payloads that mean "reset the MCU into its bootloader"
/// (avrdude/STK500 sync and the NXP/ARM ISP autobaud character).
pub const RESET_SEQUENCES: [&[u8]; 3] = [b"0 ", b"?\n", b"?\r\n"];

/// Decide a session's mode from its first payload.
///
/// The whole payload must match a reset sequence exactly, so the
/// classifying bytes have to arrive in one TCP segment.
pub fn classify(first: &[u8]) -> ConnectionMode {
    if RESET_SEQUENCES.iter().any(|seq| *seq == first) {
        return ConnectionMode::Programming;
    }
    match first {
        [IAC, verb, ..] if matches!(*verb, WILL | WONT | DO | DONT | SB) => ConnectionMode::Telnet,
        _ => ConnectionMode::Transparent,
    }
}

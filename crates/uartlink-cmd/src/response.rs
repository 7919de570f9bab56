use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};
use uartlink_frame::{crc16_update, escape_into, END};

use crate::error::{wire_u16, CmdError, Result};

/// Response header: cmd (2) + callback (4) + return value (4) + argc (2).
pub const RESPONSE_HEADER_LEN: usize = 12;

/// Body length rounded up to a multiple of four.
pub fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

fn put_tracked(dst: &mut BytesMut, crc: u16, data: &[u8]) -> u16 {
    escape_into(data, dst);
    crc16_update(crc, data)
}

fn start_into(dst: &mut BytesMut, cmd: u16, callback: u32, ret: u32, argc: u16) -> u16 {
    dst.put_u8(END);
    let mut crc = put_tracked(dst, 0, &cmd.to_le_bytes());
    crc = put_tracked(dst, crc, &callback.to_le_bytes());
    crc = put_tracked(dst, crc, &ret.to_le_bytes());
    put_tracked(dst, crc, &argc.to_le_bytes())
}

/// Padded length prefix of a body chunk.
pub(crate) fn body_len_field(data: &[u8]) -> Result<u16> {
    wire_u16("response body length", padded_len(data.len()))
}

fn body_into(dst: &mut BytesMut, crc: u16, data: &[u8], padded: u16) -> u16 {
    let mut crc = put_tracked(dst, crc, &padded.to_le_bytes());
    crc = put_tracked(dst, crc, data);
    let pad = [0u8; 3];
    put_tracked(dst, crc, &pad[..usize::from(padded) - data.len()])
}

fn end_into(dst: &mut BytesMut, crc: u16) {
    escape_into(&crc.to_le_bytes(), dst);
    dst.put_u8(END);
}

/// Open a response frame on `uart`. Returns the running CRC.
pub fn response_start<W: Write + ?Sized>(
    uart: &mut W,
    cmd: u16,
    callback: u32,
    ret: u32,
    argc: u16,
) -> Result<u16> {
    let mut buf = BytesMut::with_capacity(2 * RESPONSE_HEADER_LEN + 1);
    let crc = start_into(&mut buf, cmd, callback, ret, argc);
    uart.write_all(&buf)?;
    Ok(crc)
}

/// Append one body chunk, zero-padded to a multiple of four.
///
/// The length prefix carries the padded length; padding is covered by the
/// CRC. A chunk whose padded length exceeds `u16::MAX` is rejected before
/// anything is written.
pub fn response_body<W: Write + ?Sized>(uart: &mut W, crc: u16, data: &[u8]) -> Result<u16> {
    let padded = body_len_field(data)?;
    let mut buf = BytesMut::with_capacity(2 * (data.len() + 6));
    let crc = body_into(&mut buf, crc, data, padded);
    uart.write_all(&buf)?;
    Ok(crc)
}

/// Close the frame with the CRC and the delimiter.
pub fn response_end<W: Write + ?Sized>(uart: &mut W, crc: u16) -> Result<()> {
    let mut buf = BytesMut::with_capacity(5);
    end_into(&mut buf, crc);
    uart.write_all(&buf)?;
    uart.flush()?;
    Ok(())
}

/// A complete response frame in one buffer.
pub fn encode_response(cmd: u16, callback: u32, ret: u32, bodies: &[&[u8]]) -> Result<Bytes> {
    let argc = wire_u16("response body count", bodies.len())?;
    let lens = bodies
        .iter()
        .map(|body| body_len_field(body))
        .collect::<Result<Vec<_>>>()?;
    let mut buf = BytesMut::new();
    let mut crc = start_into(&mut buf, cmd, callback, ret, argc);
    for (body, padded) in bodies.iter().zip(lens) {
        crc = body_into(&mut buf, crc, body, padded);
    }
    end_into(&mut buf, crc);
    Ok(buf.freeze())
}

/// A decoded response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub cmd: u16,
    pub callback: u32,
    pub ret: u32,
    /// Body chunks including their zero padding.
    pub bodies: Vec<Bytes>,
    pub crc: u16,
}

impl ResponseFrame {
    /// Decode an un-escaped frame (as produced by the framer).
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if packet.len() < RESPONSE_HEADER_LEN + 2 {
            return Err(CmdError::InvalidResponse(format!(
                "{} bytes is shorter than a response header",
                packet.len()
            )));
        }
        let (body, trailer) = packet.split_at(packet.len() - 2);
        let crc = u16::from_le_bytes([trailer[0], trailer[1]]);
        let computed = crc16_update(0, body);
        if computed != crc {
            return Err(CmdError::InvalidResponse(format!(
                "crc mismatch: frame has {crc:#06x}, computed {computed:#06x}"
            )));
        }

        let cmd = u16::from_le_bytes([body[0], body[1]]);
        let callback = u32::from_le_bytes([body[2], body[3], body[4], body[5]]);
        let ret = u32::from_le_bytes([body[6], body[7], body[8], body[9]]);
        let argc = u16::from_le_bytes([body[10], body[11]]);

        let mut rest = &body[RESPONSE_HEADER_LEN..];
        let mut bodies = Vec::with_capacity(usize::from(argc));
        for index in 0..argc {
            if rest.len() < 2 {
                return Err(CmdError::InvalidResponse(format!(
                    "body {index} length prefix missing"
                )));
            }
            let len = usize::from(u16::from_le_bytes([rest[0], rest[1]]));
            let chunk = rest.get(2..2 + len).ok_or_else(|| {
                CmdError::InvalidResponse(format!("body {index} runs past the frame"))
            })?;
            bodies.push(Bytes::copy_from_slice(chunk));
            rest = &rest[2 + len..];
        }
        if !rest.is_empty() {
            return Err(CmdError::InvalidResponse(format!(
                "{} trailing bytes after bodies",
                rest.len()
            )));
        }

        Ok(Self {
            cmd,
            callback,
            ret,
            bodies,
            crc,
        })
    }
}

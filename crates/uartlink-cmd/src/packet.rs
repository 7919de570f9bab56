use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use uartlink_frame::{crc16, crc16_update, encode_packet};

use crate::callbacks::CallbackRegistry;
use crate::dispatch::DropReason;
use crate::error::{self, wire_u16, ArgError};

/// Request header: cmd (2) + argc (2) + value (4).
pub const HEADER_LEN: usize = 8;

/// Trailing CRC16.
pub const CRC_LEN: usize = 2;

/// Fixed request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PacketHeader {
    pub cmd: u16,
    pub argc: u16,
    /// Callback token, or 0 when no response is wanted.
    pub value: u32,
}

impl PacketHeader {
    /// Decode the header from the start of `body`.
    pub fn parse(body: &[u8]) -> Option<Self> {
        if body.len() < HEADER_LEN {
            return None;
        }
        Some(Self {
            cmd: u16::from_le_bytes([body[0], body[1]]),
            argc: u16::from_le_bytes([body[2], body[3]]),
            value: u32::from_le_bytes([body[4], body[5], body[6], body[7]]),
        })
    }

    pub fn wants_response(&self) -> bool {
        self.value != 0
    }
}

/// A validated request packet borrowing the framer's buffer.
#[derive(Debug, Clone, Copy)]
pub struct CommandPacket<'a> {
    pub header: PacketHeader,
    args: &'a [u8],
}

impl<'a> CommandPacket<'a> {
    /// Validate a raw packet (CRC included) as it came out of the framer.
    ///
    /// Checks run in order: length, CRC, argument bounds.
    pub fn parse(packet: &'a [u8]) -> Result<Self, DropReason> {
        if packet.len() < HEADER_LEN + CRC_LEN {
            return Err(DropReason::TooShort);
        }
        let (body, trailer) = packet.split_at(packet.len() - CRC_LEN);
        let received = u16::from_le_bytes([trailer[0], trailer[1]]);
        if crc16(body) != received {
            return Err(DropReason::BadChecksum);
        }

        let header = PacketHeader::parse(body).ok_or(DropReason::TooShort)?;
        let args = &body[HEADER_LEN..];
        let mut cursor = ArgCursor::new(args, header.argc);
        for _ in 0..header.argc {
            cursor.skip_arg().map_err(|_| DropReason::ArgOverrun)?;
        }

        Ok(Self { header, args })
    }

    /// A fresh cursor over the arguments.
    pub fn args(&self) -> ArgCursor<'a> {
        ArgCursor::new(self.args, self.header.argc)
    }
}

/// Strictly ordered reader over a packet's arguments.
///
/// Every pop checks both the argument count and the packet bounds, so a
/// handler can never read past the packet whatever `argc` claims.
#[derive(Debug, Clone)]
pub struct ArgCursor<'a> {
    data: &'a [u8],
    pos: usize,
    argc: u16,
    consumed: u16,
}

impl<'a> ArgCursor<'a> {
    pub fn new(data: &'a [u8], argc: u16) -> Self {
        Self {
            data,
            pos: 0,
            argc,
            consumed: 0,
        }
    }

    /// Declared argument count.
    pub fn argc(&self) -> u16 {
        self.argc
    }

    /// Arguments not yet consumed.
    pub fn remaining(&self) -> u16 {
        self.argc - self.consumed
    }

    /// Declared length of the next argument.
    pub fn next_arg_len(&self) -> Result<usize, ArgError> {
        if self.consumed >= self.argc {
            return Err(ArgError::Exhausted);
        }
        let prefix = self
            .data
            .get(self.pos..self.pos + 2)
            .ok_or(ArgError::Truncated)?;
        Ok(usize::from(u16::from_le_bytes([prefix[0], prefix[1]])))
    }

    /// Next argument without copying.
    pub fn pop_arg_bytes(&mut self) -> Result<&'a [u8], ArgError> {
        let len = self.next_arg_len()?;
        let start = self.pos + 2;
        let data = self
            .data
            .get(start..start + len)
            .ok_or(ArgError::Truncated)?;
        self.pos = start + len;
        self.consumed += 1;
        Ok(data)
    }

    /// Copy the next argument into `dst`, which must be exactly its length.
    ///
    /// On a length mismatch the cursor does not move.
    pub fn pop_arg(&mut self, dst: &mut [u8]) -> Result<(), ArgError> {
        let len = self.next_arg_len()?;
        if len != dst.len() {
            return Err(ArgError::LengthMismatch {
                expected: dst.len(),
                actual: len,
            });
        }
        let data = self.pop_arg_bytes()?;
        dst.copy_from_slice(data);
        Ok(())
    }

    /// Advance past the next argument.
    pub fn skip_arg(&mut self) -> Result<(), ArgError> {
        self.pop_arg_bytes().map(|_| ())
    }

    pub fn pop_u8(&mut self) -> Result<u8, ArgError> {
        let mut buf = [0u8; 1];
        self.pop_arg(&mut buf)?;
        Ok(buf[0])
    }

    pub fn pop_u16(&mut self) -> Result<u16, ArgError> {
        let mut buf = [0u8; 2];
        self.pop_arg(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn pop_u32(&mut self) -> Result<u32, ArgError> {
        let mut buf = [0u8; 4];
        self.pop_arg(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
}

/// What a handler sees of a request.
pub struct Request<'a> {
    pub header: PacketHeader,
    pub args: ArgCursor<'a>,
    /// Named callbacks registered by the MCU.
    pub callbacks: &'a mut CallbackRegistry,
}

impl Request<'_> {
    pub fn cmd(&self) -> u16 {
        self.header.cmd
    }

    pub fn value(&self) -> u32 {
        self.header.value
    }
}

/// Builds request packets, as the MCU would send them.
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    cmd: u16,
    value: u32,
    args: Vec<Bytes>,
}

impl RequestBuilder {
    pub fn new(cmd: u16) -> Self {
        Self {
            cmd,
            ..Self::default()
        }
    }

    /// Callback token; non-zero asks for a response.
    pub fn value(mut self, value: u32) -> Self {
        self.value = value;
        self
    }

    pub fn arg(mut self, data: impl Into<Bytes>) -> Self {
        self.args.push(data.into());
        self
    }

    /// Un-escaped packet with its CRC appended.
    ///
    /// Fails when there are more than `u16::MAX` arguments or one of them is
    /// longer than `u16::MAX` bytes.
    pub fn payload(&self) -> error::Result<BytesMut> {
        let argc = wire_u16("request argument count", self.args.len())?;
        let args_len: usize = self.args.iter().map(|a| 2 + a.len()).sum();
        let mut buf = BytesMut::with_capacity(HEADER_LEN + args_len + CRC_LEN);
        buf.put_u16_le(self.cmd);
        buf.put_u16_le(argc);
        buf.put_u32_le(self.value);
        for arg in &self.args {
            buf.put_u16_le(wire_u16("request argument length", arg.len())?);
            buf.put_slice(arg);
        }
        let crc = crc16_update(0, &buf);
        buf.put_u16_le(crc);
        Ok(buf)
    }

    /// Delimited, escaped packet ready for the wire.
    pub fn encode(&self, dst: &mut BytesMut) -> error::Result<()> {
        encode_packet(&self.payload()?, dst);
        Ok(())
    }

    pub fn to_wire(&self) -> error::Result<Bytes> {
        let mut dst = BytesMut::new();
        self.encode(&mut dst)?;
        Ok(dst.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CmdError;

    fn args(list: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for arg in list {
            out.extend_from_slice(&(arg.len() as u16).to_le_bytes());
            out.extend_from_slice(arg);
        }
        out
    }

    #[test]
    fn pop_arg_exact_length() {
        let data = args(&[b"abcd", b"xy"]);
        let mut cursor = ArgCursor::new(&data, 2);

        let mut first = [0u8; 4];
        cursor.pop_arg(&mut first).unwrap();
        assert_eq!(&first, b"abcd");
        assert_eq!(cursor.remaining(), 1);
        assert_eq!(cursor.pop_arg_bytes().unwrap(), b"xy");
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn length_mismatch_does_not_advance() {
        let data = args(&[b"abcd"]);
        let mut cursor = ArgCursor::new(&data, 1);

        let mut wrong = [0u8; 3];
        assert_eq!(
            cursor.pop_arg(&mut wrong),
            Err(ArgError::LengthMismatch {
                expected: 3,
                actual: 4
            })
        );
        assert_eq!(cursor.remaining(), 1);

        let mut right = [0u8; 4];
        cursor.pop_arg(&mut right).unwrap();
        assert_eq!(&right, b"abcd");
    }

    #[test]
    fn popping_past_argc_always_fails() {
        let data = args(&[b"a"]);
        let mut cursor = ArgCursor::new(&data, 1);
        cursor.skip_arg().unwrap();
        for _ in 0..3 {
            assert_eq!(cursor.skip_arg(), Err(ArgError::Exhausted));
            assert_eq!(cursor.pop_u8(), Err(ArgError::Exhausted));
        }
    }

    #[test]
    fn argc_larger_than_data_is_truncated() {
        let data = args(&[b"a"]);
        let mut cursor = ArgCursor::new(&data, 5);
        cursor.skip_arg().unwrap();
        assert_eq!(cursor.next_arg_len(), Err(ArgError::Truncated));
    }

    #[test]
    fn body_past_end_is_truncated() {
        let mut data = args(&[b"abcdef"]);
        data.truncate(5);
        let mut cursor = ArgCursor::new(&data, 1);
        assert_eq!(cursor.pop_arg_bytes(), Err(ArgError::Truncated));
        assert_eq!(cursor.remaining(), 1);
    }

    #[test]
    fn typed_pops_are_little_endian() {
        let data = args(&[&[0x7F], &[0x34, 0x12], &[0x78, 0x56, 0x34, 0x12]]);
        let mut cursor = ArgCursor::new(&data, 3);
        assert_eq!(cursor.pop_u8().unwrap(), 0x7F);
        assert_eq!(cursor.pop_u16().unwrap(), 0x1234);
        assert_eq!(cursor.pop_u32().unwrap(), 0x1234_5678);
    }

    #[test]
    fn builder_layout() {
        let payload = RequestBuilder::new(0x0102).value(7).arg(&b"hi"[..]).payload().unwrap();
        assert_eq!(
            &payload[..12],
            &[0x02, 0x01, 0x01, 0x00, 0x07, 0x00, 0x00, 0x00, 0x02, 0x00, b'h', b'i']
        );
        assert_eq!(payload.len(), 14);
    }

    #[test]
    fn builder_rejects_argument_longer_than_u16() {
        let builder = RequestBuilder::new(40).arg(vec![0u8; 70_000]);
        assert!(matches!(
            builder.payload(),
            Err(CmdError::TooLong { len: 70_000, .. })
        ));
        assert!(builder.to_wire().is_err());

        let max = RequestBuilder::new(40).arg(vec![0u8; usize::from(u16::MAX)]);
        assert_eq!(max.payload().unwrap().len(), HEADER_LEN + 2 + 65_535 + CRC_LEN);
    }

    #[test]
    fn parse_accepts_built_packet() {
        let payload = RequestBuilder::new(40).value(9).arg(vec![1, 2, 3]).payload().unwrap();
        let packet = CommandPacket::parse(&payload).unwrap();
        assert_eq!(
            packet.header,
            PacketHeader {
                cmd: 40,
                argc: 1,
                value: 9
            }
        );
        assert_eq!(packet.args().pop_arg_bytes().unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn parse_rejects_short_packet() {
        let payload = RequestBuilder::new(1).payload().unwrap();
        assert!(matches!(
            CommandPacket::parse(&payload[..payload.len() - 1]),
            Err(DropReason::TooShort)
        ));
    }

    #[test]
    fn parse_rejects_bad_crc() {
        let mut payload = RequestBuilder::new(1).payload().unwrap();
        payload[0] ^= 0x01;
        assert!(matches!(
            CommandPacket::parse(&payload),
            Err(DropReason::BadChecksum)
        ));
    }

    #[test]
    fn parse_rejects_argument_overrun() {
        // argc says 2, only one argument present; CRC is valid.
        let mut body = vec![0x28, 0x00, 0x02, 0x00, 0, 0, 0, 0];
        body.extend_from_slice(&args(&[b"only"]));
        let crc = crc16(&body);
        body.extend_from_slice(&crc.to_le_bytes());
        assert!(matches!(
            CommandPacket::parse(&body),
            Err(DropReason::ArgOverrun)
        ));
    }
}

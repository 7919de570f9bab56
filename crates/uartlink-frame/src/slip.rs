use bytes::{BufMut, BytesMut};

/// Packet delimiter. Opens a packet and closes the previous one.
pub const END: u8 = 0xC0;
/// Escape introducer.
pub const ESC: u8 = 0xDB;
/// Escaped form of [`END`].
pub const ESC_END: u8 = 0xDC;
/// Escaped form of [`ESC`].
pub const ESC_ESC: u8 = 0xDD;

/// Append the escaped form of `src` to `dst`.
pub fn escape_into(src: &[u8], dst: &mut BytesMut) {
    dst.reserve(src.len());
    for &byte in src {
        match byte {
            END => dst.put_slice(&[ESC, ESC_END]),
            ESC => dst.put_slice(&[ESC, ESC_ESC]),
            other => dst.put_u8(other),
        }
    }
}

/// Escape `src` into a new buffer.
pub fn escape(src: &[u8]) -> BytesMut {
    let mut dst = BytesMut::with_capacity(src.len() + src.len() / 8);
    escape_into(src, &mut dst);
    dst
}

/// Undo [`escape`].
///
/// An escape followed by anything other than `ESC_END`/`ESC_ESC` yields that
/// byte unchanged; a trailing lone escape is dropped.
pub fn unescape(src: &[u8]) -> BytesMut {
    let mut dst = BytesMut::with_capacity(src.len());
    let mut escaped = false;
    for &byte in src {
        if escaped {
            dst.put_u8(match byte {
                ESC_END => END,
                ESC_ESC => ESC,
                other => other,
            });
            escaped = false;
        } else if byte == ESC {
            escaped = true;
        } else {
            dst.put_u8(byte);
        }
    }
    dst
}

/// Frame `payload` as `END, escape(payload), END`.
///
/// The payload is expected to already carry its CRC.
pub fn encode_packet(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(payload.len() + 2);
    dst.put_u8(END);
    escape_into(payload, dst);
    dst.put_u8(END);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_both_markers() {
        assert_eq!(
            escape(&[0x01, END, 0x02, ESC, 0x03]).as_ref(),
            &[0x01, ESC, ESC_END, 0x02, ESC, ESC_ESC, 0x03]
        );
    }

    #[test]
    fn escaped_output_has_no_delimiter() {
        let all: Vec<u8> = (0..=255).collect();
        assert!(!escape(&all).contains(&END));
    }

    #[test]
    fn unescape_inverts_escape() {
        let all: Vec<u8> = (0..=255).rev().collect();
        assert_eq!(unescape(&escape(&all)).as_ref(), all.as_slice());
    }

    #[test]
    fn unknown_escape_passes_through() {
        assert_eq!(unescape(&[ESC, 0x41, 0x42]).as_ref(), b"AB");
    }

    #[test]
    fn trailing_escape_is_dropped() {
        assert_eq!(unescape(&[0x41, ESC]).as_ref(), b"A");
    }

    #[test]
    fn encode_packet_wraps_in_delimiters() {
        let mut buf = BytesMut::new();
        encode_packet(&[END], &mut buf);
        assert_eq!(buf.as_ref(), &[END, ESC, ESC_END, END]);
    }
}

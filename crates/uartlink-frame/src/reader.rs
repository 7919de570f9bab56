use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use bytes::Bytes;

use crate::error::{FrameError, Result};
use crate::framer::{Framer, FramerConfig, FramerEvent};

const READ_CHUNK_SIZE: usize = 1024;

/// Reads framer events from any blocking `Read` stream.
///
/// Handles partial reads internally; callers always get whole packets.
pub struct FrameReader<T> {
    inner: T,
    framer: Framer,
    pending: VecDeque<FramerEvent>,
}

impl<T: Read> FrameReader<T> {
    /// Create a reader with the default framer configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FramerConfig::default())
    }

    pub fn with_config(inner: T, config: FramerConfig) -> Self {
        Self {
            inner,
            framer: Framer::new(config),
            pending: VecDeque::new(),
        }
    }

    /// Read the next event (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` at EOF. Read timeouts of
    /// the underlying stream surface as `FrameError::Io`.
    pub fn read_event(&mut self) -> Result<FramerEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.pending.extend(self.framer.feed_buf(&chunk[..read]));
        }
    }

    /// Read until the next packet, skipping console text.
    pub fn read_packet(&mut self) -> Result<Bytes> {
        loop {
            match self.read_event()? {
                FramerEvent::PacketReady(packet) => return Ok(packet),
                FramerEvent::ConsoleBytes(text) => {
                    tracing::trace!(len = text.len(), "skipping console text");
                }
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::slip::END;

    #[test]
    fn reads_packets_and_console() {
        let mut wire = b"hi\n".to_vec();
        wire.extend_from_slice(&[END, 0x01, 0x02, END]);

        let mut reader = FrameReader::new(Cursor::new(wire));
        assert_eq!(
            reader.read_event().unwrap(),
            FramerEvent::ConsoleBytes(Bytes::from_static(b"hi\n"))
        );
        assert_eq!(
            reader.read_event().unwrap(),
            FramerEvent::PacketReady(Bytes::from_static(&[0x01, 0x02]))
        );
    }

    #[test]
    fn read_packet_skips_console() {
        let mut wire = vec![END];
        wire.extend_from_slice(b"log line\n");
        wire.extend_from_slice(&[END, 0x07, END]);

        let mut reader = FrameReader::new(Cursor::new(wire));
        assert_eq!(reader.read_packet().unwrap().as_ref(), &[0x07]);
    }

    #[test]
    fn partial_read_handling() {
        let reader = ByteByByteReader {
            bytes: vec![END, 0x09, 0x08, END],
            pos: 0,
        };
        let mut reader = FrameReader::new(reader);
        assert_eq!(reader.read_packet().unwrap().as_ref(), &[0x09, 0x08]);
    }

    #[test]
    fn connection_closed_mid_packet() {
        let mut reader = FrameReader::new(Cursor::new(vec![END, 0x01, 0x02]));
        let err = reader.read_packet().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn timeout_propagates_as_io_error() {
        let mut reader = FrameReader::new(TimesOut);
        let err = reader.read_event().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::TimedOut));
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let _ = reader.get_ref();
        let _ = reader.get_mut();
        let _inner = reader.into_inner();
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct TimesOut;

    impl Read for TimesOut {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::TimedOut))
        }
    }
}

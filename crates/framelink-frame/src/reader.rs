use std::io::{ErrorKind, Read};
use std::sync::Arc;

use bytes::{Buf, BytesMut};

use crate::config::FrameConfig;
use crate::error::{FrameError, Result};
use crate::event::EventSink;
use crate::message::Message;
use crate::parser::Parser;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete messages from any `Read` stream.
///
/// Corrupt or oversized frames are reported to the event sink and skipped;
/// callers only ever see messages that passed every check.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    parser: Parser,
}

impl<T: Read> FrameReader<T> {
    /// Create a reader for the given wire configuration.
    pub fn new(inner: T, config: FrameConfig, events: Arc<dyn EventSink>) -> Result<Self> {
        Ok(Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            parser: Parser::new(config, events)?,
        })
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            while !self.buf.is_empty() {
                let (used, msg) = self.parser.feed(&self.buf);
                self.buf.advance(used);
                if let Some(msg) = msg {
                    return Ok(msg);
                }
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

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Advance the parser's stall timer.
    pub fn tick(&mut self) {
        self.parser.tick();
    }

    /// Borrow the parser.
    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use super::*;
    use crate::checksum::Checksum;
    use crate::composer::Composer;
    use crate::event::{Event, EventQueue};

    fn config() -> FrameConfig {
        FrameConfig {
            checksum: Checksum::Crc16,
            ..FrameConfig::default()
        }
    }

    fn wire(frames: &[(u32, u32, &[u8])]) -> Vec<u8> {
        let mut composer = Composer::new(config(), Vec::new()).unwrap();
        for (id, ty, payload) in frames {
            composer.compose(*id, *ty, payload).unwrap();
        }
        composer.into_sink()
    }

    fn open(bytes: Vec<u8>) -> (FrameReader<Cursor<Vec<u8>>>, Arc<EventQueue>) {
        let events = Arc::new(EventQueue::default());
        let reader = FrameReader::new(Cursor::new(bytes), config(), events.clone()).unwrap();
        (reader, events)
    }

    #[test]
    fn read_multiple_messages() {
        let (mut reader, _) = open(wire(&[
            (0x80, 1, &b"one"[..]),
            (0x81, 2, &b"two"[..]),
            (0x82, 3, &b""[..]),
        ]));

        let m1 = reader.read_message().unwrap();
        let m2 = reader.read_message().unwrap();
        let m3 = reader.read_message().unwrap();

        assert_eq!((m1.msg_type, m1.payload.as_ref()), (1, b"one".as_ref()));
        assert_eq!((m2.msg_type, m2.payload.as_ref()), (2, b"two".as_ref()));
        assert_eq!((m3.frame_id, m3.len()), (0x82, 0));
        assert!(matches!(
            reader.read_message(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn handles_partial_reads() {
        let bytes = wire(&[(0x80, 7, &b"trickle"[..])]);
        let events = Arc::new(EventQueue::default());
        let mut reader = FrameReader::new(OneByte(Cursor::new(bytes)), config(), events).unwrap();

        let msg = reader.read_message().unwrap();
        assert_eq!(msg.payload.as_ref(), b"trickle");
    }

    #[test]
    fn skips_corrupt_frames() {
        let mut bytes = wire(&[(0x80, 1, &b"bad"[..])]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        bytes.extend(wire(&[(0x81, 1, &b"good"[..])]));

        let (mut reader, events) = open(bytes);
        let msg = reader.read_message().unwrap();
        assert_eq!(msg.frame_id, 0x81);
        assert!(matches!(
            events.drain().as_slice(),
            [Event::BodyChecksumMismatch { .. }]
        ));
    }

    #[test]
    fn truncated_stream_reports_closed() {
        let mut bytes = wire(&[(0x80, 1, &b"cut short"[..])]);
        bytes.truncate(6);
        let (mut reader, _) = open(bytes);
        assert!(matches!(
            reader.read_message(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    struct OneByte(Cursor<Vec<u8>>);

    impl Read for OneByte {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(1);
            self.0.read(&mut buf[..len])
        }
    }
}

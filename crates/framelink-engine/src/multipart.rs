use framelink_frame::FrameError;
use tracing::{debug, warn};

use crate::claim::ClaimGuard;
use crate::engine::{Engine, Transmitter};
use crate::error::{EngineError, Result};

/// An in-progress multipart send.
///
/// Holds the transmit claim until [`end`](Self::end) is called or the guard
/// is dropped. The header is already buffered; payload is streamed with
/// [`chunk`](Self::chunk).
pub struct MultipartSend<'a> {
    engine: &'a Engine,
    tx: Option<ClaimGuard<'a, Transmitter>>,
    frame_id: u32,
    has_listener: bool,
}

impl<'a> MultipartSend<'a> {
    pub(crate) fn new(
        engine: &'a Engine,
        tx: ClaimGuard<'a, Transmitter>,
        frame_id: u32,
        has_listener: bool,
    ) -> Self {
        Self {
            engine,
            tx: Some(tx),
            frame_id,
            has_listener,
        }
    }

    /// Frame ID this send was started with.
    pub fn frame_id(&self) -> u32 {
        self.frame_id
    }

    /// Payload length declared in the header.
    pub fn declared_len(&self) -> usize {
        self.tx.as_ref().map_or(0, |tx| tx.composer.declared_len())
    }

    /// Payload bytes written so far.
    pub fn written(&self) -> usize {
        self.tx.as_ref().map_or(0, |tx| tx.composer.written())
    }

    /// Stream the next piece of payload.
    ///
    /// A chunk that would exceed the declared length is rejected whole. A
    /// transport failure aborts the send: the claim is released and any
    /// response listener is removed.
    pub fn chunk(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(tx) = self.tx.as_mut() else {
            return Err(EngineError::MultipartAborted {
                frame_id: self.frame_id,
            });
        };
        match tx.composer.chunk(bytes) {
            Ok(()) => Ok(()),
            Err(FrameError::LengthOverrun {
                declared,
                attempted,
            }) => Err(EngineError::MultipartOverflow {
                declared,
                attempted,
            }),
            Err(err) => {
                self.abort();
                Err(self.engine.report(err.into()))
            }
        }
    }

    /// Append the payload checksum, flush and release the claim.
    ///
    /// If fewer bytes than declared were written, what was written is flushed
    /// without a checksum, the response listener is removed and
    /// `MultipartIncomplete` is returned.
    pub fn end(mut self) -> Result<u32> {
        let Some(mut tx) = self.tx.take() else {
            return Err(EngineError::MultipartAborted {
                frame_id: self.frame_id,
            });
        };

        let declared = tx.composer.declared_len();
        let written = tx.composer.written();
        let result = if written < declared {
            tx.composer.abandon()
        } else {
            tx.composer.end()
        };
        if result.is_err() {
            tx.composer.discard();
        }
        drop(tx);

        if result.is_err() || written < declared {
            self.forget_listener();
        }
        if let Err(err) = result {
            return Err(self.engine.report(err.into()));
        }
        if written < declared {
            return Err(EngineError::MultipartIncomplete { declared, written });
        }

        debug!(frame_id = self.frame_id, len = written, "multipart send finished");
        Ok(self.frame_id)
    }

    /// Drop buffered bytes, release the claim and forget the listener.
    fn abort(&mut self) {
        if let Some(mut tx) = self.tx.take() {
            tx.composer.discard();
        }
        self.forget_listener();
    }

    fn forget_listener(&mut self) {
        if self.has_listener {
            self.engine.remove_id_after_failure(self.frame_id);
            self.has_listener = false;
        }
    }
}

impl Drop for MultipartSend<'_> {
    fn drop(&mut self) {
        let Some(mut tx) = self.tx.take() else {
            return;
        };
        let declared = tx.composer.declared_len();
        let written = tx.composer.written();
        warn!(
            frame_id = self.frame_id,
            written, declared, "multipart send dropped without end"
        );

        // A fully written payload still gets its checksum.
        let complete = written == declared;
        let result = if complete {
            tx.composer.end()
        } else {
            tx.composer.abandon()
        };
        if result.is_err() {
            tx.composer.discard();
        }
        drop(tx);
        if result.is_err() || !complete {
            self.forget_listener();
        }
    }
}

impl std::fmt::Debug for MultipartSend<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartSend")
            .field("frame_id", &self.frame_id)
            .field("declared", &self.declared_len())
            .field("written", &self.written())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use framelink_frame::{sink_fn, Checksum, Composer, FrameConfig, ListenerKind, Message};

    use super::*;
    use crate::config::EngineConfig;
    use crate::listener::{Directive, IdListener};

    fn setup(frame: FrameConfig) -> (Engine, Arc<Mutex<Vec<u8>>>) {
        let wire = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&wire);
        let sink = sink_fn(move |bytes: &[u8]| {
            out.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        });
        let config = EngineConfig {
            frame,
            ..EngineConfig::default()
        };
        (Engine::new(config, sink).unwrap(), wire)
    }

    fn crc_config() -> FrameConfig {
        FrameConfig {
            checksum: Checksum::Crc16,
            send_buf_len: 8,
            ..FrameConfig::default()
        }
    }

    #[test]
    fn chunks_match_single_frame() {
        let (engine, wire) = setup(crc_config());
        let payload: Vec<u8> = (1..=20).collect();

        let mut part = engine.send_multipart(0x44, payload.len()).unwrap();
        for piece in payload.chunks(6) {
            part.chunk(piece).unwrap();
        }
        let frame_id = part.end().unwrap();

        let mut expected = Composer::new(crc_config(), Vec::new()).unwrap();
        expected.compose(frame_id, 0x44, &payload).unwrap();
        assert_eq!(*wire.lock().unwrap(), expected.into_sink());
    }

    #[test]
    fn claim_held_until_end() {
        let (engine, _) = setup(crc_config());
        let part = engine.send_multipart(0x01, 0).unwrap();
        assert!(matches!(
            engine.send_simple(0x02, vec![1]),
            Err(EngineError::ClaimUnavailable)
        ));
        part.end().unwrap();
        engine.send_simple(0x02, vec![1]).unwrap();
    }

    #[test]
    fn overflow_is_rejected_without_writing() {
        let (engine, _) = setup(crc_config());
        let mut part = engine.send_multipart(0x01, 4).unwrap();
        part.chunk(b"abc").unwrap();
        let err = part.chunk(b"de").unwrap_err();
        assert!(matches!(
            err,
            EngineError::MultipartOverflow {
                declared: 4,
                attempted: 5
            }
        ));
        assert_eq!(part.written(), 3);
        part.chunk(b"d").unwrap();
        part.end().unwrap();
    }

    #[test]
    fn short_end_reports_incomplete_and_releases_claim() {
        let (engine, wire) = setup(crc_config());
        let mut part = engine.send_multipart(0x01, 10).unwrap();
        part.chunk(b"abc").unwrap();
        let err = part.end().unwrap_err();
        assert!(matches!(
            err,
            EngineError::MultipartIncomplete {
                declared: 10,
                written: 3
            }
        ));
        assert_eq!(wire.lock().unwrap().len(), crc_config().header_len() + 3);
        engine.send_simple(0x02, Vec::new()).unwrap();
    }

    #[test]
    fn drop_without_end_releases_claim() {
        let (engine, _) = setup(crc_config());
        {
            let mut part = engine.send_multipart(0x01, 2).unwrap();
            part.chunk(b"a").unwrap();
        }
        engine.send_simple(0x02, Vec::new()).unwrap();
    }

    #[test]
    fn respond_multipart_keeps_frame_id() {
        let (engine, wire) = setup(FrameConfig {
            sof_byte: None,
            ..FrameConfig::default()
        });
        let mut part = engine.respond_multipart(0x07, 0x20, 2).unwrap();
        assert_eq!(part.frame_id(), 0x07);
        part.chunk(&[0xAA, 0xBB]).unwrap();
        part.end().unwrap();
        assert_eq!(*wire.lock().unwrap(), vec![0x07, 0x02, 0x20, 0xAA, 0xBB]);
    }

    fn query_listener() -> IdListener {
        IdListener::new(|_, _| Directive::Close)
    }

    #[test]
    fn write_failure_mid_chunk_aborts_send() {
        let writes = Arc::new(Mutex::new(0usize));
        let wire = Arc::new(Mutex::new(Vec::new()));
        let (count, out) = (Arc::clone(&writes), Arc::clone(&wire));
        let sink = sink_fn(move |bytes: &[u8]| {
            let mut count = count.lock().unwrap();
            *count += 1;
            if *count == 2 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link down"));
            }
            out.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        });
        let config = EngineConfig {
            frame: FrameConfig {
                sof_byte: None,
                send_buf_len: 4,
                ..FrameConfig::default()
            },
            ..EngineConfig::default()
        };
        let engine = Engine::new(config, sink).unwrap();

        let msg = Message::new(0x10, Bytes::new());
        let mut part = engine.query_multipart(msg, 6, query_listener()).unwrap();
        let err = part.chunk(&[1, 2, 3, 4, 5, 6]).unwrap_err();
        assert!(matches!(err, EngineError::Frame(FrameError::Io(_))));
        assert_eq!(engine.listener_count(ListenerKind::Id), 0);

        // The claim is free again while the failed guard is still alive.
        engine.send_simple(0x20, Vec::new()).unwrap();
        assert!(matches!(
            part.chunk(&[6]),
            Err(EngineError::MultipartAborted { frame_id: 0x80 })
        ));
        assert!(matches!(
            part.end(),
            Err(EngineError::MultipartAborted { .. })
        ));

        // Header, then the 3-byte empty frame sent after the failure.
        assert_eq!(*wire.lock().unwrap(), vec![0x80, 0x06, 0x10, 0x01, 0x81, 0x00, 0x20]);
    }

    #[test]
    fn short_query_end_removes_listener() {
        let (engine, _) = setup(crc_config());
        let msg = Message::new(0x10, Bytes::new());
        let mut part = engine.query_multipart(msg, 4, query_listener()).unwrap();
        assert_eq!(engine.listener_count(ListenerKind::Id), 1);
        part.chunk(&[1]).unwrap();
        assert!(matches!(
            part.end(),
            Err(EngineError::MultipartIncomplete {
                declared: 4,
                written: 1
            })
        ));
        assert_eq!(engine.listener_count(ListenerKind::Id), 0);
    }

    #[test]
    fn dropped_short_query_removes_listener() {
        let (engine, _) = setup(crc_config());
        {
            let msg = Message::new(0x10, Bytes::new());
            let mut part = engine.query_multipart(msg, 4, query_listener()).unwrap();
            part.chunk(&[1, 2]).unwrap();
        }
        assert_eq!(engine.listener_count(ListenerKind::Id), 0);
    }

    #[test]
    fn dropped_complete_query_is_finished() {
        let (engine, wire) = setup(crc_config());
        let frame_id = {
            let msg = Message::new(0x10, Bytes::new());
            let mut part = engine.query_multipart(msg, 2, query_listener()).unwrap();
            part.chunk(&[1, 2]).unwrap();
            part.frame_id()
        };
        assert_eq!(engine.listener_count(ListenerKind::Id), 1);

        let mut expected = Composer::new(crc_config(), Vec::new()).unwrap();
        expected.compose(frame_id, 0x10, &[1, 2]).unwrap();
        assert_eq!(*wire.lock().unwrap(), expected.into_sink());
    }
}

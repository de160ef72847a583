//! `tokio_util` codec for framing async byte streams.
//!
//! The decoder never fails on bad input: corrupt frames go to the event sink
//! and decoding resumes at the next start of frame.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::composer::Composer;
use crate::config::FrameConfig;
use crate::error::{FrameError, Result};
use crate::event::EventSink;
use crate::id::IdAllocator;
use crate::message::Message;
use crate::parser::Parser;

/// Framed message codec for `FramedRead`/`FramedWrite`.
///
/// Outgoing messages without `is_response` get a freshly allocated frame ID.
#[derive(Debug)]
pub struct FrameCodec {
    parser: Parser,
    composer: Composer<BytesMut>,
    ids: IdAllocator,
}

impl FrameCodec {
    pub fn new(config: FrameConfig, events: Arc<dyn EventSink>) -> Result<Self> {
        Ok(Self {
            ids: IdAllocator::new(&config),
            composer: Composer::new(config.clone(), BytesMut::new())?,
            parser: Parser::new(config, events)?,
        })
    }

    /// Advance the parser's stall timer.
    pub fn tick(&mut self) {
        self.parser.tick();
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        while !src.is_empty() {
            let (used, msg) = self.parser.feed(src);
            src.advance(used);
            if msg.is_some() {
                return Ok(msg);
            }
        }
        Ok(None)
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let frame_id = if item.is_response {
            item.frame_id
        } else {
            self.ids.allocate(0, |_| false)
        };
        self.composer
            .compose(frame_id, item.msg_type, &item.payload)?;
        dst.unsplit(self.composer.sink_mut().split());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::checksum::Checksum;
    use crate::event::EventQueue;

    fn codec() -> FrameCodec {
        let cfg = FrameConfig {
            checksum: Checksum::Crc32,
            ..FrameConfig::default()
        };
        FrameCodec::new(cfg, Arc::new(EventQueue::default())).unwrap()
    }

    #[tokio::test]
    async fn stream_round_trip() {
        let mut writer = FramedWrite::new(Vec::new(), codec());
        writer.send(Message::new(0x10, &b"ping"[..])).await.unwrap();
        writer
            .send(Message::response(0x05, 0x11, &b"pong"[..]))
            .await
            .unwrap();
        let wire = writer.into_inner();

        let mut reader = FramedRead::new(wire.as_slice(), codec());
        let first = reader.next().await.unwrap().unwrap();
        let second = reader.next().await.unwrap().unwrap();

        assert_eq!(first.frame_id, 0x80);
        assert_eq!(first.payload.as_ref(), b"ping");
        assert_eq!(second.frame_id, 0x05);
        assert_eq!(second.msg_type, 0x11);
        assert!(reader.next().await.is_none());
    }

    #[test]
    fn decode_waits_for_complete_frame() {
        let mut enc = codec();
        let mut wire = BytesMut::new();
        enc.encode(Message::new(0x01, &b"partial"[..]), &mut wire)
            .unwrap();
        let tail = wire.split_off(5);

        let mut dec = codec();
        assert!(dec.decode(&mut wire).unwrap().is_none());
        assert!(wire.is_empty());

        let mut tail = tail;
        let msg = dec.decode(&mut tail).unwrap().unwrap();
        assert_eq!(msg.payload.as_ref(), b"partial");
    }
}

//! Receive-side state machine.
//!
//! Bytes are consumed one at a time; the parser never depends on how the
//! transport chunks the stream.
//!
//! ```text
//! StartOfFrame -> Id -> Length -> Type -> [HeaderChecksum] -> Data -> [DataChecksum]
//!       ^                                                                   |
//!       +------------------------------ message ----------------------------+
//! ```

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::checksum::Checksum;
use crate::config::FrameConfig;
use crate::error::Result;
use crate::event::{Event, EventSink};
use crate::message::Message;

/// Parser position within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    StartOfFrame,
    Id,
    Length,
    Type,
    HeaderChecksum,
    Data,
    DataChecksum,
}

/// Incremental frame decoder.
pub struct Parser {
    config: FrameConfig,
    events: Arc<dyn EventSink>,
    state: ParserState,
    stall_ticks: u32,
    id: u32,
    len: u32,
    msg_type: u32,
    cksum: u32,
    ref_cksum: u32,
    rxi: usize,
    discard: bool,
    data: BytesMut,
}

impl Parser {
    /// Create a parser, validating the configuration.
    pub fn new(config: FrameConfig, events: Arc<dyn EventSink>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: ParserState::StartOfFrame,
            stall_ticks: 0,
            id: 0,
            len: 0,
            msg_type: 0,
            cksum: 0,
            ref_cksum: 0,
            rxi: 0,
            discard: false,
            data: BytesMut::new(),
            config,
            events,
        })
    }

    /// Current state.
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Ticks elapsed since the last accepted byte.
    pub fn stall_ticks(&self) -> u32 {
        self.stall_ticks
    }

    /// Abandon any partial frame.
    pub fn reset(&mut self) {
        self.state = ParserState::StartOfFrame;
        self.stall_ticks = 0;
        self.data.clear();
    }

    /// Advance the stall timer by one tick.
    ///
    /// A partial frame that stalls for `parser_timeout_ticks` is abandoned.
    pub fn tick(&mut self) {
        self.stall_ticks = self.stall_ticks.saturating_add(1);
        let limit = self.config.parser_timeout_ticks;
        if limit > 0 && self.stall_ticks >= limit && self.state != ParserState::StartOfFrame {
            let state = self.state;
            self.reset();
            self.events.on_event(&Event::ParserTimeout { state });
        }
    }

    /// Consume bytes until a message completes or the input runs out.
    ///
    /// Returns the number of bytes consumed and the completed message, if
    /// any. At least one byte is consumed when `bytes` is non-empty.
    pub fn feed(&mut self, bytes: &[u8]) -> (usize, Option<Message>) {
        for (i, &byte) in bytes.iter().enumerate() {
            if let Some(msg) = self.push(byte) {
                return (i + 1, Some(msg));
            }
        }
        (bytes.len(), None)
    }

    /// Consume a single byte.
    pub fn push(&mut self, byte: u8) -> Option<Message> {
        self.stall_ticks = 0;
        let checksum = self.config.checksum;

        match self.state {
            ParserState::StartOfFrame => match self.config.sof_byte {
                Some(sof) if byte == sof => {
                    self.begin_frame();
                    None
                }
                Some(_) => None,
                None => {
                    self.begin_frame();
                    self.push_id(byte, &checksum);
                    None
                }
            },

            ParserState::Id => {
                self.push_id(byte, &checksum);
                None
            }

            ParserState::Length => {
                self.cksum = checksum.add(self.cksum, byte);
                self.len = (self.len << 8) | u32::from(byte);
                self.rxi += 1;
                if self.rxi == self.config.len_bytes {
                    self.state = ParserState::Type;
                    self.rxi = 0;
                }
                None
            }

            ParserState::Type => {
                self.cksum = checksum.add(self.cksum, byte);
                self.msg_type = (self.msg_type << 8) | u32::from(byte);
                self.rxi += 1;
                if self.rxi < self.config.type_bytes {
                    return None;
                }
                self.rxi = 0;
                if checksum.is_none() {
                    self.header_complete()
                } else {
                    self.state = ParserState::HeaderChecksum;
                    self.ref_cksum = 0;
                    None
                }
            }

            ParserState::HeaderChecksum => {
                self.ref_cksum = (self.ref_cksum << 8) | u32::from(byte);
                self.rxi += 1;
                if self.rxi < checksum.width() {
                    return None;
                }
                let actual = checksum.end(self.cksum);
                if actual != self.ref_cksum {
                    let expected = self.ref_cksum;
                    self.reset();
                    self.events
                        .on_event(&Event::HeadChecksumMismatch { expected, actual });
                    return None;
                }
                self.header_complete()
            }

            ParserState::Data => {
                if !self.discard {
                    self.cksum = checksum.add(self.cksum, byte);
                    self.data.put_u8(byte);
                }
                self.rxi += 1;
                if self.rxi < self.len as usize {
                    return None;
                }
                if checksum.is_none() {
                    self.finish(true)
                } else {
                    self.state = ParserState::DataChecksum;
                    self.rxi = 0;
                    self.ref_cksum = 0;
                    None
                }
            }

            ParserState::DataChecksum => {
                self.ref_cksum = (self.ref_cksum << 8) | u32::from(byte);
                self.rxi += 1;
                if self.rxi < checksum.width() {
                    return None;
                }
                if self.discard {
                    return self.finish(false);
                }
                let actual = checksum.end(self.cksum);
                if actual != self.ref_cksum {
                    let expected = self.ref_cksum;
                    self.reset();
                    self.events
                        .on_event(&Event::BodyChecksumMismatch { expected, actual });
                    return None;
                }
                self.finish(true)
            }
        }
    }

    fn begin_frame(&mut self) {
        let checksum = self.config.checksum;
        self.cksum = checksum.start();
        if let Some(sof) = self.config.sof_byte {
            self.cksum = checksum.add(self.cksum, sof);
        }
        self.state = ParserState::Id;
        self.discard = false;
        self.rxi = 0;
        self.id = 0;
        self.len = 0;
        self.msg_type = 0;
        self.data.clear();
    }

    fn push_id(&mut self, byte: u8, checksum: &Checksum) {
        self.cksum = checksum.add(self.cksum, byte);
        self.id = (self.id << 8) | u32::from(byte);
        self.rxi += 1;
        if self.rxi == self.config.id_bytes {
            self.state = ParserState::Length;
            self.rxi = 0;
        }
    }

    /// Header fully received and verified.
    fn header_complete(&mut self) -> Option<Message> {
        if self.len == 0 {
            return self.finish(true);
        }

        self.state = ParserState::Data;
        self.rxi = 0;
        self.cksum = self.config.checksum.start();

        let max = self.config.max_payload_rx;
        if self.len as usize > max {
            self.discard = true;
            self.events
                .on_event(&Event::PayloadTooLong { len: self.len, max });
        } else {
            self.data.reserve(self.len as usize);
        }
        None
    }

    fn finish(&mut self, deliver: bool) -> Option<Message> {
        let msg = (deliver && !self.discard).then(|| Message {
            frame_id: self.id,
            msg_type: self.msg_type,
            payload: self.data.split().freeze(),
            ..Message::default()
        });
        if let Some(msg) = &msg {
            trace!(
                frame_id = msg.frame_id,
                msg_type = msg.msg_type,
                len = msg.len(),
                "frame decoded"
            );
        }
        self.reset();
        msg
    }
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("state", &self.state)
            .field("stall_ticks", &self.stall_ticks)
            .field("buffered", &self.data.len())
            .finish_non_exhaustive()
    }
}

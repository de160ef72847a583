//! Transmit-side frame builder.
//!
//! Frames are assembled into a bounded send buffer that is flushed to the
//! [`FrameSink`] whenever it fills, so payloads larger than the buffer are
//! streamed out without extra allocation.

use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::config::FrameConfig;
use crate::error::{FrameError, Result};
use crate::writer::FrameSink;

/// Writes frames to a sink through a fixed-size buffer.
pub struct Composer<S> {
    config: FrameConfig,
    sink: S,
    buf: BytesMut,
    cksum: u32,
    declared: usize,
    written: usize,
    open: bool,
}

impl<S: FrameSink> Composer<S> {
    /// Create a composer, validating the configuration.
    pub fn new(config: FrameConfig, sink: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            buf: BytesMut::with_capacity(config.send_buf_len),
            config,
            sink,
            cksum: 0,
            declared: 0,
            written: 0,
            open: false,
        })
    }

    /// Wire configuration in use.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Start a frame of `len` payload bytes and buffer its header.
    pub fn begin(&mut self, frame_id: u32, msg_type: u32, len: usize) -> Result<()> {
        let max = self.config.max_len();
        if len as u64 > max {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: usize::try_from(max).unwrap_or(usize::MAX),
            });
        }
        for (field, value, max) in [
            ("frame id", frame_id, self.config.max_id()),
            ("type", msg_type, self.config.max_type()),
        ] {
            if u64::from(value) > max {
                return Err(FrameError::FieldTooWide {
                    field,
                    value: u64::from(value),
                    max,
                });
            }
        }
        self.flush()?;

        let checksum = self.config.checksum;
        if let Some(sof) = self.config.sof_byte {
            self.buf.put_u8(sof);
        }
        self.buf.put_uint(u64::from(frame_id), self.config.id_bytes);
        self.buf.put_uint(len as u64, self.config.len_bytes);
        self.buf.put_uint(u64::from(msg_type), self.config.type_bytes);
        if !checksum.is_none() {
            let head = checksum.compute(&self.buf);
            self.buf.put_uint(u64::from(head), checksum.width());
        }

        self.cksum = checksum.start();
        self.declared = len;
        self.written = 0;
        self.open = true;
        trace!(frame_id, msg_type, len, "frame started");
        Ok(())
    }

    /// Append payload bytes to the open frame.
    ///
    /// A failed flush closes the frame; bytes already handed to the sink
    /// cannot be taken back.
    pub fn chunk(&mut self, bytes: &[u8]) -> Result<()> {
        let attempted = self.written + bytes.len();
        if !self.open || attempted > self.declared {
            return Err(FrameError::LengthOverrun {
                declared: self.declared,
                attempted,
            });
        }

        let checksum = self.config.checksum;
        for &byte in bytes {
            if self.buf.len() == self.config.send_buf_len {
                if let Err(err) = self.flush() {
                    self.discard();
                    return Err(err);
                }
            }
            self.buf.put_u8(byte);
            self.cksum = checksum.add(self.cksum, byte);
        }
        self.written = attempted;
        Ok(())
    }

    /// Finish the open frame: append the payload checksum and flush.
    ///
    /// Empty frames carry no payload checksum.
    pub fn end(&mut self) -> Result<()> {
        let checksum = self.config.checksum;
        if self.open && self.declared > 0 && !checksum.is_none() {
            let width = checksum.width();
            if self.buf.len() + width > self.config.send_buf_len {
                self.flush()?;
            }
            self.buf
                .put_uint(u64::from(checksum.end(self.cksum)), width);
        }
        self.open = false;
        self.flush()
    }

    /// Flush whatever is buffered and close the frame without its trailing
    /// checksum. The peer will reject or time out the truncated frame.
    pub fn abandon(&mut self) -> Result<()> {
        self.open = false;
        self.flush()
    }

    /// Drop buffered bytes and close the frame after a failed write.
    pub fn discard(&mut self) {
        self.buf.clear();
        self.open = false;
    }

    /// Build and flush a complete frame.
    pub fn compose(&mut self, frame_id: u32, msg_type: u32, payload: &[u8]) -> Result<()> {
        self.begin(frame_id, msg_type, payload.len())?;
        self.chunk(payload)?;
        self.end()
    }

    /// Hand buffered bytes to the sink.
    pub fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let result = self.sink.write_bytes(&self.buf);
        self.buf.clear();
        result.map_err(FrameError::from)
    }

    /// Returns true between [`begin`](Self::begin) and [`end`](Self::end).
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Payload bytes written to the open frame so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Payload length declared by the open frame's header.
    pub fn declared_len(&self) -> usize {
        self.declared
    }

    /// Borrow the sink.
    pub fn sink_ref(&self) -> &S {
        &self.sink
    }

    /// Mutably borrow the sink.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consume the composer and return the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<S> std::fmt::Debug for Composer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("buffered", &self.buf.len())
            .field("declared", &self.declared)
            .field("written", &self.written)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::error::{FrameError, Result};
use crate::id::Peer;

/// Default start-of-frame marker byte.
pub const DEFAULT_SOF_BYTE: u8 = 0x01;

/// Default maximum received payload: 1 KiB.
pub const DEFAULT_MAX_PAYLOAD_RX: usize = 1024;

/// Default transmit buffer size.
pub const DEFAULT_SEND_BUF_LEN: usize = 128;

/// Default parser stall timeout, in ticks.
pub const DEFAULT_PARSER_TIMEOUT_TICKS: u32 = 100;

/// Wire layout and buffer sizing shared by the parser and the composer.
///
/// Both ends of a link must agree on every field except `peer`,
/// `max_payload_rx` and `send_buf_len`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Width of the frame ID field in bytes (1, 2 or 4).
    pub id_bytes: usize,
    /// Width of the payload length field in bytes (1, 2 or 4).
    pub len_bytes: usize,
    /// Width of the message type field in bytes (1, 2 or 4).
    pub type_bytes: usize,
    /// Header and payload checksum algorithm.
    pub checksum: Checksum,
    /// Start-of-frame marker. `None` starts a frame on any byte.
    pub sof_byte: Option<u8>,
    /// Largest payload the parser will buffer. Longer frames are discarded.
    pub max_payload_rx: usize,
    /// Size of the transmit buffer flushed to the transport.
    pub send_buf_len: usize,
    /// Ticks a partial frame may stall before the parser resets. `0` disables.
    pub parser_timeout_ticks: u32,
    /// Role used to set the reserved top bit of allocated frame IDs.
    pub peer: Peer,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            id_bytes: 1,
            len_bytes: 1,
            type_bytes: 1,
            checksum: Checksum::None,
            sof_byte: Some(DEFAULT_SOF_BYTE),
            max_payload_rx: DEFAULT_MAX_PAYLOAD_RX,
            send_buf_len: DEFAULT_SEND_BUF_LEN,
            parser_timeout_ticks: DEFAULT_PARSER_TIMEOUT_TICKS,
            peer: Peer::Master,
        }
    }
}

impl FrameConfig {
    /// Check that the configuration can be used to build frames.
    pub fn validate(&self) -> Result<()> {
        for (name, width) in [
            ("id_bytes", self.id_bytes),
            ("len_bytes", self.len_bytes),
            ("type_bytes", self.type_bytes),
        ] {
            if !matches!(width, 1 | 2 | 4) {
                return Err(FrameError::InvalidConfig(format!(
                    "{name} must be 1, 2 or 4 (got {width})"
                )));
            }
        }

        if !matches!(self.checksum.width(), 0 | 1 | 2 | 4) {
            return Err(FrameError::InvalidConfig(format!(
                "checksum width must be 0, 1, 2 or 4 (got {})",
                self.checksum.width()
            )));
        }

        if self.send_buf_len < self.header_len() {
            return Err(FrameError::InvalidConfig(format!(
                "send_buf_len {} cannot hold a {}-byte header",
                self.send_buf_len,
                self.header_len()
            )));
        }

        Ok(())
    }

    /// Bytes before the payload: SOF, ID, LEN, TYPE and header checksum.
    pub fn header_len(&self) -> usize {
        usize::from(self.sof_byte.is_some())
            + self.id_bytes
            + self.len_bytes
            + self.type_bytes
            + self.checksum.width()
    }

    /// Total wire size of a frame carrying `payload_len` bytes.
    pub fn wire_size(&self, payload_len: usize) -> usize {
        let body_cksum = if payload_len > 0 {
            self.checksum.width()
        } else {
            0
        };
        self.header_len() + payload_len + body_cksum
    }

    /// Largest value encodable in the length field.
    pub fn max_len(&self) -> u64 {
        field_max(self.len_bytes)
    }

    /// Largest value encodable in the frame ID field.
    pub fn max_id(&self) -> u64 {
        field_max(self.id_bytes)
    }

    /// Largest value encodable in the type field.
    pub fn max_type(&self) -> u64 {
        field_max(self.type_bytes)
    }
}

pub(crate) fn field_max(width: usize) -> u64 {
    (1u64 << (width * 8)) - 1
}

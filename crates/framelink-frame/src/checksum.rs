//! Incremental checksum strategies.
//!
//! Every strategy is driven one byte at a time through `start` / `add` / `end`
//! so that header and payload bytes can be checksummed while they stream.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Checksum algorithm used for both the header and the payload.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Checksum {
    /// No checksum; both checksum phases are elided from the wire.
    #[default]
    None,
    /// Inverted XOR of all bytes (1 byte).
    Xor,
    /// CRC-8/MAXIM (reflected polynomial 0x8C, 1 byte).
    Crc8,
    /// CRC-16/ARC (reflected polynomial 0xA001, 2 bytes).
    Crc16,
    /// CRC-32/ISO-HDLC (reflected polynomial 0xEDB88320, 4 bytes).
    Crc32,
    /// Application supplied algorithm. Not representable in configuration files.
    #[serde(skip)]
    Custom(CustomChecksum),
}

/// Hooks for an application supplied checksum.
#[derive(Clone, Copy)]
pub struct CustomChecksum {
    /// Width of the checksum on the wire, in bytes (1, 2 or 4).
    pub width: usize,
    pub start: fn() -> u32,
    pub add: fn(u32, u8) -> u32,
    pub end: fn(u32) -> u32,
}

impl fmt::Debug for CustomChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomChecksum")
            .field("width", &self.width)
            .finish_non_exhaustive()
    }
}

impl Checksum {
    /// Number of checksum bytes on the wire.
    pub fn width(&self) -> usize {
        match self {
            Checksum::None => 0,
            Checksum::Xor | Checksum::Crc8 => 1,
            Checksum::Crc16 => 2,
            Checksum::Crc32 => 4,
            Checksum::Custom(custom) => custom.width,
        }
    }

    /// Returns true when checksum phases are skipped entirely.
    pub fn is_none(&self) -> bool {
        self.width() == 0
    }

    /// Initial running value.
    pub fn start(&self) -> u32 {
        match self {
            Checksum::None | Checksum::Xor | Checksum::Crc8 | Checksum::Crc16 => 0,
            Checksum::Crc32 => 0xFFFF_FFFF,
            Checksum::Custom(custom) => (custom.start)(),
        }
    }

    /// Fold one byte into the running value.
    pub fn add(&self, running: u32, byte: u8) -> u32 {
        match self {
            Checksum::None => 0,
            Checksum::Xor => running ^ u32::from(byte),
            Checksum::Crc8 => u32::from(crc8_update(running as u8, byte)),
            Checksum::Crc16 => u32::from(crc16_update(running as u16, byte)),
            Checksum::Crc32 => crc32_update(running, byte),
            Checksum::Custom(custom) => (custom.add)(running, byte),
        }
    }

    /// Finalize the running value into the value transmitted on the wire.
    pub fn end(&self, running: u32) -> u32 {
        let value = match self {
            Checksum::None => 0,
            Checksum::Xor => !running,
            Checksum::Crc8 | Checksum::Crc16 => running,
            Checksum::Crc32 => !running,
            Checksum::Custom(custom) => (custom.end)(running),
        };
        value & width_mask(self.width())
    }

    /// Checksum a complete buffer in one go.
    pub fn compute(&self, bytes: &[u8]) -> u32 {
        let running = bytes
            .iter()
            .fold(self.start(), |acc, &byte| self.add(acc, byte));
        self.end(running)
    }
}

fn width_mask(width: usize) -> u32 {
    match width {
        0 => 0,
        1..=3 => (1u32 << (width * 8)) - 1,
        _ => u32::MAX,
    }
}

fn crc8_update(mut crc: u8, byte: u8) -> u8 {
    crc ^= byte;
    for _ in 0..8 {
        crc = if crc & 0x01 != 0 {
            (crc >> 1) ^ 0x8C
        } else {
            crc >> 1
        };
    }
    crc
}

fn crc16_update(mut crc: u16, byte: u8) -> u16 {
    crc ^= u16::from(byte);
    for _ in 0..8 {
        crc = if crc & 0x0001 != 0 {
            (crc >> 1) ^ 0xA001
        } else {
            crc >> 1
        };
    }
    crc
}

fn crc32_update(mut crc: u32, byte: u8) -> u32 {
    crc ^= u32::from(byte);
    for _ in 0..8 {
        crc = if crc & 0x0000_0001 != 0 {
            (crc >> 1) ^ 0xEDB8_8320
        } else {
            crc >> 1
        };
    }
    crc
}

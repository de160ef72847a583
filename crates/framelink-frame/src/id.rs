use serde::{Deserialize, Serialize};

use crate::config::{field_max, FrameConfig};

/// Which end of the link this engine is.
///
/// The two ends set the top bit of allocated IDs differently so that both
/// can issue queries without colliding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Peer {
    #[default]
    Master,
    Slave,
}

/// Allocates frame IDs for new (non-response) messages.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u32,
    mask: u32,
    peer_bit: u32,
}

impl IdAllocator {
    /// Create an allocator for the configured ID width and peer role.
    pub fn new(config: &FrameConfig) -> Self {
        let top = 1u64 << (config.id_bytes * 8 - 1);
        let peer_bit = match config.peer {
            Peer::Master => top as u32,
            Peer::Slave => 0,
        };
        Self {
            next: 0,
            mask: (field_max(config.id_bytes) >> 1) as u32,
            peer_bit,
        }
    }

    /// Counter value the next allocation starts from.
    pub fn peek(&self) -> u32 {
        self.next
    }

    /// Allocate the next ID, skipping at most `max_skip` IDs for which
    /// `in_use` returns true.
    pub fn allocate(&mut self, max_skip: usize, in_use: impl Fn(u32) -> bool) -> u32 {
        let mut id = self.take();
        for _ in 0..max_skip {
            if !in_use(id) {
                break;
            }
            id = self.take();
        }
        id
    }

    fn take(&mut self) -> u32 {
        let seq = self.next & self.mask;
        self.next = seq.wrapping_add(1) & self.mask;
        seq | self.peer_bit
    }
}

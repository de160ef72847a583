//! Checksummed message framing for unreliable ordered byte streams.
//!
//! framelink turns a raw byte link (UART, pipe, socket) into typed messages
//! with optional query/response correlation. The transport is yours: feed
//! received bytes in, hand it a sink for outgoing ones.
//!
//! # Crate Structure
//!
//! - [`frame`]: Wire format, checksums, streaming parser and composer
//! - [`engine`]: Listener dispatch, ID allocation and exclusive transmit

/// Re-export frame types.
pub mod frame {
    pub use framelink_frame::*;
}

/// Re-export engine types.
pub mod engine {
    pub use framelink_engine::*;
}

pub use framelink_engine::{Directive, Engine, EngineConfig, EngineError};
pub use framelink_frame::{Checksum, FrameConfig, Message, Peer};

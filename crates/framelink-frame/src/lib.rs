//! Checksummed, typed framing for unreliable ordered byte streams.
//!
//! Every message travels in one frame:
//!
//! ```text
//! [SOF] ID LEN TYPE [HEAD_CKSUM] DATA [DATA_CKSUM]
//! ```
//!
//! Field widths, the checksum algorithm and the SOF marker are set by
//! [`FrameConfig`]; all multi-byte fields are big-endian. The [`Parser`]
//! consumes bytes one at a time and resynchronizes after corruption, the
//! [`Composer`] streams frames through a bounded send buffer.

pub mod checksum;
#[cfg(feature = "async")]
pub mod codec;
pub mod composer;
pub mod config;
pub mod error;
pub mod event;
pub mod hex;
pub mod id;
pub mod message;
pub mod parser;
pub mod reader;
pub mod writer;

pub use checksum::{Checksum, CustomChecksum};
#[cfg(feature = "async")]
pub use codec::FrameCodec;
pub use composer::Composer;
pub use config::{
    FrameConfig, DEFAULT_MAX_PAYLOAD_RX, DEFAULT_PARSER_TIMEOUT_TICKS, DEFAULT_SEND_BUF_LEN,
    DEFAULT_SOF_BYTE,
};
pub use error::{FrameError, Result};
pub use event::{Event, EventQueue, EventSink, ListenerKind, TracingSink};
pub use id::{IdAllocator, Peer};
pub use message::{Message, Userdata};
pub use parser::{Parser, ParserState};
pub use reader::FrameReader;
pub use writer::{sink_fn, FnSink, FrameSink, IoSink};

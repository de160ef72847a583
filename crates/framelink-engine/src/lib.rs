//! Listener dispatch and transmit discipline for framelink.
//!
//! [`Engine`] ties a parser and a composer to three listener tables:
//!
//! - **ID listeners** correlate a response with the query that allocated its
//!   frame ID, optionally expiring after a number of ticks.
//! - **Type listeners** receive every message of one type.
//! - **Generic listeners** see whatever nothing else claimed.
//!
//! Dispatch walks the tiers in that order until a callback returns anything
//! other than [`Directive::Next`]. Sends are serialized by an exclusive claim,
//! so frames are never interleaved on the wire.

pub mod claim;
pub mod config;
pub mod engine;
pub mod error;
pub mod listener;
pub mod multipart;

pub use claim::{ClaimGuard, ClaimMode, ExclusiveClaim};
pub use config::{
    EngineConfig, DEFAULT_MAX_GENERIC_LISTENERS, DEFAULT_MAX_ID_LISTENERS,
    DEFAULT_MAX_TYPE_LISTENERS,
};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use framelink_frame::ListenerKind;
pub use listener::{Callback, Directive, IdListener, ListenerId, TimeoutCallback};
pub use multipart::MultipartSend;

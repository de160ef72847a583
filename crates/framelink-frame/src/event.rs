//! Observability events.
//!
//! Nothing on the receive path is returned as an error: corrupt frames,
//! stalls and unclaimed messages are reported to an [`EventSink`] injected at
//! construction and the engine keeps going.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::parser::ParserState;

/// Listener table identity, used in capacity reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Id,
    Type,
    Generic,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ListenerKind::Id => "id",
            ListenerKind::Type => "type",
            ListenerKind::Generic => "generic",
        })
    }
}

/// Something noteworthy happened inside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Header checksum did not match; the frame was dropped.
    HeadChecksumMismatch { expected: u32, actual: u32 },
    /// Payload checksum did not match; the frame was dropped.
    BodyChecksumMismatch { expected: u32, actual: u32 },
    /// Declared payload exceeds `max_payload_rx`; its bytes are skipped.
    PayloadTooLong { len: u32, max: usize },
    /// A partial frame stalled and the parser was reset.
    ParserTimeout { state: ParserState },
    /// No listener claimed a decoded message.
    Unhandled { frame_id: u32, msg_type: u32 },
    /// An ID listener timed out and was removed.
    ListenerExpired { frame_id: u32 },
    /// A listener could not be registered.
    ListenerTableFull { kind: ListenerKind },
    /// A send was attempted while another was in flight.
    ClaimUnavailable,
    /// The transport write callback failed.
    WriteFailed { error: String },
}

impl Event {
    /// Returns true for conditions that indicate lost or rejected data.
    pub fn is_error(&self) -> bool {
        !matches!(
            self,
            Event::Unhandled { .. } | Event::ListenerExpired { .. }
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::HeadChecksumMismatch { expected, actual } => write!(
                f,
                "head checksum mismatch (expected {expected:#x}, computed {actual:#x})"
            ),
            Event::BodyChecksumMismatch { expected, actual } => write!(
                f,
                "body checksum mismatch (expected {expected:#x}, computed {actual:#x})"
            ),
            Event::PayloadTooLong { len, max } => {
                write!(f, "payload too long ({len} bytes, max {max})")
            }
            Event::ParserTimeout { state } => write!(f, "parser timeout in state {state:?}"),
            Event::Unhandled { frame_id, msg_type } => {
                write!(f, "unhandled message (id {frame_id:#x}, type {msg_type:#x})")
            }
            Event::ListenerExpired { frame_id } => {
                write!(f, "id listener {frame_id:#x} expired")
            }
            Event::ListenerTableFull { kind } => write!(f, "{kind} listener table full"),
            Event::ClaimUnavailable => f.write_str("transmit path busy"),
            Event::WriteFailed { error } => write!(f, "transport write failed: {error}"),
        }
    }
}

/// Receives engine events.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_event(&self, event: &Event) {
        if event.is_error() {
            warn!(%event, "framelink event");
        } else {
            debug!(%event, "framelink event");
        }
    }
}

/// Bounded queue of events for callers that poll.
///
/// When full, the oldest event is dropped.
#[derive(Debug)]
pub struct EventQueue {
    capacity: usize,
    events: Mutex<VecDeque<Event>>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    /// Remove and return every queued event, oldest first.
    pub fn drain(&self) -> Vec<Event> {
        self.lock().drain(..).collect()
    }

    /// Copy of the queued events without removing them.
    pub fn snapshot(&self) -> Vec<Event> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventSink for EventQueue {
    fn on_event(&self, event: &Event) {
        let mut events = self.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
    }
}

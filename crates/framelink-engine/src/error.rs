use framelink_frame::{FrameError, ListenerKind};

/// Errors that can occur in engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Frame-level error (configuration, encoding or transport write).
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Another send is in flight.
    #[error("transmit path busy")]
    ClaimUnavailable,

    /// A listener table has no free slot.
    #[error("{kind} listener table full (capacity {capacity})")]
    ListenerTableFull { kind: ListenerKind, capacity: usize },

    /// An ID listener is already registered for this frame ID.
    #[error("id listener for frame {0:#x} already registered")]
    IdListenerExists(u32),

    /// A multipart chunk would exceed the declared payload length.
    #[error("multipart payload overflow (declared {declared}, attempted {attempted})")]
    MultipartOverflow { declared: usize, attempted: usize },

    /// A multipart send was closed before the declared length was written.
    #[error("multipart payload incomplete (declared {declared}, written {written})")]
    MultipartIncomplete { declared: usize, written: usize },

    /// A multipart send already failed and was closed.
    #[error("multipart send for frame {frame_id:#x} was aborted")]
    MultipartAborted { frame_id: u32 },

    /// JSON configuration could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

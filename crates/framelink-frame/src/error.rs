/// Errors that can occur while configuring, composing or reading frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The wire configuration is not self-consistent.
    #[error("invalid frame configuration: {0}")]
    InvalidConfig(String),

    /// The payload length cannot be encoded in the configured length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A header field value does not fit its configured width.
    #[error("{field} {value:#x} exceeds field maximum {max:#x}")]
    FieldTooWide {
        field: &'static str,
        value: u64,
        max: u64,
    },

    /// More payload bytes were supplied than the frame header declared.
    #[error("frame declared {declared} payload bytes, got {attempted}")]
    LengthOverrun { declared: usize, attempted: usize },

    /// An I/O error occurred while writing to or reading from the transport.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte stream ended before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

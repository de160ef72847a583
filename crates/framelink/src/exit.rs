use std::fmt;
use std::io;

use framelink_engine::EngineError;
use framelink_frame::hex::HexError;
use framelink_frame::FrameError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn hex_error(context: &str, err: HexError) -> CliError {
    CliError::new(USAGE, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        FrameError::PayloadTooLarge { .. }
        | FrameError::FieldTooWide { .. }
        | FrameError::LengthOverrun { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn engine_error(context: &str, err: EngineError) -> CliError {
    match err {
        EngineError::Frame(err) => frame_error(context, err),
        EngineError::Json(err) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        EngineError::MultipartOverflow { .. } | EngineError::MultipartIncomplete { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_usage() {
        let err = engine_error(
            "load",
            EngineError::Frame(FrameError::InvalidConfig("id_bytes".into())),
        );
        assert_eq!(err.code, USAGE);
        assert!(err.message.starts_with("load: "));
    }

    #[test]
    fn oversized_payload_is_data_invalid() {
        let err = frame_error("encode", FrameError::PayloadTooLarge { size: 300, max: 255 });
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn type_too_wide_is_data_invalid() {
        let err = frame_error(
            "encode",
            FrameError::FieldTooWide {
                field: "type",
                value: 0x100,
                max: 0xFF,
            },
        );
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn busy_transmitter_is_internal() {
        let err = engine_error("send", EngineError::ClaimUnavailable);
        assert_eq!(err.code, INTERNAL);
    }

    #[test]
    fn missing_file_is_usage() {
        let err = io_error("read", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.code, USAGE);
    }
}

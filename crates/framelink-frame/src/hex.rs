//! Hex helpers for dumping and hand-crafting frames.

use std::fmt::Write as _;

/// Error returned by [`decode`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    #[error("odd number of hex digits ({0})")]
    OddLength(usize),
    #[error("invalid hex digit {0:?}")]
    InvalidDigit(char),
}

/// Encode bytes as uppercase hex pairs joined by `separator`.
pub fn encode(bytes: &[u8], separator: &str) -> String {
    let mut out = String::with_capacity(bytes.len() * (2 + separator.len()));
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        let _ = write!(out, "{byte:02X}");
    }
    out
}

/// Decode a hex string. Whitespace and an optional `0x` prefix are ignored.
pub fn decode(input: &str) -> Result<Vec<u8>, HexError> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<char> = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(HexError::OddLength(digits.len()));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let hi = pair[0].to_digit(16).ok_or(HexError::InvalidDigit(pair[0]))?;
            let lo = pair[1].to_digit(16).ok_or(HexError::InvalidDigit(pair[1]))?;
            Ok((hi * 16 + lo) as u8)
        })
        .collect()
}

/// Quoted text when every byte is printable ASCII, packed hex otherwise.
pub fn preview(bytes: &[u8]) -> String {
    if bytes.iter().all(|b| (0x20..0x7F).contains(b)) {
        format!("\"{}\"", String::from_utf8_lossy(bytes))
    } else {
        encode(bytes, "")
    }
}

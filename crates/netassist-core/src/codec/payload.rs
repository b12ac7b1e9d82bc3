//! Outbound payload preparation.
//!
//! Converts the send-buffer text into the exact bytes handed to every
//! connection:
//!
//! - Text mode: the UTF-8 bytes of the buffer, with `\r\n` appended when
//!   `append_crlf` is set.
//! - Hex mode: spaces, tabs and line breaks are stripped, then the remainder
//!   is decoded as hex.  `append_crlf` is ignored in hex mode; appending
//!   `\r\n` before decoding would make every hex payload invalid.
//!
//! A decode failure aborts the send before anything reaches a socket.

use thiserror::Error;
use tracing::debug;

use crate::domain::settings::SendSettings;

/// Errors produced while preparing an outbound payload.
#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    /// The buffer is not valid hex after whitespace removal.
    #[error("invalid hex input: {0}")]
    InvalidHexInput(#[from] hex::FromHexError),
}

/// Builds the wire payload for `text` according to `settings`.
///
/// # Errors
///
/// Returns [`PayloadError::InvalidHexInput`] when `send_hex` is set and the
/// stripped text has an odd length or contains a non-hex character.
///
/// # Examples
///
/// ```rust
/// use netassist_core::{prepare_payload, SendSettings};
///
/// let hex = SendSettings { send_hex: true, ..Default::default() };
/// assert_eq!(prepare_payload("48 65 6C 6C 6F", &hex).unwrap(), b"Hello");
///
/// let crlf = SendSettings { append_crlf: true, ..Default::default() };
/// assert_eq!(prepare_payload("AT", &crlf).unwrap(), b"AT\r\n");
/// ```
pub fn prepare_payload(text: &str, settings: &SendSettings) -> Result<Vec<u8>, PayloadError> {
    if settings.send_hex {
        let digits: String = text
            .chars()
            .filter(|c| !matches!(c, ' ' | '\t' | '\r' | '\n'))
            .collect();
        let bytes = hex::decode(&digits)?;
        debug!("decoded {} hex digit(s) into {} byte(s)", digits.len(), bytes.len());
        return Ok(bytes);
    }

    let mut bytes = text.as_bytes().to_vec();
    if settings.append_crlf {
        bytes.extend_from_slice(b"\r\n");
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_mode() -> SendSettings {
        SendSettings {
            send_hex: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_text_mode_sends_utf8_bytes() {
        let out = prepare_payload("héllo", &SendSettings::default()).unwrap();
        assert_eq!(out, "héllo".as_bytes());
    }

    #[test]
    fn test_text_mode_appends_crlf_when_requested() {
        let settings = SendSettings {
            append_crlf: true,
            ..Default::default()
        };
        assert_eq!(prepare_payload("ping", &settings).unwrap(), b"ping\r\n");
    }

    #[test]
    fn test_hex_mode_decodes_spaced_pairs() {
        let out = prepare_payload("48 65 6C 6C 6F", &hex_mode()).unwrap();
        assert_eq!(out, b"Hello");
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_hex_mode_ignores_line_breaks_and_lowercase() {
        let out = prepare_payload("de ad\nbe\r\nef", &hex_mode()).unwrap();
        assert_eq!(out, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_hex_mode_rejects_non_hex_characters() {
        let result = prepare_payload("ZZ", &hex_mode());
        assert!(matches!(result, Err(PayloadError::InvalidHexInput(_))));
    }

    #[test]
    fn test_hex_mode_rejects_odd_length() {
        let result = prepare_payload("ABC", &hex_mode());
        assert_eq!(
            result,
            Err(PayloadError::InvalidHexInput(hex::FromHexError::OddLength))
        );
    }

    #[test]
    fn test_hex_mode_ignores_crlf_append() {
        let settings = SendSettings {
            send_hex: true,
            append_crlf: true,
            ..Default::default()
        };
        assert_eq!(prepare_payload("0A0B", &settings).unwrap(), vec![0x0A, 0x0B]);
    }

    #[test]
    fn test_empty_text_yields_empty_payload() {
        assert!(prepare_payload("", &SendSettings::default()).unwrap().is_empty());
        assert!(prepare_payload("  ", &hex_mode()).unwrap().is_empty());
    }
}

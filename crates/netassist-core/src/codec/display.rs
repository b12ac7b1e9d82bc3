//! Inbound display transforms.
//!
//! A received chunk is turned into display text in this order:
//!
//! 1. Raw bytes are decoded as UTF-8 (invalid sequences become `U+FFFD`).
//! 2. With `hex_display`, the raw bytes are instead rendered as two-digit
//!    uppercase hex pairs joined by single spaces: `DE AD BE EF 01`.
//! 3. With `show_timestamp`, the result is wrapped as
//!    `[2024-05-01 13:45:10]:<text>\n` using local time.
//!
//! File mirroring and the pause flag are applied by the inbound pump, not
//! here; this module is pure.

use chrono::{Local, NaiveDateTime};

use crate::domain::settings::ReceiveSettings;

/// `chrono` format string for the receive timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders bytes as uppercase hex pairs separated by single spaces.
///
/// # Examples
///
/// ```rust
/// use netassist_core::render_hex;
///
/// assert_eq!(render_hex(&[0xDE, 0xAD, 0xBE, 0xEF, 0x01]), "DE AD BE EF 01");
/// assert_eq!(render_hex(&[]), "");
/// ```
pub fn render_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{b:02X}"));
    }
    out
}

/// Builds the display text for `chunk` using the current local time.
pub fn format_received(chunk: &[u8], settings: &ReceiveSettings) -> String {
    format_received_at(chunk, settings, Local::now().naive_local())
}

/// Builds the display text for `chunk` as if it arrived at `at`.
pub fn format_received_at(chunk: &[u8], settings: &ReceiveSettings, at: NaiveDateTime) -> String {
    let text = if settings.hex_display {
        render_hex(chunk)
    } else {
        String::from_utf8_lossy(chunk).into_owned()
    };

    if settings.show_timestamp {
        format!("[{}]:{text}\n", at.format(TIMESTAMP_FORMAT))
    } else {
        text
    }
}

//! Byte transforms applied to inbound and outbound traffic.
//!
//! - **`display`** – Turns a received chunk into the text shown to the user
//!   (hex rendering, timestamp prefix).
//! - **`payload`** – Turns the outbound text buffer into the bytes written to
//!   the wire (CRLF append, hex decoding).

pub mod display;
pub mod payload;

//! Storage infrastructure: configuration and capture files.
//!
//! - **`config`** – Reads and writes the TOML configuration from the
//!   platform config directory, with defaults for a first run.
//! - **`capture`** – Plain appends of received data, saving the received
//!   view, and loading send data from a file.

pub mod capture;
pub mod config;

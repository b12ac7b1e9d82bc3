//! Protocol selection and the receive/send options owned by the UI.
//!
//! None of these types are owned by the session.  The UI layer keeps the
//! authoritative copy and hands the session a snapshot: receive settings are
//! published through a watch channel and read for every received chunk, send
//! settings travel with each send command.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Interval used for cyclic sends when the interval text is empty or invalid.
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_millis(1000);

/// The four endpoint kinds a session can open.
///
/// The discriminant order matches the protocol drop-down of the UI
/// (TCP client, TCP server, UDP client, UDP server).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolKind {
    /// Dials one TCP connection.
    TcpClient,
    /// Listens for TCP connections and accepts any number of them.
    TcpServer,
    /// A UDP socket connected to a single peer.
    UdpClient,
    /// An unconnected UDP socket; the destination is chosen per send.
    UdpServer,
}

impl ProtocolKind {
    /// All kinds in drop-down order.
    pub const ALL: [ProtocolKind; 4] = [
        ProtocolKind::TcpClient,
        ProtocolKind::TcpServer,
        ProtocolKind::UdpClient,
        ProtocolKind::UdpServer,
    ];

    /// Maps a drop-down index to a kind.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Returns `true` for the kinds that bind a local address instead of dialing.
    pub fn is_server(self) -> bool {
        matches!(self, ProtocolKind::TcpServer | ProtocolKind::UdpServer)
    }

    /// Human-readable label, e.g. `"TCP client"`.
    pub fn label(self) -> &'static str {
        match self {
            ProtocolKind::TcpClient => "TCP client",
            ProtocolKind::TcpServer => "TCP server",
            ProtocolKind::UdpClient => "UDP client",
            ProtocolKind::UdpServer => "UDP server",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a protocol name cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown protocol kind: {0:?}")]
pub struct UnknownProtocolKind(pub String);

impl FromStr for ProtocolKind {
    type Err = UnknownProtocolKind;

    /// Accepts the kebab-case config names (`"tcp-server"`) as well as the
    /// display labels (`"TCP server"`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '_'], "-");
        match normalized.as_str() {
            "tcp-client" => Ok(ProtocolKind::TcpClient),
            "tcp-server" => Ok(ProtocolKind::TcpServer),
            "udp-client" => Ok(ProtocolKind::UdpClient),
            "udp-server" => Ok(ProtocolKind::UdpServer),
            _ => Err(UnknownProtocolKind(s.to_string())),
        }
    }
}

/// How received chunks are rendered and where they go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveSettings {
    /// Render each byte as two uppercase hex digits.
    #[serde(default)]
    pub hex_display: bool,
    /// Prefix each chunk with `[YYYY-MM-DD HH:MM:SS]:` and end it with a newline.
    #[serde(default)]
    pub show_timestamp: bool,
    /// Append every transformed chunk to this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_file: Option<PathBuf>,
    /// Keep counting bytes but stop updating the received-data display.
    #[serde(default)]
    pub pause_display: bool,
}

/// How the outbound text buffer is turned into a send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendSettings {
    /// Interpret the buffer as hex digits (spaces and line breaks ignored).
    pub send_hex: bool,
    /// Append `\r\n` to the buffer.  Ignored when `send_hex` is set.
    pub append_crlf: bool,
    /// Ask the UI to clear the send buffer after a successful send.
    pub auto_clear: bool,
    /// Repeat the send at this interval until stopped; `None` sends once.
    pub cycle_interval: Option<Duration>,
}

impl SendSettings {
    /// Enables cyclic sending with the interval parsed from UI text.
    ///
    /// See [`parse_cycle_interval`] for the fallback rules.
    pub fn cyclic(mut self, interval_text: &str) -> Self {
        self.cycle_interval = Some(parse_cycle_interval(interval_text));
        self
    }
}

/// Parses the cyclic interval entry (integer milliseconds).
///
/// Empty, non-numeric, or zero input falls back to
/// [`DEFAULT_CYCLE_INTERVAL`]; a zero interval would spin the send loop.
pub fn parse_cycle_interval(text: &str) -> Duration {
    match text.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Duration::from_millis(ms),
        _ => DEFAULT_CYCLE_INTERVAL,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

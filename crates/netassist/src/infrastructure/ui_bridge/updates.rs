//! The single update queue between the session and the UI.
//!
//! Every background task (accept loop, inbound pumps, cyclic sender) reports
//! what the user should see by enqueueing a [`UiUpdate`] on an
//! [`UpdateSink`].  Exactly one consumer applies those updates to the display,
//! so the display surface is never mutated from two places at once.
//!
//! ```text
//! accept loop ─┐
//! pump #1 ─────┤
//! pump #N ─────┼──► UpdateSink::enqueue ──► mpsc ──► UI consumer task
//! cyclic send ─┤
//! controller ──┘
//! ```
//!
//! Updates from one pump are enqueued in read order; nothing is promised
//! about the interleaving of different pumps.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

/// Severity of a status line.  Used as a colour hint by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl StatusLevel {
    /// Pango foreground colour for the level, if any.
    pub fn colour(self) -> Option<&'static str> {
        match self {
            StatusLevel::Info => None,
            StatusLevel::Success => Some("green"),
            StatusLevel::Warning => Some("pink"),
            StatusLevel::Error => Some("red"),
        }
    }
}

/// A status line shown in the UI's status bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Success,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            text: text.into(),
        }
    }

    /// Renders the message as Pango markup, e.g.
    /// `<span foreground="green">new connection:127.0.0.1:5000</span>`.
    ///
    /// `<`, `>` and `&` in the text are escaped.
    pub fn to_markup(&self) -> String {
        let escaped = self
            .text
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;");
        match self.level.colour() {
            Some(colour) => format!(r#"<span foreground="{colour}">{escaped}</span>"#),
            None => escaped,
        }
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// One change the UI must apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UiUpdate {
    /// Append this text to the received-data view.
    Received(String),
    /// Replace the status line.
    Status(StatusMessage),
    /// New counter labels, e.g. `"Recv count:42"` / `"Send count:7"`.
    Counters { received: String, sent: String },
    /// Show the local (or listening) address of the session.
    LocalEndpoint { address: String, port: String },
    /// Switch the address fields between read-only local-address display
    /// (`editable == false`) and UDP target entry (`editable == true`).
    /// Both fields are cleared in either case.
    TargetEntry { editable: bool },
    /// Clear the outbound text buffer (auto-clear after send).
    ClearSendBuffer,
    /// A cyclic send has finished; the Send/Stop control can reset.
    CyclicStopped,
}

/// Capability to enqueue UI updates.  Injected into the session at
/// construction; implementations must not block.
#[cfg_attr(test, mockall::automock)]
pub trait UpdateSink: Send + Sync {
    fn enqueue(&self, update: UiUpdate);
}

/// [`UpdateSink`] backed by an unbounded Tokio channel.
///
/// The matching receiver belongs to the UI consumer.  Once it is dropped,
/// updates are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<UiUpdate>,
}

impl ChannelSink {
    /// Creates a sink together with the receiver the UI consumer drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UiUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl UpdateSink for ChannelSink {
    fn enqueue(&self, update: UiUpdate) {
        if self.tx.send(update).is_err() {
            trace!("UI consumer gone; update dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_wraps_coloured_levels() {
        let msg = StatusMessage::success("new connection:127.0.0.1:5000");
        assert_eq!(
            msg.to_markup(),
            r#"<span foreground="green">new connection:127.0.0.1:5000</span>"#
        );
    }

    #[test]
    fn test_markup_leaves_info_plain_and_escapes() {
        let msg = StatusMessage::info("a <b> & c");
        assert_eq!(msg.to_markup(), "a &lt;b&gt; &amp; c");
    }

    #[test]
    fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.enqueue(UiUpdate::Received("a".into()));
        sink.enqueue(UiUpdate::Received("b".into()));
        assert_eq!(rx.try_recv().unwrap(), UiUpdate::Received("a".into()));
        assert_eq!(rx.try_recv().unwrap(), UiUpdate::Received("b".into()));
    }

    #[test]
    fn test_channel_sink_ignores_dropped_consumer() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.enqueue(UiUpdate::ClearSendBuffer);
    }
}

//! # netassist-core
//!
//! Shared library for NetAssist containing the session-independent pieces of
//! the network assistant: protocol selection, receive/send settings, traffic
//! counters, and the byte transforms applied on the way in and out.
//!
//! This crate has zero dependencies on sockets, async runtimes, or UI
//! frameworks.  Everything here is plain data plus pure functions, which keeps
//! it trivially testable.
//!
//! # Architecture overview
//!
//! NetAssist lets a user open a TCP/UDP client or server endpoint, watch the
//! bytes that arrive, and send bytes back (as text or as hex).
//!
//! - **`domain`** – What the user configured: which [`ProtocolKind`] to open,
//!   how received data should be shown ([`ReceiveSettings`]), how outbound
//!   text should be encoded ([`SendSettings`]), plus the shared
//!   [`TrafficCounters`].
//!
//! - **`codec`** – How bytes are turned into display text
//!   ([`codec::display`]) and how the outbound text buffer is turned into a
//!   wire payload ([`codec::payload`]).

pub mod codec;
pub mod domain;

pub use codec::display::{format_received, format_received_at, render_hex};
pub use codec::payload::{prepare_payload, PayloadError};
pub use domain::counters::{CounterSnapshot, TrafficCounters};
pub use domain::settings::{
    parse_cycle_interval, ProtocolKind, ReceiveSettings, SendSettings, DEFAULT_CYCLE_INTERVAL,
};

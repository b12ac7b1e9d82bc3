//! Application layer: the session and the tasks it runs.
//!
//! This layer owns every piece of mutable session state (registry, counters,
//! listener, cyclic task) and talks to the UI only through the
//! [`UpdateSink`] it was given at construction.  It never renders anything
//! itself.
//!
//! # Sub-modules
//!
//! - **`registry`** – The concurrent set of open connections shared by the
//!   accept loop, the inbound pumps and the outbound dispatcher.
//!
//! - **`inbound`** – One pump task per connection: read a chunk, count it,
//!   transform it for display, mirror it to the capture file, enqueue it.
//!
//! - **`outbound`** – Writes a payload to every registered connection, once
//!   or repeatedly on a timer.
//!
//! - **`session`** – The controller behind the connect/disconnect/send
//!   commands and the state machine
//!   `Disconnected → Connecting → Connected → Disconnected`.

pub mod inbound;
pub mod outbound;
pub mod registry;
pub mod session;

use netassist_core::TrafficCounters;

use crate::infrastructure::ui_bridge::updates::{UiUpdate, UpdateSink};

/// Pushes the current counter labels to the UI.
pub(crate) fn push_counters(sink: &dyn UpdateSink, counters: &TrafficCounters) {
    let snapshot = counters.snapshot();
    sink.enqueue(UiUpdate::Counters {
        received: snapshot.received_label(),
        sent: snapshot.sent_label(),
    });
}

//! Domain types for NetAssist.
//!
//! - **`settings`** – The protocol kind and the receive/send options the UI
//!   owns.  The session reads them at the moment each event happens.
//! - **`counters`** – Received/sent byte totals shared by every task of a
//!   session.

pub mod counters;
pub mod settings;

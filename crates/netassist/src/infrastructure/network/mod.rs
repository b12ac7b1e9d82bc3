//! Network infrastructure.
//!
//! # Sub-modules
//!
//! - **`transport`** – Uniform dial/listen/accept/read/write over the four
//!   endpoint kinds (TCP client, TCP server, UDP client, UDP server).  Hides
//!   the differences between them behind [`Connection`], [`Reader`] and
//!   [`Listener`].

pub mod transport;

pub use transport::{
    dial_tcp, dial_udp, listen_tcp, listen_udp, resolve, Connection, ConnectionId,
    Listener, ReadOutcome, Reader, TransportError, READ_CHUNK_SIZE,
};

//! Inbound pump: one task per connection that turns socket reads into UI
//! updates.
//!
//! # Per-chunk pipeline
//!
//! ```text
//! read ≤ 2048 bytes
//!   ├─► received counter += n
//!   ├─► format_received (lossy UTF-8 or hex, optional timestamp)
//!   ├─► capture file append            (if configured)
//!   ├─► UiUpdate::Received(text)       (unless display is paused)
//!   └─► UiUpdate::Counters             (always)
//! ```
//!
//! The receive settings are read from a `watch` channel at the moment each
//! chunk arrives, so toggling hex display or pause takes effect on the next
//! chunk without restarting the pump.
//!
//! # Termination
//!
//! - [`ReadOutcome::Closed`]: the session closed the connection on purpose.
//!   The pump exits silently; whoever closed it also removed it.
//! - Read failure (end-of-stream, reset, any I/O error): the pump is the one
//!   place that removes the connection from the registry and closes it.  For
//!   TCP it reports `connection closed: <peer>` first.

use std::sync::Arc;

use netassist_core::{format_received, ReceiveSettings, TrafficCounters};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use super::{push_counters, registry::ConnectionRegistry};
use crate::infrastructure::{
    network::{Connection, ReadOutcome, Reader, TransportError, READ_CHUNK_SIZE},
    storage::capture::append_to_file,
    ui_bridge::updates::{StatusMessage, UiUpdate, UpdateSink},
};

/// Everything a pump shares with the rest of the session.
#[derive(Clone)]
pub struct PumpContext {
    pub registry: Arc<ConnectionRegistry>,
    pub counters: Arc<TrafficCounters>,
    pub sink: Arc<dyn UpdateSink>,
    pub settings: watch::Receiver<ReceiveSettings>,
}

/// Spawns the pump for `conn`.  The connection must already be registered.
pub fn spawn_pump(conn: Arc<Connection>, reader: Reader, ctx: PumpContext) -> JoinHandle<()> {
    tokio::spawn(run_pump(conn, reader, ctx))
}

async fn run_pump(conn: Arc<Connection>, mut reader: Reader, ctx: PumpContext) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    debug!("pump started for connection {} ({})", conn.id(), conn.peer_label());

    loop {
        match reader.read_chunk(&mut buf).await {
            Ok(ReadOutcome::Data { len, from }) => {
                if let Some(from) = from {
                    conn.record_peer(from);
                }
                ctx.handle_chunk(&buf[..len]).await;
            }
            Ok(ReadOutcome::Closed) => {
                debug!("pump for connection {} stopped by close", conn.id());
                return;
            }
            Err(e) => {
                ctx.handle_read_failure(&conn, e).await;
                return;
            }
        }
    }
}

impl PumpContext {
    async fn handle_chunk(&self, chunk: &[u8]) {
        self.counters.add_received(chunk.len() as u64);

        // Clone out of the watch so no borrow is held across the file write.
        let settings = self.settings.borrow().clone();
        let text = format_received(chunk, &settings);

        if let Some(path) = &settings.capture_file {
            if let Err(e) = append_to_file(path, text.as_bytes()).await {
                warn!("capture write failed: {e}");
                self.sink
                    .enqueue(UiUpdate::Status(StatusMessage::error(e.to_string())));
            }
        }

        if !settings.pause_display {
            self.sink.enqueue(UiUpdate::Received(text));
        }
        push_counters(self.sink.as_ref(), &self.counters);
    }

    async fn handle_read_failure(&self, conn: &Connection, err: TransportError) {
        // A close that raced the failing read already took care of cleanup.
        if conn.is_closed() {
            debug!("read on closing connection {} ended: {err}", conn.id());
            return;
        }

        if conn.is_tcp() {
            info!("connection closed: {} ({err})", conn.peer_label());
            self.sink.enqueue(UiUpdate::Status(StatusMessage::warning(format!(
                "connection closed: {}",
                conn.peer_label()
            ))));
        } else {
            warn!("UDP read on {} failed: {err}", conn.local_addr());
        }

        self.registry.remove(conn.id()).await;
        conn.close().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

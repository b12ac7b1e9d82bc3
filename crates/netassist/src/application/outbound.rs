//! Outbound dispatcher: writes one payload to every registered connection.
//!
//! A send works on a registry snapshot, so the registry lock is never held
//! across a socket write and connections that appear or disappear mid-send
//! are simply included or skipped.  Sending is best effort: a failing entry
//! is reported and skipped, and the others still receive the payload.
//!
//! # Cyclic sends
//!
//! [`OutboundDispatcher::start_cyclic`] runs the same send on a timer in its
//! own task:
//!
//! ```text
//! loop {
//!     select { stop signal ──► exit,  send_once(payload) ──► continue }
//!     stop signal seen? ──► exit
//!     registry empty?   ──► "there's no connection", exit
//!     select { stop signal ──► exit,  sleep(interval) ──► continue }
//! }
//! CyclicStopped
//! ```
//!
//! The stop signal also cancels a send that is still in progress, so a peer
//! that stops reading cannot keep the task alive.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use netassist_core::TrafficCounters;
use tokio::{
    sync::{
        oneshot::{self, error::TryRecvError},
        watch,
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::{push_counters, registry::ConnectionRegistry};
use crate::infrastructure::{
    network::TransportError,
    ui_bridge::updates::{StatusMessage, UiUpdate, UpdateSink},
};

/// Status shown when a UDP server send has nowhere to go.
pub const NO_TARGET_STATUS: &str = "UDP target address is not set";
/// Status shown when a cyclic send runs out of connections.
pub const NO_CONNECTION_STATUS: &str = "there's no connection";

/// Fans a payload out to every connection in the registry.
#[derive(Clone)]
pub struct OutboundDispatcher {
    registry: Arc<ConnectionRegistry>,
    counters: Arc<TrafficCounters>,
    sink: Arc<dyn UpdateSink>,
    udp_target: watch::Receiver<Option<SocketAddr>>,
}

impl OutboundDispatcher {
    /// `udp_target` is read on every send; it is the destination for
    /// connections that need one (UDP server sockets).
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        counters: Arc<TrafficCounters>,
        sink: Arc<dyn UpdateSink>,
        udp_target: watch::Receiver<Option<SocketAddr>>,
    ) -> Self {
        Self {
            registry,
            counters,
            sink,
            udp_target,
        }
    }

    /// Writes `data` to every current connection and returns the total number
    /// of bytes written.  The total is added to the sent counter.
    pub async fn send_once(&self, data: &[u8]) -> usize {
        let target = *self.udp_target.borrow();
        let mut total = 0usize;

        for conn in self.registry.snapshot().await {
            let result = if conn.is_datagram_server() {
                match target {
                    Some(target) => conn.write_to(data, target).await,
                    None => {
                        warn!("UDP server {} has no target; skipped", conn.local_addr());
                        self.sink
                            .enqueue(UiUpdate::Status(StatusMessage::warning(NO_TARGET_STATUS)));
                        continue;
                    }
                }
            } else {
                conn.write(data).await
            };

            match result {
                Ok(n) => total += n,
                Err(TransportError::Closed(id)) => {
                    debug!("skipping connection {id}: closed during send");
                }
                Err(e) => {
                    warn!("send failed: {e}");
                    self.sink
                        .enqueue(UiUpdate::Status(StatusMessage::error(e.to_string())));
                }
            }
        }

        self.counters.add_sent(total as u64);
        push_counters(self.sink.as_ref(), &self.counters);
        debug!("sent {total} byte(s) of a {}-byte payload", data.len());
        total
    }

    /// Starts repeating `send_once(data)` every `interval`.
    pub fn start_cyclic(&self, data: Vec<u8>, interval: Duration) -> CyclicSend {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let dispatcher = self.clone();
        info!("cyclic send of {} byte(s) every {interval:?}", data.len());

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => {
                        debug!("cyclic send stopped during a send");
                        break;
                    }
                    _ = dispatcher.send_once(&data) => {}
                }

                // A disconnect signals the stop before it empties the registry.
                if !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty)) {
                    debug!("cyclic send stopped on request");
                    break;
                }

                if dispatcher.registry.is_empty().await {
                    info!("cyclic send stopped: no connection left");
                    dispatcher
                        .sink
                        .enqueue(UiUpdate::Status(StatusMessage::warning(NO_CONNECTION_STATUS)));
                    break;
                }

                tokio::select! {
                    // Also fires if the CyclicSend handle was dropped.
                    _ = &mut stop_rx => {
                        debug!("cyclic send stopped on request");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            dispatcher.sink.enqueue(UiUpdate::CyclicStopped);
        });

        CyclicSend {
            stop: Some(stop_tx),
            handle,
        }
    }
}

/// Handle to a running cyclic send.
#[derive(Debug)]
pub struct CyclicSend {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl CyclicSend {
    /// Signals the task to stop without waiting for it.
    pub fn request_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // Err means the task already finished on its own.
            let _ = stop.send(());
        }
    }

    /// Signals the task to stop and waits for it to exit.
    pub async fn stop(mut self) {
        self.request_stop();
        if let Err(e) = (&mut self.handle).await {
            warn!("cyclic send task ended abnormally: {e}");
        }
    }

    /// Returns `true` once the task has exited, for whatever reason.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

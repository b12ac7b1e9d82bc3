//! Session controller: the state machine behind connect, disconnect and send.
//!
//! # Lifecycle
//!
//! ```text
//!              connect(kind, host, port)
//! Disconnected ─────────────► Connecting ──ok──► Connected
//!      ▲                          │                  │
//!      └────────── error ─────────┘                  │
//!      └──────────────────── disconnect() ───────────┘
//! ```
//!
//! What `connect` opens depends on the [`ProtocolKind`]:
//!
//! | Kind        | Opened                     | Registered                       |
//! |-------------|----------------------------|----------------------------------|
//! | TCP client  | one dialed stream          | immediately                      |
//! | TCP server  | a listener + accept task   | each accepted stream, as it comes |
//! | UDP client  | one connected socket       | immediately                      |
//! | UDP server  | one unconnected socket     | immediately                      |
//!
//! Every registered connection gets its own inbound pump.
//!
//! # Teardown
//!
//! `disconnect` signals the cyclic send to stop, closes the listener and
//! waits for the accept task, closes every registered connection, and only
//! then waits for the cyclic task.  Closing aborts pending writes, so a peer
//! that stopped reading cannot stall teardown.  Once it returns no task
//! started by the session is still writing to the registry.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use netassist_core::{
    prepare_payload, PayloadError, ProtocolKind, ReceiveSettings, SendSettings, TrafficCounters,
};
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{
    inbound::{spawn_pump, PumpContext},
    outbound::{CyclicSend, OutboundDispatcher},
    push_counters,
    registry::ConnectionRegistry,
};
use crate::infrastructure::{
    network::{
        dial_tcp, dial_udp, listen_tcp, listen_udp, resolve, Connection, Listener, Reader,
        TransportError,
    },
    ui_bridge::updates::{StatusMessage, UiUpdate, UpdateSink},
};

/// Status shown once a session has been torn down.
pub const WAITING_STATUS: &str = "Waiting connection";

/// Errors returned by [`SessionController`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    InvalidHexInput(#[from] PayloadError),

    #[error("a session is already open")]
    AlreadyConnected,

    #[error("no session is open")]
    NotConnected,
}

/// Connection state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// What a call to [`SessionController::send`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The payload was written once; total bytes across all connections.
    Sent(usize),
    /// A cyclic send was started.
    CyclicStarted,
    /// A cyclic send was running and has been stopped instead.
    CyclicStopped,
}

/// Result of [`SessionController::prepare_send`].
pub enum PreparedSend {
    /// Nothing left to write.
    Done(SendOutcome),
    /// A one-shot send still to be run.
    Once(PendingSend),
}

/// A one-shot send detached from the session.
pub struct PendingSend {
    dispatcher: OutboundDispatcher,
    sink: Arc<dyn UpdateSink>,
    payload: Vec<u8>,
    auto_clear: bool,
}

impl PendingSend {
    /// Writes the payload to every connection.
    pub async fn run(self) -> SendOutcome {
        let sent = self.dispatcher.send_once(&self.payload).await;
        if self.auto_clear {
            self.sink.enqueue(UiUpdate::ClearSendBuffer);
        }
        SendOutcome::Sent(sent)
    }
}

struct AcceptLoop {
    listener: Arc<Listener>,
    task: JoinHandle<()>,
}

/// Owns one session: its connections, counters and background tasks.
pub struct SessionController {
    sink: Arc<dyn UpdateSink>,
    registry: Arc<ConnectionRegistry>,
    counters: Arc<TrafficCounters>,
    receive_settings: watch::Sender<ReceiveSettings>,
    udp_target: watch::Sender<Option<SocketAddr>>,
    dispatcher: OutboundDispatcher,
    state: SessionState,
    kind: Option<ProtocolKind>,
    accept_loop: Option<AcceptLoop>,
    cyclic: Option<CyclicSend>,
}

impl SessionController {
    /// Creates a disconnected session that reports to `sink`.
    pub fn new(sink: Arc<dyn UpdateSink>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let counters = Arc::new(TrafficCounters::new());
        let (receive_settings, _) = watch::channel(ReceiveSettings::default());
        let (udp_target, udp_target_rx) = watch::channel(None);
        let dispatcher = OutboundDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&counters),
            Arc::clone(&sink),
            udp_target_rx,
        );

        Self {
            sink,
            registry,
            counters,
            receive_settings,
            udp_target,
            dispatcher,
            state: SessionState::Disconnected,
            kind: None,
            accept_loop: None,
            cyclic: None,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The kind of the open session, `None` while disconnected.
    pub fn kind(&self) -> Option<ProtocolKind> {
        self.kind
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn counters(&self) -> &Arc<TrafficCounters> {
        &self.counters
    }

    pub fn receive_settings(&self) -> ReceiveSettings {
        self.receive_settings.borrow().clone()
    }

    pub fn udp_target(&self) -> Option<SocketAddr> {
        *self.udp_target.borrow()
    }

    pub fn is_cyclic_running(&self) -> bool {
        self.cyclic.as_ref().is_some_and(|c| !c.is_finished())
    }

    // ── Connect / disconnect ────────────────────────────────────────────────

    /// Opens an endpoint of `kind` on `host:port` and returns its local
    /// address (the listening address for server kinds).
    ///
    /// # Errors
    ///
    /// [`SessionError::AlreadyConnected`] unless disconnected, or
    /// [`SessionError::Transport`] if the endpoint cannot be opened; the
    /// session is then back in [`SessionState::Disconnected`].
    pub async fn connect(
        &mut self,
        kind: ProtocolKind,
        host: &str,
        port: &str,
    ) -> Result<SocketAddr, SessionError> {
        if self.state != SessionState::Disconnected {
            return Err(SessionError::AlreadyConnected);
        }
        self.state = SessionState::Connecting;
        debug!("connecting {kind} on {host}:{port}");

        match self.open(kind, host, port).await {
            Ok(local) => {
                self.state = SessionState::Connected;
                self.kind = Some(kind);
                info!("{kind} session open on {local}");
                self.sink.enqueue(UiUpdate::Status(StatusMessage::success(format!(
                    "{} connection succeeds",
                    kind.label()
                ))));
                self.sink.enqueue(UiUpdate::LocalEndpoint {
                    address: local.ip().to_string(),
                    port: local.port().to_string(),
                });
                if kind == ProtocolKind::UdpServer {
                    self.sink.enqueue(UiUpdate::TargetEntry { editable: true });
                }
                Ok(local)
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                error!("{kind} connect to {host}:{port} failed: {e}");
                self.sink
                    .enqueue(UiUpdate::Status(StatusMessage::error(e.to_string())));
                Err(e.into())
            }
        }
    }

    async fn open(
        &mut self,
        kind: ProtocolKind,
        host: &str,
        port: &str,
    ) -> Result<SocketAddr, TransportError> {
        match kind {
            ProtocolKind::TcpClient => {
                let (conn, reader) = dial_tcp(host, port).await?;
                Ok(self.register(conn, reader).await)
            }
            ProtocolKind::UdpClient => {
                let (conn, reader) = dial_udp(host, port).await?;
                Ok(self.register(conn, reader).await)
            }
            ProtocolKind::UdpServer => {
                let (conn, reader) = listen_udp(host, port).await?;
                Ok(self.register(conn, reader).await)
            }
            ProtocolKind::TcpServer => {
                let listener = Arc::new(listen_tcp(host, port).await?);
                let local = listener.local_addr();
                let task = tokio::spawn(accept_loop(Arc::clone(&listener), self.pump_context()));
                self.accept_loop = Some(AcceptLoop { listener, task });
                Ok(local)
            }
        }
    }

    async fn register(&self, conn: Connection, reader: Reader) -> SocketAddr {
        let conn = Arc::new(conn);
        let local = conn.local_addr();
        self.registry.add(Arc::clone(&conn)).await;
        spawn_pump(conn, reader, self.pump_context());
        local
    }

    fn pump_context(&self) -> PumpContext {
        PumpContext {
            registry: Arc::clone(&self.registry),
            counters: Arc::clone(&self.counters),
            sink: Arc::clone(&self.sink),
            settings: self.receive_settings.subscribe(),
        }
    }

    /// Tears the session down and returns to [`SessionState::Disconnected`].
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] if there is no open session.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Disconnected {
            return Err(SessionError::NotConnected);
        }

        // The cyclic task is joined only once every connection is closed.
        let mut cyclic = self.cyclic.take();
        if let Some(cyclic) = cyclic.as_mut() {
            cyclic.request_stop();
        }

        if let Some(AcceptLoop { listener, task }) = self.accept_loop.take() {
            listener.close();
            if let Err(e) = task.await {
                warn!("accept task ended abnormally: {e}");
            }
        }

        let closed = self.registry.close_all().await;

        if let Some(cyclic) = cyclic {
            cyclic.stop().await;
        }

        if self.kind == Some(ProtocolKind::UdpServer) {
            self.udp_target.send_replace(None);
            self.sink.enqueue(UiUpdate::TargetEntry { editable: false });
        }

        info!(
            "{} session closed ({closed} connection(s))",
            self.kind.map(ProtocolKind::label).unwrap_or("unknown")
        );
        self.state = SessionState::Disconnected;
        self.kind = None;
        self.sink
            .enqueue(UiUpdate::Status(StatusMessage::info(WAITING_STATUS)));
        Ok(())
    }

    // ── Sending ──────────────────────────────────────────────────────────────

    /// Sends the outbound text buffer.
    ///
    /// While a cyclic send is running this stops it instead, as the
    /// Send/Stop button does.  With no connection open nothing is written.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidHexInput`] if `settings.send_hex` is set and
    /// `text` is not valid hex; nothing is sent.
    pub async fn send(
        &mut self,
        text: &str,
        settings: &SendSettings,
    ) -> Result<SendOutcome, SessionError> {
        match self.prepare_send(text, settings).await? {
            PreparedSend::Done(outcome) => Ok(outcome),
            PreparedSend::Once(pending) => Ok(pending.run().await),
        }
    }

    /// Does everything [`SessionController::send`] does except the socket
    /// writes of a one-shot send, which are returned as a [`PendingSend`].
    ///
    /// Callers sharing the session behind a lock run the pending send after
    /// releasing it, so a stalled peer never blocks other commands.  A later
    /// [`SessionController::disconnect`] aborts the pending writes.
    ///
    /// # Errors
    ///
    /// As for [`SessionController::send`].
    pub async fn prepare_send(
        &mut self,
        text: &str,
        settings: &SendSettings,
    ) -> Result<PreparedSend, SessionError> {
        if self.is_cyclic_running() {
            self.stop_cyclic().await;
            return Ok(PreparedSend::Done(SendOutcome::CyclicStopped));
        }

        let payload = match prepare_payload(text, settings) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("send aborted: {e}");
                self.sink
                    .enqueue(UiUpdate::Status(StatusMessage::error(e.to_string())));
                return Err(e.into());
            }
        };

        match settings.cycle_interval {
            Some(interval) => {
                self.cyclic = Some(self.dispatcher.start_cyclic(payload, interval));
                if settings.auto_clear {
                    self.sink.enqueue(UiUpdate::ClearSendBuffer);
                }
                Ok(PreparedSend::Done(SendOutcome::CyclicStarted))
            }
            None => Ok(PreparedSend::Once(PendingSend {
                dispatcher: self.dispatcher.clone(),
                sink: Arc::clone(&self.sink),
                payload,
                auto_clear: settings.auto_clear,
            })),
        }
    }

    /// Stops the cyclic send, if any.  Returns `true` if one was running.
    pub async fn stop_cyclic(&mut self) -> bool {
        match self.cyclic.take() {
            Some(cyclic) => {
                let was_running = !cyclic.is_finished();
                cyclic.stop().await;
                was_running
            }
            None => false,
        }
    }

    // ── Settings and counters ───────────────────────────────────────────────

    /// Zeroes both counters and pushes the reset labels.
    pub fn reset_counters(&self) {
        self.counters.reset();
        push_counters(self.sink.as_ref(), &self.counters);
    }

    /// Publishes new receive settings; pumps apply them from the next chunk.
    pub fn set_receive_settings(&self, settings: ReceiveSettings) {
        debug!("receive settings now {settings:?}");
        self.receive_settings.send_replace(settings);
    }

    /// Resolves and stores the destination used by UDP server sends.
    ///
    /// # Errors
    ///
    /// [`SessionError::Transport`] with
    /// [`TransportError::InvalidPortOrAddress`] if the text does not resolve.
    pub async fn set_udp_target(&self, host: &str, port: &str) -> Result<SocketAddr, SessionError> {
        let target = resolve(host, port).await?;
        self.udp_target.send_replace(Some(target));
        debug!("UDP target set to {target}");
        Ok(target)
    }

    pub fn clear_udp_target(&self) {
        self.udp_target.send_replace(None);
    }
}

async fn accept_loop(listener: Arc<Listener>, ctx: PumpContext) {
    loop {
        match listener.accept().await {
            Ok((conn, reader)) => {
                let conn = Arc::new(conn);
                let peer = conn.peer_label();
                info!("new connection: {peer}");
                ctx.sink.enqueue(UiUpdate::Status(StatusMessage::success(format!(
                    "new connection: {peer}"
                ))));
                ctx.registry.add(Arc::clone(&conn)).await;
                spawn_pump(conn, reader, ctx.clone());
            }
            Err(TransportError::ListenerClosed) => {
                debug!("accept loop on {} finished", listener.local_addr());
                return;
            }
            Err(e) => {
                error!("accept loop on {} failed: {e}", listener.local_addr());
                ctx.sink
                    .enqueue(UiUpdate::Status(StatusMessage::error(e.to_string())));
                return;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Transport abstraction over TCP and UDP endpoints.
//!
//! Every endpoint the session opens is represented by two halves:
//!
//! - a [`Connection`], shared through the registry, used for writing and for
//!   closing;
//! - a [`Reader`], owned by exactly one inbound pump, used for reading.
//!
//! # Endpoint kinds
//!
//! ```text
//! dial_tcp    ──► Link::Tcp             (write half behind a Mutex)
//! listen_tcp  ──► Listener ── accept ──► Link::Tcp (one per peer)
//! dial_udp    ──► Link::UdpConnected    (socket fixed to one peer)
//! listen_udp  ──► Link::UdpUnconnected  (peer chosen per send via write_to)
//! ```
//!
//! The variant tag decides between a plain `write` and a `write_to`; callers
//! never inspect the socket type.
//!
//! # Closing
//!
//! Each connection carries a `watch` close flag.  [`Connection::close`] flips
//! it exactly once (later calls return `false`), shuts down the TCP write
//! half, and wakes the [`Reader`] so its pump returns
//! [`ReadOutcome::Closed`] instead of waiting for the peer.  [`Listener`]
//! uses the same mechanism so a closed listener ends its accept loop with
//! [`TransportError::ListenerClosed`] rather than a runtime failure.

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        lookup_host,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream, UdpSocket,
    },
    sync::{watch, Mutex},
};
use tracing::{debug, info};
use uuid::Uuid;

/// Maximum number of bytes read from a socket in one call.
pub const READ_CHUNK_SIZE: usize = 2048;

/// Identity of a registered connection.
///
/// Accepted TCP connections share the listener's local address, so the
/// local address alone cannot tell them apart.
pub type ConnectionId = Uuid;

/// Errors produced by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The host or port entered by the user could not be turned into an address.
    #[error("invalid address or port {host:?}:{port:?}: {reason}")]
    InvalidPortOrAddress {
        host: String,
        port: String,
        reason: String,
    },
    /// Connecting to the remote endpoint failed.
    #[error("dial {addr} failed: {source}")]
    DialFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// Binding the local endpoint failed.
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// The listener failed while waiting for a connection.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] io::Error),
    /// The listener was closed; the accept loop should stop quietly.
    #[error("listener closed")]
    ListenerClosed,
    /// Reading from a connection failed, including end-of-stream.
    #[error("read failed: {0}")]
    ReadFailed(#[source] io::Error),
    /// Writing to a connection failed.
    #[error("write to {addr} failed: {source}")]
    WriteFailed {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// The connection was already closed when a write was attempted.
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
    /// A plain write was attempted on an unconnected UDP socket.
    #[error("connection {0} needs a target address for every send")]
    MissingTarget(ConnectionId),
    /// `write_to` was attempted on something other than an unconnected UDP socket.
    #[error("connection {0} is not an unconnected UDP socket")]
    NotDatagramServer(ConnectionId),
}

/// The socket behind a [`Connection`], tagged by how it must be written to.
#[derive(Debug)]
enum Link {
    /// A TCP stream (dialed or accepted).  Only the write half lives here.
    Tcp(Mutex<OwnedWriteHalf>),
    /// A UDP socket connected to one peer.
    UdpConnected(Arc<UdpSocket>),
    /// A bound, unconnected UDP socket; every send names its destination.
    UdpUnconnected(Arc<UdpSocket>),
}

/// The shared, writable side of an open endpoint.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    local_addr: SocketAddr,
    peer_addr: watch::Sender<Option<SocketAddr>>,
    link: Link,
    closed: watch::Sender<bool>,
}

/// Result of one [`Reader::read_chunk`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `len` bytes were read into the buffer; `from` is set for unconnected UDP.
    Data {
        len: usize,
        from: Option<SocketAddr>,
    },
    /// [`Connection::close`] was called; the pump should stop without reporting.
    Closed,
}

/// The readable side of an open endpoint, owned by one inbound pump.
#[derive(Debug)]
pub struct Reader {
    half: ReadHalf,
    closed: watch::Receiver<bool>,
}

#[derive(Debug)]
enum ReadHalf {
    Tcp(OwnedReadHalf),
    UdpConnected(Arc<UdpSocket>),
    UdpUnconnected(Arc<UdpSocket>),
}

/// A bound TCP listening socket.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
    closed: watch::Sender<bool>,
}

// ── Address resolution ────────────────────────────────────────────────────────

/// Resolves UI host/port text into a socket address.
///
/// IPv4 results are preferred when a name resolves to both families.
///
/// # Errors
///
/// Returns [`TransportError::InvalidPortOrAddress`] for an empty host, a port
/// that is not a `u16`, or a host that does not resolve.
pub async fn resolve(host: &str, port: &str) -> Result<SocketAddr, TransportError> {
    let invalid = |reason: String| TransportError::InvalidPortOrAddress {
        host: host.to_string(),
        port: port.to_string(),
        reason,
    };

    let host_trimmed = host.trim();
    if host_trimmed.is_empty() {
        return Err(invalid("host is empty".to_string()));
    }
    let port_num: u16 = port
        .trim()
        .parse()
        .map_err(|e| invalid(format!("port: {e}")))?;

    let addrs: Vec<SocketAddr> = lookup_host((host_trimmed, port_num))
        .await
        .map_err(|e| invalid(e.to_string()))?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| invalid("host did not resolve".to_string()))
}

// ── Constructors ──────────────────────────────────────────────────────────────

/// Dials a TCP connection to `host:port`.
///
/// # Errors
///
/// [`TransportError::InvalidPortOrAddress`] or [`TransportError::DialFailed`].
pub async fn dial_tcp(host: &str, port: &str) -> Result<(Connection, Reader), TransportError> {
    let addr = resolve(host, port).await?;
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::DialFailed { addr, source })?;
    let pair = tcp_pair(stream).map_err(|source| TransportError::DialFailed { addr, source })?;
    info!("dialed TCP {addr} from {}", pair.0.local_addr());
    Ok(pair)
}

/// Binds a TCP listener on `host:port`.  Port `0` picks an ephemeral port.
///
/// # Errors
///
/// [`TransportError::InvalidPortOrAddress`] or [`TransportError::BindFailed`].
pub async fn listen_tcp(host: &str, port: &str) -> Result<Listener, TransportError> {
    let addr = resolve(host, port).await?;
    let inner = TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::BindFailed { addr, source })?;
    let local_addr = inner
        .local_addr()
        .map_err(|source| TransportError::BindFailed { addr, source })?;
    let (closed, _) = watch::channel(false);
    info!("TCP listener bound on {local_addr}");
    Ok(Listener {
        inner,
        local_addr,
        closed,
    })
}

/// Opens a UDP socket connected to `host:port`.
///
/// # Errors
///
/// [`TransportError::InvalidPortOrAddress`] or [`TransportError::DialFailed`].
pub async fn dial_udp(host: &str, port: &str) -> Result<(Connection, Reader), TransportError> {
    let addr = resolve(host, port).await?;
    let unspecified = match addr.ip() {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    let dial_failed = |source| TransportError::DialFailed { addr, source };

    let socket = UdpSocket::bind(SocketAddr::new(unspecified, 0))
        .await
        .map_err(dial_failed)?;
    socket.connect(addr).await.map_err(dial_failed)?;
    let local_addr = socket.local_addr().map_err(dial_failed)?;

    let socket = Arc::new(socket);
    let conn = Connection::new(
        local_addr,
        Some(addr),
        Link::UdpConnected(Arc::clone(&socket)),
    );
    let reader = conn.reader(ReadHalf::UdpConnected(socket));
    info!("UDP socket {local_addr} connected to {addr}");
    Ok((conn, reader))
}

/// Binds an unconnected UDP socket on `host:port`.
///
/// # Errors
///
/// [`TransportError::InvalidPortOrAddress`] or [`TransportError::BindFailed`].
pub async fn listen_udp(host: &str, port: &str) -> Result<(Connection, Reader), TransportError> {
    let addr = resolve(host, port).await?;
    let bind_failed = |source| TransportError::BindFailed { addr, source };

    let socket = UdpSocket::bind(addr).await.map_err(bind_failed)?;
    let local_addr = socket.local_addr().map_err(bind_failed)?;

    let socket = Arc::new(socket);
    let conn = Connection::new(local_addr, None, Link::UdpUnconnected(Arc::clone(&socket)));
    let reader = conn.reader(ReadHalf::UdpUnconnected(socket));
    info!("UDP socket bound on {local_addr}");
    Ok((conn, reader))
}

fn tcp_pair(stream: TcpStream) -> io::Result<(Connection, Reader)> {
    let local_addr = stream.local_addr()?;
    let peer_addr = stream.peer_addr()?;
    let (read_half, write_half) = stream.into_split();
    let conn = Connection::new(local_addr, Some(peer_addr), Link::Tcp(Mutex::new(write_half)));
    let reader = conn.reader(ReadHalf::Tcp(read_half));
    Ok((conn, reader))
}

// ── Connection ────────────────────────────────────────────────────────────────

impl Connection {
    fn new(local_addr: SocketAddr, peer_addr: Option<SocketAddr>, link: Link) -> Self {
        let (peer_addr, _) = watch::channel(peer_addr);
        let (closed, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            local_addr,
            peer_addr,
            link,
            closed,
        }
    }

    fn reader(&self, half: ReadHalf) -> Reader {
        Reader {
            half,
            closed: self.closed.subscribe(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The remote endpoint.  For an unconnected UDP socket this is the sender
    /// of the most recent datagram, or `None` before the first one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        *self.peer_addr.borrow()
    }

    pub(crate) fn record_peer(&self, addr: SocketAddr) {
        self.peer_addr.send_if_modified(|current| {
            if *current == Some(addr) {
                false
            } else {
                *current = Some(addr);
                true
            }
        });
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self.link, Link::Tcp(_))
    }

    /// Returns `true` when sends must go through [`Connection::write_to`].
    pub fn is_datagram_server(&self) -> bool {
        matches!(self.link, Link::UdpUnconnected(_))
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Peer address for messages, or `"-"` when unknown.
    pub fn peer_label(&self) -> String {
        self.peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string())
    }

    /// Writes `data` to the connected peer and returns the byte count.
    ///
    /// A write still pending when [`Connection::close`] is called is
    /// abandoned and reported as [`TransportError::Closed`], so a peer that
    /// stops reading cannot hold up teardown.
    ///
    /// # Errors
    ///
    /// [`TransportError::Closed`] after [`Connection::close`],
    /// [`TransportError::MissingTarget`] for an unconnected UDP socket, or
    /// [`TransportError::WriteFailed`] for socket errors.
    pub async fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed(self.id));
        }
        let write_failed = |source| TransportError::WriteFailed {
            addr: self.peer_label(),
            source,
        };
        match &self.link {
            Link::Tcp(writer) => {
                self.until_closed(async {
                    let mut guard = writer.lock().await;
                    guard.write_all(data).await.map_err(write_failed)?;
                    Ok(data.len())
                })
                .await
            }
            Link::UdpConnected(socket) => {
                self.until_closed(async { socket.send(data).await.map_err(write_failed) })
                    .await
            }
            Link::UdpUnconnected(_) => Err(TransportError::MissingTarget(self.id)),
        }
    }

    /// Sends one datagram to `target` from an unconnected UDP socket.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotDatagramServer`] for any other link,
    /// [`TransportError::Closed`] after close, or
    /// [`TransportError::WriteFailed`] for socket errors.
    pub async fn write_to(&self, data: &[u8], target: SocketAddr) -> Result<usize, TransportError> {
        let Link::UdpUnconnected(socket) = &self.link else {
            return Err(TransportError::NotDatagramServer(self.id));
        };
        if self.is_closed() {
            return Err(TransportError::Closed(self.id));
        }
        self.until_closed(async {
            socket
                .send_to(data, target)
                .await
                .map_err(|source| TransportError::WriteFailed {
                    addr: target.to_string(),
                    source,
                })
        })
        .await
    }

    /// Runs `op` unless the connection is closed first.  Dropping `op`
    /// releases the TCP writer lock it may hold.
    async fn until_closed<T>(
        &self,
        op: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        let mut closed = self.closed.subscribe();
        tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => Err(TransportError::Closed(self.id)),
            result = op => result,
        }
    }

    /// Closes the connection.  Returns `true` only for the call that closed it.
    ///
    /// Wakes the reader so its pump exits and aborts any pending write; for
    /// TCP the write half is then shut down so the peer sees end-of-stream.
    /// The writer lock is only awaited after the flag is set, when every
    /// holder is already giving it up.
    pub async fn close(&self) -> bool {
        let already_closed = self.closed.send_replace(true);
        if already_closed {
            return false;
        }
        if let Link::Tcp(writer) = &self.link {
            let mut guard = writer.lock().await;
            if let Err(e) = guard.shutdown().await {
                debug!("shutdown of {} failed: {e}", self.peer_label());
            }
        }
        debug!("connection {} ({}) closed", self.id, self.local_addr);
        true
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

impl Reader {
    /// Waits for the next chunk, or for the connection to be closed.
    ///
    /// A TCP end-of-stream is reported as [`TransportError::ReadFailed`] with
    /// [`io::ErrorKind::UnexpectedEof`]; an empty UDP datagram is valid data.
    ///
    /// # Errors
    ///
    /// [`TransportError::ReadFailed`] for any socket failure.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        tokio::select! {
            biased;
            _ = wait_closed(&mut self.closed) => Ok(ReadOutcome::Closed),
            result = read_half(&mut self.half, buf) => result,
        }
    }
}

async fn read_half(half: &mut ReadHalf, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
    match half {
        ReadHalf::Tcp(stream) => match stream.read(buf).await {
            Ok(0) => Err(TransportError::ReadFailed(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            ))),
            Ok(len) => Ok(ReadOutcome::Data { len, from: None }),
            Err(e) => Err(TransportError::ReadFailed(e)),
        },
        ReadHalf::UdpConnected(socket) => socket
            .recv(buf)
            .await
            .map(|len| ReadOutcome::Data { len, from: None })
            .map_err(TransportError::ReadFailed),
        ReadHalf::UdpUnconnected(socket) => loop {
            match socket.recv_from(buf).await {
                Ok((len, from)) => {
                    return Ok(ReadOutcome::Data {
                        len,
                        from: Some(from),
                    })
                }
                // Windows reports an ICMP port-unreachable for an earlier
                // send_to here; the socket itself is still usable.
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                    debug!("ignoring connection reset on unconnected UDP socket: {e}");
                }
                Err(e) => return Err(TransportError::ReadFailed(e)),
            }
        },
    }
}

/// Resolves once the flag is `true` or its sender is gone.
async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    loop {
        let is_closed = *closed.borrow_and_update();
        if is_closed {
            return;
        }
        if closed.changed().await.is_err() {
            return;
        }
    }
}

// ── Listener ──────────────────────────────────────────────────────────────────

impl Listener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the next incoming connection.
    ///
    /// # Errors
    ///
    /// [`TransportError::ListenerClosed`] once [`Listener::close`] has been
    /// called, or [`TransportError::AcceptFailed`] for socket errors.
    pub async fn accept(&self) -> Result<(Connection, Reader), TransportError> {
        let mut closed = self.closed.subscribe();
        tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => Err(TransportError::ListenerClosed),
            result = self.inner.accept() => {
                let (stream, peer) = result.map_err(TransportError::AcceptFailed)?;
                debug!("accepted TCP connection from {peer}");
                tcp_pair(stream).map_err(TransportError::AcceptFailed)
            }
        }
    }

    /// Stops accepting.  Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        let already_closed = self.closed.send_replace(true);
        if !already_closed {
            info!("TCP listener on {} closed", self.local_addr);
        }
        !already_closed
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Command bridge: exposes session operations to whatever front end drives
//! NetAssist.
//!
//! The front end (GTK window, web view, or the headless binary) never touches
//! the session directly.  It calls the async command functions in this
//! module, passing the shared [`AppState`], and it receives everything it
//! must display through the [`updates::UpdateSink`] queue.
//!
//! # Data Transfer Objects (DTOs)
//!
//! Commands take and return plain serialisable structs (`SendOptionsDto`,
//! `ReceiveOptionsDto`, `StatusDto`, ...) whose fields are the raw values a
//! form would hold: protocol names, port text, interval text, file paths as
//! strings.  Parsing and validation happen here, at the edge, so the
//! application layer only sees typed values.
//!
//! # `CommandResult<T>` wrapper
//!
//! Every command returns `CommandResult<T>` rather than `Result<T, E>`, so
//! every response has the same shape:
//! `{ success: bool, data: T | null, error: string | null }`.
//! Failures are also reported as a status update, so a front end that only
//! renders the update queue still shows them.

pub mod updates;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use netassist_core::{ProtocolKind, ReceiveSettings, SendSettings};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::application::session::{PreparedSend, SendOutcome, SessionController};
use crate::infrastructure::storage::{
    capture::{self, CaptureError},
    config::{self as config_store, AppConfig, SendConfig},
};

pub use updates::{ChannelSink, StatusLevel, StatusMessage, UiUpdate, UpdateSink};

// ── Shared application state ──────────────────────────────────────────────────

/// State shared by all command invocations.
///
/// Fields are behind async Tokio mutexes: commands run as Tokio tasks and
/// may await I/O while holding the session.
pub struct AppState {
    /// The single connection session.
    pub session: Mutex<SessionController>,
    /// Configuration loaded at start-up; the source of form defaults.
    pub config: Mutex<AppConfig>,
    /// Where `save_config` writes; `None` means the platform config file.
    config_path: Option<PathBuf>,
    sink: Arc<dyn UpdateSink>,
}

impl AppState {
    /// Creates the state with a fresh session reporting to `sink`.
    ///
    /// The session starts with the receive settings from `config`.
    pub fn new(sink: Arc<dyn UpdateSink>, config: AppConfig) -> Arc<Self> {
        Self::build(sink, config, None)
    }

    /// Like [`AppState::new`], but `save_config` writes to `path`.
    pub fn with_config_file(
        sink: Arc<dyn UpdateSink>,
        config: AppConfig,
        path: impl Into<PathBuf>,
    ) -> Arc<Self> {
        Self::build(sink, config, Some(path.into()))
    }

    fn build(
        sink: Arc<dyn UpdateSink>,
        config: AppConfig,
        config_path: Option<PathBuf>,
    ) -> Arc<Self> {
        let session = SessionController::new(Arc::clone(&sink));
        session.set_receive_settings(config.receive.to_settings());
        Arc::new(Self {
            session: Mutex::new(session),
            config: Mutex::new(config),
            config_path,
            sink,
        })
    }

    fn report(&self, status: StatusMessage) {
        self.sink.enqueue(UiUpdate::Status(status));
    }
}

// ── Data Transfer Objects ─────────────────────────────────────────────────────

/// Local endpoint returned by a successful connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDto {
    pub address: String,
    pub port: u16,
}

/// Send options exactly as the form holds them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptionsDto {
    #[serde(default)]
    pub send_hex: bool,
    #[serde(default)]
    pub append_crlf: bool,
    #[serde(default)]
    pub auto_clear: bool,
    #[serde(default)]
    pub cyclic: bool,
    /// Interval in milliseconds as typed; empty, invalid or zero means 1000.
    #[serde(default)]
    pub cycle_interval: String,
}

impl From<&SendOptionsDto> for SendSettings {
    fn from(dto: &SendOptionsDto) -> Self {
        let settings = SendSettings {
            send_hex: dto.send_hex,
            append_crlf: dto.append_crlf,
            auto_clear: dto.auto_clear,
            cycle_interval: None,
        };
        if dto.cyclic {
            settings.cyclic(&dto.cycle_interval)
        } else {
            settings
        }
    }
}

impl From<&SendConfig> for SendOptionsDto {
    fn from(cfg: &SendConfig) -> Self {
        Self {
            send_hex: cfg.send_hex,
            append_crlf: cfg.append_crlf,
            auto_clear: cfg.auto_clear,
            cyclic: cfg.cyclic,
            cycle_interval: cfg.cycle_interval_ms.to_string(),
        }
    }
}

/// Receive options exactly as the form holds them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveOptionsDto {
    #[serde(default)]
    pub hex_display: bool,
    #[serde(default)]
    pub show_timestamp: bool,
    #[serde(default)]
    pub pause_display: bool,
    /// Capture file path; `None` or empty disables mirroring.
    #[serde(default)]
    pub capture_file: Option<String>,
}

impl From<ReceiveOptionsDto> for ReceiveSettings {
    fn from(dto: ReceiveOptionsDto) -> Self {
        Self {
            hex_display: dto.hex_display,
            show_timestamp: dto.show_timestamp,
            capture_file: dto
                .capture_file
                .filter(|p| !p.trim().is_empty())
                .map(Into::into),
            pause_display: dto.pause_display,
        }
    }
}

/// Result of the send command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResultDto {
    /// `"sent"`, `"cyclic-started"` or `"cyclic-stopped"`.
    pub outcome: String,
    /// Bytes written by a one-shot send; zero otherwise.
    pub bytes: usize,
}

impl From<SendOutcome> for SendResultDto {
    fn from(outcome: SendOutcome) -> Self {
        match outcome {
            SendOutcome::Sent(bytes) => Self {
                outcome: "sent".to_string(),
                bytes,
            },
            SendOutcome::CyclicStarted => Self {
                outcome: "cyclic-started".to_string(),
                bytes: 0,
            },
            SendOutcome::CyclicStopped => Self {
                outcome: "cyclic-stopped".to_string(),
                bytes: 0,
            },
        }
    }
}

/// Snapshot of the session for polling front ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDto {
    pub state: String,
    pub protocol: Option<String>,
    pub received: u64,
    pub sent: u64,
    pub connections: usize,
    pub cyclic_running: bool,
    pub udp_target: Option<String>,
}

/// Unified response wrapper used by every command.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Opens a session.  `protocol` accepts `"tcp-server"` style names or the
/// display labels (`"TCP server"`).
pub async fn connect(
    state: Arc<AppState>,
    protocol: String,
    host: String,
    port: String,
) -> CommandResult<EndpointDto> {
    let kind: ProtocolKind = match protocol.parse() {
        Ok(kind) => kind,
        Err(e) => {
            let msg = format!("{e}");
            state.report(StatusMessage::error(msg.clone()));
            return CommandResult::err(msg);
        }
    };

    let mut session = state.session.lock().await;
    match session.connect(kind, &host, &port).await {
        Ok(local) => CommandResult::ok(EndpointDto {
            address: local.ip().to_string(),
            port: local.port(),
        }),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Closes the session.
pub async fn disconnect(state: Arc<AppState>) -> CommandResult<()> {
    let mut session = state.session.lock().await;
    match session.disconnect().await {
        Ok(()) => CommandResult::ok(()),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Sends the outbound text, or stops the running cyclic send.
pub async fn send(
    state: Arc<AppState>,
    text: String,
    options: SendOptionsDto,
) -> CommandResult<SendResultDto> {
    let settings = SendSettings::from(&options);
    // The session lock is released before any socket write.
    let prepared = state.session.lock().await.prepare_send(&text, &settings).await;
    match prepared {
        Ok(PreparedSend::Done(outcome)) => CommandResult::ok(outcome.into()),
        Ok(PreparedSend::Once(pending)) => CommandResult::ok(pending.run().await.into()),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Stops the cyclic send.  `data` is `true` if one was running.
pub async fn stop_cyclic(state: Arc<AppState>) -> CommandResult<bool> {
    let mut session = state.session.lock().await;
    CommandResult::ok(session.stop_cyclic().await)
}

/// Zeroes the received and sent counters.
pub async fn reset_counters(state: Arc<AppState>) -> CommandResult<()> {
    state.session.lock().await.reset_counters();
    CommandResult::ok(())
}

/// Applies new receive options to every running pump.
pub async fn update_receive_settings(
    state: Arc<AppState>,
    options: ReceiveOptionsDto,
) -> CommandResult<()> {
    state
        .session
        .lock()
        .await
        .set_receive_settings(options.into());
    CommandResult::ok(())
}

/// Sets the UDP server destination.  Empty host and port clear it.
pub async fn set_udp_target(
    state: Arc<AppState>,
    host: String,
    port: String,
) -> CommandResult<Option<String>> {
    let session = state.session.lock().await;
    if host.trim().is_empty() && port.trim().is_empty() {
        session.clear_udp_target();
        return CommandResult::ok(None);
    }
    match session.set_udp_target(&host, &port).await {
        Ok(target) => CommandResult::ok(Some(target.to_string())),
        Err(e) => {
            state.report(StatusMessage::error(e.to_string()));
            CommandResult::err(e.to_string())
        }
    }
}

/// Returns the current session status.
pub async fn get_status(state: Arc<AppState>) -> CommandResult<StatusDto> {
    let session = state.session.lock().await;
    let counters = session.counters().snapshot();
    CommandResult::ok(StatusDto {
        state: session.state().to_string(),
        protocol: session.kind().map(|k| k.to_string()),
        received: counters.received,
        sent: counters.sent,
        connections: session.registry().count().await,
        cyclic_running: session.is_cyclic_running(),
        udp_target: session.udp_target().map(|t| t.to_string()),
    })
}

/// Returns the configuration the front end should use for its initial form
/// values.
pub async fn get_config(state: Arc<AppState>) -> CommandResult<AppConfig> {
    CommandResult::ok(state.config.lock().await.clone())
}

/// Makes `config` the start-up configuration and writes it to disk.
pub async fn save_config(state: Arc<AppState>, config: AppConfig) -> CommandResult<()> {
    let written = match &state.config_path {
        Some(path) => config_store::save_config_to(&config, path),
        None => config_store::save_config(&config),
    };
    match written {
        Ok(()) => {
            *state.config.lock().await = config;
            CommandResult::ok(())
        }
        Err(e) => {
            warn!("saving config failed: {e}");
            state.report(StatusMessage::error(e.to_string()));
            CommandResult::err(e.to_string())
        }
    }
}

/// Reads a file into the send buffer.
pub async fn load_send_data(state: Arc<AppState>, path: String) -> CommandResult<String> {
    match capture::load_send_data(Path::new(&path)).await {
        Ok(text) => CommandResult::ok(text),
        Err(e) => capture_failed(&state, e),
    }
}

/// Appends the received view to a file.
pub async fn save_received_data(
    state: Arc<AppState>,
    path: String,
    received_text: String,
) -> CommandResult<()> {
    match capture::save_received(Path::new(&path), &received_text).await {
        Ok(()) => CommandResult::ok(()),
        Err(e) => capture_failed(&state, e),
    }
}

fn capture_failed<T: Serialize>(state: &AppState, e: CaptureError) -> CommandResult<T> {
    warn!("{e}");
    state.report(StatusMessage::error(e.to_string()));
    CommandResult::err(e.to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

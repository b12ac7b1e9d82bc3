//! NetAssist headless entry point.
//!
//! Plays the part of the UI: opens the endpoint described by the config
//! file, prints every update from the queue, and sends each line typed on
//! stdin with the configured send options.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  ├─ load_config()             -- platform config file or defaults
//!  ├─ tracing subscriber        -- RUST_LOG, else config log_level;
//!  │                               NET_ASS_DEBUG=on forces debug
//!  ├─ AppState::new(sink)       -- session reporting to a ChannelSink
//!  ├─ UI consumer task          -- sole reader of the update queue
//!  ├─ ui_bridge::connect(...)
//!  └─ stdin lines ─► ui_bridge::send(...)   until EOF or Ctrl-C
//! ```

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use netassist::infrastructure::storage::config::{load_config, AppConfig};
use netassist::infrastructure::ui_bridge::{
    self, AppState, ChannelSink, SendOptionsDto, StatusLevel, UiUpdate,
};

/// Environment switch that forces debug logging.
const DEBUG_ENV: &str = "NET_ASS_DEBUG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, config_error) = match load_config() {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // Initialise structured logging.  `RUST_LOG` wins over the config file.
    let filter = if std::env::var(DEBUG_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("on")) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("NetAssist starting");
    if let Some(e) = config_error {
        warn!("config not loaded, using defaults: {e}");
    }

    let (sink, updates) = ChannelSink::new();
    let consumer = tokio::spawn(render_updates(updates));
    let state = AppState::new(Arc::new(sink), config.clone());

    // ── Connect ──────────────────────────────────────────────────────────────
    let connection = &config.connection;
    let connected = ui_bridge::connect(
        Arc::clone(&state),
        connection.protocol.to_string(),
        connection.host.clone(),
        connection.port.to_string(),
    )
    .await;
    if !connected.success {
        drop(state);
        let _ = tokio::time::timeout(Duration::from_secs(1), consumer).await;
        bail!(
            "could not open {} on {}:{}: {}",
            connection.protocol,
            connection.host,
            connection.port,
            connected.error.unwrap_or_default()
        );
    }

    let send_options = SendOptionsDto::from(&config.send);

    info!("NetAssist ready.  Type a line to send it; Ctrl-C to exit.");

    // ── Send loop ────────────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            line = lines.next_line() => match line? {
                Some(text) => {
                    let result =
                        ui_bridge::send(Arc::clone(&state), text, send_options.clone()).await;
                    if let Some(data) = result.data {
                        debug!("send: {} ({} byte(s))", data.outcome, data.bytes);
                    }
                }
                None => {
                    debug!("stdin closed");
                    break;
                }
            },
        }
    }

    // ── Shutdown ─────────────────────────────────────────────────────────────
    let _ = ui_bridge::disconnect(Arc::clone(&state)).await;
    drop(state);
    // Pumps release their sink clones as they exit; don't wait forever.
    let _ = tokio::time::timeout(Duration::from_secs(1), consumer).await;

    info!("NetAssist stopped");
    Ok(())
}

/// The single consumer of the update queue.
async fn render_updates(mut updates: UnboundedReceiver<UiUpdate>) {
    while let Some(update) = updates.recv().await {
        match update {
            UiUpdate::Received(text) => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            UiUpdate::Status(msg) => match msg.level {
                StatusLevel::Error => eprintln!("[status] {msg}"),
                _ => println!("[status] {msg}"),
            },
            UiUpdate::Counters { received, sent } => debug!("{received}  {sent}"),
            UiUpdate::LocalEndpoint { address, port } => println!("[local] {address}:{port}"),
            UiUpdate::TargetEntry { editable } => {
                debug!("target entry {}", if editable { "enabled" } else { "disabled" });
            }
            UiUpdate::ClearSendBuffer => debug!("send buffer cleared"),
            UiUpdate::CyclicStopped => println!("[status] cyclic send stopped"),
        }
    }
}

//! Plain-file capture: mirroring received data, saving the received view,
//! and loading send data.
//!
//! All writes are plain appends with no framing.  The file is opened per
//! call, so several pumps mirroring into the same file interleave whole
//! chunks rather than sharing a long-lived handle.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tracing::debug;

/// Error type for capture file operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Appends `content` to `path`, creating the file if needed.
///
/// # Errors
///
/// Returns [`CaptureError::Io`] if the file cannot be opened or written.
pub async fn append_to_file(path: &Path, content: &[u8]) -> Result<(), CaptureError> {
    let io_err = |source| CaptureError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(io_err)?;
    file.write_all(content).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)?;
    debug!("appended {} byte(s) to {}", content.len(), path.display());
    Ok(())
}

/// Appends the whole received view to `path` (the "Save" action).
///
/// # Errors
///
/// Returns [`CaptureError::Io`] on file-system failure.
pub async fn save_received(path: &Path, received_text: &str) -> Result<(), CaptureError> {
    append_to_file(path, received_text.as_bytes()).await
}

/// Reads a file into the send buffer (the "Load data" action).
///
/// Bytes that are not valid UTF-8 are replaced with `U+FFFD`.
///
/// # Errors
///
/// Returns [`CaptureError::Io`] if the file cannot be read.
pub async fn load_send_data(path: &Path) -> Result<String, CaptureError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| CaptureError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

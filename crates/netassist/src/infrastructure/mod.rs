//! Infrastructure layer.
//!
//! Contains OS-facing adapters: TCP/UDP sockets, file-system storage, and
//! the UI bridge (update queue plus command functions).
//!
//! **Dependency rule**: the `application` layer only uses the socket and
//! update-queue types re-exported here; storage and command functions are
//! reserved for the bridge and `main.rs`.

pub mod network;
pub mod storage;
pub mod ui_bridge;

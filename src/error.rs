//! Library error type.

use std::path::PathBuf;

/// Errors surfaced by the server and relay.
///
/// Missing files, binary files and unreadable directories are not errors:
/// they resolve to empty content and never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("root is not a directory: {}", .0.display())]
    InvalidRoot(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Caller-facing error taxonomy.
//!
//! Everything recoverable inside the subsystem (transport hiccups, corrupt
//! frames, write failures) is swallowed at the session boundary; what
//! escapes to callers is one of these variants.

use std::path::PathBuf;
use std::time::Duration;

use crate::types::QueryKind;

#[derive(Debug, thiserror::Error)]
pub enum LspError {
    /// No project root could be resolved for the given path.
    #[error("no project root found for {}", .0.display())]
    RootNotFound(PathBuf),

    /// The configured server does not handle this file's extension.
    #[error("no configured server handles {}", .0.display())]
    UnsupportedFile(PathBuf),

    /// The path could not be converted to a `file://` URI.
    #[error("cannot convert path to file URI: {}", .0.display())]
    InvalidPath(PathBuf),

    /// The server process could not be started or initialized.
    #[error("failed to start language server: {0}")]
    Spawn(String),

    /// No response arrived within the per-request deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with a JSON-RPC error object.
    #[error("server error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The session died before a response arrived.
    #[error("session closed before a response arrived")]
    SessionClosed,

    /// A position is required for this query kind but none was given.
    #[error("{kind:?} query requires a position")]
    MissingPosition { kind: QueryKind },

    /// Failed to serialize an outgoing frame.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

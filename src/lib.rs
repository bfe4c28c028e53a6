//! Pooled LSP client: per-project language server sessions.
//!
//! Turns raw subprocess byte streams into correlated JSON-RPC calls, keeps
//! one server session per project root, synchronizes file content with each
//! server, and aggregates push diagnostics into bounded text reports. Idle
//! sessions are reclaimed by a background sweep.

pub mod codec;
pub mod types;

pub(crate) mod diagnostics;
pub(crate) mod documents;
pub(crate) mod protocol;
pub(crate) mod rpc;
pub(crate) mod session;

mod error;
mod pool;
mod root;

pub use error::LspError;
pub use pool::LspPool;
pub use root::{MarkerRoots, RootResolver};
pub use types::{Diagnostic, DiagnosticSeverity, PoolConfig, Position, QueryKind, ServerConfig};

//! Public types: configuration, diagnostics, and query kinds.
//!
//! Callers construct a [`PoolConfig`], issue [`QueryKind`] requests through
//! the pool, and read [`Diagnostic`]s out of formatted reports.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration for the session pool.
///
/// The three timing knobs are constructor parameters rather than baked-in
/// constants; the defaults match the observed workload (15s per request,
/// 120s idle threshold, 30s sweep).
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// The language server this pool spawns, one process per project root.
    pub server: ServerConfig,
    /// Per-request deadline in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Sessions with no outbound send for this long are evicted.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// How often the idle sweep runs.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_request_timeout() -> u64 {
    15
}

fn default_idle_timeout() -> u64 {
    120
}

fn default_sweep_interval() -> u64 {
    30
}

impl PoolConfig {
    /// Config with default timings for the given server.
    #[must_use]
    pub fn new(server: ServerConfig) -> Self {
        Self {
            server,
            request_timeout_secs: default_request_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub(crate) fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub(crate) fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Configuration for the language server command.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Executable command (e.g. "rust-analyzer").
    pub command: String,
    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// LSP language identifier (e.g. "rust", "typescript").
    pub language_id: String,
    /// File extensions this server handles (e.g. `["rs"]`). Empty = all.
    #[serde(default)]
    pub file_extensions: Vec<String>,
    /// Files that indicate a project root (e.g. `["Cargo.toml"]`).
    #[serde(default)]
    pub root_markers: Vec<String>,
}

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Convert from LSP numeric severity (1=Error, 2=Warning, 3=Info, 4=Hint).
    ///
    /// Returns `None` for values outside the LSP-defined range; boundary
    /// code decides the fallback policy.
    #[must_use]
    pub fn from_lsp(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

/// A single diagnostic pushed by a language server.
///
/// Fields are private; construction goes through `new` and consumers read
/// via accessors.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    severity: DiagnosticSeverity,
    message: String,
    /// 0-indexed line number.
    line: u32,
    /// 0-indexed column.
    col: u32,
    /// Server-assigned code (e.g. "E0308"), if any.
    code: Option<String>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        severity: DiagnosticSeverity,
        message: String,
        line: u32,
        col: u32,
        code: Option<String>,
    ) -> Self {
        Self {
            severity,
            message,
            line,
            col,
            code,
        }
    }

    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 0-indexed line number.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// 0-indexed column.
    #[must_use]
    pub fn col(&self) -> u32 {
        self.col
    }

    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Format as `path:line:col severity[ code]: message` (1-indexed for display).
    #[must_use]
    pub fn display_with_path(&self, path: &Path) -> String {
        let code = self
            .code
            .as_deref()
            .map(|c| format!(" {c}"))
            .unwrap_or_default();
        format!(
            "{}:{}:{} {}{}: {}",
            path.display(),
            self.line + 1,
            self.col + 1,
            self.severity.label(),
            code,
            self.message,
        )
    }
}

/// A 0-indexed position in a document, as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// The on-demand requests the pool can issue against a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Hover,
    Definition,
    References,
    DocumentSymbols,
    /// Pull diagnostics, as opposed to the push cache.
    Diagnostics,
}

impl QueryKind {
    pub(crate) fn method(self) -> &'static str {
        match self {
            Self::Hover => "textDocument/hover",
            Self::Definition => "textDocument/definition",
            Self::References => "textDocument/references",
            Self::DocumentSymbols => "textDocument/documentSymbol",
            Self::Diagnostics => "textDocument/diagnostic",
        }
    }

    /// Whether this kind carries a cursor position.
    #[must_use]
    pub fn needs_position(self) -> bool {
        matches!(self, Self::Hover | Self::Definition | Self::References)
    }
}

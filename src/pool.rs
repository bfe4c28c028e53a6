//! Session pool — the public facade.
//!
//! Keyed by project root: at most one session per root, created on demand,
//! reused across calls, and reclaimed by a periodic idle sweep. Callers
//! report file changes, issue queries, and read diagnostic reports through
//! this single type.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::diagnostics::{self, DiagnosticsStore};
use crate::error::LspError;
use crate::protocol;
use crate::root::RootResolver;
use crate::session::{Session, SharedSessions};
use crate::types::{PoolConfig, Position, QueryKind};

/// Roots whose sessions have been idle longer than `threshold`.
///
/// Idle time is measured from the last outbound send, so a session being
/// actively driven never qualifies even if the server itself is quiet.
fn idle_roots(entries: &[(PathBuf, Instant)], now: Instant, threshold: Duration) -> Vec<PathBuf> {
    entries
        .iter()
        .filter(|(_, last)| now.duration_since(*last) > threshold)
        .map(|(root, _)| root.clone())
        .collect()
}

fn spawn_sweeper(
    sessions: SharedSessions,
    interval: Duration,
    threshold: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick completes immediately
        loop {
            ticker.tick().await;
            let now = Instant::now();

            let mut entries = Vec::new();
            {
                let map = sessions.lock().await;
                for (root, session) in map.iter() {
                    entries.push((root.clone(), session.last_activity().await));
                }
            }

            let idle = idle_roots(&entries, now, threshold);
            if idle.is_empty() {
                continue;
            }

            let mut evicted = Vec::new();
            {
                let mut map = sessions.lock().await;
                for root in idle {
                    // Re-check: a send may have landed since the snapshot.
                    let still_idle = match map.get(&root) {
                        Some(session) => {
                            now.duration_since(session.last_activity().await) > threshold
                        }
                        None => false,
                    };
                    if still_idle {
                        if let Some(session) = map.remove(&root) {
                            tracing::info!("evicting idle session for {}", root.display());
                            evicted.push(session);
                        }
                    }
                }
            }

            for session in evicted {
                tokio::spawn(async move { session.shutdown().await });
            }
        }
    })
}

/// Pool of language-server sessions, one per project root.
///
/// Construct once per host lifetime; must be created inside a tokio
/// runtime (the idle sweep runs as a background task).
pub struct LspPool {
    config: PoolConfig,
    resolver: Arc<dyn RootResolver>,
    sessions: SharedSessions,
    sweeper: JoinHandle<()>,
}

impl LspPool {
    #[must_use]
    pub fn new(config: PoolConfig, resolver: impl RootResolver + 'static) -> Self {
        let sessions: SharedSessions = Arc::new(Mutex::new(HashMap::new()));
        let sweeper = spawn_sweeper(
            sessions.clone(),
            config.sweep_interval(),
            config.idle_timeout(),
        );
        Self {
            config,
            resolver: Arc::new(resolver),
            sessions,
            sweeper,
        }
    }

    /// Report that a file was created or modified.
    ///
    /// Files the configured server doesn't handle are skipped silently;
    /// the owning session is created on first touch.
    pub async fn notify_file_changed(&self, path: &Path) -> Result<(), LspError> {
        if !self.handles(path) {
            return Ok(());
        }
        let root = self.resolve_root(path)?;
        let session = self.session_for(&root).await?;
        session.sync_document(path).await?;
        Ok(())
    }

    /// Issue an on-demand request against the session owning `path`.
    ///
    /// The document is opened from current file content if the server
    /// hasn't seen it yet. `position` is 0-indexed (line and character, as
    /// LSP counts them) and passes to the wire untouched; editors showing
    /// 1-indexed coordinates must convert before calling. Returns the
    /// server's raw `result` value.
    pub async fn query(
        &self,
        path: &Path,
        kind: QueryKind,
        position: Option<Position>,
    ) -> Result<serde_json::Value, LspError> {
        if !self.handles(path) {
            return Err(LspError::UnsupportedFile(path.to_path_buf()));
        }
        if kind.needs_position() && position.is_none() {
            return Err(LspError::MissingPosition { kind });
        }

        let root = self.resolve_root(path)?;
        let session = self.session_for(&root).await?;
        let uri = session.ensure_open(path).await?;

        let params = match kind {
            QueryKind::Hover | QueryKind::Definition => {
                // needs_position() was checked above
                let Some(position) = position else {
                    return Err(LspError::MissingPosition { kind });
                };
                protocol::position_params(&uri, position)
            }
            QueryKind::References => {
                let Some(position) = position else {
                    return Err(LspError::MissingPosition { kind });
                };
                protocol::references_params(&uri, position)
            }
            QueryKind::DocumentSymbols | QueryKind::Diagnostics => {
                protocol::text_document_params(&uri)
            }
        };

        session.request(kind.method(), Some(params)).await
    }

    /// Render the push-diagnostics cache for the project owning `path`.
    ///
    /// A root with no live session reports zero diagnostics.
    pub async fn diagnostics_report(&self, path: &Path) -> Result<String, LspError> {
        let root = self.resolve_root(path)?;
        let session = self.sessions.lock().await.get(&root).cloned();
        match session {
            Some(session) => Ok(session
                .diagnostics_report(diagnostics::MAX_REPORT_LINES)
                .await),
            None => Ok(diagnostics::render_report(
                &root,
                &DiagnosticsStore::new(),
                diagnostics::MAX_REPORT_LINES,
            )),
        }
    }

    /// Gracefully shut down every session and stop the sweep.
    ///
    /// Outstanding requests are rejected immediately; every child process
    /// receives a termination signal.
    pub async fn shutdown_all(&self) {
        self.sweeper.abort();
        let drained: Vec<(PathBuf, Arc<Session>)> = {
            let mut map = self.sessions.lock().await;
            map.drain().collect()
        };
        for (root, session) in drained {
            tracing::info!("shutting down session for {}", root.display());
            session.shutdown().await;
        }
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Existing session for `root`, or spawn one. Idempotent; the pool
    /// lock is held across the handshake so two callers racing on the same
    /// root cannot create two sessions.
    async fn session_for(&self, root: &Path) -> Result<Arc<Session>, LspError> {
        let mut map = self.sessions.lock().await;
        if let Some(existing) = map.get(root) {
            return Ok(existing.clone());
        }

        let session = Session::spawn(
            root.to_path_buf(),
            &self.config.server,
            self.config.request_timeout(),
            self.sessions.clone(),
        )
        .await?;

        map.insert(root.to_path_buf(), session.clone());
        Ok(session)
    }

    fn resolve_root(&self, path: &Path) -> Result<PathBuf, LspError> {
        self.resolver
            .resolve(path)
            .ok_or_else(|| LspError::RootNotFound(path.to_path_buf()))
    }

    fn handles(&self, path: &Path) -> bool {
        let extensions = &self.config.server.file_extensions;
        if extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|e| e == ext))
    }
}

impl Drop for LspPool {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

//! Server session — owns one child process and its protocol state.
//!
//! A `Session` wires the child's stdout into a [`FrameReader`] read loop,
//! funnels outbound frames through a writer task, correlates requests via
//! [`RequestTracker`], and caches push diagnostics. Holding an
//! `Arc<Session>` is proof the initialize handshake succeeded: sessions are
//! only registered in the pool after it completes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;

use crate::codec::{FrameReader, FrameWriter};
use crate::diagnostics::{DiagnosticsStore, render_report};
use crate::documents::{DocUpdate, DocumentTracker};
use crate::error::LspError;
use crate::protocol::{self, Notification, PublishDiagnosticsParams, Request};
use crate::rpc::RequestTracker;
use crate::types::ServerConfig;

/// Deadline for the initialize handshake; servers indexing a large
/// workspace can take a while to answer.
const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for the graceful shutdown request.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Grace period between `exit` and force-kill.
const KILL_GRACE: Duration = Duration::from_secs(2);

const WRITER_CHANNEL_CAPACITY: usize = 64;

/// The pool map, shared with each session's reader task so a dying process
/// can deregister itself.
pub(crate) type SharedSessions = Arc<Mutex<HashMap<PathBuf, Arc<Session>>>>;

enum WriterCommand {
    Send(serde_json::Value),
    Shutdown,
}

enum IncomingFrame {
    Response {
        id: u64,
        body: serde_json::Value,
    },
    ServerRequest {
        id: serde_json::Value,
        method: String,
    },
    Notification {
        method: String,
        params: Option<serde_json::Value>,
    },
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out = Vec::new();
    for c in path.components() {
        match c {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other),
        }
    }
    out.iter().collect()
}

fn parse_incoming(frame: &serde_json::Value) -> Option<IncomingFrame> {
    let id = frame.get("id");
    let method = frame
        .get("method")
        .and_then(|m| m.as_str())
        .map(String::from);
    let has_result_or_error = frame.get("result").is_some() || frame.get("error").is_some();

    match (id, method, has_result_or_error) {
        (Some(id_val), None, true) => Some(IncomingFrame::Response {
            id: id_val.as_u64()?,
            body: frame.clone(),
        }),
        (Some(id_val), Some(method), _) => Some(IncomingFrame::ServerRequest {
            id: id_val.clone(),
            method,
        }),
        (None, Some(method), _) => Some(IncomingFrame::Notification {
            method,
            params: frame.get("params").cloned(),
        }),
        _ => None,
    }
}

pub(crate) struct Session {
    root: PathBuf,
    language_id: String,
    /// `None` only for stub sessions in tests.
    child: Mutex<Option<Child>>,
    writer_tx: mpsc::Sender<WriterCommand>,
    tracker: Arc<RequestTracker>,
    documents: Mutex<DocumentTracker>,
    diagnostics: Arc<Mutex<DiagnosticsStore>>,
    /// Refreshed on every outbound send; read by the idle sweep.
    last_activity: Mutex<Instant>,
    request_timeout: Duration,
}

impl Session {
    /// Spawn the server process for `root` and run the initialize handshake.
    ///
    /// On any failure the child is dropped (and killed via `kill_on_drop`)
    /// and nothing is registered — the next call for this root starts from
    /// scratch.
    pub async fn spawn(
        root: PathBuf,
        config: &ServerConfig,
        request_timeout: Duration,
        sessions: SharedSessions,
    ) -> Result<Arc<Self>, LspError> {
        let resolved_cmd = which::which(&config.command)
            .map_err(|_| LspError::Spawn(format!("{} not found in PATH", config.command)))?;

        let root_uri = protocol::path_to_file_uri(&root)
            .map_err(|_| LspError::InvalidPath(root.clone()))?;

        let mut cmd = Command::new(&resolved_cmd);
        cmd.args(&config.args)
            .current_dir(&root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // Non-fatal server logging must never break the read loop.
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| LspError::Spawn(format!("spawning {}: {e}", config.command)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::Spawn("no stdout from child".to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::Spawn("no stdin from child".to_string()))?;

        let (writer_tx, writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        tokio::spawn(Self::write_loop(stdin, writer_rx));

        let session = Arc::new(Self {
            root: root.clone(),
            language_id: config.language_id.clone(),
            child: Mutex::new(Some(child)),
            writer_tx: writer_tx.clone(),
            tracker: Arc::new(RequestTracker::new()),
            documents: Mutex::new(DocumentTracker::new()),
            diagnostics: Arc::new(Mutex::new(DiagnosticsStore::new())),
            last_activity: Mutex::new(Instant::now()),
            request_timeout,
        });

        tokio::spawn(Self::read_loop(
            stdout,
            session.tracker.clone(),
            session.diagnostics.clone(),
            writer_tx,
            root,
            sessions,
            Arc::downgrade(&session),
        ));

        session
            .request_with_timeout(
                "initialize",
                Some(protocol::initialize_params(root_uri.as_str())),
                INIT_TIMEOUT,
            )
            .await
            .map_err(|e| LspError::Spawn(format!("initialize failed: {e}")))?;

        session.notify("initialized", Some(serde_json::json!({}))).await;

        Ok(session)
    }

    pub async fn last_activity(&self) -> Instant {
        *self.last_activity.lock().await
    }

    async fn touch(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    /// Send a request and await its response under the session deadline.
    pub async fn request(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, LspError> {
        self.request_with_timeout(method, params, self.request_timeout)
            .await
    }

    async fn request_with_timeout(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
        deadline: Duration,
    ) -> Result<serde_json::Value, LspError> {
        let (id, rx) = self.tracker.register().await;
        let frame = serde_json::to_value(Request::new(id, method, params))?;

        self.touch().await;
        if self
            .writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .is_err()
        {
            // Writer gone means the process is gone; don't leak the entry.
            self.tracker.remove(id).await;
            return Err(LspError::SessionClosed);
        }

        self.tracker.wait(id, rx, deadline).await
    }

    /// Fire-and-forget notification. Write failures are swallowed at the
    /// transport; callers observe them only as a later request timeout.
    pub async fn notify(&self, method: &'static str, params: Option<serde_json::Value>) {
        let frame = match serde_json::to_value(Notification::new(method, params)) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("failed to encode {method} notification: {e}");
                return;
            }
        };
        self.touch().await;
        if self
            .writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .is_err()
        {
            tracing::warn!("dropping {method} notification: writer closed");
        }
    }

    /// Push the file's current content to the server, opening it on first
    /// touch and bumping the version on every later one.
    ///
    /// Returns the document URI for follow-up requests.
    pub async fn sync_document(&self, path: &Path) -> Result<String, LspError> {
        let uri = protocol::path_to_file_uri(path)
            .map_err(|_| LspError::InvalidPath(path.to_path_buf()))?
            .to_string();
        let text = tokio::fs::read_to_string(path).await?;

        let update = self.documents.lock().await.open_or_change(&uri);
        match update {
            DocUpdate::Open { version } => {
                let params = protocol::did_open_params(&uri, &self.language_id, version, &text);
                self.notify("textDocument/didOpen", Some(params)).await;
            }
            DocUpdate::Change { version } => {
                let params = protocol::did_change_params(&uri, version, &text);
                self.notify("textDocument/didChange", Some(params)).await;
            }
        }
        Ok(uri)
    }

    /// Open the document if it isn't already; no version bump when it is.
    pub async fn ensure_open(&self, path: &Path) -> Result<String, LspError> {
        let uri = protocol::path_to_file_uri(path)
            .map_err(|_| LspError::InvalidPath(path.to_path_buf()))?
            .to_string();
        if self.documents.lock().await.is_open(&uri) {
            return Ok(uri);
        }
        self.sync_document(path).await
    }

    /// Render this session's push-diagnostic cache.
    pub async fn diagnostics_report(&self, max_lines: usize) -> String {
        let store = self.diagnostics.lock().await;
        render_report(&self.root, &store, max_lines)
    }

    /// Gracefully shut down: best-effort `shutdown`/`exit`, then force-kill
    /// after a grace period. Outstanding requests are rejected.
    pub async fn shutdown(&self) {
        if self
            .request_with_timeout("shutdown", None, SHUTDOWN_TIMEOUT)
            .await
            .is_ok()
        {
            self.notify("exit", None).await;
        }

        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;

        let mut child = self.child.lock().await;
        if let Some(child) = child.as_mut() {
            if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
                tracing::debug!("server for {} didn't exit in time, killing", self.root.display());
                let _ = child.kill().await;
            }
        }

        self.tracker.fail_all().await;
    }

    async fn write_loop(stdin: impl AsyncWrite + Unpin, mut writer_rx: mpsc::Receiver<WriterCommand>) {
        let mut writer = FrameWriter::new(stdin);
        while let Some(cmd) = writer_rx.recv().await {
            match cmd {
                WriterCommand::Send(frame) => {
                    if let Err(e) = writer.write_frame(&frame).await {
                        tracing::warn!("LSP write error: {e}");
                        break;
                    }
                }
                WriterCommand::Shutdown => break,
            }
        }
    }

    async fn read_loop(
        stdout: impl AsyncRead + Unpin,
        tracker: Arc<RequestTracker>,
        diagnostics: Arc<Mutex<DiagnosticsStore>>,
        writer_tx: mpsc::Sender<WriterCommand>,
        root: PathBuf,
        sessions: SharedSessions,
        this: Weak<Session>,
    ) {
        let mut reader = FrameReader::new(stdout);
        loop {
            match reader.read_frame().await {
                Ok(Some(frame)) => {
                    Self::dispatch_frame(&frame, &tracker, &diagnostics, &writer_tx).await;
                }
                Ok(None) => {
                    tracing::info!("server for {} closed stdout", root.display());
                    break;
                }
                Err(e) => {
                    tracing::warn!("reader error for {}: {e}", root.display());
                    break;
                }
            }
        }

        // Reject pending requests first: a caller holding the pool lock and
        // awaiting a response must unblock before we take the lock below.
        tracker.fail_all().await;

        // Deregister, but only if the pool still holds this exact instance;
        // a replacement session for the same root must survive.
        if let Some(session) = this.upgrade() {
            let mut map = sessions.lock().await;
            if map
                .get(&root)
                .is_some_and(|current| Arc::ptr_eq(current, &session))
            {
                map.remove(&root);
            }
        }
    }

    async fn dispatch_frame(
        frame: &serde_json::Value,
        tracker: &RequestTracker,
        diagnostics: &Mutex<DiagnosticsStore>,
        writer_tx: &mpsc::Sender<WriterCommand>,
    ) {
        let Some(incoming) = parse_incoming(frame) else {
            tracing::trace!("ignoring malformed JSON-RPC frame");
            return;
        };

        match incoming {
            IncomingFrame::Response { id, body } => {
                tracker.resolve(id, body).await;
            }
            IncomingFrame::ServerRequest { id, method } => {
                // Many servers send client/registerCapability, workspace/configuration,
                // etc. We must respond or the server may block.
                tracing::debug!("server sent request {method} — replying method not found");
                let response = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {
                        "code": -32601,
                        "message": format!("Method not found: {method}")
                    }
                });
                let _ = writer_tx.send(WriterCommand::Send(response)).await;
            }
            IncomingFrame::Notification { method, params } => {
                Self::handle_notification(&method, params, diagnostics).await;
            }
        }
    }

    async fn handle_notification(
        method: &str,
        params: Option<serde_json::Value>,
        diagnostics: &Mutex<DiagnosticsStore>,
    ) {
        match method {
            "textDocument/publishDiagnostics" => {
                let Some(params) = params else { return };
                match serde_json::from_value::<PublishDiagnosticsParams>(params) {
                    Ok(diag_params) => {
                        if let Some(path) = protocol::file_uri_to_path(&diag_params.uri) {
                            let items = diag_params
                                .diagnostics
                                .iter()
                                .map(protocol::LspDiagnostic::to_diagnostic)
                                .collect();
                            // Keyed by normalized path so differently spelled
                            // URIs for one document replace each other.
                            diagnostics.lock().await.publish(normalize_path(&path), items);
                        }
                    }
                    Err(e) => {
                        tracing::debug!("failed to parse publishDiagnostics: {e}");
                    }
                }
            }
            _ => {
                // Unknown server chatter must not crash the client.
                tracing::trace!("ignoring notification: {method}");
            }
        }
    }
}

#[cfg(test)]
impl Session {
    /// A session with no process behind it, for driving pool logic.
    /// The writer channel is closed, so every request fails fast with
    /// `SessionClosed`.
    pub(crate) fn stub(root: PathBuf) -> Arc<Self> {
        let (writer_tx, _writer_rx) = mpsc::channel(1);
        Arc::new(Self {
            root,
            language_id: "rust".to_string(),
            child: Mutex::new(None),
            writer_tx,
            tracker: Arc::new(RequestTracker::new()),
            documents: Mutex::new(DocumentTracker::new()),
            diagnostics: Arc::new(Mutex::new(DiagnosticsStore::new())),
            last_activity: Mutex::new(Instant::now()),
            request_timeout: Duration::from_secs(15),
        })
    }

    pub(crate) async fn set_last_activity(&self, at: Instant) {
        *self.last_activity.lock().await = at;
    }
}

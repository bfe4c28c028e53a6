//! Push-diagnostics cache and report rendering.
//!
//! The reader task feeds `textDocument/publishDiagnostics` payloads into a
//! per-session [`DiagnosticsStore`]; each publish fully replaces the prior
//! entry for that document. [`render_report`] flattens the cache into a
//! deterministic, bounded text report.

use std::collections::HashMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::types::Diagnostic;

/// Cap on report body lines; the remainder collapses into a `+N more` suffix.
pub(crate) const MAX_REPORT_LINES: usize = 50;

#[derive(Debug, Default)]
pub(crate) struct DiagnosticsStore {
    data: HashMap<PathBuf, Vec<Diagnostic>>,
}

impl DiagnosticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last-write-wins: replaces any prior entry for `path`, never merges.
    /// An empty list removes the entry entirely.
    pub fn publish(&mut self, path: PathBuf, items: Vec<Diagnostic>) {
        if items.is_empty() {
            self.data.remove(&path);
        } else {
            self.data.insert(path, items);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.data
            .values()
            .flatten()
            .filter(|d| d.severity().is_error())
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.data
            .values()
            .flatten()
            .filter(|d| d.severity() == crate::types::DiagnosticSeverity::Warning)
            .count()
    }

    /// Per-file diagnostics, error-containing files first, then alphabetical.
    pub fn files_sorted(&self) -> Vec<(PathBuf, Vec<Diagnostic>)> {
        let mut files: Vec<(PathBuf, Vec<Diagnostic>)> = self
            .data
            .iter()
            .map(|(path, items)| (path.clone(), items.clone()))
            .collect();

        files.sort_by(|a, b| {
            let a_has_errors = a.1.iter().any(|d| d.severity().is_error());
            let b_has_errors = b.1.iter().any(|d| d.severity().is_error());
            b_has_errors.cmp(&a_has_errors).then_with(|| a.0.cmp(&b.0))
        });

        files
    }
}

/// Render the cache as a flat text report.
///
/// Header line with aggregate counts, then one line per diagnostic with the
/// path shown relative to `root`, truncated at `max_lines`.
pub(crate) fn render_report(root: &Path, store: &DiagnosticsStore, max_lines: usize) -> String {
    if store.is_empty() {
        return "0 error(s), 0 warning(s)".to_string();
    }

    let mut lines = Vec::new();
    for (path, items) in store.files_sorted() {
        let rel = path.strip_prefix(root).unwrap_or(&path);
        for diag in &items {
            lines.push(diag.display_with_path(rel));
        }
    }

    let mut out = format!(
        "{} error(s), {} warning(s)",
        store.error_count(),
        store.warning_count()
    );
    let shown = lines.len().min(max_lines);
    for line in &lines[..shown] {
        out.push('\n');
        out.push_str(line);
    }
    if lines.len() > shown {
        let _ = write!(out, "\n+{} more", lines.len() - shown);
    }
    out
}

//! Per-session document state: which URIs are open, and their versions.

use std::collections::{HashMap, HashSet};

/// What the caller must send for a document touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DocUpdate {
    /// Not yet open: send `didOpen` at this version.
    Open { version: i32 },
    /// Already open: send `didChange` at this version.
    Change { version: i32 },
}

/// Tracks the open set and a strictly increasing version per document.
///
/// An update for an unopened document becomes an open — the first touch is
/// always `Open { version: 1 }`.
#[derive(Debug, Default)]
pub(crate) struct DocumentTracker {
    open: HashSet<String>,
    versions: HashMap<String, i32>,
}

impl DocumentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self, uri: &str) -> bool {
        self.open.contains(uri)
    }

    pub fn open_or_change(&mut self, uri: &str) -> DocUpdate {
        if self.open.contains(uri) {
            let version = self.versions.entry(uri.to_string()).or_insert(0);
            *version += 1;
            DocUpdate::Change { version: *version }
        } else {
            self.open.insert(uri.to_string());
            self.versions.insert(uri.to_string(), 1);
            DocUpdate::Open { version: 1 }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_are_one_two_three() {
        let mut tracker = DocumentTracker::new();
        let uri = "file:///test/main.rs";

        assert_eq!(tracker.open_or_change(uri), DocUpdate::Open { version: 1 });
        assert_eq!(tracker.open_or_change(uri), DocUpdate::Change { version: 2 });
        assert_eq!(tracker.open_or_change(uri), DocUpdate::Change { version: 3 });
    }

    #[test]
    fn test_first_touch_is_always_open() {
        let mut tracker = DocumentTracker::new();
        assert!(!tracker.is_open("file:///a.rs"));
        assert_eq!(
            tracker.open_or_change("file:///a.rs"),
            DocUpdate::Open { version: 1 }
        );
        assert!(tracker.is_open("file:///a.rs"));
    }

    #[test]
    fn test_documents_version_independently() {
        let mut tracker = DocumentTracker::new();
        tracker.open_or_change("file:///a.rs");
        tracker.open_or_change("file:///a.rs");
        assert_eq!(
            tracker.open_or_change("file:///b.rs"),
            DocUpdate::Open { version: 1 }
        );
        assert_eq!(
            tracker.open_or_change("file:///a.rs"),
            DocUpdate::Change { version: 3 }
        );
    }
}

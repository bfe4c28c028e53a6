//! Project-root resolution seam.
//!
//! Which directory keys the session pool is decided outside the core; the
//! pool only requires something that maps a file path to a root. The
//! bundled [`MarkerRoots`] implements the single rule the pool relies on:
//! nearest ancestor directory containing a marker file.

use std::path::{Path, PathBuf};

pub trait RootResolver: Send + Sync {
    /// Return the project root that should own `path`, or `None` if the
    /// path belongs to no known project.
    fn resolve(&self, path: &Path) -> Option<PathBuf>;
}

/// Nearest-ancestor marker-file resolver (e.g. `Cargo.toml`, `package.json`).
#[derive(Debug, Clone)]
pub struct MarkerRoots {
    markers: Vec<String>,
}

impl MarkerRoots {
    #[must_use]
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }
}

impl RootResolver for MarkerRoots {
    fn resolve(&self, path: &Path) -> Option<PathBuf> {
        let start = if path.is_dir() { path } else { path.parent()? };
        for dir in start.ancestors() {
            if self.markers.iter().any(|m| dir.join(m).exists()) {
                return Some(dir.to_path_buf());
            }
        }
        None
    }
}

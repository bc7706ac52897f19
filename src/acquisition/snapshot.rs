//! On-disk page snapshots for refinement replay.
//!
//! Each fetched page's HTML can be saved once and re-read later when the
//! refinement loop needs to re-resolve a link set without going back to the
//! network. Disk snapshots live in a site-scoped subdirectory so concurrent
//! runs against different sites never share files; writes happen once per
//! page and all later access is read-only.

use crate::schema::page::PageId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed")]
    Io(#[from] std::io::Error),
    #[error("no snapshot recorded for page {page}")]
    Missing { page: u32 },
}

/// Opaque reference to a saved snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHandle {
    page: u32,
    path: Option<PathBuf>,
}

/// Site-scoped snapshot storage, on disk or in memory.
#[derive(Debug)]
pub struct SnapshotStore {
    dir: Option<PathBuf>,
    memory: HashMap<u32, String>,
}

impl SnapshotStore {
    /// Disk-backed store under `<root>/<sanitized site>/`.
    pub fn on_disk(root: &Path, site: &str) -> Result<Self, SnapshotError> {
        let dir = root.join(sanitize(site));
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir: Some(dir),
            memory: HashMap::new(),
        })
    }

    /// Memory-backed store for runs that do not persist snapshots.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            memory: HashMap::new(),
        }
    }

    /// Save a page's HTML. Saving the same page twice is a no-op returning
    /// the existing handle; snapshots are write-once.
    pub fn save(&mut self, page: PageId, html: &str) -> Result<SnapshotHandle, SnapshotError> {
        match &self.dir {
            Some(dir) => {
                let path = dir.join(format!("{}.html", page.0));
                if !path.exists() {
                    fs::write(&path, html)?;
                }
                Ok(SnapshotHandle {
                    page: page.0,
                    path: Some(path),
                })
            }
            None => {
                self.memory.entry(page.0).or_insert_with(|| html.to_string());
                Ok(SnapshotHandle {
                    page: page.0,
                    path: None,
                })
            }
        }
    }

    /// Re-read a saved snapshot.
    pub fn reload(&self, handle: &SnapshotHandle) -> Result<String, SnapshotError> {
        match &handle.path {
            Some(path) => Ok(fs::read_to_string(path)?),
            None => self
                .memory
                .get(&handle.page)
                .cloned()
                .ok_or(SnapshotError::Missing { page: handle.page }),
        }
    }
}

fn sanitize(site: &str) -> String {
    site.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
            c
        } else {
            '-'
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_round_trip() {
        let mut store = SnapshotStore::in_memory();
        let handle = store.save(PageId(3), "<html>x</html>").unwrap();
        assert_eq!(store.reload(&handle).unwrap(), "<html>x</html>");
    }

    #[test]
    fn test_memory_write_once() {
        let mut store = SnapshotStore::in_memory();
        let h1 = store.save(PageId(0), "first").unwrap();
        let h2 = store.save(PageId(0), "second").unwrap();
        assert_eq!(h1, h2);
        assert_eq!(store.reload(&h1).unwrap(), "first");
    }

    #[test]
    fn test_disk_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = SnapshotStore::on_disk(tmp.path(), "example.com:8080").unwrap();
        let handle = store.save(PageId(7), "<html>disk</html>").unwrap();
        assert_eq!(store.reload(&handle).unwrap(), "<html>disk</html>");
        // The site directory name is sanitized.
        assert!(tmp.path().join("example.com-8080").exists());
    }

    #[test]
    fn test_missing_memory_snapshot() {
        let store = SnapshotStore::in_memory();
        let handle = SnapshotHandle {
            page: 42,
            path: None,
        };
        assert!(matches!(
            store.reload(&handle),
            Err(SnapshotError::Missing { page: 42 })
        ));
    }
}

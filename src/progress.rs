//! Durable progress lists
//!
//! A progress list is a flat file with one item identifier per line. A phase
//! truncates it when it starts and appends one line per item that finished
//! successfully. Each append is flushed and synced before the next item
//! begins, so a crash can lose at most the line being written.
//!
//! The list is also the resumption record: after a reboot the patch phase
//! reads `package.downloaded` from disk because nothing else survives.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// File name of the list of packages fetched into the local cache.
pub const DOWNLOADED_FILE: &str = "package.downloaded";
/// File name of the list of packages installed.
pub const PATCHED_FILE: &str = "package.patched";

/// Append-only, line-per-item list persisted at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressList {
    path: PathBuf,
}

impl ProgressList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The `package.downloaded` list under `lib_dir`.
    pub fn downloaded(lib_dir: &Path) -> Self {
        Self::new(lib_dir.join(DOWNLOADED_FILE))
    }

    /// The `package.patched` list under `lib_dir`.
    pub fn patched(lib_dir: &Path) -> Self {
        Self::new(lib_dir.join(PATCHED_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Empty the list, creating it (and its directory) if needed.
    pub fn truncate(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(&self.path)?.sync_all()?;
        debug!("Truncated progress list {}", self.path.display());
        Ok(())
    }

    /// Append one item and make it durable before returning.
    pub fn append(&self, item: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", item)?;
        file.sync_data()
    }

    /// Read the list back, in order, skipping blank lines.
    pub fn read(&self) -> io::Result<Vec<String>> {
        let content = fs::read_to_string(&self.path)?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Like [`read`](Self::read), but a missing or unreadable list is an empty queue.
    pub fn read_or_empty(&self) -> Vec<String> {
        match self.read() {
            Ok(items) => items,
            Err(e) => {
                error!(
                    "Failed to open {} ({}), treating it as empty",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
        }
    }
}

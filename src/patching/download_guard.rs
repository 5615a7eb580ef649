//! Record of an in-flight download phase.
//!
//! `download()` writes its PID and start time to `download.pid` and removes
//! the file when it finishes, however it finishes. `patch()` reads the record
//! first: a download still alive past its allowed duration is killed so it
//! cannot keep the package lock while packages are being installed.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::process_guard::{is_process_alive, terminate_process};

/// File name of the download record under the library directory.
pub const DOWNLOAD_RECORD_FILE: &str = "download.pid";

/// How long an exceeded download gets to stop its commands after SIGTERM.
/// Longer than the grace its own signal handler gives them.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Contents of `download.pid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub pid: u32,
    /// Seconds since the Unix epoch
    pub started_at: u64,
}

/// What the kill-if-exceeded check found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    /// No record on disk
    NotRunning,
    /// Record left behind by a process that is gone
    Stale,
    /// Alive and within its allowed duration
    Running,
    /// Alive past its allowed duration and stopped
    Killed,
}

fn epoch_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// RAII guard holding `download.pid` for the lifetime of a download phase.
#[derive(Debug)]
pub struct DownloadGuard {
    path: PathBuf,
}

impl DownloadGuard {
    /// Record the current process as the running download.
    pub fn acquire(lib_dir: &Path) -> Result<Self> {
        fs::create_dir_all(lib_dir)?;
        let path = lib_dir.join(DOWNLOAD_RECORD_FILE);
        let record = DownloadRecord {
            pid: std::process::id(),
            started_at: epoch_secs(SystemTime::now()),
        };
        fs::write(&path, serde_json::to_vec(&record)?)?;
        debug!("Download record written: {:?}", record);
        Ok(Self { path })
    }
}

impl Drop for DownloadGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove download record {}: {}", self.path.display(), e);
        }
    }
}

/// Kill a previous download that is still running after `limit`.
///
/// A record naming this very process is ignored. Unreadable records are
/// treated as stale and removed.
pub fn kill_exceeded_download(lib_dir: &Path, limit: Duration, now: SystemTime) -> DownloadState {
    let path = lib_dir.join(DOWNLOAD_RECORD_FILE);

    let content = match fs::read(&path) {
        Ok(content) => content,
        Err(_) => return DownloadState::NotRunning,
    };

    let record: DownloadRecord = match serde_json::from_slice(&content) {
        Ok(record) => record,
        Err(e) => {
            warn!("Discarding unreadable download record {}: {}", path.display(), e);
            let _ = fs::remove_file(&path);
            return DownloadState::Stale;
        }
    };

    if record.pid == std::process::id() {
        return DownloadState::Running;
    }

    if !is_process_alive(record.pid) {
        debug!("Download process {} is gone, removing its record", record.pid);
        let _ = fs::remove_file(&path);
        return DownloadState::Stale;
    }

    let age = epoch_secs(now).saturating_sub(record.started_at);
    if age <= limit.as_secs() {
        warn!(
            "Download process {} is still running ({}s of {}s allowed)",
            record.pid,
            age,
            limit.as_secs()
        );
        return DownloadState::Running;
    }

    info!(
        "Download process {} exceeded its {}s window after {}s, stopping it",
        record.pid,
        limit.as_secs(),
        age
    );
    if let Err(e) = terminate_process(record.pid, KILL_GRACE) {
        error!("Failed to stop download process {}: {}", record.pid, e);
    }
    let _ = fs::remove_file(&path);
    DownloadState::Killed
}

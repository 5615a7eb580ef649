//! Idempotent step sequencing
//!
//! A step is a named unit of work guarded by a zero-byte marker file. The
//! caller asks [`StepMarker::should_enter`] before doing the work and calls
//! [`StepMarker::should_exit`] once it is done:
//!
//! ```text
//! if step.should_enter() {
//!     do_the_work()?;          // crash here => no marker, step re-runs
//!     step.should_exit();      // marker written, step never re-enters
//! }
//! ```
//!
//! Semantics are at-least-once per step. The engine only ever creates
//! markers; removing one is a reset performed outside this crate.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Directory holding one marker file per completed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerStore {
    dir: PathBuf,
}

impl MarkerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A fresh in-memory handle on the step called `name`.
    pub fn step(&self, name: &str) -> StepMarker {
        StepMarker::new(name, &self.dir)
    }

    /// Names of all steps whose marker exists, sorted.
    ///
    /// A missing markers directory means nothing has completed yet.
    pub fn completed(&self) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// In-memory view of one step: its name, marker path and whether it ran
/// in this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepMarker {
    name: String,
    marker_path: PathBuf,
    markers_dir: PathBuf,
    executed: bool,
}

impl StepMarker {
    pub fn new(name: &str, markers_dir: &Path) -> Self {
        Self {
            name: name.to_string(),
            marker_path: markers_dir.join(name),
            markers_dir: markers_dir.to_path_buf(),
            executed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    /// Whether `should_exit` has run for this handle in this process.
    pub fn executed(&self) -> bool {
        self.executed
    }

    /// Whether the durable marker exists.
    pub fn is_marked(&self) -> bool {
        self.marker_path.exists()
    }

    /// May the step's work start?
    ///
    /// False if this handle already exited in this process, or if the marker
    /// exists from any earlier run.
    pub fn should_enter(&self) -> bool {
        debug!("should_enter() called for {}", self.name);

        if self.executed {
            info!("Step {} has already executed, not entering", self.name);
            return false;
        }

        if self.is_marked() {
            info!(
                "Marker {} exists, step {} has already executed",
                self.marker_path.display(),
                self.name
            );
            false
        } else {
            info!(
                "Marker {} does not exist, step {} can be entered",
                self.marker_path.display(),
                self.name
            );
            true
        }
    }

    /// Record completion. Always returns `true`.
    ///
    /// Creates the markers directory and the marker if either is missing.
    /// A failed marker write is logged; the in-memory flag still keeps the
    /// step from re-entering in this process.
    pub fn should_exit(&mut self) -> bool {
        debug!("should_exit() called for {}", self.name);

        if !self.is_marked() {
            info!("Creating step marker {}", self.marker_path.display());
            if let Err(e) = self.write_marker() {
                error!(
                    "Failed to create marker {} for step {}: {}",
                    self.marker_path.display(),
                    self.name,
                    e
                );
            }
        }

        self.executed = true;
        debug!("executed for {}: {}", self.name, self.executed);
        self.executed
    }

    fn write_marker(&self) -> io::Result<()> {
        fs::create_dir_all(&self.markers_dir)?;
        // create without truncate: touching an existing marker is a no-op
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.marker_path)?
            .sync_all()
    }
}

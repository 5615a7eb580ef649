//! Patch cycle: find upgradable packages, download them inside one window,
//! install them inside another, reboot if the distro asks for it.

pub mod commands;
mod controller;
pub mod download_guard;
pub mod report;

pub use commands::{PatchCommands, RebootCheck};
pub use controller::PatchController;
pub use download_guard::{DownloadGuard, DownloadState, kill_exceeded_download};
pub use report::parse_candidates;

use std::fmt;
use strum::{Display, EnumIter, EnumString};

/// Result of the dry-run upgrade check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Upgrades(Vec<String>),
    NoUpgrades,
}

/// Which phases one invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum CycleMode {
    /// Check, clean, download. Runs at the scheduled start time.
    Download,
    /// Install what was downloaded. Runs after the download window.
    Patch,
    /// Check and install straight away, without a schedule.
    OneOff,
    /// Download then patch in a single invocation.
    Full,
}

/// What a cycle did, package by package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub candidates: Vec<String>,
    pub downloaded: Vec<String>,
    pub patched: Vec<String>,
    /// Attempted during the install phase without success
    pub failed: Vec<String>,
    /// Left for the next cycle because the install window ran out
    pub deferred: Vec<String>,
    pub reboot_issued: bool,
}

impl PatchReport {
    /// Whether the install window ran out before the list was finished.
    pub fn halted(&self) -> bool {
        !self.deferred.is_empty()
    }
}

impl fmt::Display for PatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} candidate(s), {} downloaded, {} patched, {} failed, {} deferred",
            self.candidates.len(),
            self.downloaded.len(),
            self.patched.len(),
            self.failed.len(),
            self.deferred.len()
        )?;
        if self.reboot_issued {
            write!(f, ", reboot issued")?;
        }
        Ok(())
    }
}

/// Result of a whole cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The check found nothing to do. The process should exit successfully.
    NoUpgrades,
    Completed(PatchReport),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cycle_mode_parsing() {
        assert_eq!(CycleMode::from_str("one-off").unwrap(), CycleMode::OneOff);
        assert_eq!(CycleMode::from_str("DOWNLOAD").unwrap(), CycleMode::Download);
        assert_eq!(CycleMode::Full.to_string(), "full");
        assert!(CycleMode::from_str("sometimes").is_err());
    }

    #[test]
    fn test_report_halted() {
        let report = PatchReport {
            candidates: names(&["a", "b", "c", "d"]),
            downloaded: names(&["a", "b", "c", "d"]),
            patched: names(&["a"]),
            failed: names(&["b"]),
            deferred: names(&["c", "d"]),
            reboot_issued: false,
        };
        assert!(report.halted());
        assert!(!PatchReport::default().halted());
    }

    #[test]
    fn test_report_display() {
        let report = PatchReport {
            candidates: names(&["a", "b"]),
            downloaded: names(&["a", "b"]),
            patched: names(&["a"]),
            failed: names(&["b"]),
            deferred: Vec::new(),
            reboot_issued: true,
        };
        assert_eq!(
            report.to_string(),
            "2 candidate(s), 2 downloaded, 1 patched, 1 failed, 0 deferred, reboot issued"
        );
    }
}

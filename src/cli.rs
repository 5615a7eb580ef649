use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// vmtend - resumable VM maintenance: patch cycles and OS-volume encryption
#[derive(Parser, Debug)]
#[command(name = "vmtend")]
#[command(about = "Resumable patch cycles and OS-volume encryption steps")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the library directory holding progress lists
    #[arg(long, global = true)]
    pub lib_dir: Option<PathBuf>,

    /// Dry-run mode: log every command instead of executing it.
    ///
    /// No encryption markers are written in this mode.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Package patch cycle
    Patch {
        #[command(subcommand)]
        action: PatchCommand,
    },
    /// OS-volume encryption steps
    Encrypt {
        #[command(subcommand)]
        action: EncryptCommand,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchCommand {
    /// Check for upgrades and download them (scheduled window start)
    Download,
    /// Install the packages the last download phase fetched
    Patch,
    /// Check and install immediately
    OneOff,
    /// Pick the phases from the configuration: one-off without a start time,
    /// download then patch otherwise
    Cycle,
    /// Install the packages the reboot check needs
    InstallDeps,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptCommand {
    /// Run every configured state that has not completed yet
    Run,
    /// Show which configured states have completed
    Status,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}

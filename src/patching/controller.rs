//! Patch cycle controller.
//!
//! # Phase Flow
//!
//! ```text
//! scheduled:  check → clean → download ─┐      (one invocation)
//!                                       ↓ package.downloaded
//!             patch (budgeted) → reboot-if-required   (later invocation)
//!
//! on demand:  check → patch_one_off (budgeted) → reboot-if-required
//! ```
//!
//! Per-package failures are logged and skipped. The only terminal outcome
//! is "nothing to upgrade", returned as [`CycleOutcome::NoUpgrades`].
//!
//! Under a dry-run runner the progress lists and the download record are
//! left untouched: no command really ran, so nothing may be recorded as done.

use std::time::SystemTime;
use tracing::{debug, error, info, warn};

use super::commands::{PatchCommands, RebootCheck};
use super::download_guard::{DownloadGuard, kill_exceeded_download};
use super::report::parse_candidates;
use super::{CheckOutcome, CycleMode, CycleOutcome, PatchReport};
use crate::clock::CycleBudget;
use crate::context::Context;
use crate::error::Result;
use crate::progress::ProgressList;

/// Drives one patch cycle for one invocation.
#[derive(Debug)]
pub struct PatchController {
    ctx: Context,
    commands: PatchCommands,
    downloaded: ProgressList,
    patched: ProgressList,
}

impl PatchController {
    /// Controller using the command table for the context's distro and category.
    pub fn new(ctx: Context) -> Self {
        let commands =
            PatchCommands::for_family(ctx.distro().package_family(), ctx.config().category);
        Self::with_commands(ctx, commands)
    }

    pub fn with_commands(ctx: Context, commands: PatchCommands) -> Self {
        let lib_dir = ctx.config().lib_dir.clone();
        Self {
            ctx,
            commands,
            downloaded: ProgressList::downloaded(&lib_dir),
            patched: ProgressList::patched(&lib_dir),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn commands(&self) -> &PatchCommands {
        &self.commands
    }

    pub fn downloaded_list(&self) -> &ProgressList {
        &self.downloaded
    }

    pub fn patched_list(&self) -> &ProgressList {
        &self.patched
    }

    fn dry_run(&self) -> bool {
        self.ctx.runner().is_dry_run()
    }

    fn reset(&self, list: &ProgressList) -> Result<()> {
        if self.dry_run() {
            info!("[DRY RUN] Would truncate {}", list.path().display());
            return Ok(());
        }
        list.truncate()?;
        Ok(())
    }

    fn record(&self, list: &ProgressList, package: &str) -> Result<()> {
        if self.dry_run() {
            info!("[DRY RUN] Would record {} in {}", package, list.path().display());
            return Ok(());
        }
        list.append(package)?;
        Ok(())
    }

    /// Run a command, logging a failure. Returns whether it exited 0.
    fn run_ok(&self, cmd: &str) -> bool {
        match self.ctx.runner().run(cmd) {
            Ok(0) => true,
            Ok(code) => {
                debug!("`{}` exited with {}", cmd, code);
                false
            }
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    /// Refresh the index, simulate an upgrade and parse the candidates.
    ///
    /// A failing check command is logged; whatever it printed is still parsed.
    pub fn check(&self) -> Result<CheckOutcome> {
        if let Some(prepare) = &self.commands.prepare {
            if !self.run_ok(prepare) {
                error!("Failed to prepare the security-only package sources");
            }
        }

        if !self.run_ok(&self.commands.refresh) {
            warn!("Failed to refresh the package index");
        }

        let output = self.ctx.runner().run_capture(&self.commands.check)?;
        if !self.commands.check_ok_codes.contains(&output.exit_code) {
            error!(
                "Failed to check valid upgrades (exit code {})",
                output.exit_code
            );
        }

        match parse_candidates(self.commands.family, &output.text) {
            Some(candidates) => {
                info!("There are {} packages to upgrade.", candidates.len());
                Ok(CheckOutcome::Upgrades(candidates))
            }
            None => {
                info!("No package to upgrade");
                Ok(CheckOutcome::NoUpgrades)
            }
        }
    }

    /// Purge the local package cache. Non-fatal.
    pub fn clean(&self) {
        if !self.run_ok(&self.commands.clean) {
            error!("Failed to erase downloaded archive files");
        }
    }

    /// Check, clean, then fetch every candidate into the cache.
    ///
    /// Runs to the end of the candidate list; no time budget applies.
    pub fn download(&self) -> Result<CycleOutcome> {
        let _guard = if self.dry_run() {
            info!("[DRY RUN] Would write the download record");
            None
        } else {
            Some(DownloadGuard::acquire(&self.ctx.config().lib_dir)?)
        };

        let candidates = match self.check()? {
            CheckOutcome::Upgrades(candidates) => candidates,
            CheckOutcome::NoUpgrades => return Ok(CycleOutcome::NoUpgrades),
        };
        self.clean();

        self.reset(&self.downloaded)?;
        let mut downloaded = Vec::with_capacity(candidates.len());
        for package in &candidates {
            if !self.run_ok(&self.commands.download_cmd(package)) {
                error!("Failed to download the package: {}", package);
                continue;
            }
            self.record(&self.downloaded, package)?;
            downloaded.push(package.clone());
            info!("Package {} is downloaded.", package);
        }

        Ok(CycleOutcome::Completed(PatchReport {
            candidates,
            downloaded,
            ..PatchReport::default()
        }))
    }

    /// Install what the last download phase left in `package.downloaded`.
    ///
    /// The budget is checked after every package; once exceeded the rest are
    /// deferred and stay in `package.downloaded` for the next cycle.
    pub fn patch(&self) -> Result<PatchReport> {
        if self.dry_run() {
            info!("[DRY RUN] Would stop a download running past its window");
        } else {
            kill_exceeded_download(
                &self.ctx.config().lib_dir,
                self.ctx.config().download_duration(),
                SystemTime::now(),
            );
        }

        let budget = CycleBudget::start(self.ctx.config().install_duration(), self.ctx.clock());
        let to_patch = self.downloaded.read_or_empty();

        self.reset(&self.patched)?;
        let mut report = PatchReport {
            candidates: to_patch.clone(),
            downloaded: to_patch.clone(),
            ..PatchReport::default()
        };

        for (index, package) in to_patch.iter().enumerate() {
            if self.run_ok(&self.commands.install_cmd(package)) {
                self.record(&self.patched, package)?;
                report.patched.push(package.clone());
                info!("Package {} is patched.", package);
            } else {
                error!("Failed to patch the package: {}", package);
                report.failed.push(package.clone());
            }

            if budget.exceeded(self.ctx.clock()) {
                report.deferred = to_patch[index + 1..].to_vec();
                info!(
                    "Patching time exceeded. {} pending package(s) will be patched in the next cycle",
                    report.deferred.len()
                );
                break;
            }
        }

        report.reboot_issued = self.reboot_if_required();
        Ok(report)
    }

    /// On-demand pass: install every candidate straight away.
    ///
    /// Each success goes into both progress lists since no separate download
    /// happened.
    pub fn patch_one_off(&self) -> Result<CycleOutcome> {
        info!("Going to patch one-off");
        let budget = CycleBudget::start(self.ctx.config().install_duration(), self.ctx.clock());

        let candidates = match self.check()? {
            CheckOutcome::Upgrades(candidates) => candidates,
            CheckOutcome::NoUpgrades => return Ok(CycleOutcome::NoUpgrades),
        };

        self.reset(&self.downloaded)?;
        self.reset(&self.patched)?;
        let mut report = PatchReport {
            candidates: candidates.clone(),
            ..PatchReport::default()
        };

        for (index, package) in candidates.iter().enumerate() {
            if self.run_ok(&self.commands.install_cmd(package)) {
                self.record(&self.downloaded, package)?;
                self.record(&self.patched, package)?;
                report.downloaded.push(package.clone());
                report.patched.push(package.clone());
                info!("Package {} is patched.", package);
            } else {
                error!("Failed to patch the package: {}", package);
                report.failed.push(package.clone());
            }

            if budget.exceeded(self.ctx.clock()) {
                report.deferred = candidates[index + 1..].to_vec();
                info!(
                    "Patching time exceeded. {} pending package(s) will be patched in the next cycle",
                    report.deferred.len()
                );
                break;
            }
        }

        report.reboot_issued = self.reboot_if_required();
        Ok(CycleOutcome::Completed(report))
    }

    /// Reboot when the distro says the installed updates need it.
    ///
    /// Returns whether a reboot command was issued.
    pub fn reboot_if_required(&self) -> bool {
        let required = match &self.commands.reboot_check {
            RebootCheck::Sentinel(path) => path.is_file(),
            RebootCheck::Command(cmd) => match self.ctx.runner().run(cmd) {
                Ok(code) => code != 0,
                Err(e) => {
                    error!("Cannot tell whether a reboot is required: {}", e);
                    false
                }
            },
        };

        if !required {
            debug!("No reboot required");
            return false;
        }

        info!("System going to reboot...");
        if !self.run_ok(&self.commands.reboot) {
            error!("Failed to reboot");
        }
        true
    }

    /// Log the package manager's description of each patched package.
    pub fn report(&self, patched: &[String]) {
        for package in patched {
            match self.ctx.runner().run_capture(&self.commands.status_cmd(package)) {
                Ok(output) => {
                    let first = output.text.split("\n\n").next().unwrap_or_default();
                    info!("{}", first.trim());
                }
                Err(e) => error!("Failed to query status of {}: {}", package, e),
            }
        }
    }

    /// Install the packages the reboot check relies on.
    pub fn install_dependencies(&self) -> bool {
        match &self.commands.dependencies {
            Some(cmd) => {
                let ok = self.run_ok(cmd);
                if !ok {
                    error!("Failed to install patching dependencies");
                }
                ok
            }
            None => true,
        }
    }

    /// Run the phases selected by `mode`.
    pub fn run_cycle(&self, mode: CycleMode) -> Result<CycleOutcome> {
        info!("Starting {} cycle for {}", mode, self.ctx.distro());
        let outcome = match mode {
            CycleMode::Download => self.download()?,
            CycleMode::Patch => CycleOutcome::Completed(self.patch()?),
            CycleMode::OneOff => self.patch_one_off()?,
            CycleMode::Full => match self.download()? {
                CycleOutcome::NoUpgrades => CycleOutcome::NoUpgrades,
                CycleOutcome::Completed(downloaded) => {
                    let mut report = self.patch()?;
                    report.candidates = downloaded.candidates;
                    CycleOutcome::Completed(report)
                }
            },
        };

        if let CycleOutcome::Completed(report) = &outcome {
            self.report(&report.patched);
            info!("{}", report);
        }
        Ok(outcome)
    }
}

//! Patch cycle scenarios
//!
//! Each test drives a `PatchController` against a scripted `MockRunner`, a
//! `ManualClock` and a scratch library directory, then checks both the
//! returned report and the progress lists left on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vmtend::command_runner::{CommandOutput, MockRunner, ShellRunner};
use vmtend::patching::{CycleMode, CycleOutcome, PatchCommands, PatchController, RebootCheck};
use vmtend::{
    Category, CommandRunner, Context, Distro, LiveResolver, MaintConfig, ManualClock, PackageFamily,
};

const APT_REPORT: &str = "\
Reading package lists... Done
Building dependency tree... Done
Calculating upgrade... Done
The following packages will be upgraded:
  pkg-a pkg-b pkg-c
3 upgraded, 0 newly installed, 0 to remove and 0 not upgraded.
Inst pkg-a [1.0] (1.1 Ubuntu:22.04/jammy-updates [amd64])
Inst pkg-b [2.0] (2.1 Ubuntu:22.04/jammy-updates [amd64])
Inst pkg-c [3.0] (3.1 Ubuntu:22.04/jammy-updates [amd64])
";

const APT_NOTHING: &str = "\
Reading package lists... Done
Building dependency tree... Done
Calculating upgrade... Done
0 upgraded, 0 newly installed, 0 to remove and 0 not upgraded.
";

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn read_list(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

struct Harness {
    _dir: tempfile::TempDir,
    lib_dir: PathBuf,
    sentinel: PathBuf,
    runner: MockRunner,
    clock: ManualClock,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let lib_dir = dir.path().join("lib");
        let sentinel = dir.path().join("reboot-required");
        Self {
            _dir: dir,
            lib_dir,
            sentinel,
            runner: MockRunner::new(),
            clock: ManualClock::new(),
        }
    }

    fn with_report(self, report: &str) -> Self {
        self.runner.on("apt-get -s upgrade", CommandOutput::new(0, report));
        self
    }

    fn controller(&self) -> PatchController {
        self.controller_with(Box::new(self.runner.clone()))
    }

    fn controller_with(&self, runner: Box<dyn CommandRunner>) -> PatchController {
        let config = MaintConfig {
            lib_dir: self.lib_dir.clone(),
            install_duration_secs: 60,
            ..MaintConfig::default()
        };
        let ctx = Context::new(
            runner,
            Box::new(LiveResolver::default()),
            Box::new(self.clock.clone()),
            config,
            Distro::Ubuntu,
        );
        let mut commands = PatchCommands::for_family(PackageFamily::Apt, Category::All);
        commands.reboot_check = RebootCheck::Sentinel(self.sentinel.clone());
        PatchController::with_commands(ctx, commands)
    }

    fn downloaded(&self) -> Vec<String> {
        read_list(&self.lib_dir.join("package.downloaded"))
    }

    fn patched(&self) -> Vec<String> {
        read_list(&self.lib_dir.join("package.patched"))
    }
}

fn completed(outcome: CycleOutcome) -> vmtend::PatchReport {
    match outcome {
        CycleOutcome::Completed(report) => report,
        CycleOutcome::NoUpgrades => panic!("expected a completed cycle"),
    }
}

// =============================================================================
// Download then patch
// =============================================================================

#[test]
fn test_all_packages_download_and_patch() {
    let h = Harness::new().with_report(APT_REPORT);
    let controller = h.controller();

    let downloaded = completed(controller.download().unwrap());
    assert_eq!(downloaded.candidates, names(&["pkg-a", "pkg-b", "pkg-c"]));
    assert_eq!(downloaded.downloaded, names(&["pkg-a", "pkg-b", "pkg-c"]));
    assert_eq!(h.downloaded(), names(&["pkg-a", "pkg-b", "pkg-c"]));

    let report = controller.patch().unwrap();
    assert_eq!(report.patched, names(&["pkg-a", "pkg-b", "pkg-c"]));
    assert!(!report.halted());
    assert!(!report.reboot_issued);
    assert_eq!(h.patched(), names(&["pkg-a", "pkg-b", "pkg-c"]));

    let commands = h.runner.commands();
    assert_eq!(commands[0], "apt-get update");
    assert_eq!(commands[1], "apt-get -s upgrade");
    assert_eq!(commands[2], "apt-get clean");
    assert_eq!(
        h.runner.commands_matching("apt-get -y install"),
        names(&[
            "apt-get -y install pkg-a",
            "apt-get -y install pkg-b",
            "apt-get -y install pkg-c"
        ])
    );
    assert!(!commands.contains(&"reboot".to_string()));
}

#[test]
fn test_failed_download_is_skipped() {
    let h = Harness::new().with_report(APT_REPORT);
    h.runner.on(
        "apt-get -d -y install pkg-b",
        CommandOutput::new(100, "E: Failed to fetch pkg-b"),
    );
    let controller = h.controller();

    let downloaded = completed(controller.download().unwrap());
    assert_eq!(downloaded.downloaded, names(&["pkg-a", "pkg-c"]));
    assert_eq!(h.downloaded(), names(&["pkg-a", "pkg-c"]));

    let report = controller.patch().unwrap();
    assert_eq!(report.patched, names(&["pkg-a", "pkg-c"]));
    assert!(h.runner.commands_matching("apt-get -y install pkg-b").is_empty());
}

#[test]
fn test_failed_install_is_not_recorded() {
    let h = Harness::new().with_report(APT_REPORT);
    h.runner.on("apt-get -y install pkg-a", CommandOutput::new(1, "dpkg error"));
    let controller = h.controller();

    controller.download().unwrap();
    let report = controller.patch().unwrap();

    assert_eq!(report.patched, names(&["pkg-b", "pkg-c"]));
    assert_eq!(report.failed, names(&["pkg-a"]));
    assert_eq!(h.patched(), names(&["pkg-b", "pkg-c"]));
}

#[test]
fn test_budget_exceeded_after_first_package() {
    let h = Harness::new().with_report(APT_REPORT);
    let controller = h.controller();
    controller.download().unwrap();

    // each reading moves the clock past the 60s budget
    h.clock.set_step(Duration::from_secs(61));
    let report = controller.patch().unwrap();

    assert_eq!(report.patched, names(&["pkg-a"]));
    assert_eq!(report.deferred, names(&["pkg-b", "pkg-c"]));
    assert!(report.halted());
    assert_eq!(h.patched(), names(&["pkg-a"]));
    // the download list survives for the next cycle
    assert_eq!(h.downloaded(), names(&["pkg-a", "pkg-b", "pkg-c"]));
    assert_eq!(h.runner.commands_matching("apt-get -y install").len(), 1);
}

#[test]
fn test_budget_not_exceeded_at_exact_limit() {
    let h = Harness::new().with_report(APT_REPORT);
    let controller = h.controller();
    controller.download().unwrap();

    h.clock.set_step(Duration::from_secs(20));
    let report = controller.patch().unwrap();
    assert_eq!(report.patched.len(), 3);
    assert!(!report.halted());
}

#[test]
fn test_patch_resumes_from_download_list_on_disk() {
    let h = Harness::new();
    fs::create_dir_all(&h.lib_dir).unwrap();
    fs::write(h.lib_dir.join("package.downloaded"), "openssl\n\nlibc6\n").unwrap();

    let report = h.controller().patch().unwrap();
    assert_eq!(report.patched, names(&["openssl", "libc6"]));
    // no check is needed to patch
    assert!(h.runner.commands_matching("apt-get -s upgrade").is_empty());
}

#[test]
fn test_patch_without_download_list_is_empty() {
    let h = Harness::new();
    let report = h.controller().patch().unwrap();
    assert!(report.patched.is_empty());
    assert!(h.patched().is_empty());
}

// =============================================================================
// No upgrades
// =============================================================================

#[test]
fn test_no_upgrade_section_stops_download() {
    let h = Harness::new().with_report(APT_NOTHING);
    let outcome = h.controller().download().unwrap();

    assert_eq!(outcome, CycleOutcome::NoUpgrades);
    assert!(!h.lib_dir.join("package.downloaded").exists());
    assert!(h.runner.commands_matching("apt-get clean").is_empty());
    // the download record is gone once the phase returns
    assert!(!h.lib_dir.join("download.pid").exists());
}

#[test]
fn test_no_upgrades_stops_full_cycle() {
    let h = Harness::new().with_report(APT_NOTHING);
    let outcome = h.controller().run_cycle(CycleMode::Full).unwrap();
    assert_eq!(outcome, CycleOutcome::NoUpgrades);
    assert!(h.runner.commands_matching("install").is_empty());
}

#[test]
fn test_failing_check_is_still_parsed() {
    let h = Harness::new();
    h.runner.on("apt-get -s upgrade", CommandOutput::new(100, APT_REPORT));
    let outcome = h.controller().download().unwrap();
    assert_eq!(completed(outcome).downloaded.len(), 3);
}

// =============================================================================
// One-off and full cycles
// =============================================================================

#[test]
fn test_one_off_records_successes_in_both_lists() {
    let h = Harness::new().with_report(APT_REPORT);
    h.runner.on("apt-get -y install pkg-b", CommandOutput::new(100, ""));

    let report = completed(h.controller().patch_one_off().unwrap());
    assert_eq!(report.patched, names(&["pkg-a", "pkg-c"]));
    assert_eq!(report.failed, names(&["pkg-b"]));
    assert_eq!(h.downloaded(), names(&["pkg-a", "pkg-c"]));
    assert_eq!(h.patched(), names(&["pkg-a", "pkg-c"]));
    // no separate download happens
    assert!(h.runner.commands_matching("apt-get -d").is_empty());
}

#[test]
fn test_one_off_honors_budget() {
    let h = Harness::new().with_report(APT_REPORT);
    h.clock.set_step(Duration::from_secs(40));

    // readings: start 0, after pkg-a 40, after pkg-b 80
    let report = completed(h.controller().patch_one_off().unwrap());
    assert_eq!(report.patched, names(&["pkg-a", "pkg-b"]));
    assert_eq!(report.deferred, names(&["pkg-c"]));
}

#[test]
fn test_one_off_failure_is_reported() {
    let h = Harness::new().with_report(APT_REPORT);
    h.runner.on("apt-get -y install pkg-a", CommandOutput::new(100, "E: dpkg was interrupted"));
    h.clock.set_step(Duration::from_secs(40));

    // pkg-c is deferred by the budget, not failed
    let report = completed(h.controller().run_cycle(CycleMode::OneOff).unwrap());
    assert_eq!(report.patched, names(&["pkg-b"]));
    assert_eq!(report.failed, names(&["pkg-a"]));
    assert_eq!(report.deferred, names(&["pkg-c"]));
    assert!(report.downloaded.iter().all(|p| p != "pkg-a"));
}

// =============================================================================
// Dry run
// =============================================================================

#[test]
fn test_dry_run_patch_keeps_progress_lists() {
    let h = Harness::new();
    fs::create_dir_all(&h.lib_dir).unwrap();
    fs::write(h.lib_dir.join("package.downloaded"), "pkg-a
pkg-b
").unwrap();
    fs::write(h.lib_dir.join("package.patched"), "real-earlier
").unwrap();

    let report = h.controller_with(Box::new(ShellRunner::dry_run())).patch().unwrap();
    assert_eq!(report.patched, names(&["pkg-a", "pkg-b"]));
    assert_eq!(h.patched(), names(&["real-earlier"]));
    assert_eq!(h.downloaded(), names(&["pkg-a", "pkg-b"]));
}

#[test]
fn test_dry_run_download_and_one_off_write_nothing() {
    let h = Harness::new().with_report(APT_REPORT);
    h.runner.set_dry_run(true);
    fs::create_dir_all(&h.lib_dir).unwrap();
    fs::write(h.lib_dir.join("package.downloaded"), "kept
").unwrap();
    fs::write(h.lib_dir.join("package.patched"), "kept
").unwrap();
    let controller = h.controller();

    let downloaded = completed(controller.download().unwrap());
    assert_eq!(downloaded.downloaded.len(), 3);
    assert!(!h.lib_dir.join("download.pid").exists());

    let report = completed(controller.patch_one_off().unwrap());
    assert_eq!(report.patched.len(), 3);

    assert_eq!(h.downloaded(), names(&["kept"]));
    assert_eq!(h.patched(), names(&["kept"]));
}

#[test]
fn test_full_cycle_reports_and_reboots() {
    let h = Harness::new().with_report(APT_REPORT);
    fs::write(&h.sentinel, "*** System restart required ***\n").unwrap();
    h.runner.on(
        "apt-cache show",
        CommandOutput::new(0, "Package: pkg-a\nVersion: 1.1\n\nPackage: pkg-a\nVersion: 1.0\n"),
    );

    let report = completed(h.controller().run_cycle(CycleMode::Full).unwrap());
    assert_eq!(report.candidates.len(), 3);
    assert_eq!(report.patched.len(), 3);
    assert!(report.reboot_issued);

    let commands = h.runner.commands();
    assert!(commands.contains(&"reboot".to_string()));
    assert_eq!(h.runner.commands_matching("apt-cache show").len(), 3);
}

// =============================================================================
// yum family
// =============================================================================

const YUM_REPORT: &str = "\
Loaded plugins: fastestmirror, langpacks

kernel.x86_64                      3.10.0-1160.119.1.el7           updates
openssl-libs.x86_64                1:1.0.2k-26.el7_9               updates
";

fn yum_controller(lib_dir: &Path, runner: &MockRunner, category: Category) -> PatchController {
    let config = MaintConfig {
        lib_dir: lib_dir.to_path_buf(),
        category,
        distro: Some(Distro::CentOs),
        ..MaintConfig::default()
    };
    let ctx = Context::new(
        Box::new(runner.clone()),
        Box::new(LiveResolver::default()),
        Box::new(ManualClock::new()),
        config,
        Distro::CentOs,
    );
    PatchController::new(ctx)
}

#[test]
fn test_yum_security_cycle_with_needs_restarting() {
    let dir = tempfile::tempdir().unwrap();
    let runner = MockRunner::new();
    runner.on("check-update", CommandOutput::new(100, YUM_REPORT));
    runner.on("needs-restarting -r", CommandOutput::new(1, "Reboot is required"));

    let controller = yum_controller(dir.path(), &runner, Category::Important);
    let downloaded = completed(controller.download().unwrap());
    assert_eq!(downloaded.downloaded, names(&["kernel", "openssl-libs"]));

    let report = controller.patch().unwrap();
    assert!(report.reboot_issued);
    assert_eq!(
        runner.commands_matching("yum -y update --security"),
        names(&[
            "yum -y update --security kernel",
            "yum -y update --security openssl-libs"
        ])
    );
}

#[test]
fn test_install_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    let runner = MockRunner::new();
    let controller = yum_controller(dir.path(), &runner, Category::All);

    assert!(controller.install_dependencies());
    assert_eq!(runner.commands(), names(&["yum -y install yum-utils"]));

    runner.on("yum-utils", CommandOutput::new(1, "No package available"));
    assert!(!controller.install_dependencies());
}

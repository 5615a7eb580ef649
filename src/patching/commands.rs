//! Package-manager command tables.
//!
//! One `PatchCommands` per package family, adjusted for the update
//! category. Package names are appended to the download, install and status
//! commands by the controller.

use std::path::PathBuf;

use crate::config::Category;
use crate::distro::PackageFamily;

/// How the controller decides whether the host must reboot after patching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebootCheck {
    /// Reboot when this file exists.
    Sentinel(PathBuf),
    /// Reboot when this command exits nonzero.
    Command(String),
}

/// Shell commands for each patch phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchCommands {
    pub family: PackageFamily,
    /// Refresh the package index before checking
    pub refresh: String,
    /// Dry-run upgrade whose report lists the candidates
    pub check: String,
    /// Exit codes of `check` that are not failures
    pub check_ok_codes: Vec<i32>,
    pub clean: String,
    pub download: String,
    pub install: String,
    pub status: String,
    /// Run once before a cycle when `Important` is selected
    pub prepare: Option<String>,
    /// Installs whatever `reboot_check` depends on
    pub dependencies: Option<String>,
    pub reboot_check: RebootCheck,
    pub reboot: String,
}

const APT_SECURITY_SOURCES: &str = "/etc/apt/security.sources.list";

impl PatchCommands {
    pub fn for_family(family: PackageFamily, category: Category) -> Self {
        match family {
            PackageFamily::Apt => Self::apt(category),
            PackageFamily::Yum => Self::yum(category),
        }
    }

    fn apt(category: Category) -> Self {
        let mut commands = Self {
            family: PackageFamily::Apt,
            refresh: "apt-get update".to_string(),
            check: "apt-get -s upgrade".to_string(),
            check_ok_codes: vec![0],
            clean: "apt-get clean".to_string(),
            download: "apt-get -d -y install".to_string(),
            install: "apt-get -y install".to_string(),
            status: "apt-cache show".to_string(),
            prepare: None,
            // /var/run/reboot-required comes from update-notifier-common
            dependencies: Some("apt-get -y install update-notifier-common".to_string()),
            reboot_check: RebootCheck::Sentinel(PathBuf::from("/var/run/reboot-required")),
            reboot: "reboot".to_string(),
        };

        if category == Category::Important {
            commands.prepare = Some(format!(
                "grep -- \"-security\" /etc/apt/sources.list | grep -v \"#\" > {}",
                APT_SECURITY_SOURCES
            ));
            commands.download = format!(
                "{} -o Dir::Etc::SourceList={}",
                commands.download, APT_SECURITY_SOURCES
            );
        }

        commands
    }

    fn yum(category: Category) -> Self {
        let security = if category == Category::Important {
            " --security"
        } else {
            ""
        };

        Self {
            family: PackageFamily::Yum,
            refresh: "yum -q makecache".to_string(),
            // check-update exits 100 when updates are available
            check: format!("yum -q check-update{}", security),
            check_ok_codes: vec![0, 100],
            clean: "yum clean packages".to_string(),
            download: format!("yum -y update --downloadonly{}", security),
            install: format!("yum -y update{}", security),
            status: "yum info".to_string(),
            prepare: None,
            dependencies: Some("yum -y install yum-utils".to_string()),
            reboot_check: RebootCheck::Command("needs-restarting -r".to_string()),
            reboot: "reboot".to_string(),
        }
    }

    pub fn download_cmd(&self, package: &str) -> String {
        format!("{} {}", self.download, package)
    }

    pub fn install_cmd(&self, package: &str) -> String {
        format!("{} {}", self.install, package)
    }

    pub fn status_cmd(&self, package: &str) -> String {
        format!("{} {}", self.status, package)
    }
}

//! Distribution identity and per-distro policy tables
//!
//! Two tables live here:
//!
//! - which package-manager family a distro uses (apt or yum), and
//! - which block devices to assume for the disk, root and boot roles when
//!   live resolution fails.
//!
//! The device defaults are a last resort. Callers must log when they use them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use strum::{Display, EnumIter, EnumString};
use tracing::{debug, warn};

/// Supported Linux distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Distro {
    Ubuntu,
    Debian,
    #[strum(serialize = "centos")]
    CentOs,
    #[strum(to_string = "rhel", serialize = "redhat")]
    #[serde(alias = "redhat")]
    Rhel,
    #[strum(to_string = "oracle", serialize = "ol")]
    #[serde(alias = "ol")]
    Oracle,
}

/// Package-manager family driving the patch command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PackageFamily {
    Apt,
    Yum,
}

/// Device roles assumed when nothing better is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDefaults {
    pub disk: &'static str,
    pub root: &'static str,
    pub boot: &'static str,
}

const UBUNTU_DEVICES: DeviceDefaults = DeviceDefaults {
    disk: "/dev/sda",
    root: "/dev/sda1",
    boot: "/dev/sda2",
};

const DEFAULT_DEVICES: DeviceDefaults = DeviceDefaults {
    disk: "/dev/sda",
    root: "/dev/sda2",
    boot: "/dev/sda1",
};

impl Distro {
    pub fn package_family(self) -> PackageFamily {
        match self {
            Self::Ubuntu | Self::Debian => PackageFamily::Apt,
            Self::CentOs | Self::Rhel | Self::Oracle => PackageFamily::Yum,
        }
    }

    /// Default device layout for this distro's marketplace images.
    pub fn device_defaults(self) -> DeviceDefaults {
        match self {
            Self::Ubuntu => UBUNTU_DEVICES,
            _ => DEFAULT_DEVICES,
        }
    }

    /// Detect the running distro from an os-release file.
    pub fn detect_from(os_release: &Path) -> Option<Self> {
        let content = match fs::read_to_string(os_release) {
            Ok(content) => content,
            Err(e) => {
                warn!("Cannot read {}: {}", os_release.display(), e);
                return None;
            }
        };
        let distro = parse_os_release_id(&content).and_then(|id| id.parse().ok());
        debug!("Detected distro from {}: {:?}", os_release.display(), distro);
        distro
    }

    /// Detect the running distro from `/etc/os-release`.
    pub fn detect() -> Option<Self> {
        Self::detect_from(Path::new("/etc/os-release"))
    }
}

/// Extract the unquoted `ID=` value from os-release content.
fn parse_os_release_id(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.trim().strip_prefix("ID="))
        .map(|value| value.trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|value| !value.is_empty())
}

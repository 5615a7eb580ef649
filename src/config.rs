//! Configuration file handling.
//!
//! The scheduler hands vmtend a JSON settings file. Every field has a
//! default so a partial file (or none at all) is valid; `validate` rejects
//! values the engine cannot work with.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::{Display, EnumIter, EnumString};

use crate::distro::Distro;
use crate::encryption::StateSpec;

/// Which updates a patch cycle may install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum Category {
    /// Every available upgrade
    #[default]
    All,
    /// Security updates only
    Important,
}

/// Settings for one vmtend invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintConfig {
    /// Directory holding `package.downloaded`, `package.patched` and the download record
    pub lib_dir: PathBuf,
    /// Directory holding encryption step markers
    pub markers_dir: PathBuf,
    /// Distro identity; detected from /etc/os-release when absent
    pub distro: Option<Distro>,
    pub category: Category,
    /// Wall-clock budget of the patch phase, in seconds
    pub install_duration_secs: u64,
    /// Age after which a still-running download is killed, in seconds
    pub download_duration_secs: u64,
    /// Scheduled start time; absent means an on-demand (one-off) request
    pub start_time: Option<String>,
    /// Ordered encryption states
    pub encryption_states: Vec<StateSpec>,
}

impl Default for MaintConfig {
    fn default() -> Self {
        Self {
            lib_dir: PathBuf::from("/var/lib/vmtend"),
            markers_dir: PathBuf::from("/var/lib/vmtend/encryption_markers"),
            distro: None,
            category: Category::All,
            install_duration_secs: 3600,
            download_duration_secs: 3600,
            start_time: None,
            encryption_states: Vec::new(),
        }
    }
}

impl MaintConfig {
    pub fn install_duration(&self) -> Duration {
        Duration::from_secs(self.install_duration_secs)
    }

    pub fn download_duration(&self) -> Duration {
        Duration::from_secs(self.download_duration_secs)
    }

    /// True when no start time was scheduled.
    pub fn is_one_off(&self) -> bool {
        self.start_time
            .as_deref()
            .is_none_or(|start| start.trim().is_empty())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.lib_dir.as_os_str().is_empty() {
            anyhow::bail!("lib_dir must be specified");
        }
        if self.markers_dir.as_os_str().is_empty() {
            anyhow::bail!("markers_dir must be specified");
        }
        if self.install_duration_secs == 0 {
            anyhow::bail!("install_duration_secs must be greater than zero");
        }
        if self.download_duration_secs == 0 {
            anyhow::bail!("download_duration_secs must be greater than zero");
        }

        let mut seen = HashSet::new();
        for state in &self.encryption_states {
            let name = state.name.trim();
            if name.is_empty() {
                anyhow::bail!("Encryption state names must not be empty");
            }
            // the name becomes a file name under markers_dir
            if name.contains('/') || name == "." || name == ".." {
                anyhow::bail!("Encryption state name {:?} is not a valid marker name", name);
            }
            if state.command.trim().is_empty() {
                anyhow::bail!("Encryption state {:?} has no command", name);
            }
            if !seen.insert(name) {
                anyhow::bail!("Encryption state {:?} is listed twice", name);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(name: &str, command: &str) -> StateSpec {
        StateSpec {
            name: name.to_string(),
            command: command.to_string(),
        }
    }

    #[test]
    fn test_default_is_valid() {
        let config = MaintConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.is_one_off());
        assert_eq!(config.install_duration(), Duration::from_secs(3600));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: MaintConfig =
            serde_json::from_str(r#"{"category": "Important", "distro": "ubuntu"}"#).unwrap();
        assert_eq!(config.category, Category::Important);
        assert_eq!(config.distro, Some(Distro::Ubuntu));
        assert_eq!(config.lib_dir, PathBuf::from("/var/lib/vmtend"));
    }

    #[test]
    fn test_blank_start_time_is_one_off() {
        let config = MaintConfig {
            start_time: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(config.is_one_off());

        let scheduled = MaintConfig {
            start_time: Some("03:00".to_string()),
            ..Default::default()
        };
        assert!(!scheduled.is_one_off());
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let config = MaintConfig {
            install_duration_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_state_names() {
        for states in [
            vec![state("", "true")],
            vec![state("a/b", "true")],
            vec![state("..", "true")],
            vec![state("prepare", " ")],
            vec![state("prepare", "true"), state("prepare", "true")],
        ] {
            let config = MaintConfig {
                encryption_states: states,
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vmtend.json");
        let config = MaintConfig {
            distro: Some(Distro::CentOs),
            encryption_states: vec![state("prepare", "true")],
            ..Default::default()
        };
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(MaintConfig::load_from_file(&path).unwrap(), config);

        fs::write(&path, "{ not json").unwrap();
        assert!(MaintConfig::load_from_file(&path).is_err());
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("important".parse::<Category>().unwrap(), Category::Important);
        assert_eq!(Category::All.to_string(), "All");
    }
}

//! Block-device and partition resolution
//!
//! Maps mount points, filesystem UUIDs and kernel device names to stable
//! device identifiers by reading the live mount table, the static fstab and
//! the `/dev/disk/by-*` symlink farms.
//!
//! Mount points are matched by device number (`lstat` `st_dev`), not by
//! string: `/`, `/.` and a bind mount of the root all name the same device.
//!
//! Every path is taken from [`SystemPaths`] so the resolver can be pointed
//! at a scratch directory.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One line of the mount table: device, mount point, filesystem type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
}

/// Files and directories the resolver reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPaths {
    pub proc_mounts: PathBuf,
    pub fstab: PathBuf,
    pub by_uuid_dir: PathBuf,
    pub by_id_dir: PathBuf,
    /// Prefix a resolved device path must carry to be considered usable.
    pub dev_root: PathBuf,
}

impl Default for SystemPaths {
    fn default() -> Self {
        Self {
            proc_mounts: PathBuf::from("/proc/mounts"),
            fstab: PathBuf::from("/etc/fstab"),
            by_uuid_dir: PathBuf::from("/dev/disk/by-uuid"),
            by_id_dir: PathBuf::from("/dev/disk/by-id"),
            dev_root: PathBuf::from("/dev"),
        }
    }
}

/// Lookup operations the orchestrators need.
pub trait DeviceResolver {
    /// Mount-table entry for the filesystem holding `mountpoint`.
    fn fs_partition(&self, mountpoint: &str) -> Option<MountEntry>;

    /// Whether the running root filesystem is a tmpfs.
    fn is_in_memfs_root(&self) -> bool;

    /// UUID of the filesystem the static fstab mounts at `/`.
    fn rootfs_uuid_from_fstab(&self) -> Option<String>;

    /// Kernel device path for a filesystem UUID.
    fn dev_path_by_uuid(&self, uuid: &str) -> Option<String>;

    /// Stable by-id alias for a device path, or the path itself if none exists.
    fn dev_id_path_by_dev_path(&self, dev_path: &str) -> String;

    /// Whether `path` looks like a device node path.
    fn is_device_path(&self, path: &str) -> bool;
}

/// Resolver backed by the running system.
#[derive(Debug, Clone, Default)]
pub struct LiveResolver {
    paths: SystemPaths,
}

impl LiveResolver {
    pub fn new(paths: SystemPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &SystemPaths {
        &self.paths
    }

    fn mount_table(&self) -> Vec<MountEntry> {
        match fs::read_to_string(&self.paths.proc_mounts) {
            Ok(content) => parse_mount_table(&content),
            Err(e) => {
                warn!(
                    "Cannot read mount table {}: {}",
                    self.paths.proc_mounts.display(),
                    e
                );
                Vec::new()
            }
        }
    }
}

impl DeviceResolver for LiveResolver {
    fn fs_partition(&self, mountpoint: &str) -> Option<MountEntry> {
        let dev = match fs::symlink_metadata(mountpoint) {
            Ok(meta) => meta.dev(),
            Err(e) => {
                warn!("Cannot stat {}: {}", mountpoint, e);
                return None;
            }
        };

        // later mounts shadow earlier ones on the same device
        let found = self
            .mount_table()
            .into_iter()
            .filter(|entry| {
                fs::symlink_metadata(&entry.mountpoint)
                    .map(|meta| meta.dev() == dev)
                    .unwrap_or(false)
            })
            .last();
        debug!("fs_partition({}) = {:?}", mountpoint, found);
        found
    }

    fn is_in_memfs_root(&self) -> bool {
        self.mount_table()
            .iter()
            .any(|entry| entry.mountpoint == "/" && entry.fstype == "tmpfs")
    }

    fn rootfs_uuid_from_fstab(&self) -> Option<String> {
        match fs::read_to_string(&self.paths.fstab) {
            Ok(content) => parse_rootfs_uuid(&content),
            Err(e) => {
                warn!("Cannot read {}: {}", self.paths.fstab.display(), e);
                None
            }
        }
    }

    fn dev_path_by_uuid(&self, uuid: &str) -> Option<String> {
        let link = self.paths.by_uuid_dir.join(uuid);
        match fs::canonicalize(&link) {
            Ok(target) => Some(target.to_string_lossy().into_owned()),
            Err(e) => {
                warn!("Cannot resolve {}: {}", link.display(), e);
                None
            }
        }
    }

    fn dev_id_path_by_dev_path(&self, dev_path: &str) -> String {
        let target = fs::canonicalize(dev_path).unwrap_or_else(|_| PathBuf::from(dev_path));

        let mut aliases: Vec<PathBuf> = match fs::read_dir(&self.paths.by_id_dir) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(e) => {
                debug!("Cannot list {}: {}", self.paths.by_id_dir.display(), e);
                Vec::new()
            }
        };
        aliases.sort();

        aliases
            .into_iter()
            .find(|alias| fs::canonicalize(alias).is_ok_and(|resolved| resolved == target))
            .map(|alias| alias.to_string_lossy().into_owned())
            .unwrap_or_else(|| dev_path.to_string())
    }

    fn is_device_path(&self, path: &str) -> bool {
        Path::new(path).starts_with(&self.paths.dev_root)
    }
}

/// Parse `/proc/mounts` content, decoding the kernel's octal escapes.
pub fn parse_mount_table(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            Some(MountEntry {
                device: unescape_mount_field(fields.next()?),
                mountpoint: unescape_mount_field(fields.next()?),
                fstype: unescape_mount_field(fields.next()?),
            })
        })
        .collect()
}

/// Decode `\NNN` octal escapes (`\040` is a space).
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..=i + 3].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let code = (bytes[i + 1] - b'0') as u32 * 64
                + (bytes[i + 2] - b'0') as u32 * 8
                + (bytes[i + 3] - b'0') as u32;
            if let Ok(byte) = u8::try_from(code) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// First `UUID=<uuid>` entry mounted at `/` in fstab content.
pub fn parse_rootfs_uuid(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let mut fields = line.split_whitespace();
            let uuid = fields.next()?.strip_prefix("UUID=")?;
            (fields.next()? == "/").then(|| uuid.trim_matches('"').to_string())
        })
        .filter(|uuid| !uuid.is_empty())
}

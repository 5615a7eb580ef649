//! Block-device layout of the OS disk.

use tracing::{info, warn};

use crate::distro::Distro;
use crate::resolver::DeviceResolver;

const PART_INFIX: &str = "-part";

/// Root, disk and boot devices an encryption state operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    pub rootfs_mountpoint: String,
    pub rootfs_block_device: String,
    pub rootfs_disk: String,
    pub bootfs_block_device: String,
}

impl BlockLayout {
    /// Resolve the layout from the live system, falling back to the distro
    /// table for anything that cannot be resolved.
    pub fn resolve(resolver: &dyn DeviceResolver, distro: Distro) -> Self {
        let defaults = distro.device_defaults();

        let rootfs_mountpoint = if resolver.is_in_memfs_root() {
            "/oldroot"
        } else {
            "/"
        };

        let mut root_dev_path = resolver
            .fs_partition(rootfs_mountpoint)
            .map(|entry| entry.device)
            .filter(|device| device != "none");

        if root_dev_path.is_none() {
            info!("Root device is not in the mount table, parsing UUID from fstab");
            let uuid = resolver.rootfs_uuid_from_fstab();
            info!("rootfs_uuid: {:?}", uuid);
            root_dev_path = uuid.and_then(|uuid| resolver.dev_path_by_uuid(&uuid));
        }
        info!("rootfs dev path: {:?}", root_dev_path);

        let stable = root_dev_path
            .map(|path| resolver.dev_id_path_by_dev_path(&path))
            .filter(|path| resolver.is_device_path(path));

        let rootfs_block_device = match stable {
            Some(path) => path,
            None => {
                warn!(
                    "Cannot resolve the root block device, assuming {} for {}",
                    defaults.root, distro
                );
                defaults.root.to_string()
            }
        };

        let (rootfs_disk, bootfs_block_device) = match rootfs_block_device.find(PART_INFIX) {
            Some(index) => {
                let disk = rootfs_block_device[..index].to_string();
                let boot = format!("{}{}{}", disk, PART_INFIX, partition_number(defaults.boot));
                (disk, boot)
            }
            None => (defaults.disk.to_string(), defaults.boot.to_string()),
        };

        let layout = Self {
            rootfs_mountpoint: rootfs_mountpoint.to_string(),
            rootfs_block_device,
            rootfs_disk,
            bootfs_block_device,
        };
        info!(
            "rootfs_block_device: {}, rootfs_disk: {}, bootfs_block_device: {}",
            layout.rootfs_block_device, layout.rootfs_disk, layout.bootfs_block_device
        );
        layout
    }

    /// Layout as environment variables for a state command.
    pub fn env(&self) -> Vec<(String, String)> {
        vec![
            ("ROOTFS_BLOCK_DEVICE".to_string(), self.rootfs_block_device.clone()),
            ("ROOTFS_DISK".to_string(), self.rootfs_disk.clone()),
            ("BOOTFS_BLOCK_DEVICE".to_string(), self.bootfs_block_device.clone()),
        ]
    }
}

/// Trailing digits of a kernel partition name: `/dev/sda2` → `2`.
fn partition_number(device: &str) -> &str {
    let digits = device
        .bytes()
        .rev()
        .take_while(u8::is_ascii_digit)
        .count();
    &device[device.len() - digits..]
}

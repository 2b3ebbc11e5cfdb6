//! fstab and kernel root parameter generation.

use super::model::{Mountpoint, Partition};
use super::mounts::mount_fs_type;
use anyhow::{bail, Result};

/// Build the fstab for `mountpoints`: one line per mountpoint, `defaults`
/// always first in the option list.
pub fn generate_fstab(partitions: &[Partition], mountpoints: &[Mountpoint]) -> Result<String> {
    let mut fstab = String::new();

    for mnt in mountpoints {
        let part = mnt.bound(partitions)?;
        if part.fs_uuid.is_empty() {
            bail!("Missing fs UUID for partition {}", part.name);
        }

        let mut options = vec!["defaults"];
        options.extend(mnt.options.iter().map(String::as_str));

        fstab.push_str(&format!(
            "UUID={}\t{}\t{}\t{}\t0\t0\n",
            part.fs_uuid,
            mnt.mountpoint,
            mount_fs_type(&part.fs),
            options.join(",")
        ));
    }

    Ok(fstab)
}

/// `root=UUID=<uuid>` for the mountpoint at `/`, or `None` when the image
/// has no root mountpoint.
pub fn generate_kernel_root(
    partitions: &[Partition],
    mountpoints: &[Mountpoint],
) -> Result<Option<String>> {
    let Some(mnt) = mountpoints.iter().find(|m| m.mountpoint == "/") else {
        return Ok(None);
    };

    let part = mnt.bound(partitions)?;
    if part.fs_uuid.is_empty() {
        bail!("No fs UUID for root partition {}", part.name);
    }
    Ok(Some(format!("root=UUID={}", part.fs_uuid)))
}

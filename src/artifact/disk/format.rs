//! Filesystem creation and UUID probing.

use super::device::partition_device;
use super::model::Partition;
use crate::process::{Cmd, Runner};
use anyhow::{bail, Context, Result};

/// `mkfs` invocation for `part` on `path`.
///
/// FAT variants take their volume name through `-n`; everything else follows
/// the `mkfs.<fs> -L <name>` convention.
pub fn mkfs_command(part: &Partition, path: &str) -> Cmd {
    let cmd = match part.fs.as_str() {
        "fat32" => Cmd::new("mkfs.vfat").args(["-F", "32", "-n", part.name.as_str()]),
        "vfat" => Cmd::new("mkfs.vfat").args(["-n", part.name.as_str()]),
        fs => Cmd::new(format!("mkfs.{}", fs)).args(["-L", part.name.as_str()]),
    };
    cmd.arg(path)
        .label(&format!("Formatting partition {}", part.number))
        .error_msg(&format!("Failed to format partition {}", part.name))
}

/// Low-level probe of the filesystem UUID on `path`, bypassing the blkid cache.
pub fn blkid_command(path: &str) -> Cmd {
    Cmd::new("blkid")
        .args(["-o", "value", "-s", "UUID", "-p", "-c", "none", path])
        .label("Probing filesystem UUID")
        .error_msg(&format!("Failed to get uuid for {}", path))
}

/// Read the filesystem UUID from `path`.
pub fn probe_uuid(runner: &mut dyn Runner, path: &str) -> Result<String> {
    let result = blkid_command(path).run_with(runner)?;
    let uuid = result.stdout.trim();
    if uuid.is_empty() {
        bail!("Failed to get uuid for {}: blkid reported none", path);
    }
    Ok(uuid.to_string())
}

/// Format `part` on `device` and record its UUID on the partition.
pub fn format_partition(runner: &mut dyn Runner, device: &str, part: &mut Partition) -> Result<()> {
    let path = partition_device(device, part.number);
    mkfs_command(part, &path).run_with(runner)?;

    part.fs_uuid = probe_uuid(runner, &path)
        .with_context(|| format!("Partition {} has no filesystem UUID", part.name))?;
    Ok(())
}

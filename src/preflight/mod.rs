//! Preflight checks for host builds.
//!
//! Validates that the host has the partitioning and formatting tools before
//! any loop device is attached. This prevents half-built images from cryptic
//! "command not found" failures.
//!
//! # Example
//!
//! ```rust
//! use image_partition::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("parted") {
//!     println!("parted not installed");
//! }
//!
//! let tools = &[("parted", "parted"), ("blkid", "util-linux")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use crate::artifact::disk::Partition;
use anyhow::{bail, Result};

/// Check if a command exists in PATH.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Host tools every host build needs.
///
/// Each tuple is (command_name, package_name).
pub const HOST_TOOLS: &[(&str, &str)] = &[
    ("parted", "parted"),
    ("blkid", "util-linux"),
    ("losetup", "util-linux"),
    ("mkfs.vfat", "dosfstools"),
    ("mkfs.ext4", "e2fsprogs"),
];

/// Package that usually ships `mkfs.<fs>`.
fn mkfs_package(fs: &str) -> &'static str {
    match fs {
        "fat32" | "vfat" => "dosfstools",
        "ext2" | "ext3" | "ext4" => "e2fsprogs",
        "xfs" => "xfsprogs",
        "btrfs" => "btrfs-progs",
        "f2fs" => "f2fs-tools",
        _ => "unknown package",
    }
}

/// Check that specific tools are available.
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` with list of missing tools and their packages
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(tool, package)| format!("  {} (install: {})", tool, package))
        .collect();

    if !missing.is_empty() {
        bail!("Missing required host tools:\n{}", missing.join("\n"));
    }

    Ok(())
}

/// Check [`HOST_TOOLS`] plus the `mkfs` for every declared filesystem.
pub fn check_host_tools(partitions: &[Partition]) -> Result<()> {
    let mut tools: Vec<(String, &str)> = HOST_TOOLS
        .iter()
        .map(|(tool, package)| (tool.to_string(), *package))
        .collect();

    for part in partitions {
        let tool = match part.fs.as_str() {
            "fat32" | "vfat" => "mkfs.vfat".to_string(),
            fs => format!("mkfs.{}", fs),
        };
        if !tools.iter().any(|(t, _)| *t == tool) {
            tools.push((tool, mkfs_package(&part.fs)));
        }
    }

    let borrowed: Vec<(&str, &str)> = tools.iter().map(|(t, p)| (t.as_str(), *p)).collect();
    check_required_tools(&borrowed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        // 'ls' should exist on any Unix system
        assert!(command_exists("ls"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_check_required_tools_success() {
        let tools = &[("ls", "coreutils"), ("cat", "coreutils")];
        assert!(check_required_tools(tools).is_ok());
    }

    #[test]
    fn test_check_required_tools_lists_missing() {
        let tools = &[("ls", "coreutils"), ("nonexistent_command_xyz", "fake-package")];
        let err = check_required_tools(tools).unwrap_err().to_string();
        assert!(err.contains("nonexistent_command_xyz (install: fake-package)"));
        assert!(!err.contains("ls (install"));
    }

    #[test]
    fn test_host_tools_include_declared_filesystems() {
        let parts = [Partition::new("data", "0%", "100%", "nonexistentfs")];
        let err = check_host_tools(&parts).unwrap_err().to_string();
        assert!(err.contains("mkfs.nonexistentfs"));
    }

    #[test]
    fn test_mkfs_packages() {
        assert_eq!(mkfs_package("fat32"), "dosfstools");
        assert_eq!(mkfs_package("ext4"), "e2fsprogs");
        assert_eq!(mkfs_package("xfs"), "xfsprogs");
    }
}

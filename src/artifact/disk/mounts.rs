//! Mount tree management.
//!
//! Mountpoints are mounted in declaration order under the scratch mount root
//! and unmounted in exactly the reverse order, so nested mounts such as
//! `/boot/efi` are released before `/boot` and `/`.

use super::device::partition_device;
use super::model::{Mountpoint, Partition};
use anyhow::{bail, Context, Result};
use std::ffi::CString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

pub trait Mounter {
    fn mount(&mut self, source: &str, target: &Path, fstype: &str) -> Result<()>;
    fn unmount(&mut self, target: &Path) -> Result<()>;
}

/// Mounts through the `mount(2)` and `umount2(2)` syscalls.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyscallMounter;

fn c_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .with_context(|| format!("path contains a NUL byte: {}", path.display()))
}

fn c_str(value: &str) -> Result<CString> {
    CString::new(value).with_context(|| format!("value contains a NUL byte: {}", value))
}

impl Mounter for SyscallMounter {
    fn mount(&mut self, source: &str, target: &Path, fstype: &str) -> Result<()> {
        let source_c = c_str(source)?;
        let target_c = c_path(target)?;
        let fstype_c = c_str(fstype)?;

        // SAFETY: all pointers come from live CStrings; no mount data is passed.
        let rc = unsafe {
            libc::mount(
                source_c.as_ptr(),
                target_c.as_ptr(),
                fstype_c.as_ptr(),
                0,
                std::ptr::null(),
            )
        };
        if rc != 0 {
            return Err(std::io::Error::last_os_error()).with_context(|| {
                format!("mount {} on {} ({})", source, target.display(), fstype)
            });
        }
        Ok(())
    }

    fn unmount(&mut self, target: &Path) -> Result<()> {
        let target_c = c_path(target)?;

        // SAFETY: pointer comes from a live CString.
        let rc = unsafe { libc::umount2(target_c.as_ptr(), 0) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error())
                .with_context(|| format!("umount {}", target.display()));
        }
        Ok(())
    }
}

/// Filesystem type name the kernel knows `fs` by.
pub fn mount_fs_type(fs: &str) -> &str {
    match fs {
        "fat32" => "vfat",
        other => other,
    }
}

/// Host path for `mountpoint` under `root`. Leading slashes are dropped so
/// `/` maps onto `root` itself.
pub fn mount_path(root: &Path, mountpoint: &str) -> PathBuf {
    let relative = mountpoint.trim_start_matches('/');
    if relative.is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

/// Mount every mountpoint in order. Returns the mounted targets in mount
/// order; on failure the targets mounted so far are left for cleanup.
pub fn mount_all(
    mounter: &mut dyn Mounter,
    device: &str,
    root: &Path,
    partitions: &[Partition],
    mountpoints: &[Mountpoint],
    mounted: &mut Vec<PathBuf>,
) -> Result<()> {
    fs::create_dir_all(root)
        .with_context(|| format!("Failed to create mount root {}", root.display()))?;

    for mnt in mountpoints {
        let part = mnt.bound(partitions)?;
        let dev = partition_device(device, part.number);
        let target = mount_path(root, &mnt.mountpoint);

        fs::create_dir_all(&target)
            .with_context(|| format!("Failed to create mount point {}", target.display()))?;

        println!("  Mounting {} on {}...", dev, mnt.mountpoint);
        mounter
            .mount(&dev, &target, mount_fs_type(&part.fs))
            .with_context(|| format!("{} mount failed", part.name))?;
        mounted.push(target);
    }

    Ok(())
}

/// Failures collected while tearing down. Teardown never stops early.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub failures: Vec<anyhow::Error>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn record(&mut self, result: Result<()>) {
        if let Err(err) = result {
            eprintln!("warning: {:#}", err);
            self.failures.push(err);
        }
    }

    /// Collapse into a single error, for callers that want one.
    pub fn into_result(mut self) -> Result<()> {
        match self.failures.len() {
            0 => Ok(()),
            1 => Err(self.failures.remove(0)),
            n => bail!("{} teardown steps failed", n),
        }
    }
}

/// Unmount `mounted` last-first, attempting every target.
pub fn unmount_all(mounter: &mut dyn Mounter, mounted: &mut Vec<PathBuf>, report: &mut TeardownReport) {
    while let Some(target) = mounted.pop() {
        report.record(mounter.unmount(&target));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::artifact::disk::model::verify;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    /// Journals mount calls as "mount <dev> <target> <fs>" / "umount <target>".
    #[derive(Default, Clone)]
    pub(crate) struct RecordingMounter {
        pub(crate) journal: Rc<RefCell<Vec<String>>>,
        pub(crate) fail_mount: Option<String>,
        pub(crate) fail_unmount: Option<PathBuf>,
    }

    impl RecordingMounter {
        pub(crate) fn entries(&self) -> Vec<String> {
            self.journal.borrow().clone()
        }
    }

    impl Mounter for RecordingMounter {
        fn mount(&mut self, source: &str, target: &Path, fstype: &str) -> Result<()> {
            if self.fail_mount.as_deref() == Some(source) {
                bail!("EBUSY");
            }
            self.journal
                .borrow_mut()
                .push(format!("mount {} {} {}", source, target.display(), fstype));
            Ok(())
        }

        fn unmount(&mut self, target: &Path) -> Result<()> {
            self.journal
                .borrow_mut()
                .push(format!("umount {}", target.display()));
            if self.fail_unmount.as_deref() == Some(target) {
                bail!("target is busy");
            }
            Ok(())
        }
    }

    fn layout() -> (Vec<Partition>, Vec<Mountpoint>) {
        let mut parts = vec![
            Partition::new("root", "0%", "80%", "ext4"),
            Partition::new("boot", "80%", "90%", "ext2"),
            Partition::new("efi", "90%", "100%", "fat32"),
        ];
        let mut mnts = vec![
            Mountpoint::new("/", "root"),
            Mountpoint::new("/boot", "boot"),
            Mountpoint::new("/boot/efi", "efi"),
        ];
        verify(&mut parts, &mut mnts).unwrap();
        (parts, mnts)
    }

    #[test]
    fn test_mount_path() {
        let root = Path::new("/scratch/mnt");
        assert_eq!(mount_path(root, "/"), PathBuf::from("/scratch/mnt"));
        assert_eq!(mount_path(root, "/boot/efi"), PathBuf::from("/scratch/mnt/boot/efi"));
    }

    #[test]
    fn test_fat32_mounts_as_vfat() {
        assert_eq!(mount_fs_type("fat32"), "vfat");
        assert_eq!(mount_fs_type("ext4"), "ext4");
        assert_eq!(mount_fs_type("vfat"), "vfat");
    }

    #[test]
    fn test_unmount_reverses_mount_order() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("mnt");
        let (parts, mnts) = layout();
        let mut mounter = RecordingMounter::default();
        let mut mounted = Vec::new();

        mount_all(&mut mounter, "/dev/vda", &root, &parts, &mnts, &mut mounted).unwrap();
        assert!(root.join("boot/efi").is_dir());

        let mut report = TeardownReport::default();
        unmount_all(&mut mounter, &mut mounted, &mut report);
        assert!(report.is_clean());
        assert!(mounted.is_empty());

        let r = root.display();
        assert_eq!(
            mounter.entries(),
            vec![
                format!("mount /dev/vda1 {} ext4", r),
                format!("mount /dev/vda2 {}/boot ext2", r),
                format!("mount /dev/vda3 {}/boot/efi vfat", r),
                format!("umount {}/boot/efi", r),
                format!("umount {}/boot", r),
                format!("umount {}", r),
            ]
        );
    }

    #[test]
    fn test_unmount_failure_does_not_stop_teardown() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("mnt");
        let (parts, mnts) = layout();
        let mut mounter = RecordingMounter {
            fail_unmount: Some(root.join("boot")),
            ..Default::default()
        };
        let mut mounted = Vec::new();
        mount_all(&mut mounter, "/dev/vda", &root, &parts, &mnts, &mut mounted).unwrap();

        let mut report = TeardownReport::default();
        unmount_all(&mut mounter, &mut mounted, &mut report);

        assert_eq!(report.failures.len(), 1);
        let unmounts = mounter
            .entries()
            .into_iter()
            .filter(|e| e.starts_with("umount"))
            .count();
        assert_eq!(unmounts, 3);
    }

    #[test]
    fn test_mount_failure_names_partition() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("mnt");
        let (parts, mnts) = layout();
        let mut mounter = RecordingMounter {
            fail_mount: Some("/dev/vda2".into()),
            ..Default::default()
        };
        let mut mounted = Vec::new();

        let err = mount_all(&mut mounter, "/dev/vda", &root, &parts, &mnts, &mut mounted)
            .unwrap_err();

        assert!(err.to_string().contains("boot mount failed"));
        assert_eq!(mounted, vec![root.clone()]);
    }
}

//! Isolated build machine.
//!
//! When the build runs inside a VM, the target disk is a virtual disk the
//! machine exposes to the guest instead of a loop device on the host. The
//! [`Machine`] trait is the narrow piece of the VM abstraction the
//! partitioning step needs; [`QemuMachine`] is a QEMU backed implementation.

use crate::process::Cmd;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Guest path of the first virtio disk.
pub const FIRST_VIRTUAL_DISK: &str = "/dev/vda";

pub trait Machine {
    /// Create a raw disk image of `size` bytes at `path` and attach it to the
    /// machine as its next disk.
    fn create_image(&mut self, path: &Path, size: u64) -> Result<()>;
}

/// QEMU machine description. Disks become virtio drives in creation order,
/// so the first one shows up in the guest as [`FIRST_VIRTUAL_DISK`].
#[derive(Debug, Default)]
pub struct QemuMachine {
    cpu_mode: String,
    memory_gb: u32,
    kernel: Option<PathBuf>,
    initrd: Option<PathBuf>,
    append: Vec<String>,
    disks: Vec<PathBuf>,
}

impl QemuMachine {
    pub fn new(cpu_mode: &str, memory_gb: u32) -> Self {
        Self {
            cpu_mode: cpu_mode.to_string(),
            memory_gb,
            ..Default::default()
        }
    }

    pub fn kernel(mut self, path: PathBuf) -> Self {
        self.kernel = Some(path);
        self
    }

    pub fn initrd(mut self, path: PathBuf) -> Self {
        self.initrd = Some(path);
        self
    }

    /// Add a kernel command line parameter.
    pub fn append(mut self, param: &str) -> Self {
        self.append.push(param.to_string());
        self
    }

    pub fn disks(&self) -> &[PathBuf] {
        &self.disks
    }

    /// Guest device path for the disk at `index` (`/dev/vda`, `/dev/vdb`, ...).
    pub fn guest_device(index: usize) -> Result<String> {
        if index >= 26 {
            bail!("too many virtio disks ({})", index + 1);
        }
        Ok(format!("/dev/vd{}", (b'a' + index as u8) as char))
    }

    /// Render the QEMU invocation. `guest_args` are handed to the in-machine
    /// build process on the kernel command line.
    pub fn command(&self, guest_args: &[String]) -> Cmd {
        let mut cmd = Cmd::new("qemu-system-x86_64");

        // Enable KVM acceleration if available
        if Path::new("/dev/kvm").exists() {
            cmd = cmd.args(["-enable-kvm", "-cpu", "host"]);
        } else {
            cmd = cmd.args(["-cpu", self.cpu_mode.as_str()]);
        }

        cmd = cmd
            .args(["-m", &format!("{}G", self.memory_gb)])
            .args(["-display", "none", "-no-reboot"]);

        if let Some(kernel) = &self.kernel {
            cmd = cmd.arg("-kernel").arg_path(kernel);
        }
        if let Some(initrd) = &self.initrd {
            cmd = cmd.arg("-initrd").arg_path(initrd);
        }

        let mut append = self.append.clone();
        append.extend(guest_args.iter().cloned());
        if !append.is_empty() {
            cmd = cmd.args(["-append".to_string(), append.join(" ")]);
        }

        for disk in &self.disks {
            cmd = cmd.args([
                "-drive".to_string(),
                format!("file={},format=raw,if=virtio", disk.display()),
            ]);
        }

        cmd
    }
}

impl Machine for QemuMachine {
    fn create_image(&mut self, path: &Path, size: u64) -> Result<()> {
        Self::guest_device(self.disks.len())?;

        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create disk image {}", path.display()))?;
        file.set_len(size)
            .with_context(|| format!("Failed to size disk image {}", path.display()))?;

        self.disks.push(path.to_path_buf());
        Ok(())
    }
}

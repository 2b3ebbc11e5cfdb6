//! Partitioned, formatted, and mounted disk images.
//!
//! [`ImagePartitionAction`] turns a declarative list of partitions and
//! mountpoints into a partition table on a backing block device, formatted
//! filesystems with known UUIDs, a live mount tree under the scratch
//! directory, and two derived artifacts: an fstab and a `root=UUID=...`
//! kernel parameter.
//!
//! The backing device is either a virtual disk inside an isolated build
//! machine or a loop-attached sparse file on the host; every step after
//! provisioning only sees the device path.
//!
//! All table writing and formatting is delegated to `parted`, `mkfs.*` and
//! `blkid`. A failure part way through is not rolled back: already created
//! partitions stay on the device and cleanup only releases mounts and the
//! loop device.

pub mod device;
pub mod format;
pub mod fstab;
pub mod model;
pub mod mounts;
pub mod partitions;
pub mod provision;

pub use device::partition_device;
pub use model::{Mountpoint, Partition, TableType};
pub use mounts::{Mounter, SyscallMounter, TeardownReport};

use crate::action::{Action, Host};
use crate::build::context::{Backing, ImageContext};
use crate::machine::Machine;
use crate::size::parse_human_size;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Directory under the scratch dir that holds the mount tree.
pub const MOUNT_DIR: &str = "mnt";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImagePartitionAction {
    #[serde(default)]
    pub description: Option<String>,
    pub image_name: PathBuf,
    pub image_size: String,
    pub partition_type: TableType,
    #[serde(default)]
    pub partitions: Vec<Partition>,
    #[serde(default)]
    pub mountpoints: Vec<Mountpoint>,
    /// Image size in bytes, parsed by `verify`.
    #[serde(skip)]
    size: u64,
    /// Mounted targets, in mount order.
    #[serde(skip)]
    mounted: Vec<PathBuf>,
}

impl ImagePartitionAction {
    pub fn new(image_name: impl Into<PathBuf>, image_size: &str, partition_type: TableType) -> Self {
        Self {
            description: None,
            image_name: image_name.into(),
            image_size: image_size.to_string(),
            partition_type,
            partitions: Vec::new(),
            mountpoints: Vec::new(),
            size: 0,
            mounted: Vec::new(),
        }
    }

    pub fn partition(mut self, part: Partition) -> Self {
        self.partitions.push(part);
        self
    }

    pub fn mountpoint(mut self, mnt: Mountpoint) -> Self {
        self.mountpoints.push(mnt);
        self
    }

    /// Image size in bytes. Zero until verified.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Currently mounted targets, in mount order.
    pub fn mounted(&self) -> &[PathBuf] {
        &self.mounted
    }

    fn build_table(&mut self, host: &mut Host<'_>, device: &str) -> Result<()> {
        println!("  Creating {} label on {}...", self.partition_type, device);
        partitions::create_label(host.runner, device, self.partition_type)?;

        for part in self.partitions.iter_mut() {
            println!(
                "  Creating partition {} '{}' ({} - {})...",
                part.number, part.name, part.start, part.end
            );
            partitions::create_partition(host.runner, device, self.partition_type, part)?;
            format::format_partition(host.runner, device, part)?;
        }
        Ok(())
    }

    /// Generate the fstab and kernel root parameter into `ctx`, replacing
    /// whatever was generated before.
    pub fn generate_artifacts(&self, ctx: &mut ImageContext) -> Result<()> {
        ctx.fstab = fstab::generate_fstab(&self.partitions, &self.mountpoints)?;
        ctx.kernel_root =
            fstab::generate_kernel_root(&self.partitions, &self.mountpoints)?.unwrap_or_default();
        Ok(())
    }

    /// Unmount everything last-first, then detach the loop device if one was
    /// attached. Every step is attempted.
    pub fn teardown(&mut self, ctx: &ImageContext, host: &mut Host<'_>) -> TeardownReport {
        let mut report = TeardownReport::default();

        mounts::unmount_all(host.mounter, &mut self.mounted, &mut report);

        if let Some(Backing::LoopFile { device, .. }) = &ctx.backing {
            report.record(provision::detach_loop(host.runner, device));
        }

        report
    }
}

impl Action for ImagePartitionAction {
    fn name(&self) -> &str {
        self.description.as_deref().unwrap_or("image-partition")
    }

    fn verify(&mut self, _ctx: &mut ImageContext) -> Result<()> {
        model::verify(&mut self.partitions, &mut self.mountpoints)?;

        self.size = parse_human_size(&self.image_size)
            .with_context(|| format!("Failed to parse image size: {}", self.image_size))?;
        Ok(())
    }

    fn pre_machine(
        &mut self,
        ctx: &mut ImageContext,
        machine: &mut dyn Machine,
        args: &mut Vec<String>,
    ) -> Result<()> {
        let backing = provision::provision_virtual_disk(machine, &self.image_name, self.size, args)?;
        ctx.backing = Some(backing);
        Ok(())
    }

    fn pre_no_machine(&mut self, ctx: &mut ImageContext, host: &mut Host<'_>) -> Result<()> {
        let backing = provision::provision_loop_file(host.runner, &self.image_name, self.size)?;
        ctx.backing = Some(backing);
        Ok(())
    }

    fn run(&mut self, ctx: &mut ImageContext, host: &mut Host<'_>) -> Result<()> {
        let device = ctx.device()?.to_string();
        println!("=== Partitioning {} ===", device);

        self.build_table(host, &device)?;

        let root = ctx.scratch_dir.join(MOUNT_DIR);
        ctx.mount_root = Some(root.clone());
        mounts::mount_all(
            host.mounter,
            &device,
            &root,
            &self.partitions,
            &self.mountpoints,
            &mut self.mounted,
        )?;

        self.generate_artifacts(ctx)?;

        if !ctx.kernel_root.is_empty() {
            println!("  Kernel root: {}", ctx.kernel_root);
        }
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut ImageContext, host: &mut Host<'_>) -> Result<()> {
        let report = self.teardown(ctx, host);
        if !report.is_clean() {
            eprintln!(
                "warning: {} cleanup step(s) failed for {}",
                report.failures.len(),
                self.name()
            );
        }
        Ok(())
    }
}

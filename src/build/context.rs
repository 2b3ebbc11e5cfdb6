//! Shared image build context.
//!
//! One [`ImageContext`] is threaded by reference through every lifecycle
//! phase. Provisioning writes the backing device into it, the run phase writes
//! the mount root, fstab, and kernel root parameter, and later pipeline stages
//! read those back out.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Where the partitioned image lives while it is being built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backing {
    /// Virtual disk attached to an isolated build machine.
    VirtualDisk { device: String },
    /// Sparse host file attached through a loop device that must be detached
    /// during cleanup.
    LoopFile { image: PathBuf, device: String },
}

impl Backing {
    pub fn device(&self) -> &str {
        match self {
            Backing::VirtualDisk { device } | Backing::LoopFile { device, .. } => device,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageContext {
    /// Scratch directory owned by the surrounding pipeline.
    pub scratch_dir: PathBuf,
    /// Backing device, set by whichever provisioning path ran.
    pub backing: Option<Backing>,
    /// Root of the live mount tree, set during the run phase.
    pub mount_root: Option<PathBuf>,
    /// Generated fstab, one newline-terminated line per mountpoint.
    pub fstab: String,
    /// Kernel root parameter (`root=UUID=...`), empty for root-less images.
    pub kernel_root: String,
}

/// Outputs of a finished run, for handing to downstream stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    pub backing: Option<Backing>,
    pub mount_root: Option<PathBuf>,
    pub fstab: String,
    pub kernel_root: String,
}

impl ImageContext {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            ..Default::default()
        }
    }

    /// Path of the backing block device.
    pub fn device(&self) -> Result<&str> {
        self.backing
            .as_ref()
            .map(Backing::device)
            .ok_or_else(|| anyhow!("no backing device; provisioning has not run"))
    }

    pub fn mount_root(&self) -> Option<&Path> {
        self.mount_root.as_deref()
    }

    pub fn summary(&self) -> BuildSummary {
        BuildSummary {
            backing: self.backing.clone(),
            mount_root: self.mount_root.clone(),
            fstab: self.fstab.clone(),
            kernel_root: self.kernel_root.clone(),
        }
    }
}

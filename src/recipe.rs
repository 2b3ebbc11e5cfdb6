//! TOML recipe loading.
//!
//! ```toml
//! image_name = "disk.img"
//! image_size = "4GiB"
//! partition_type = "gpt"
//!
//! [[partitions]]
//! name = "efi"
//! start = "0%"
//! end = "256MiB"
//! fs = "fat32"
//! flags = ["boot", "esp"]
//!
//! [[partitions]]
//! name = "root"
//! start = "256MiB"
//! end = "100%"
//! fs = "ext4"
//!
//! [[mountpoints]]
//! mountpoint = "/"
//! partition = "root"
//! options = ["noatime"]
//!
//! [[mountpoints]]
//! mountpoint = "/boot/efi"
//! partition = "efi"
//! ```
//!
//! A relative `image_name` is resolved against the recipe's directory.

use crate::artifact::disk::ImagePartitionAction;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub fn parse_recipe(text: &str) -> Result<ImagePartitionAction> {
    let action: ImagePartitionAction = toml::from_str(text)?;
    Ok(action)
}

pub fn load_recipe(path: &Path) -> Result<ImagePartitionAction> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading recipe '{}'", path.display()))?;
    let mut action =
        parse_recipe(&text).with_context(|| format!("parsing recipe '{}'", path.display()))?;

    if action.image_name.is_relative() {
        if let Some(dir) = path.parent() {
            action.image_name = dir.join(&action.image_name);
        }
    }
    Ok(action)
}

//! Declarative partition and mountpoint model, plus validation.

use anyhow::{bail, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Component, Path};

/// Partition table flavor handed to `parted mklabel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableType {
    Gpt,
    #[serde(alias = "mbr", alias = "dos")]
    Msdos,
}

impl TableType {
    pub fn label(&self) -> &'static str {
        match self {
            TableType::Gpt => "gpt",
            TableType::Msdos => "msdos",
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Partition {
    /// 1-based position in the table, assigned by [`verify`].
    #[serde(skip)]
    pub number: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub fs: String,
    #[serde(default)]
    pub flags: Vec<String>,
    /// Filesystem UUID read back from the device after formatting.
    #[serde(skip)]
    pub fs_uuid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Mountpoint {
    pub mountpoint: String,
    pub partition: String,
    #[serde(default)]
    pub options: Vec<String>,
    /// Index into the partition list, bound by [`verify`].
    #[serde(skip)]
    pub part: Option<usize>,
}

impl Partition {
    pub fn new(name: &str, start: &str, end: &str, fs: &str) -> Self {
        Self {
            name: name.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            fs: fs.to_string(),
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: &[&str]) -> Self {
        self.flags = flags.iter().map(|f| f.to_string()).collect();
        self
    }
}

impl Mountpoint {
    pub fn new(mountpoint: &str, partition: &str) -> Self {
        Self {
            mountpoint: mountpoint.to_string(),
            partition: partition.to_string(),
            ..Default::default()
        }
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    /// The bound partition. Errors if [`verify`] has not resolved this
    /// mountpoint.
    pub fn bound<'a>(&self, partitions: &'a [Partition]) -> Result<&'a Partition> {
        match self.part.and_then(|idx| partitions.get(idx)) {
            Some(part) => Ok(part),
            None => bail!("mountpoint {} is not bound to a partition", self.mountpoint),
        }
    }
}

/// Number partitions in declaration order, check required fields, and bind
/// every mountpoint to the first partition with a matching name.
pub fn verify(partitions: &mut [Partition], mountpoints: &mut [Mountpoint]) -> Result<()> {
    for (idx, part) in partitions.iter_mut().enumerate() {
        part.number = idx as u32 + 1;

        if part.name.is_empty() {
            bail!("Partition {} without a name", part.number);
        }
        if part.start.is_empty() {
            bail!("Partition {} missing start", part.name);
        }
        if part.end.is_empty() {
            bail!("Partition {} missing end", part.name);
        }
        if part.fs.is_empty() {
            bail!("Partition {} missing fs type", part.name);
        }
    }

    for mnt in mountpoints.iter_mut() {
        // Targets are joined under the mount root and must stay inside it.
        if Path::new(&mnt.mountpoint)
            .components()
            .any(|c| c == Component::ParentDir)
        {
            bail!("Mountpoint {} escapes the mount root", mnt.mountpoint);
        }

        mnt.part = partitions.iter().position(|p| p.name == mnt.partition);
        if mnt.part.is_none() {
            bail!(
                "Couldn't find partition '{}' for mountpoint {}",
                mnt.partition,
                mnt.mountpoint
            );
        }
    }

    Ok(())
}

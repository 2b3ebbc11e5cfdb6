//! Partition table construction with `parted`.

use super::model::{Partition, TableType};
use crate::process::{Cmd, Runner};
use anyhow::{Context, Result};

/// A single `parted -s` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartedOp {
    MkLabel(TableType),
    MkPart {
        name: String,
        fs_type: String,
        start: String,
        end: String,
    },
    SetFlag {
        number: u32,
        flag: String,
    },
}

impl PartedOp {
    /// Build the `parted` invocation for this operation on `device`.
    pub fn command(&self, device: &str) -> Cmd {
        match self {
            PartedOp::MkLabel(table) => Cmd::new("parted")
                .args(["-s", device, "mklabel", table.label()])
                .label("parted")
                .error_msg(&format!("parted mklabel {} failed on {}", table, device)),
            PartedOp::MkPart {
                name,
                fs_type,
                start,
                end,
            } => Cmd::new("parted")
                .args(["-a", "none", "-s", device, "mkpart"])
                .args([name, fs_type, start, end])
                .label("parted")
                .error_msg(&format!("parted mkpart {} failed on {}", name, device)),
            PartedOp::SetFlag { number, flag } => Cmd::new("parted")
                .args(["-s", device, "set"])
                .arg(number.to_string())
                .args([flag.as_str(), "on"])
                .label("parted")
                .error_msg(&format!(
                    "parted set {} on partition {} failed on {}",
                    flag, number, device
                )),
        }
    }
}

/// Partition name written into the table. Only GPT stores per-partition
/// names; legacy tables get the generic "primary" type.
pub fn table_name(table: TableType, part: &Partition) -> String {
    match table {
        TableType::Gpt => part.name.clone(),
        TableType::Msdos => "primary".to_string(),
    }
}

/// Operations that create `part` and set its flags.
pub fn partition_ops(table: TableType, part: &Partition) -> Vec<PartedOp> {
    let mut ops = vec![PartedOp::MkPart {
        name: table_name(table, part),
        fs_type: part.fs.clone(),
        start: part.start.clone(),
        end: part.end.clone(),
    }];
    ops.extend(part.flags.iter().map(|flag| PartedOp::SetFlag {
        number: part.number,
        flag: flag.clone(),
    }));
    ops
}

/// Write a fresh label to `device`.
pub fn create_label(runner: &mut dyn Runner, device: &str, table: TableType) -> Result<()> {
    PartedOp::MkLabel(table).command(device).run_with(runner)?;
    Ok(())
}

/// Create `part` on `device` and set its flags. Stops at the first failure.
pub fn create_partition(
    runner: &mut dyn Runner,
    device: &str,
    table: TableType,
    part: &Partition,
) -> Result<()> {
    for op in partition_ops(table, part) {
        op.command(device)
            .run_with(runner)
            .with_context(|| format!("Failed to create partition {}", part.name))?;
    }
    Ok(())
}

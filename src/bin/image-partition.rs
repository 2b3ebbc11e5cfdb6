use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use image_partition::action::{Action, Host};
use image_partition::artifact::disk::{partition_device, SyscallMounter};
use image_partition::machine::QemuMachine;
use image_partition::process::HostRunner;
use image_partition::{load_recipe, pipeline, preflight, ImageContext, ImagePartitionAction};

const INTERNAL_IMAGE: &str = "--internal-image";

fn usage() -> &'static str {
    "Usage:\n  image-partition verify <recipe.toml>\n  image-partition build <recipe.toml> <scratch_dir> [--json]\n  image-partition build <recipe.toml> <scratch_dir> --internal-image <device> [--json]\n  image-partition machine <recipe.toml> <scratch_dir>"
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let json = args.iter().any(|a| a == "--json");
    let args: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|a| *a != "--json")
        .collect();

    match args.as_slice() {
        ["verify", recipe] => verify(Path::new(recipe)),
        ["build", recipe, scratch] => build(Path::new(recipe), Path::new(scratch), None, json),
        ["build", recipe, scratch, flag, device] if *flag == INTERNAL_IMAGE => {
            build(Path::new(recipe), Path::new(scratch), Some(*device), json)
        }
        ["machine", recipe, scratch] => machine(Path::new(recipe), Path::new(scratch)),
        _ => bail!(usage()),
    }
}

fn verify(recipe: &Path) -> Result<()> {
    let mut action = load_recipe(recipe)?;
    let mut ctx = ImageContext::default();
    action
        .verify(&mut ctx)
        .with_context(|| format!("verifying recipe '{}'", recipe.display()))?;

    println!(
        "{} ({} bytes, {} table)",
        action.image_name.display(),
        action.size(),
        action.partition_type
    );
    for part in &action.partitions {
        println!(
            "  {:>2}  {:<12} {:>8} - {:<8} {}",
            part.number,
            part.name,
            part.start,
            part.end,
            part.fs
        );
    }
    for mnt in &action.mountpoints {
        println!("  {} -> {}", mnt.mountpoint, mnt.partition);
    }
    Ok(())
}

fn build(recipe: &Path, scratch: &Path, device: Option<&str>, json: bool) -> Result<()> {
    let mut action = load_recipe(recipe)?;
    fs::create_dir_all(scratch)
        .with_context(|| format!("creating scratch directory '{}'", scratch.display()))?;

    preflight::check_host_tools(&action.partitions)?;

    let mut ctx = ImageContext::new(scratch);
    let (mut runner, mut mounter) = (HostRunner, SyscallMounter);
    let mut host = Host::new(&mut runner, &mut mounter);

    let mut stages: [&mut dyn Action; 1] = [&mut action];
    match device {
        Some(device) => pipeline::run_in_machine(&mut stages, &mut ctx, &mut host, device)?,
        None => pipeline::run_on_host(&mut stages, &mut ctx, &mut host)?,
    }

    write_outputs(&ctx, scratch)?;
    report(&action, &ctx, json)
}

fn machine(recipe: &Path, scratch: &Path) -> Result<()> {
    let mut action = load_recipe(recipe)?;
    fs::create_dir_all(scratch)
        .with_context(|| format!("creating scratch directory '{}'", scratch.display()))?;

    let mut ctx = ImageContext::new(scratch);
    let mut machine = QemuMachine::new("max", 2);
    let mut stages: [&mut dyn Action; 1] = [&mut action];
    let guest_args = pipeline::prepare_in_machine(&mut stages, &mut ctx, &mut machine)?;

    println!("{}", machine.command(&guest_args));
    Ok(())
}

fn write_outputs(ctx: &ImageContext, scratch: &Path) -> Result<()> {
    let fstab = scratch.join("fstab");
    fs::write(&fstab, &ctx.fstab).with_context(|| format!("writing '{}'", fstab.display()))?;

    let kernel_root = scratch.join("kernel-root");
    fs::write(&kernel_root, &ctx.kernel_root)
        .with_context(|| format!("writing '{}'", kernel_root.display()))?;
    Ok(())
}

fn report(action: &ImagePartitionAction, ctx: &ImageContext, json: bool) -> Result<()> {
    if json {
        let summary = serde_json::to_string_pretty(&ctx.summary())
            .context("serializing build summary")?;
        println!("{}", summary);
        return Ok(());
    }

    println!("\n=== Image Partitioned ===");
    if let Ok(device) = ctx.device() {
        println!("  Device: {}", device);
        for part in &action.partitions {
            println!(
                "  {} {} UUID={}",
                partition_device(device, part.number),
                part.name,
                part.fs_uuid
            );
        }
    }
    if !ctx.kernel_root.is_empty() {
        println!("  Kernel: {}", ctx.kernel_root);
    }
    print!("{}", ctx.fstab);
    Ok(())
}

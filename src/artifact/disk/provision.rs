//! Backing device provisioning.
//!
//! Exactly one path runs per build: a virtual disk created by the isolated
//! build machine, or a sparse host file attached to a loop device. Later
//! steps only ever see the resulting device path.

use crate::build::context::Backing;
use crate::machine::{Machine, FIRST_VIRTUAL_DISK};
use crate::process::{Cmd, Runner};
use anyhow::{bail, Context, Result};
use std::fs::OpenOptions;
use std::path::Path;

/// Launch argument telling the in-machine build which device to partition.
pub const INTERNAL_IMAGE_ARG: &str = "--internal-image";

/// Create the virtual disk and record its guest device path. `args` receives
/// the extra launch arguments for the in-machine build process.
pub fn provision_virtual_disk(
    machine: &mut dyn Machine,
    image: &Path,
    size: u64,
    args: &mut Vec<String>,
) -> Result<Backing> {
    machine
        .create_image(image, size)
        .with_context(|| format!("Failed to create virtual disk {}", image.display()))?;

    args.push(INTERNAL_IMAGE_ARG.to_string());
    args.push(FIRST_VIRTUAL_DISK.to_string());

    Ok(Backing::VirtualDisk {
        device: FIRST_VIRTUAL_DISK.to_string(),
    })
}

/// Create (or resize) `image` to exactly `size` bytes without allocating it.
pub fn create_sparse_image(image: &Path, size: u64) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(image)
        .with_context(|| format!("Couldn't open image file {}", image.display()))?;
    file.set_len(size)
        .with_context(|| format!("Couldn't resize image file {}", image.display()))?;
    Ok(())
}

/// Create the sparse image file and attach it to a free loop device.
pub fn provision_loop_file(runner: &mut dyn Runner, image: &Path, size: u64) -> Result<Backing> {
    create_sparse_image(image, size)?;

    let result = Cmd::new("losetup")
        .args(["-P", "-f", "--show"])
        .arg_path(image)
        .error_msg("Failed to setup loop device")
        .run_with(runner)?;

    let device = result.stdout.trim();
    if device.is_empty() {
        bail!("Failed to setup loop device: losetup printed no device");
    }
    println!("  Attached {} to {}", image.display(), device);

    Ok(Backing::LoopFile {
        image: image.to_path_buf(),
        device: device.to_string(),
    })
}

/// Detach a loop device.
pub fn detach_loop(runner: &mut dyn Runner, device: &str) -> Result<()> {
    Cmd::new("losetup")
        .args(["-d", device])
        .error_msg(&format!("Failed to detach loop device {}", device))
        .run_with(runner)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::tests::RecordingMachine;
    use crate::process::tests::ScriptedRunner;
    use crate::process::CmdResult;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_virtual_disk_records_vda() {
        let mut machine = RecordingMachine::default();
        let mut args = vec!["--verbose".to_string()];

        let backing =
            provision_virtual_disk(&mut machine, Path::new("disk.img"), 1 << 30, &mut args).unwrap();

        assert_eq!(backing.device(), "/dev/vda");
        assert_eq!(args, ["--verbose", "--internal-image", "/dev/vda"]);
        assert_eq!(machine.images, vec![(Path::new("disk.img").to_path_buf(), 1 << 30)]);
    }

    #[test]
    fn test_virtual_disk_failure_is_fatal() {
        let mut machine = RecordingMachine {
            fail: true,
            ..Default::default()
        };
        let mut args = Vec::new();
        assert!(provision_virtual_disk(&mut machine, Path::new("disk.img"), 1, &mut args).is_err());
        assert!(args.is_empty());
    }

    #[test]
    fn test_sparse_image_resizes_existing_file() {
        let temp = TempDir::new().unwrap();
        let image = temp.path().join("disk.img");
        fs::write(&image, vec![1u8; 4096]).unwrap();

        create_sparse_image(&image, 1024).unwrap();
        assert_eq!(fs::metadata(&image).unwrap().len(), 1024);

        create_sparse_image(&image, 8 << 20).unwrap();
        assert_eq!(fs::metadata(&image).unwrap().len(), 8 << 20);
    }

    #[test]
    fn test_loop_file_attaches_image() {
        let temp = TempDir::new().unwrap();
        let image = temp.path().join("disk.img");
        let mut runner = ScriptedRunner::default();
        runner.respond("losetup", CmdResult::ok("/dev/loop7\n"));

        let backing = provision_loop_file(&mut runner, &image, 1 << 20).unwrap();

        assert_eq!(
            backing,
            Backing::LoopFile {
                image: image.clone(),
                device: "/dev/loop7".into()
            }
        );
        let cmd = &runner.commands()[0];
        assert_eq!(cmd[..4], ["losetup", "-P", "-f", "--show"]);
        assert_eq!(fs::metadata(&image).unwrap().len(), 1 << 20);
    }

    #[test]
    fn test_loop_attach_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let image = temp.path().join("disk.img");
        let mut runner = ScriptedRunner::default();
        runner.respond("losetup", CmdResult::failed(1, "no free loop devices"));

        let err = provision_loop_file(&mut runner, &image, 1 << 20).unwrap_err();
        assert!(err.to_string().contains("loop device"));
        // The image file is left in place.
        assert!(image.exists());
    }

    #[test]
    fn test_unopenable_image_is_fatal() {
        let mut runner = ScriptedRunner::default();
        let err = provision_loop_file(&mut runner, Path::new("/nonexistent/dir/disk.img"), 1)
            .unwrap_err();
        assert!(err.to_string().contains("Couldn't open image file"));
        assert!(runner.commands().is_empty());
    }
}

//! Partitioned disk image construction for image build pipelines.
//!
//! Takes a declarative description of partitions and mountpoints and turns
//! it into a partition table on a block device, formatted filesystems with
//! discoverable UUIDs, a live mount tree for later stages to populate, and
//! the fstab and `root=UUID=...` kernel parameter derived from them.
//!
//! # Architecture
//!
//! ```text
//! pipeline (lifecycle driver)
//!     │  verify → pre_machine | pre_no_machine → run → cleanup
//!     ▼
//! artifact::disk::ImagePartitionAction (implements action::Action)
//!     │
//!     ├── model       partitions, mountpoints, validation
//!     ├── provision   virtual disk (machine::Machine) or loop-attached file
//!     ├── partitions  parted label / mkpart / set flags
//!     ├── format      mkfs + blkid UUID probe
//!     ├── mounts      ordered mount, reverse unmount (mounts::Mounter)
//!     └── fstab       fstab + kernel root parameter
//!
//! process::Runner   seam for every external command
//! build::context    ImageContext shared by all phases
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use image_partition::action::{Action, Host};
//! use image_partition::artifact::disk::SyscallMounter;
//! use image_partition::process::HostRunner;
//! use image_partition::{load_recipe, pipeline, ImageContext};
//!
//! let mut action = load_recipe(Path::new("image.toml"))?;
//! let mut ctx = ImageContext::new("/var/tmp/build");
//! let (mut runner, mut mounter) = (HostRunner, SyscallMounter);
//! let mut host = Host::new(&mut runner, &mut mounter);
//!
//! let mut stages: [&mut dyn Action; 1] = [&mut action];
//! pipeline::run_on_host(&mut stages, &mut ctx, &mut host)?;
//! print!("{}", ctx.fstab);
//! ```

pub mod action;
pub mod artifact;
pub mod build;
pub mod machine;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod recipe;
pub mod size;

pub use action::{Action, Host};
pub use artifact::disk::ImagePartitionAction;
pub use build::context::{Backing, BuildSummary, ImageContext};
pub use recipe::load_recipe;

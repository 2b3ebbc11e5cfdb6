//! Lifecycle contract between a pipeline stage and the engine driving it.
//!
//! The engine calls the hooks in a fixed order:
//!
//! ```text
//! verify ──► pre_machine    (build runs inside an isolated machine)
//!        └─► pre_no_machine (build runs directly on the host)
//!                 │
//!                 ▼
//!               run ──► cleanup
//! ```
//!
//! Once a `pre_*` hook has succeeded, `cleanup` runs on every exit path.

use crate::artifact::disk::mounts::Mounter;
use crate::build::context::ImageContext;
use crate::machine::Machine;
use crate::process::Runner;
use anyhow::Result;

/// Host facilities a stage may touch.
pub struct Host<'a> {
    pub runner: &'a mut dyn Runner,
    pub mounter: &'a mut dyn Mounter,
}

impl<'a> Host<'a> {
    pub fn new(runner: &'a mut dyn Runner, mounter: &'a mut dyn Mounter) -> Self {
        Self { runner, mounter }
    }
}

pub trait Action {
    /// Name for logging and identification.
    fn name(&self) -> &str;

    /// Check the declaration and prepare derived state. Must not touch any
    /// resource.
    fn verify(&mut self, ctx: &mut ImageContext) -> Result<()>;

    /// Prepare the isolated machine before it boots. `args` are extra
    /// arguments for the build process inside the machine.
    fn pre_machine(
        &mut self,
        _ctx: &mut ImageContext,
        _machine: &mut dyn Machine,
        _args: &mut Vec<String>,
    ) -> Result<()> {
        Ok(())
    }

    /// Prepare the host when no isolated machine is used.
    fn pre_no_machine(&mut self, _ctx: &mut ImageContext, _host: &mut Host<'_>) -> Result<()> {
        Ok(())
    }

    fn run(&mut self, ctx: &mut ImageContext, host: &mut Host<'_>) -> Result<()>;

    /// Release acquired resources. Must attempt every step.
    fn cleanup(&mut self, _ctx: &mut ImageContext, _host: &mut Host<'_>) -> Result<()> {
        Ok(())
    }
}

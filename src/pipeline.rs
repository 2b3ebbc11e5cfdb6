//! Drives pipeline stages through their lifecycle.
//!
//! Stages run the way a recipe lists them: every stage is verified, then
//! every stage is provisioned, then every stage runs in order, and only then
//! are the provisioned stages cleaned up in reverse. A later stage therefore
//! sees the live mount tree an earlier stage left in the context.

use crate::action::{Action, Host};
use crate::build::context::{Backing, ImageContext};
use crate::machine::Machine;
use anyhow::{Context, Result};

/// Run `actions` directly on the host: verify all, provision all, run all,
/// clean up in reverse.
///
/// Every stage whose provisioning succeeded is cleaned up, including after a
/// failed provision or run of a later stage. The first construction error
/// wins over cleanup errors.
pub fn run_on_host(
    actions: &mut [&mut dyn Action],
    ctx: &mut ImageContext,
    host: &mut Host<'_>,
) -> Result<()> {
    verify_all(actions, ctx)?;

    let mut prepared = 0;
    let mut result = Ok(());
    for action in actions.iter_mut() {
        let name = action.name().to_string();
        if let Err(err) = action
            .pre_no_machine(ctx, host)
            .with_context(|| format!("{}: provisioning failed", name))
        {
            result = Err(err);
            break;
        }
        prepared += 1;
    }

    if result.is_ok() {
        result = run_all(actions, ctx, host);
    }
    let cleanup = cleanup_all(&mut actions[..prepared], ctx, host);
    settle(result, cleanup)
}

/// Host side of a build inside an isolated machine: verify every stage and
/// let each prepare the machine. Returns the extra launch arguments for the
/// in-machine build process.
pub fn prepare_in_machine(
    actions: &mut [&mut dyn Action],
    ctx: &mut ImageContext,
    machine: &mut dyn Machine,
) -> Result<Vec<String>> {
    verify_all(actions, ctx)?;

    let mut args = Vec::new();
    for action in actions.iter_mut() {
        let name = action.name().to_string();
        action
            .pre_machine(ctx, machine, &mut args)
            .with_context(|| format!("{}: machine setup failed", name))?;
    }
    Ok(args)
}

/// Machine side of a build: the virtual disk is already attached at `device`.
pub fn run_in_machine(
    actions: &mut [&mut dyn Action],
    ctx: &mut ImageContext,
    host: &mut Host<'_>,
    device: &str,
) -> Result<()> {
    verify_all(actions, ctx)?;
    ctx.backing = Some(Backing::VirtualDisk {
        device: device.to_string(),
    });

    let result = run_all(actions, ctx, host);
    let cleanup = cleanup_all(actions, ctx, host);
    settle(result, cleanup)
}

fn verify_all(actions: &mut [&mut dyn Action], ctx: &mut ImageContext) -> Result<()> {
    for action in actions.iter_mut() {
        let name = action.name().to_string();
        action
            .verify(ctx)
            .with_context(|| format!("{}: verify failed", name))?;
    }
    Ok(())
}

/// Run stages in order, stopping at the first failure.
fn run_all(
    actions: &mut [&mut dyn Action],
    ctx: &mut ImageContext,
    host: &mut Host<'_>,
) -> Result<()> {
    for action in actions.iter_mut() {
        let name = action.name().to_string();
        action
            .run(ctx, host)
            .with_context(|| format!("{}: run failed", name))?;
    }
    Ok(())
}

/// Clean up stages last-first. Every stage is attempted; the first error is
/// returned and the rest are logged.
fn cleanup_all(
    actions: &mut [&mut dyn Action],
    ctx: &mut ImageContext,
    host: &mut Host<'_>,
) -> Result<()> {
    let mut first = None;
    for action in actions.iter_mut().rev() {
        let name = action.name().to_string();
        if let Err(err) = action
            .cleanup(ctx, host)
            .with_context(|| format!("{}: cleanup failed", name))
        {
            if first.is_none() {
                first = Some(err);
            } else {
                eprintln!("warning: {:#}", err);
            }
        }
    }
    first.map_or(Ok(()), Err)
}

fn settle(result: Result<()>, cleanup: Result<()>) -> Result<()> {
    match (result, cleanup) {
        (Err(err), Err(cleanup_err)) => {
            eprintln!("warning: {:#}", cleanup_err);
            Err(err)
        }
        (Err(err), Ok(())) => Err(err),
        (Ok(()), cleanup) => cleanup,
    }
}

//! External command execution.
//!
//! Every partitioning, formatting, probing, and loop-device operation is a
//! single invocation of an external tool with a fixed argument vector. [`Cmd`]
//! describes that invocation, and a [`Runner`] executes it. Lifecycle code only
//! ever talks to `&mut dyn Runner`, so tests (or a future syscall/library based
//! backend) can stand in for the host without touching the lifecycle logic.
//!
//! # Example
//!
//! ```rust,ignore
//! use image_partition::process::Cmd;
//!
//! let result = Cmd::new("blkid")
//!     .args(["-o", "value", "-s", "UUID"])
//!     .arg("/dev/loop0p1")
//!     .error_msg("blkid failed")
//!     .run()?;
//! println!("{}", result.stdout.trim());
//! ```

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::Path;
use std::process::Command;

/// A single external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    label: Option<String>,
    error_msg: Option<String>,
    allow_fail: bool,
}

/// Captured outcome of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdResult {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CmdResult {
    /// Successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed result with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes commands. The only seam between lifecycle logic and the host.
pub trait Runner {
    /// Run `cmd` to completion and capture its output.
    ///
    /// Returns `Err` only when the command could not be started at all; a
    /// non-zero exit is reported through [`CmdResult::code`].
    fn run(&mut self, cmd: &Cmd) -> Result<CmdResult>;
}

/// Runs commands as real host processes, blocking until they exit.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostRunner;

impl Runner for HostRunner {
    fn run(&mut self, cmd: &Cmd) -> Result<CmdResult> {
        let output = Command::new(&cmd.program)
            .args(&cmd.args)
            .output()
            .with_context(|| format!("Failed to run {}", cmd.program))?;

        Ok(CmdResult {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            label: None,
            error_msg: None,
            allow_fail: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Human label; labelled commands are echoed before they run.
    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn get_label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Line echoed before running, `None` for unlabelled commands.
    pub fn echo_line(&self) -> Option<String> {
        self.label
            .as_ref()
            .map(|label| format!("  {}: {}", label, self))
    }

    /// Message used when the command exits non-zero.
    pub fn error_msg(mut self, msg: &str) -> Self {
        self.error_msg = Some(msg.to_string());
        self
    }

    /// Report a non-zero exit through the result instead of an error.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Run on the host.
    pub fn run(&self) -> Result<CmdResult> {
        self.run_with(&mut HostRunner)
    }

    /// Run through `runner`, turning a non-zero exit into an error unless
    /// [`Cmd::allow_fail`] was set.
    pub fn run_with(&self, runner: &mut dyn Runner) -> Result<CmdResult> {
        if let Some(line) = self.echo_line() {
            println!("{}", line);
        }

        let result = runner.run(self)?;
        if result.success() || self.allow_fail {
            return Ok(result);
        }

        let status = match result.code {
            Some(code) => format!("exit code {}", code),
            None => "killed by signal".to_string(),
        };
        let stderr = result.stderr.trim();
        let detail = if stderr.is_empty() {
            status
        } else {
            format!("{}: {}", status, stderr)
        };

        match &self.error_msg {
            Some(msg) => bail!("{} ({})", msg, detail),
            None => bail!("`{}` failed ({})", self, detail),
        }
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

//! Exec: hand control to the delegated command.

use std::io;
use std::process::{Command, ExitStatus};

use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::HandoffMode;
use crate::consts::{EXIT_COMMAND_NOT_EXECUTABLE, EXIT_COMMAND_NOT_FOUND};
use crate::env::EnvironmentAssembly;

/// Argument vector the bootstrapper forwards. Owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DelegatedCommand {
  argv: Vec<String>,
}

impl DelegatedCommand {
  /// `args`, or `default_shell` when there are none.
  pub fn new(args: Vec<String>, default_shell: &str) -> Self {
    if args.is_empty() {
      return Self {
        argv: vec![default_shell.to_string()],
      };
    }
    Self { argv: args }
  }

  pub fn program(&self) -> &str {
    &self.argv[0]
  }

  pub fn args(&self) -> &[String] {
    &self.argv[1..]
  }

  pub fn argv(&self) -> &[String] {
    &self.argv
  }
}

fn build_command(cmd: &DelegatedCommand, env: &EnvironmentAssembly) -> Command {
  let mut command = Command::new(cmd.program());
  command.args(cmd.args()).env_clear().envs(env.iter());
  command
}

/// Run `cmd` with exactly `env` as its environment.
///
/// In [`HandoffMode::Replace`] this only returns if the process could not be
/// replaced; the returned code then reports why. Otherwise it returns the
/// command's own exit code.
pub fn handoff(cmd: &DelegatedCommand, env: &EnvironmentAssembly, mode: HandoffMode) -> i32 {
  info!(program = %cmd.program(), args = ?cmd.args(), mode = ?mode, "handing off");
  match mode {
    HandoffMode::Replace => replace(cmd, env),
    HandoffMode::Supervise => supervise(cmd, env),
  }
}

#[cfg(unix)]
fn replace(cmd: &DelegatedCommand, env: &EnvironmentAssembly) -> i32 {
  use std::os::unix::process::CommandExt;

  let err = build_command(cmd, env).exec();
  error!(program = %cmd.program(), error = %err, "exec failed");
  start_failure_code(&err)
}

#[cfg(not(unix))]
fn replace(cmd: &DelegatedCommand, env: &EnvironmentAssembly) -> i32 {
  supervise(cmd, env)
}

fn supervise(cmd: &DelegatedCommand, env: &EnvironmentAssembly) -> i32 {
  match build_command(cmd, env).status() {
    Ok(status) => {
      let code = exit_code(status);
      debug!(program = %cmd.program(), code, "delegated command exited");
      code
    }
    Err(err) => {
      error!(program = %cmd.program(), error = %err, "failed to start delegated command");
      start_failure_code(&err)
    }
  }
}

/// Exit status as a shell reports it: the code, or 128 + signal number.
pub fn exit_code(status: ExitStatus) -> i32 {
  if let Some(code) = status.code() {
    return code;
  }
  #[cfg(unix)]
  {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = status.signal() {
      return 128 + signal;
    }
  }
  EXIT_COMMAND_NOT_EXECUTABLE
}

fn start_failure_code(err: &io::Error) -> i32 {
  match err.kind() {
    io::ErrorKind::NotFound => EXIT_COMMAND_NOT_FOUND,
    _ => EXIT_COMMAND_NOT_EXECUTABLE,
  }
}

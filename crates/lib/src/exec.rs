//! Running user commands inside an environment snapshot.
//!
//! The program is looked up on the snapshot's own `PATH`, so a command
//! resolves to whatever the selected environment puts first, never to
//! the caller's `PATH`.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::env::EnvSnapshot;

#[derive(Debug, Error)]
pub enum ExecError {
  #[error("no command given")]
  EmptyCommand,

  #[error("command not found: {program}")]
  CommandNotFound { program: String },

  #[error("failed to run {}: {source}", .program.display())]
  Spawn {
    program: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl ExecError {
  /// Exit code reported when the command could not be run.
  pub fn exit_code(&self) -> i32 {
    match self {
      ExecError::CommandNotFound { .. } => 127,
      ExecError::EmptyCommand => 2,
      ExecError::Spawn { .. } => 126,
    }
  }
}

/// Find `program` on the `PATH` of `env`.
///
/// Names containing a path separator are resolved against `cwd` instead.
pub fn resolve_program(program: &str, env: &EnvSnapshot, cwd: &Path) -> Result<PathBuf, ExecError> {
  let not_found = || ExecError::CommandNotFound {
    program: program.to_string(),
  };

  if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
    let path = cwd.join(program);
    return if path.is_file() { Ok(path) } else { Err(not_found()) };
  }

  which::which_in(program, Some(env.path().unwrap_or_default()), cwd).map_err(|_| not_found())
}

/// Run `argv` with exactly the variables of `env`, inheriting stdio.
///
/// Returns the command's exit code; a command killed by a signal reports
/// `128 + signal`.
pub async fn run(env: &EnvSnapshot, argv: &[String], cwd: &Path) -> Result<i32, ExecError> {
  let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;
  let resolved = resolve_program(program, env, cwd)?;

  debug!(
    program = %resolved.display(),
    kind = %env.kind,
    package = %env.package,
    "running command"
  );

  let status = Command::new(&resolved)
    .args(args)
    .current_dir(cwd)
    .env_clear()
    .envs(env.iter())
    .kill_on_drop(true)
    .status()
    .await
    .map_err(|source| ExecError::Spawn {
      program: resolved.clone(),
      source,
    })?;

  Ok(exit_code(&status))
}

/// Exit code of a finished process, mapping death by signal to `128 + signal`.
pub fn exit_code(status: &ExitStatus) -> i32 {
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

  1
}

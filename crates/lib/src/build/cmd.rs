//! Running build and install commands.
//!
//! Commands run with a cleared environment set to the package's build
//! snapshot. String commands go through a shell; argv commands are spawned
//! directly after resolving the program on the snapshot's `PATH`.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use super::types::BuildError;
use crate::env::EnvSnapshot;
use crate::exec::{ExecError, exit_code, resolve_program};
use crate::graph::PackageId;
use crate::manifest::CommandSpec;

/// Run one command in `cwd`, returning its trimmed stdout.
pub async fn run_command(
  package: &PackageId,
  command: &CommandSpec,
  env: &EnvSnapshot,
  cwd: &Path,
  shell: Option<&str>,
) -> Result<String, BuildError> {
  info!(package = %package, command = %command, "running build command");

  let mut cmd = match command {
    CommandSpec::Shell(script) => {
      let (shell_cmd, shell_args) = get_shell(shell);
      let mut cmd = Command::new(shell_cmd);
      cmd.args(shell_args).arg(script);
      cmd
    }
    CommandSpec::Argv(argv) => {
      let Some((program, args)) = argv.split_first() else {
        return Err(BuildError::ProgramNotFound {
          package: package.clone(),
          program: String::new(),
        });
      };
      let resolved = resolve_program(program, env, cwd).map_err(|e| match e {
        ExecError::CommandNotFound { program } => BuildError::ProgramNotFound {
          package: package.clone(),
          program,
        },
        other => BuildError::Spawn {
          package: package.clone(),
          command: command.to_string(),
          source: std::io::Error::other(other),
        },
      })?;
      let mut cmd = Command::new(resolved);
      cmd.args(args);
      cmd
    }
  };

  cmd
    .current_dir(cwd)
    .env_clear()
    .envs(env.iter())
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  #[cfg(unix)]
  cmd.process_group(0);

  debug!(package = %package, cwd = %cwd.display(), "spawning process");

  let spawn_error = |source| BuildError::Spawn {
    package: package.clone(),
    command: command.to_string(),
    source,
  };
  let child = cmd.spawn().map_err(spawn_error)?;
  #[cfg(unix)]
  let mut group = ProcessGroup::of(&child);

  let output = child.wait_with_output().await.map_err(spawn_error)?;
  #[cfg(unix)]
  group.release();

  let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
  let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

  if !stdout.is_empty() {
    debug!(package = %package, stdout = %stdout, "command stdout");
  }
  if !stderr.is_empty() {
    debug!(package = %package, stderr = %stderr, "command stderr");
  }

  if !output.status.success() {
    return Err(BuildError::CommandFailed {
      package: package.clone(),
      command: command.to_string(),
      code: Some(exit_code(&output.status)),
      stderr,
    });
  }

  Ok(stdout)
}

/// The process group of a running command, killed as a whole when dropped
/// before the command exits. Dropping the build future on cancellation
/// would otherwise only kill the direct child.
#[cfg(unix)]
struct ProcessGroup(Option<rustix::process::Pid>);

#[cfg(unix)]
impl ProcessGroup {
  fn of(child: &tokio::process::Child) -> Self {
    let pid = child
      .id()
      .and_then(|id| i32::try_from(id).ok())
      .and_then(rustix::process::Pid::from_raw);
    Self(pid)
  }

  fn release(&mut self) {
    self.0 = None;
  }
}

#[cfg(unix)]
impl Drop for ProcessGroup {
  fn drop(&mut self) {
    let Some(pgid) = self.0.take() else {
      return;
    };
    match rustix::process::kill_process_group(pgid, rustix::process::Signal::KILL) {
      Ok(()) => debug!(pgid = ?pgid, "killed build process group"),
      Err(e) => debug!(pgid = ?pgid, error = %e, "failed to kill build process group"),
    }
  }
}

/// Shell and arguments used for string commands.
///
/// Defaults to `/bin/sh -c` rather than `$SHELL`, whose profile could alter
/// the build environment.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<&'static str>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile", "-Command"]
    } else if shell.ends_with("cmd") || shell.ends_with("cmd.exe") {
      vec!["/C"]
    } else {
      vec!["-c"]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c"])
  }

  #[cfg(windows)]
  {
    ("cmd.exe".to_string(), vec!["/C"])
  }
}

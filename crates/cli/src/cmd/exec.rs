//! `lodge x`, `lodge b` and the default invocation.

use anyhow::{Context, Result};

use lodge_lib::env::EnvKind;

use super::{GlobalOpts, load_project, runtime, shutdown_signal};

/// Run `argv` in the `kind` environment of the project root, building what
/// that environment needs first. Returns the command's exit code.
pub fn cmd_exec(opts: &GlobalOpts, kind: EnvKind, argv: &[String]) -> Result<i32> {
  let project = load_project(opts)?;
  let cwd = std::env::current_dir().context("Failed to read current directory")?;

  let rt = runtime()?;
  Ok(rt.block_on(project.exec(kind, argv, &cwd, shutdown_signal()))?)
}

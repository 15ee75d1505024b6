//! Implementation of the `lodge env` command.

use anyhow::Result;

use lodge_lib::env::EnvKind;
use lodge_lib::store::LockMode;

use super::{GlobalOpts, load_project};
use crate::output::{OutputFormat, print_json, shell_quote};

/// Print the `kind` environment of the project root.
pub fn cmd_env(opts: &GlobalOpts, kind: EnvKind, output: OutputFormat) -> Result<()> {
  let project = load_project(opts)?;
  let _lock = project.lock(LockMode::Shared, "env")?;

  let snapshot = project.snapshot(kind)?;

  if output.is_json() {
    print_json(&*snapshot)?;
  } else {
    for (name, value) in snapshot.iter() {
      println!("export {name}={}", shell_quote(value));
    }
  }

  Ok(())
}

//! Implementation of the `lodge build` command.

use std::time::Instant;

use anyhow::Result;

use lodge_lib::build::BuildTarget;
use lodge_lib::project::ProjectError;
use lodge_lib::store::LockMode;

use super::{GlobalOpts, load_project, runtime, shutdown_signal};
use crate::output::{format_duration, print_error, print_stat, print_success, print_warning};

/// Build the whole project, or `package` and its dependencies.
pub fn cmd_build(opts: &GlobalOpts, package: Option<&str>) -> Result<()> {
  let start = Instant::now();
  let project = load_project(opts)?;

  let target = match package {
    Some(name) => BuildTarget::Package(project.package_id(name)?),
    None => BuildTarget::All,
  };

  let _lock = project.lock(LockMode::Exclusive, "build")?;
  let rt = runtime()?;

  match rt.block_on(project.build_until(&target, shutdown_signal())) {
    Ok(report) => {
      print_success(&format!("Built {target}"));
      print_stat("Built", &report.built.len().to_string());
      print_stat("Cached", &report.cached.len().to_string());
      print_stat("Duration", &format_duration(start.elapsed()));
      Ok(())
    }
    Err(ProjectError::BuildFailed(report)) => {
      for (_, err) in report.failed.iter().skip(1) {
        print_error(&err.to_string());
      }
      for (_, err) in &report.skipped {
        print_warning(&err.to_string());
      }
      Err(ProjectError::BuildFailed(report).into())
    }
    Err(e) => Err(e.into()),
  }
}

//! Implementation of the `lodge ls-builds` command.
//!
//! Prints the dependency tree of the project with each package's
//! fingerprint and build status.

use std::collections::HashMap;

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};

use lodge_lib::project::PackageStatus;
use lodge_lib::store::{BuildStatus, LockMode};

use super::{GlobalOpts, load_project};
use crate::output::{OutputFormat, print_json, truncate_hash};

pub fn cmd_ls_builds(opts: &GlobalOpts, output: OutputFormat) -> Result<()> {
  let project = load_project(opts)?;
  let _lock = project.lock(LockMode::Shared, "ls-builds")?;

  let statuses = project.statuses();

  if output.is_json() {
    return print_json(&statuses);
  }

  let by_name: HashMap<&str, &PackageStatus> = statuses.iter().map(|s| (s.name.as_str(), s)).collect();
  let mut lines = Vec::new();
  render(&by_name, project.root().name(), "", "", &mut lines);
  for line in lines {
    println!("{line}");
  }

  Ok(())
}

fn render(
  by_name: &HashMap<&str, &PackageStatus>,
  name: &str,
  prefix: &str,
  child_prefix: &str,
  lines: &mut Vec<String>,
) {
  let Some(status) = by_name.get(name) else {
    return;
  };

  lines.push(format!(
    "{prefix}{}@{} {} {}",
    status.name,
    status.version,
    truncate_hash(status.fingerprint.as_str()).if_supports_color(Stream::Stdout, |s| s.dimmed()),
    colored_status(status.status)
  ));

  let count = status.dependencies.len();
  for (i, dep) in status.dependencies.iter().enumerate() {
    let last = i + 1 == count;
    let (branch, extension) = if last { ("└── ", "    ") } else { ("├── ", "│   ") };
    render(
      by_name,
      dep,
      &format!("{child_prefix}{branch}"),
      &format!("{child_prefix}{extension}"),
      lines,
    );
  }
}

fn colored_status(status: BuildStatus) -> String {
  let label = status.as_str();
  match status {
    BuildStatus::Built => label.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    BuildStatus::Failed => label.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
    _ => label.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
  }
}

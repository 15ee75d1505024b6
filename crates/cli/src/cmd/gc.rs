use std::time::Instant;

use anyhow::{Context, Result};

use lodge_lib::store::LockMode;

use super::{GlobalOpts, load_project};
use crate::output::{OutputFormat, format_bytes, format_duration, print_info, print_json, print_stat, print_success};

pub fn cmd_gc(opts: &GlobalOpts, dry_run: bool, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let project = load_project(opts)?;

  let _lock = project
    .lock(LockMode::Exclusive, "gc")
    .context("Failed to acquire store lock")?;

  let result = project.gc(dry_run)?;

  if output.is_json() {
    print_json(&result)?;
  } else {
    if dry_run {
      print_info("Dry run - no changes made");
      for path in &result.deleted_paths {
        println!("{}", path.display());
      }
    } else {
      print_success("Garbage collection complete!");
    }
    print_stat("Installs removed", &result.stats.installs_deleted.to_string());
    print_stat("Build directories removed", &result.stats.builds_deleted.to_string());
    print_stat("Space freed", &format_bytes(result.stats.total_bytes_freed()));
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}

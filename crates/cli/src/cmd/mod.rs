mod build;
mod env;
mod exec;
mod gc;
mod ls_builds;

pub use build::cmd_build;
pub use env::cmd_env;
pub use exec::cmd_exec;
pub use gc::cmd_gc;
pub use ls_builds::cmd_ls_builds;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use lodge_lib::config::Config;
use lodge_lib::project::Project;

/// Options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOpts {
  pub project: Option<PathBuf>,
  pub jobs: Option<usize>,
}

/// Locate and load the project, applying command-line overrides to the
/// environment configuration.
pub fn load_project(opts: &GlobalOpts) -> Result<Project> {
  let mut config = Config::from_env().context("Invalid configuration")?;
  if let Some(jobs) = opts.jobs {
    config = config.with_jobs(jobs);
  }

  let start = match &opts.project {
    Some(dir) => dunce::canonicalize(dir).with_context(|| format!("Project directory {} not found", dir.display()))?,
    None => std::env::current_dir().context("Failed to read current directory")?,
  };
  let root = Project::discover(&start)?;
  debug!(root = %root.display(), "project root");

  Ok(Project::load(&root, config)?)
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}

/// Resolves on Ctrl-C. Never resolves if the signal handler cannot be installed.
pub async fn shutdown_signal() {
  if tokio::signal::ctrl_c().await.is_err() {
    std::future::pending::<()>().await;
  }
}

//! Runtime configuration.
//!
//! Settings come from `LODGE_*` environment variables; the CLI overrides
//! individual fields from its flags.

use std::path::PathBuf;

use thiserror::Error;

use crate::consts::{DEFAULT_SYSTEM_PATH, ENV_JOBS, ENV_SHELL, ENV_SOURCE_ROOTS, ENV_SYSTEM_PATH};
use crate::platform::paths::store_dir;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid value for {var}: '{value}' ({reason})")]
  InvalidValue {
    var: &'static str,
    value: String,
    reason: String,
  },
}

#[derive(Debug, Clone)]
pub struct Config {
  /// Root of the package store.
  pub store_dir: PathBuf,

  /// Maximum number of packages built concurrently.
  pub jobs: usize,

  /// Extra directories searched for `<root>/<name>` packages.
  pub source_roots: Vec<PathBuf>,

  /// `PATH` every build environment starts from.
  pub system_path: String,

  /// Shell used for string commands. `None` means `/bin/sh`.
  pub shell: Option<String>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      store_dir: store_dir(),
      jobs: default_jobs(),
      source_roots: Vec::new(),
      system_path: DEFAULT_SYSTEM_PATH.to_string(),
      shell: None,
    }
  }
}

impl Config {
  pub fn from_env() -> Result<Self, ConfigError> {
    let mut config = Self::default();

    if let Some(raw) = non_empty_var(ENV_JOBS) {
      config.jobs = match raw.parse::<usize>() {
        Ok(0) => {
          return Err(ConfigError::InvalidValue {
            var: ENV_JOBS,
            value: raw,
            reason: "must be at least 1".to_string(),
          });
        }
        Ok(jobs) => jobs,
        Err(e) => {
          return Err(ConfigError::InvalidValue {
            var: ENV_JOBS,
            value: raw,
            reason: e.to_string(),
          });
        }
      };
    }

    if let Some(raw) = non_empty_var(ENV_SOURCE_ROOTS) {
      config.source_roots = std::env::split_paths(&raw).filter(|p| !p.as_os_str().is_empty()).collect();
    }

    if let Some(path) = non_empty_var(ENV_SYSTEM_PATH) {
      config.system_path = path;
    }

    config.shell = non_empty_var(ENV_SHELL);

    Ok(config)
  }

  pub fn with_store_dir(mut self, store_dir: impl Into<PathBuf>) -> Self {
    self.store_dir = store_dir.into();
    self
  }

  pub fn with_jobs(mut self, jobs: usize) -> Self {
    self.jobs = jobs.max(1);
    self
  }

  pub fn with_source_roots(mut self, roots: Vec<PathBuf>) -> Self {
    self.source_roots = roots;
    self
  }
}

fn non_empty_var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn default_jobs() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

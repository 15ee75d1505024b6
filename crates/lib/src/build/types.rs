//! Build targets, errors and reports.

use std::fmt;

use thiserror::Error;

use crate::env::EnvError;
use crate::graph::PackageId;
use crate::placeholder::PlaceholderError;
use crate::store::MarkerError;

/// Which part of the graph to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTarget {
  /// Every package.
  All,
  /// A package and its transitive dependencies.
  Package(PackageId),
  /// Only the transitive dependencies of a package.
  DependenciesOf(PackageId),
}

impl fmt::Display for BuildTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildTarget::All => write!(f, "all packages"),
      BuildTarget::Package(id) => write!(f, "{id}"),
      BuildTarget::DependenciesOf(id) => write!(f, "dependencies of {id}"),
    }
  }
}

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("{package}: `{command}` failed with exit code {}{}", fmt_code(.code), fmt_stderr(.stderr))]
  CommandFailed {
    package: PackageId,
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("{package}: failed to run `{command}`: {source}")]
  Spawn {
    package: PackageId,
    command: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{package}: program '{program}' not found in the build PATH")]
  ProgramNotFound { package: PackageId, program: String },

  #[error("{package}: not built because dependency {dependency} failed")]
  DependencyBuildFailed { package: PackageId, dependency: PackageId },

  #[error("{package}: {source}")]
  Placeholder {
    package: PackageId,
    #[source]
    source: PlaceholderError,
  },

  #[error(transparent)]
  Env(#[from] EnvError),

  #[error("{package}: {context}: {source}")]
  Io {
    package: PackageId,
    context: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{package}: {source}")]
  Marker {
    package: PackageId,
    #[source]
    source: MarkerError,
  },

  #[error("{package}: build interrupted")]
  Interrupted { package: PackageId },

  #[error("unknown package {0}")]
  UnknownPackage(PackageId),

  #[error("build cancelled")]
  Cancelled,
}

fn fmt_code(code: &Option<i32>) -> String {
  code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

fn fmt_stderr(stderr: &str) -> String {
  let trimmed = stderr.trim_end();
  if trimmed.is_empty() {
    String::new()
  } else {
    format!("\n{trimmed}")
  }
}

impl BuildError {
  pub fn io(package: &PackageId, context: impl Into<String>) -> impl FnOnce(std::io::Error) -> BuildError {
    let package = package.clone();
    let context = context.into();
    move |source| BuildError::Io {
      package,
      context,
      source,
    }
  }

  /// Exit code of the failing build command, if a command failed.
  pub fn exit_code(&self) -> Option<i32> {
    match self {
      BuildError::CommandFailed { code, .. } => *code,
      _ => None,
    }
  }
}

/// Outcome of building a single package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  /// The build commands ran.
  Built,
  /// A complete install prefix already existed.
  Cached,
}

#[derive(Debug, Default)]
pub struct BuildReport {
  pub built: Vec<PackageId>,
  pub cached: Vec<PackageId>,
  /// Packages whose own build failed.
  pub failed: Vec<(PackageId, BuildError)>,
  /// Packages not attempted because a dependency failed.
  pub skipped: Vec<(PackageId, BuildError)>,
}

impl BuildReport {
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty()
  }

  pub fn first_failure(&self) -> Option<&BuildError> {
    self.failed.first().map(|(_, e)| e)
  }

  /// Process exit code for this report: 0 on success, otherwise the exit
  /// code of the first failed command, or 1.
  pub fn exit_code(&self) -> i32 {
    if self.is_success() {
      return 0;
    }
    self
      .first_failure()
      .and_then(BuildError::exit_code)
      .filter(|&code| code != 0)
      .unwrap_or(1)
  }

  pub(crate) fn record(&mut self, id: PackageId, outcome: Outcome) {
    match outcome {
      Outcome::Built => self.built.push(id),
      Outcome::Cached => self.cached.push(id),
    }
  }
}
